//! Fires concurrent claims for one code from distinct accounts against a running server.
//!
//! For an unclaimed code exactly one account should come back granted. For a claimed one, none.
use anyhow::{Context, bail};
use clap::Parser;
use futures_util::future::join_all;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server base URL, e.g. http://localhost:1111
    url: String,

    code: String,

    #[arg(long, default_value_t = 8)]
    accounts: usize,

    /// Gateway token the server expects
    #[arg(long, env = "GATEWAY_TOKEN")]
    token: String,
}

#[derive(Deserialize)]
struct ClaimResponse {
    granted: bool,
}

#[derive(Debug, PartialEq)]
enum Attempt {
    Granted,
    Denied,
    Failed(String),
}

async fn claim(client: &Client, args: &Args, account: &str) -> Attempt {
    let response = client
        .post(format!("{}/admin/claim", args.url.trim_end_matches('/')))
        .header("x-gateway-token", &args.token)
        .header("x-account-id", account)
        .json(&json!({ "code": args.code }))
        .send()
        .await;

    let response = match response {
        Ok(response) if response.status() == StatusCode::OK => response,
        Ok(response) => return Attempt::Failed(response.status().to_string()),
        Err(e) => return Attempt::Failed(e.to_string()),
    };

    match response.json::<ClaimResponse>().await {
        Ok(ClaimResponse { granted: true }) => Attempt::Granted,
        Ok(ClaimResponse { granted: false }) => Attempt::Denied,
        Err(e) => Attempt::Failed(e.to_string()),
    }
}

fn count_granted(attempts: &[(String, Attempt)]) -> usize {
    attempts
        .iter()
        .filter(|(_, attempt)| *attempt == Attempt::Granted)
        .count()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = Client::builder().build().context("building HTTP client")?;

    let accounts: Vec<String> = (0..args.accounts)
        .map(|i| format!("tester-{}-{i}", std::process::id()))
        .collect();

    let results = join_all(accounts.iter().map(|account| claim(&client, &args, account))).await;
    let attempts: Vec<(String, Attempt)> = accounts.into_iter().zip(results).collect();

    for (account, attempt) in &attempts {
        println!("{account}: {attempt:?}");
    }

    let granted = count_granted(&attempts);
    println!("\nGranted: {granted}/{}", attempts.len());

    if granted > 1 {
        bail!("{granted} accounts were granted the same code");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_granted() {
        let attempts = vec![
            ("a".to_string(), Attempt::Denied),
            ("b".to_string(), Attempt::Granted),
            ("c".to_string(), Attempt::Failed("503".to_string())),
        ];

        assert_eq!(count_granted(&attempts), 1);
    }
}
