use clap::Parser;
use server::config::StoreConfig;
use tracing_subscriber::{EnvFilter, fmt};

/// Print the admin code registry.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Registry key, defaults to REGISTRY_KEY or the server default.
    #[arg(long)]
    key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let mut config = StoreConfig::load()?;
    if let Some(key) = args.key {
        config.registry_key = key;
    }

    inspect::print_registry(&config).await
}
