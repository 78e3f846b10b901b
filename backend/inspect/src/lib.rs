//! # Registry Inspection
//!
//! Read-only view of the admin code registry for operators. Codes are printed masked, same as in
//! the server logs. Nothing here writes, claims only ever change through the server.
use registry::AdminCodeRegistry;
use server::{
    claims::AdminCodeClaimService,
    config::StoreConfig,
    database::{DocumentStore, Store},
};

pub fn render(registry: &AdminCodeRegistry) -> Vec<String> {
    registry
        .iter()
        .map(|(code, state)| {
            let owner = state
                .claimed_by
                .as_ref()
                .map_or("unclaimed", |account| account.as_str());

            format!(
                "{:<16} {:<32} {}",
                code.masked(),
                owner,
                state.created_at.to_rfc3339()
            )
        })
        .collect()
}

pub async fn load<S: DocumentStore>(
    claims: &AdminCodeClaimService<S>,
) -> anyhow::Result<Option<AdminCodeRegistry>> {
    Ok(claims.snapshot().await?)
}

pub async fn print_registry(config: &StoreConfig) -> anyhow::Result<()> {
    let store = Store::open(config).await?;
    let claims = AdminCodeClaimService::new(store, config.registry_key.clone(), config.retry.clone());

    let Some(registry) = load(&claims).await? else {
        println!("Registry {} not created yet.", config.registry_key);
        return Ok(());
    };

    println!("Registry: {}", config.registry_key);
    println!("Codes: {}\n", registry.len());

    for line in render(&registry) {
        println!("{line}");
    }

    let claimed = registry
        .iter()
        .filter(|(_, state)| state.claimed_by.is_some())
        .count();
    println!("\nClaimed: {claimed}/{}", registry.len());

    Ok(())
}
