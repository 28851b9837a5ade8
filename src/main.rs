use azure_sql_client::AzureSqlClient;
use azure_sql_client::config::Config;
use azure_sql_client::driver::OdbcDriver;
use mimalloc::MiMalloc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        tenant_id = %cfg.identity.tenant_id,
        subscription_id = %cfg.identity.subscription_id,
        authority = %cfg.cloud.authority_host,
        loglevel = %cfg.loglevel
    );

    let mut client = AzureSqlClient::from_config(&cfg, OdbcDriver).await?;
    info!("{}", client);

    let server = client.lookup_server(None, None).await?;
    info!(
        server = %server.name,
        location = %server.location,
        fqdn = %server.properties.fully_qualified_domain_name.as_deref().unwrap_or("<none>"),
        state = %server.properties.state.as_deref().unwrap_or("<unknown>"),
        "server"
    );

    let Some(database_name) = client.database_name().map(str::to_owned) else {
        warn!("no target database configured; skipping connect");
        return Ok(());
    };
    let database = client.lookup_database(None, None, None).await?;
    info!(
        database = %database.name,
        status = %database.properties.status.as_deref().unwrap_or("<unknown>"),
        "database"
    );

    client.connect(&server.name, &database_name, None).await?;
    let outcome = client.close()?;
    info!(?outcome, "done");
    Ok(())
}
