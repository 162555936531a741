use accrual_engine::{
    infrastructure::{config::Config, db},
    telemetry,
};
use dotenvy::dotenv;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init();

    let config = Config::from_env()?;
    if config.store.provider != "postgres" {
        anyhow::bail!(
            "migrations only apply to the postgres store provider; set ENGINE__STORE__PROVIDER=postgres"
        );
    }
    let pool = db::connect(&config.database).await?;
    db::run_migrations(&pool).await?;

    info!("database migrations completed");

    Ok(())
}
