use std::sync::Arc;

use backend::{build_rocket, config::Config, queries::PgVoteStore, service::VoteService};
use shuttle_runtime::CustomError;
use sqlx::PgPool;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, error};

async fn run_reconcile_task(service: VoteService, every: std::time::Duration) {
    let mut interval = interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately and recovery has just run.
    interval.tick().await;
    info!("🧮 Tally reconciler started");

    loop {
        interval.tick().await;
        for report in service.reconcile().await {
            info!("✓ Round {} recounted: {} vote(s), {} recovered", report.round_id, report.total, report.drift);
        }
    }
}

#[shuttle_runtime::main]
async fn rocket(
    #[shuttle_shared_db::Postgres] pool: PgPool,
    #[shuttle_runtime::Secrets] secret_store: shuttle_runtime::SecretStore,
) -> shuttle_rocket::ShuttleRocket {
    info!("🚀 Starting Meme vs Meme vote server");

    let config = Config::from_lookup(|key| secret_store.get(key)).map_err(CustomError::new)?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(CustomError::new)?;

    info!("📋 Migrations complete");

    let service = VoteService::from_config(&config, Arc::new(PgVoteStore::new(pool)));

    for report in service.recover().await {
        info!("📊 Round {} recovered with {} vote(s)", report.round_id, report.total);
    }
    if service.rounds().count() == 0 {
        error!("No voting rounds configured");
    }

    tokio::spawn(run_reconcile_task(service.clone(), config.reconcile_interval));

    Ok(build_rocket(&config, service).into())
}
