//! Worker process boot sequence.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pulse_cache::{DisabledLeaderboard, LeaderboardSettings, RedisLeaderboard};
use pulse_config::{CacheSettings, PipelineConfig, QueueBackend};
use pulse_core::Leaderboard;
use pulse_data::{LedgerStore, NotificationRepository, PgJobQueue};
use pulse_events::{JobQueue, MemoryQueue};
use pulse_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, Metrics};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::pipeline::{Pipeline, PipelineDeps, PipelineOptions};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const JOB_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Entry point for the worker boot sequence: load configuration, install
/// logging, run until Ctrl-C.
///
/// # Errors
///
/// Returns an error if configuration, logging, the database or the cache
/// client cannot be initialised.
pub async fn run_app() -> AppResult<()> {
    let config =
        PipelineConfig::from_env().map_err(|err| AppError::config("config.from_env", err))?;

    let format = config
        .log
        .format
        .as_deref()
        .map_or_else(LogFormat::infer, LogFormat::from_label);
    pulse_telemetry::init_logging(&LoggingConfig {
        level: &config.log.level,
        format,
        build_sha: option_env!("PULSE_BUILD_SHA").unwrap_or("dev"),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("pulse-worker");

    info!("pulse worker bootstrap starting");
    Box::pin(run_app_with(config, shutdown_signal())).await
}

/// Boot sequence with an injected shutdown future, for tests and embedding.
///
/// # Errors
///
/// Returns an error if the database or cache client cannot be initialised, or
/// whatever `shutdown` resolves to.
pub async fn run_app_with<S>(config: PipelineConfig, shutdown: S) -> AppResult<()>
where
    S: Future<Output = AppResult<()>>,
{
    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;

    let pool = pulse_data::connect(
        &config.database_url,
        config.database_max_connections,
        ACQUIRE_TIMEOUT,
    )
    .await
    .map_err(|err| AppError::data("data.connect", err))?;
    pulse_data::run_migrations(&pool)
        .await
        .map_err(|err| AppError::data("data.migrate", err))?;

    let (stop_janitor, janitor_signal) = watch::channel(false);
    let (queue, janitor): (Arc<dyn JobQueue>, Option<JoinHandle<()>>) =
        match config.queue_backend {
            QueueBackend::Postgres => {
                let queue = PgJobQueue::new(pool.clone());
                let janitor = tokio::spawn(purge_completed_jobs(queue.clone(), janitor_signal));
                (Arc::new(queue), Some(janitor))
            }
            QueueBackend::Memory => {
                warn!("in-memory queue selected; pending jobs are lost on restart");
                (Arc::new(MemoryQueue::new()), None)
            }
        };

    let deps = PipelineDeps {
        ledger: Arc::new(LedgerStore::new(pool.clone())),
        leaderboard: build_leaderboard(&config.cache)?,
        notifications: Arc::new(NotificationRepository::new(pool.clone())),
        queue,
        metrics: metrics.clone(),
    };
    let pipeline = Pipeline::start(deps, PipelineOptions::from_config(&config));
    info!(
        queue_backend = config.queue_backend.as_str(),
        cache_enabled = config.cache.redis_url.is_some(),
        "pulse worker ready"
    );

    let outcome = shutdown.await;
    info!("shutdown requested; draining consumers");
    pipeline.shutdown().await;

    let _ = stop_janitor.send(true);
    if let Some(janitor) = janitor
        && let Err(err) = janitor.await
    {
        warn!(error = %err, "job purge task join failed");
    }
    pool.close().await;

    let snapshot = metrics.snapshot();
    info!(
        awards_enqueued = snapshot.awards_enqueued,
        awards_dropped = snapshot.awards_dropped,
        level_ups = snapshot.level_ups_total,
        xp_awarded = snapshot.xp_awarded_total,
        "pulse worker stopped"
    );
    if let Some(exposition) = final_exposition(&metrics) {
        debug!(metrics = %exposition, "final metrics exposition");
    }
    outcome
}

fn final_exposition(metrics: &Metrics) -> Option<String> {
    match metrics.render() {
        Ok(text) => Some(text),
        Err(err) => {
            warn!(error = %err, "final metrics could not be rendered");
            None
        }
    }
}

async fn shutdown_signal() -> AppResult<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|source| AppError::Signal { source })
}

fn build_leaderboard(settings: &CacheSettings) -> AppResult<Arc<dyn Leaderboard>> {
    let Some(url) = settings.redis_url.as_deref() else {
        warn!("REDIS_URL not set; leaderboard cache disabled");
        return Ok(Arc::new(DisabledLeaderboard));
    };
    let board = RedisLeaderboard::new(
        url,
        LeaderboardSettings {
            key: settings.key.clone(),
            ttl: settings.ttl,
            connect_attempts: settings.connect_attempts,
            connect_timeout: settings.connect_timeout,
            command_timeout: settings.command_timeout,
            cooldown: settings.cooldown,
        },
    )
    .map_err(|err| AppError::cache("cache.open", err))?;
    Ok(Arc::new(board))
}

async fn purge_completed_jobs(queue: PgJobQueue, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => match queue.purge_completed(JOB_RETENTION).await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "purged completed jobs"),
                Err(err) => warn!(error = %err, "completed job purge failed"),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
