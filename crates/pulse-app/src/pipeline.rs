//! Service wiring shared by the worker binary and embedding hosts.
//!
//! [`Pipeline::start`] takes already-constructed adapters, so the same wiring
//! runs against Postgres and Redis in production and in-memory fakes in tests.

use std::sync::Arc;
use std::time::Duration;

use pulse_config::PipelineConfig;
use pulse_core::{Leaderboard, NotificationStore, UserLedger};
use pulse_events::{
    Backoff, Consumer, ConsumerHandle, ConsumerOptions, JobQueue, QueueName, RetryPolicy,
};
use pulse_telemetry::Metrics;

use crate::dispatcher::AwardDispatcher;
use crate::gamification::GamificationWorker;
use crate::notifications::NotificationWorker;
use crate::ranking::RankingService;

/// Adapters the pipeline runs on.
#[derive(Clone)]
pub struct PipelineDeps {
    /// Authoritative XP ledger.
    pub ledger: Arc<dyn UserLedger>,
    /// Leaderboard cache.
    pub leaderboard: Arc<dyn Leaderboard>,
    /// Notification persistence.
    pub notifications: Arc<dyn NotificationStore>,
    /// Queue carrying both gamification and notification jobs.
    pub queue: Arc<dyn JobQueue>,
    /// Metrics registry.
    pub metrics: Metrics,
}

/// Consumer and dispatcher tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Gamification consumer.
    pub gamification: ConsumerOptions,
    /// Notification consumer.
    pub notifications: ConsumerOptions,
    /// Bound on a single dispatcher enqueue.
    pub dispatch_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            gamification: ConsumerOptions::for_queue(QueueName::Gamification, 5),
            notifications: ConsumerOptions::for_queue(QueueName::Notifications, 10),
            dispatch_timeout: Duration::from_secs(2),
        }
    }
}

impl PipelineOptions {
    /// Options from loaded configuration: exponential retries for
    /// gamification, fixed retries for notifications.
    #[must_use]
    pub const fn from_config(config: &PipelineConfig) -> Self {
        Self {
            gamification: ConsumerOptions {
                concurrency: config.gamification.concurrency,
                retry: RetryPolicy {
                    max_attempts: config.gamification.max_attempts,
                    backoff: Backoff::Exponential {
                        base: config.gamification.backoff,
                    },
                },
                poll_interval: config.poll_interval,
            },
            notifications: ConsumerOptions {
                concurrency: config.notifications.concurrency,
                retry: RetryPolicy {
                    max_attempts: config.notifications.max_attempts,
                    backoff: Backoff::Fixed {
                        delay: config.notifications.backoff,
                    },
                },
                poll_interval: config.poll_interval,
            },
            dispatch_timeout: config.dispatch_timeout,
        }
    }
}

/// Running consumers plus the request-path services.
pub struct Pipeline {
    dispatcher: AwardDispatcher,
    ranking: RankingService,
    metrics: Metrics,
    gamification: ConsumerHandle,
    notifications: ConsumerHandle,
}

impl Pipeline {
    /// Spawn both consumers and build the dispatcher and ranking service.
    #[must_use]
    pub fn start(deps: PipelineDeps, options: PipelineOptions) -> Self {
        let PipelineDeps {
            ledger,
            leaderboard,
            notifications,
            queue,
            metrics,
        } = deps;

        let gamification_worker = Arc::new(GamificationWorker::new(
            Arc::clone(&ledger),
            Arc::clone(&leaderboard),
            Arc::clone(&queue),
            metrics.clone(),
        ));
        let gamification = Consumer::new(
            Arc::clone(&queue),
            gamification_worker,
            options.gamification,
            metrics.clone(),
        )
        .spawn();

        let notification_worker = Arc::new(NotificationWorker::new(notifications));
        let notifications = Consumer::new(
            Arc::clone(&queue),
            notification_worker,
            options.notifications,
            metrics.clone(),
        )
        .spawn();

        Self {
            dispatcher: AwardDispatcher::new(queue, metrics.clone(), options.dispatch_timeout),
            ranking: RankingService::new(ledger, leaderboard, metrics.clone()),
            metrics,
            gamification,
            notifications,
        }
    }

    /// Entry point for route handlers awarding XP.
    #[must_use]
    pub const fn dispatcher(&self) -> &AwardDispatcher {
        &self.dispatcher
    }

    /// Leaderboard read path.
    #[must_use]
    pub const fn ranking(&self) -> &RankingService {
        &self.ranking
    }

    /// Shared metrics registry.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Stop claiming new jobs and wait for in-flight ones, gamification first.
    pub async fn shutdown(self) {
        self.gamification.shutdown().await;
        self.notifications.shutdown().await;
    }
}
