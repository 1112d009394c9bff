//! Background lease renewer.
//!
//! Hubs expire subscriptions when their lease runs out. The renewer
//! periodically looks for active subscriptions close to expiry and enqueues a
//! renewal for each.

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

use super::repository::SubscriptionRepository;
use super::tasks::{Task, TaskQueue};
use crate::config::PushConfig;
use crate::db::Database;

/// Longest renewal window honoured, one year.
const MAX_RENEW_BEFORE_SECS: i64 = 365 * 86400;

/// Lease renewal background loop.
pub struct LeaseRenewer {
    db: Database,
    queue: TaskQueue,
    check_interval: Duration,
    renew_before: ChronoDuration,
}

impl LeaseRenewer {
    /// Create a renewer using the push configuration's timings.
    pub fn new(db: Database, queue: TaskQueue, config: &PushConfig) -> Self {
        Self {
            db,
            queue,
            check_interval: Duration::from_secs(config.renew_check_interval_secs.max(1)),
            renew_before: ChronoDuration::seconds(
                i64::try_from(config.renew_before_secs)
                    .unwrap_or(MAX_RENEW_BEFORE_SECS)
                    .min(MAX_RENEW_BEFORE_SECS),
            ),
        }
    }

    /// Run the renewer loop.
    pub async fn run(&self) {
        info!(
            "Lease renewer started (check interval: {} seconds)",
            self.check_interval.as_secs()
        );

        let mut timer = interval(self.check_interval);

        loop {
            timer.tick().await;
            self.renew_expiring().await;
        }
    }

    /// Enqueue renewals for every lease ending soon. Returns how many.
    pub async fn renew_expiring(&self) -> usize {
        let cutoff = Utc::now() + self.renew_before;
        let expiring = match SubscriptionRepository::new(self.db.pool())
            .list_expiring(cutoff)
            .await
        {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                error!("Failed to list expiring subscriptions: {}", e);
                return 0;
            }
        };

        if expiring.is_empty() {
            debug!("No subscriptions due for renewal");
            return 0;
        }

        info!("Renewing {} subscription(s)", expiring.len());
        expiring
            .into_iter()
            .filter(|subscription| {
                self.queue.enqueue(Task::Renew {
                    subscription_id: subscription.id,
                })
            })
            .count()
    }
}
