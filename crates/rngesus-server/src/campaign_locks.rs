//! One async mutex per campaign, so that sessions writing to the same
//! campaign (regeneration, character rolls, chat turns) run one at a time
//! while different campaigns proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use rngesus_shared::CampaignId;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Clone, Default)]
pub struct CampaignLocks {
    locks: Arc<Mutex<HashMap<CampaignId, Arc<Mutex<()>>>>>,
}

impl CampaignLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other session holds `id`. The returned guard keeps the
    /// campaign locked until it is dropped.
    pub async fn acquire(&self, id: CampaignId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries nobody else references are idle.
            locks.retain(|other, lock| *other == id || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id).or_default())
        };

        if lock.try_lock().is_err() {
            debug!(campaign_id = %id, "Waiting for running session on campaign");
        }
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_campaign_waits_for_the_holder() {
        let locks = CampaignLocks::new();
        let guard = locks.acquire(CampaignId(1)).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(CampaignId(1)).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_campaigns_do_not_block() {
        let locks = CampaignLocks::new();
        let _one = locks.acquire(CampaignId(1)).await;
        let _two = tokio::time::timeout(Duration::from_secs(1), locks.acquire(CampaignId(2)))
            .await
            .expect("second campaign should not wait");
    }

    #[tokio::test]
    async fn idle_entries_are_dropped() {
        let locks = CampaignLocks::new();
        drop(locks.acquire(CampaignId(1)).await);
        drop(locks.acquire(CampaignId(2)).await);
        assert_eq!(locks.tracked().await, 1);
    }
}
