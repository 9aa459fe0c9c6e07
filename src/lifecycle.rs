//! Process-wide run state: the shutdown signal and the one-time steps that happen as shards come
//! online.

use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tokio_util::sync::CancellationToken;

/// Sleeps for `duration`.  Returns false instead if `shutdown` fires first.
pub async fn pause(shutdown: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

pub struct Lifecycle {
    shutdown: CancellationToken,
    http: reqwest::Client,
    ready_shards: Mutex<HashSet<u32>>,
    presence_shards: Mutex<HashSet<u32>>,
    startup_claimed: AtomicBool,
    background_claimed: AtomicBool,
}

impl Lifecycle {
    pub fn new(shutdown: CancellationToken, http: reqwest::Client) -> Self {
        Self {
            shutdown,
            http,
            ready_shards: Mutex::new(HashSet::new()),
            presence_shards: Mutex::new(HashSet::new()),
            startup_claimed: AtomicBool::new(false),
            background_claimed: AtomicBool::new(false),
        }
    }

    /// Cancelled when the process is shutting down
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Records that `shard` has connected.
    pub fn shard_ready(&self, shard: u32) {
        self.ready_shards.lock().insert(shard);
    }

    /// Returns true exactly once: the first time every one of `shard_count` shards has connected
    /// and no guild is still waiting to be streamed into the cache.
    pub fn claim_startup(&self, shard_count: u32, guilds_pending: bool) -> bool {
        let all_ready = self.ready_shards.lock().len() >= shard_count.max(1) as usize;
        all_ready && !guilds_pending && !self.startup_claimed.swap(true, Ordering::SeqCst)
    }

    /// Undoes a successful [`Self::claim_startup`] after startup failed.
    pub fn release_startup(&self) {
        self.startup_claimed.store(false, Ordering::SeqCst);
    }

    /// True the first time it's called for `shard`.  Shards reconnecting fire `ready` again.
    pub fn claim_presence(&self, shard: u32) -> bool {
        self.presence_shards.lock().insert(shard)
    }

    /// True only for the first caller
    pub fn claim_background_tasks(&self) -> bool {
        !self.background_claimed.swap(true, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle() -> Lifecycle {
        Lifecycle::new(CancellationToken::new(), reqwest::Client::new())
    }

    #[test]
    fn startup_waits_for_every_shard() {
        let lifecycle = lifecycle();
        lifecycle.shard_ready(0);
        assert!(!lifecycle.claim_startup(3, false));
        lifecycle.shard_ready(2);
        // Same shard reconnecting doesn't count twice
        lifecycle.shard_ready(2);
        assert!(!lifecycle.claim_startup(3, false));

        lifecycle.shard_ready(1);
        assert!(lifecycle.claim_startup(3, false));
        assert!(!lifecycle.claim_startup(3, false));
    }

    #[test]
    fn one_cache_ready_covers_every_shard() {
        // Shard 1 connects while shard 0 is still streaming guilds; serenity then reports the
        // cache ready once, from whichever shard finished last.
        let lifecycle = lifecycle();
        lifecycle.shard_ready(0);
        assert!(!lifecycle.claim_startup(2, true));
        lifecycle.shard_ready(1);
        assert!(!lifecycle.claim_startup(2, true));

        assert!(lifecycle.claim_startup(2, false));
    }

    #[test]
    fn single_shard_starts_once_guilds_arrive() {
        let lifecycle = lifecycle();
        lifecycle.shard_ready(0);
        assert!(!lifecycle.claim_startup(1, true));
        assert!(lifecycle.claim_startup(1, false));
        assert!(!lifecycle.claim_startup(1, false));

        lifecycle.release_startup();
        assert!(lifecycle.claim_startup(1, false));
    }

    #[test]
    fn claims_are_one_shot() {
        let lifecycle = lifecycle();
        assert!(lifecycle.claim_presence(0));
        assert!(lifecycle.claim_presence(1));
        assert!(!lifecycle.claim_presence(0));

        assert!(lifecycle.claim_background_tasks());
        assert!(!lifecycle.claim_background_tasks());
    }
}
