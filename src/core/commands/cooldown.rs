// Manual "run now" cooldown - a per-(guild, user) mutual-exclusion token
// with a short expiry.
//
// The entry API locks the shard while deciding, giving the set-only-if-absent
// semantics the gate needs: of two concurrent acquisitions for the same key,
// exactly one wins.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// How long a manual run locks out further manual runs for the same user.
pub const RUN_NOW_COOLDOWN: Duration = Duration::from_secs(5);

pub struct RunNowCooldown {
    window: Duration,
    slots: DashMap<(u64, u64), Instant>,
}

impl RunNowCooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slots: DashMap::new(),
        }
    }

    /// Take the cooldown token if it is free or expired. Returns false while
    /// a previous acquisition is still inside the window; callers surface
    /// that as an informational "on cooldown" result, not an error.
    pub fn try_acquire(&self, guild_id: u64, user_id: u64) -> bool {
        let now = Instant::now();
        match self.slots.entry((guild_id, user_id)) {
            Entry::Occupied(mut taken) => {
                if now.duration_since(*taken.get()) >= self.window {
                    taken.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(free) => {
                free.insert(now);
                true
            }
        }
    }

    /// Drop expired tokens so the map tracks only active windows.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.slots
            .retain(|_, acquired| now.duration_since(*acquired) < self.window);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.len()
    }
}

impl Default for RunNowCooldown {
    fn default() -> Self {
        Self::new(RUN_NOW_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn second_acquire_inside_window_is_rejected() {
        let gate = RunNowCooldown::new(Duration::from_secs(5));

        assert!(gate.try_acquire(1, 2));
        assert!(!gate.try_acquire(1, 2));
        // A different user in the same guild is unaffected.
        assert!(gate.try_acquire(1, 3));
        // Same user in a different guild is unaffected.
        assert!(gate.try_acquire(2, 2));
    }

    #[test]
    fn expired_token_can_be_reacquired() {
        let gate = RunNowCooldown::new(Duration::from_millis(10));

        assert!(gate.try_acquire(1, 2));
        std::thread::sleep(Duration::from_millis(20));
        assert!(gate.try_acquire(1, 2));
    }

    #[tokio::test]
    async fn concurrent_acquires_admit_exactly_one() {
        let gate = Arc::new(RunNowCooldown::new(Duration::from_secs(5)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move { gate.try_acquire(7, 9) }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[test]
    fn sweep_removes_only_expired_tokens() {
        let gate = RunNowCooldown::new(Duration::from_millis(30));

        assert!(gate.try_acquire(1, 1));
        std::thread::sleep(Duration::from_millis(40));
        assert!(gate.try_acquire(1, 2));

        gate.sweep();
        assert_eq!(gate.len(), 1);
        assert!(!gate.try_acquire(1, 2));
    }
}
