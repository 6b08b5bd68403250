use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces operations at least `1 / per_second` apart across all callers.
///
/// The lock only guards the slot bookkeeping; callers sleep after releasing it.
pub struct Throttle {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn per_second(per_second: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / per_second.max(1),
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for this caller's slot.
    pub async fn acquire(&self) {
        let wait = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.interval);
            slot - now
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spaces_callers() {
        let throttle = Throttle::per_second(100);
        assert_eq!(throttle.interval(), Duration::from_millis(10));
        let start = Instant::now();
        for _ in 0..5 {
            throttle.acquire().await;
        }
        // First slot is immediate, then four 10ms intervals.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
