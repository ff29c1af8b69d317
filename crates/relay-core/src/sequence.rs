use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide monotonic message counter.
///
/// Owned by the composition root and handed to every [`Channel`](crate::Channel)
/// at construction, so tests can inject a deterministic counter instead of
/// relying on ambient global state.  Cloning shares the underlying counter.
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter {
    inner: Arc<AtomicU64>,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next sequence number, starting at 1.  Lock-free fetch-and-add.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_one_and_increments() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.next(), 3);
    }

    #[test]
    fn clones_share_the_same_counter() {
        let counter = SequenceCounter::new();
        let clone = counter.clone();
        assert_eq!(counter.next(), 1);
        assert_eq!(clone.next(), 2);
        assert_eq!(counter.next(), 3);
    }

    #[test]
    fn concurrent_callers_never_collide() {
        let counter = SequenceCounter::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = counter.clone();
            handles.push(std::thread::spawn(move || {
                (0..1000).map(|_| counter.next()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8 * 1000);
        assert_eq!(*all.first().unwrap(), 1);
        assert_eq!(*all.last().unwrap(), 8 * 1000);
    }
}
