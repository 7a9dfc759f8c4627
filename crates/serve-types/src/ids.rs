use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic, time-prefixed unique id generator shared by envelopes, turns,
/// and threads.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: &'static str,
    counter: AtomicU64,
}

impl IdGenerator {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            counter: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{:06}", self.prefix, now_millis(), n)
    }
}

/// Current time in milliseconds since the Unix epoch, used for
/// `received_at`/`started_at`/etc. Falls back to 0 if the clock is before
/// the epoch (should never happen outside of test doubles).
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let gen = IdGenerator::new("evt");
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
        assert!(a.starts_with("evt-"));
        assert!(b.starts_with("evt-"));
    }
}
