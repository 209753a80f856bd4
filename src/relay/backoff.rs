use std::time::Duration;

pub(super) struct Backoff {
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub(super) fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            attempt: 0,
            base_ms: base_ms.max(1),
            max_ms: max_ms.max(base_ms),
        }
    }

    pub(super) fn next(&mut self) -> Duration {
        let delay = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(self.attempt.min(16)))
            .min(self.max_ms);
        self.attempt += 1;
        Duration::from_millis(delay)
    }

    pub(super) fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(super) fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_the_cap_and_resets() {
        let mut backoff = Backoff::new(1_000, 5_000);
        let delays: Vec<u64> = (0..5).map(|_| backoff.next().as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 5_000, 5_000]);
        assert_eq!(backoff.attempt(), 5);

        backoff.reset();
        assert_eq!(backoff.next(), Duration::from_millis(1_000));
    }
}
