//! Named retry and settle timings for a pairing session
//!
//! Every wait the orchestrator performs is taken from a [`SessionPolicy`], so
//! tests can run the whole lifecycle with millisecond timings.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A bounded retry loop: how many attempts, and how long to wait between them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least one is always made)
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub interval: Duration,
    /// Optional random extra wait added to each interval
    pub jitter: Option<Duration>,
}

impl RetryPolicy {
    /// Create a fixed-interval policy without jitter
    pub const fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            jitter: None,
        }
    }

    /// Builder pattern: add jitter
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Number of attempts, never less than one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait to apply before the next attempt
    pub fn delay(&self) -> Duration {
        match self.jitter {
            Some(jitter) if !jitter.is_zero() => {
                let extra = rand::thread_rng().gen_range(0..=jitter.as_millis() as u64);
                self.interval + Duration::from_millis(extra)
            }
            _ => self.interval,
        }
    }

    /// Total time covered by all attempts, ignoring jitter
    pub fn window(&self) -> Duration {
        self.interval * self.attempts()
    }
}

/// All timings used by one pairing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPolicy {
    /// Wait between connecting and requesting the pairing code
    pub pre_code_delay: Duration,
    /// Bounds the wait for the link-open event on each connection
    pub link: RetryPolicy,
    /// Wait after the link opens, before looking for credentials
    pub link_settle: Duration,
    /// Credential file polling
    pub credential_poll: RetryPolicy,
    /// Wait after a failed credential read, in place of the poll interval
    pub read_error_delay: Duration,
    /// Wait before the first transmission attempt
    pub transmit_settle: Duration,
    /// Transmission retries
    pub transmission: RetryPolicy,
    /// Wait before closing the conduit after a successful transmission
    pub close_delay: Duration,
    /// Reconnects after an unsolicited disconnect
    pub reconnect: RetryPolicy,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            pre_code_delay: Duration::from_millis(1500),
            link: RetryPolicy::fixed(15, Duration::from_secs(8)),
            link_settle: Duration::from_secs(50),
            credential_poll: RetryPolicy::fixed(15, Duration::from_secs(8)),
            read_error_delay: Duration::from_secs(2),
            transmit_settle: Duration::from_secs(5),
            transmission: RetryPolicy::fixed(5, Duration::from_secs(3)),
            close_delay: Duration::from_secs(3),
            reconnect: RetryPolicy::fixed(5, Duration::from_secs(5)),
        }
    }
}

impl SessionPolicy {
    /// Uniformly scaled-down timings, mostly useful for tests
    pub fn compressed(step: Duration) -> Self {
        Self {
            pre_code_delay: Duration::ZERO,
            link: RetryPolicy::fixed(15, step),
            link_settle: step,
            credential_poll: RetryPolicy::fixed(15, step),
            read_error_delay: step,
            transmit_settle: step,
            transmission: RetryPolicy::fixed(5, step),
            close_delay: step,
            reconnect: RetryPolicy::fixed(5, step),
        }
    }

    /// Builder pattern: set the reconnect policy
    pub fn with_reconnect(mut self, reconnect: RetryPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Builder pattern: set the credential polling policy
    pub fn with_credential_poll(mut self, poll: RetryPolicy) -> Self {
        self.credential_poll = poll;
        self
    }

    /// Builder pattern: set the link-open wait policy
    pub fn with_link(mut self, link: RetryPolicy) -> Self {
        self.link = link;
        self
    }

    /// Builder pattern: set the transmission policy
    pub fn with_transmission(mut self, transmission: RetryPolicy) -> Self {
        self.transmission = transmission;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let policy = SessionPolicy::default();
        assert_eq!(policy.credential_poll.attempts(), 15);
        assert_eq!(policy.credential_poll.interval, Duration::from_secs(8));
        assert_eq!(policy.credential_poll.window(), Duration::from_secs(120));
        assert_eq!(policy.transmission.attempts(), 5);
        assert_eq!(policy.link_settle, Duration::from_secs(50));
        assert_eq!(policy.read_error_delay, Duration::from_secs(2));
        assert_eq!(policy.reconnect.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy::fixed(0, Duration::from_millis(10));
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(100))
            .with_jitter(Duration::from_millis(50));
        for _ in 0..50 {
            let delay = policy.delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }
}
