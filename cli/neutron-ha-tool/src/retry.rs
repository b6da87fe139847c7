// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Outer retry loop for `--retry`

use std::time::Duration;

use neutron_ha::FailoverError;

const INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Exponential backoff with jitter, capped at a maximum interval
#[derive(Debug)]
pub struct Backoff {
    delay: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(max: Duration) -> Self {
        Self {
            delay: INITIAL_DELAY.min(max),
            max,
        }
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let jitter = Duration::from_millis(u64::from(rand::random::<u8>()) % 50);
        let delay = (self.delay + jitter).min(self.max);
        self.delay = std::cmp::min(self.delay * 2, self.max);
        delay
    }
}

/// Whether an operation outcome is worth another attempt
///
/// Leftover per-router errors and an unreachable control plane are;
/// configuration errors are not.
pub fn should_retry(outcome: &Result<usize, FailoverError>) -> bool {
    match outcome {
        Ok(errors) => *errors > 0,
        Err(e) => e.is_transient(),
    }
}

#[cfg(test)]
mod tests {
    use neutron_ha::{ClientError, PickError};

    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(1500));

        let first = backoff.next_delay();
        let second = backoff.next_delay();
        let third = backoff.next_delay();

        assert!(first >= Duration::from_millis(500) && first < Duration::from_millis(550));
        assert!(second >= Duration::from_millis(1000) && second < Duration::from_millis(1050));
        assert_eq!(third, Duration::from_millis(1500));
    }

    #[test]
    fn tiny_cap_bounds_first_delay() {
        let mut backoff = Backoff::new(Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }

    #[test]
    fn retry_decision() {
        assert!(!should_retry(&Ok(0)));
        assert!(should_retry(&Ok(2)));
        assert!(should_retry(&Err(FailoverError::ListAgents(
            ClientError::Rejected("503".to_string())
        ))));
        assert!(!should_retry(&Err(FailoverError::Pick(
            PickError::HostNotFound("h".to_string())
        ))));
    }
}
