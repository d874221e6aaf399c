//! Scheduling helpers for periodic retrosync runs.

use serde::{Deserialize, Serialize};

/// Default cadence of the background retrosync loop in seconds.
pub const RETROSYNC_DEFAULT_INTERVAL_SECS: u64 = 60;

/// Maximum jitter (seconds) added to periodic run intervals.
pub const RETROSYNC_INTERVAL_JITTER_SECS: u64 = 5;

/// Retry policy classification for database API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Classify HTTP status into retry behavior.
pub fn classify_http_status(status: u16) -> SyncRetryClass {
    match status {
        401 | 403 => SyncRetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 => SyncRetryClass::Retryable,
        500..=599 => SyncRetryClass::Retryable,
        _ => SyncRetryClass::Permanent,
    }
}

/// Delay before the next scheduled run after `consecutive_failures` failed runs.
///
/// Zero failures keeps the configured interval; each failure doubles it, capped
/// at 2^6 times the interval.
pub fn next_run_delay_secs(interval_secs: u64, consecutive_failures: u32) -> u64 {
    const MAX_EXPONENT: u32 = 6;

    let exponent = consecutive_failures.min(MAX_EXPONENT);
    interval_secs.saturating_mul(2_u64.pow(exponent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_http_status_for_retry_policy() {
        assert_eq!(classify_http_status(500), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(429), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(403), SyncRetryClass::ReauthRequired);
        assert_eq!(classify_http_status(422), SyncRetryClass::Permanent);
    }

    #[test]
    fn delay_backs_off_and_caps() {
        assert_eq!(next_run_delay_secs(60, 0), 60);
        assert_eq!(next_run_delay_secs(60, 1), 120);
        assert_eq!(next_run_delay_secs(60, 3), 480);
        assert_eq!(next_run_delay_secs(60, 40), next_run_delay_secs(60, 6));
    }
}
