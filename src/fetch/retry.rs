//! Retry policy for outbound requests
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 4xx | Immediate → `Rejected` |
//! | HTTP 5xx | Retry with backoff |
//! | Timeout | Retry with backoff |
//! | Connection refused / reset | Retry with backoff |
//! | Redirect loop or chain too long | Immediate → `Redirect` failure |

use crate::NetworkErrorKind;
use rand::Rng;
use std::time::Duration;

/// Upper bound for a single backoff delay, before jitter
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Maximum jitter as a fraction of the backoff delay
const MAX_JITTER_FRACTION: f64 = 0.3;

/// Outcome of a single failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttemptError {
    /// Worth another attempt
    Transient(NetworkErrorKind),
    /// Retrying cannot help
    Fatal(NetworkErrorKind),
    /// The provider answered with a 4xx
    Rejected { status: u16, url: String },
    /// The caller cancelled the request
    Cancelled,
}

/// Classifies a reqwest error raised while sending or reading a response
pub(crate) fn classify_reqwest_error(error: &reqwest::Error) -> AttemptError {
    if error.is_timeout() {
        AttemptError::Transient(NetworkErrorKind::Timeout)
    } else if error.is_redirect() {
        AttemptError::Fatal(NetworkErrorKind::Redirect)
    } else {
        AttemptError::Transient(NetworkErrorKind::Connection)
    }
}

/// Exponential backoff before attempt `attempt + 1`, without jitter
///
/// `attempt` is the 1-based number of the attempt that just failed.
pub fn backoff_base_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(MAX_BACKOFF)
}

/// Applies a jitter fraction (clamped to `0.0..=0.3`) to a delay
pub fn with_jitter(delay: Duration, fraction: f64) -> Duration {
    delay + delay.mul_f64(fraction.clamp(0.0, MAX_JITTER_FRACTION))
}

/// Backoff delay with random jitter
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let fraction = rand::rng().random_range(0.0..=MAX_JITTER_FRACTION);
    with_jitter(backoff_base_delay(base, attempt), fraction)
}
