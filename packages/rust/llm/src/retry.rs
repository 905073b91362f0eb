//! Retry classification and backoff.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};

const BASE_BACKOFF_SECS: u64 = 1;

/// Upper bound on any single wait, whatever the server asks for.
const MAX_DELAY_SECS: u64 = 60;

/// Statuses worth another attempt: rate limiting and server-side errors.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Transport failures worth another attempt.
pub(crate) fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Exponential backoff: `1s << attempt`, capped.
pub(crate) fn backoff(attempt: u32) -> Duration {
    let secs = BASE_BACKOFF_SECS
        .checked_shl(attempt)
        .unwrap_or(MAX_DELAY_SECS)
        .min(MAX_DELAY_SECS);
    Duration::from_secs(secs)
}

/// Honor a numeric `Retry-After` header, falling back to [`backoff`].
pub(crate) fn retry_delay(headers: &HeaderMap, attempt: u32) -> Duration {
    if let Some(val) = headers.get(RETRY_AFTER)
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        return Duration::from_secs(secs.min(MAX_DELAY_SECS));
    }
    backoff(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn retry_after_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_delay(&headers, 0), Duration::from_secs(7));
    }

    #[test]
    fn unparseable_retry_after_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(retry_delay(&headers, 2), Duration::from_secs(4));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn backoff_is_monotonic_and_capped(attempt in 0u32..200) {
            let delay = backoff(attempt);
            prop_assert!(delay.as_secs() >= BASE_BACKOFF_SECS);
            prop_assert!(delay.as_secs() <= MAX_DELAY_SECS);
            if attempt > 0 {
                prop_assert!(delay >= backoff(attempt - 1));
            }
        }
    }
}
