use std::time::Duration;

pub(crate) const RETRY_ATTEMPT_HEADER: &str = "x-relay-retry-attempt";

pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// `Retry-After` wins; otherwise the base delay doubles per attempt, capped at 64x.
pub(crate) fn retry_delay(
    base_delay_ms: u64,
    attempt: usize,
    retry_after_seconds: Option<u64>,
) -> Duration {
    if let Some(retry_after_seconds) = retry_after_seconds {
        return Duration::from_secs(retry_after_seconds);
    }
    let exponent = attempt.saturating_sub(1).min(6) as u32;
    Duration::from_millis(base_delay_ms.max(1).saturating_mul(2_u64.pow(exponent)))
}

pub(crate) fn is_retryable_slack_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

pub(crate) fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_retry_delay_doubles_and_caps() {
        assert_eq!(retry_delay(100, 1, None), Duration::from_millis(100));
        assert_eq!(retry_delay(100, 3, None), Duration::from_millis(400));
        assert_eq!(retry_delay(100, 40, None), Duration::from_millis(6_400));
        assert_eq!(retry_delay(100, 2, Some(3)), Duration::from_secs(3));
        assert_eq!(retry_delay(0, 1, None), Duration::from_millis(1));
    }

    #[test]
    fn unit_retryable_statuses_are_rate_limits_and_server_errors() {
        assert!(is_retryable_slack_status(429));
        assert!(is_retryable_slack_status(503));
        assert!(!is_retryable_slack_status(400));
        assert!(!is_retryable_slack_status(404));
    }

    #[test]
    fn unit_parse_retry_after_reads_whole_seconds() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(
            reqwest::header::RETRY_AFTER,
            reqwest::header::HeaderValue::from_static(" 7 "),
        );
        assert_eq!(parse_retry_after(&headers), Some(7));
    }
}
