use crate::ApiFailure;
use reqwest::StatusCode;
use std::time::Duration;

const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(30);

// INFO: client errors that clear up without a spec change, e.g. a domain still
// being provisioned or an account limit being raised.
const KNOWN_CLIENT_ERRORS: &[(&str, Duration)] = &[
    ("ERR_NGROK_413", Duration::from_secs(60)),
    ("ERR_NGROK_446", Duration::from_secs(5 * 60)),
    ("ERR_NGROK_511", Duration::from_secs(2 * 60)),
    ("ERR_NGROK_7122", Duration::from_secs(30)),
];

/// How a caller should react to a failed platform request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Transient failure, retry with the caller's own backoff.
    Backoff,
    /// Retry no sooner than the given duration.
    After(Duration),
    /// Retrying with the same input will not help.
    Never,
}

pub fn classify(failure: &ApiFailure) -> Retry {
    match failure {
        ApiFailure::Error {
            status,
            errors,
            retry_after,
        } => {
            if status.is_server_error() {
                return Retry::Backoff;
            }
            if *status == StatusCode::TOO_MANY_REQUESTS {
                return Retry::After(retry_after.unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF));
            }
            if let Some(window) = errors.error_code.as_deref().and_then(known_client_error) {
                return Retry::After(window);
            }
            if status.is_client_error() {
                Retry::Never
            } else {
                Retry::Backoff
            }
        }
        // Transport and decoding failures carry no verdict from the platform.
        ApiFailure::Invalid(_) => Retry::Backoff,
    }
}

fn known_client_error(code: &str) -> Option<Duration> {
    KNOWN_CLIENT_ERRORS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(code))
        .map(|(_, window)| *window)
}
