//! Classification of HTTP failures into retryable and final ones.

use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;

/// Maximum number of attempts for a network operation.
pub const MAX_RETRIES: usize = 3;

/// Delay between attempts.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Failures that will not go away by asking again.
#[derive(Debug, PartialEq)]
pub enum NonRetryableError {
    RateLimited { url: String },
    Unauthorized { url: String },
    Forbidden { url: String },
    NotFound { url: String },
    Client { url: String, status: u16 },
}

impl fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NonRetryableError::RateLimited { url } => write!(
                f,
                "Rate limit exceeded while fetching {}. Try again later or set GITHUB_TOKEN.",
                url
            ),
            NonRetryableError::Unauthorized { url } => {
                write!(f, "Authentication failed for {}. Check GITHUB_TOKEN.", url)
            }
            NonRetryableError::Forbidden { url } => write!(f, "Access forbidden: {}", url),
            NonRetryableError::NotFound { url } => write!(f, "Not found: {}", url),
            NonRetryableError::Client { url, status } => {
                write!(f, "Request for {} failed with HTTP {}", url, status)
            }
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// Returns the final error for 4xx responses; `None` means a retry may help
/// (5xx, timeouts, connection resets).
pub fn classify_error(error: &reqwest::Error) -> Option<NonRetryableError> {
    let status = error.status()?;
    let url = error
        .url()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<unknown url>".to_string());

    match status {
        StatusCode::UNAUTHORIZED => Some(NonRetryableError::Unauthorized { url }),
        StatusCode::TOO_MANY_REQUESTS => Some(NonRetryableError::RateLimited { url }),
        StatusCode::FORBIDDEN if error.to_string().contains("rate limit") => {
            Some(NonRetryableError::RateLimited { url })
        }
        StatusCode::FORBIDDEN => Some(NonRetryableError::Forbidden { url }),
        StatusCode::NOT_FOUND => Some(NonRetryableError::NotFound { url }),
        s if s.is_client_error() => Some(NonRetryableError::Client {
            url,
            status: s.as_u16(),
        }),
        _ => None,
    }
}

/// Converts an `error_for_status()` failure into an `anyhow::Error`, swapping
/// in a [`NonRetryableError`] when retrying is pointless.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Some(final_error) => anyhow::Error::from(final_error),
        None => anyhow::Error::from(error),
    }
}
