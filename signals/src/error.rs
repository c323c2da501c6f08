use std::fmt;

use thiserror::Error;

/// Stable classification of a failed signal fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalErrorKind {
    /// The configured signals URL is not an absolute http(s) URL.
    InvalidUrl,
    /// Connection or protocol failure.
    Transport,
    /// Request exceeded the configured timeout.
    Timeout,
    /// Non-2xx status.
    Status,
    /// Response was not `application/json`.
    ContentType,
    /// Response lacked `X-Allow-FLEDGE: true`.
    MissingAllowHeader,
    /// Response body exceeded the size limit.
    TooLarge,
    /// Body was not a JSON object.
    InvalidJson,
}

impl SignalErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Status => "status",
            Self::ContentType => "content_type",
            Self::MissingAllowHeader => "missing_allow_header",
            Self::TooLarge => "too_large",
            Self::InvalidJson => "invalid_json",
        }
    }
}

impl fmt::Display for SignalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bidding or scoring signal fetch that produced no usable signals.
#[derive(Debug, Clone, Error)]
#[error("{kind} error fetching {url}: {message}")]
pub struct SignalFetchError {
    pub kind: SignalErrorKind,
    pub url: String,
    pub message: String,
}

impl SignalFetchError {
    pub fn new(kind: SignalErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            message: message.into(),
        }
    }

    pub(crate) fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            SignalErrorKind::Timeout
        } else {
            SignalErrorKind::Transport
        };
        Self::new(kind, url, err.to_string())
    }
}
