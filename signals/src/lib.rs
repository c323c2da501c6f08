//! Trusted signal fetches for the auction orchestrator.
//!
//! Two request shapes, both plain cookie-less `GET`s:
//!
//! | Signals | URL |
//! |---------|-----|
//! | Bidding | `<trustedBiddingSignalsUrl>?hostname=<origin>` |
//! | Scoring | `<trustedScoringSignalsUrl>?keys=<url1>,<url2>,...` |
//!
//! Responses must be `application/json` objects, and (unless disabled in
//! config) carry `X-Allow-FLEDGE: true`. Anything else is a
//! [`SignalFetchError`] with a stable [`SignalErrorKind`].

mod error;
pub mod query;

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::redirect::Policy;
use serde_json::Value;
use url::Url;

use fledge_config::ResolvedSignalsConfig;

pub use error::{SignalErrorKind, SignalFetchError};

/// Response header a signals server sets to opt in to being queried.
pub const ALLOW_HEADER: &str = "X-Allow-FLEDGE";

const CONNECT_TIMEOUT_SECS: u64 = 10;
const MAX_REDIRECTS: usize = 3;

/// HTTP client for trusted signal servers.
///
/// Built without a cookie store and never sets `Authorization`, so no
/// ambient credentials reach a signals server.
#[derive(Debug, Clone)]
pub struct SignalsClient {
    http: reqwest::Client,
    require_allow_header: bool,
    max_response_bytes: usize,
}

impl SignalsClient {
    pub fn new(config: &ResolvedSignalsConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(config.timeout))
            .timeout(config.timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self {
            http,
            require_allow_header: config.require_allow_header,
            max_response_bytes: config.max_response_bytes,
        })
    }

    /// Fetch a group's bidding signals on behalf of `hostname`.
    pub async fn fetch_bidding_signals(
        &self,
        trusted_bidding_signals_url: &str,
        hostname: &str,
    ) -> Result<Value, SignalFetchError> {
        let url = query::bidding_signals_url(trusted_bidding_signals_url, hostname)?;
        self.get_json(url).await
    }

    /// Fetch the seller's scoring signals for the candidate render URLs.
    pub async fn fetch_scoring_signals(
        &self,
        trusted_scoring_signals_url: &str,
        render_urls: &[String],
    ) -> Result<Value, SignalFetchError> {
        let url = query::scoring_signals_url(trusted_scoring_signals_url, render_urls)?;
        self.get_json(url).await
    }

    async fn get_json(&self, url: Url) -> Result<Value, SignalFetchError> {
        tracing::debug!(url = %url, "Fetching trusted signals");
        let url_str = url.to_string();

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| SignalFetchError::from_reqwest(&url_str, &err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SignalFetchError::new(
                SignalErrorKind::Status,
                url_str,
                format!("HTTP {status}"),
            ));
        }

        self.check_headers(&url_str, response.headers())?;

        if let Some(len) = response.content_length()
            && len > self.max_response_bytes as u64
        {
            return Err(too_large(&url_str, self.max_response_bytes));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| SignalFetchError::from_reqwest(&url_str, &err))?;
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(too_large(&url_str, self.max_response_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        match serde_json::from_slice::<Value>(&body) {
            Ok(value @ Value::Object(_)) => Ok(value),
            Ok(_) => Err(SignalFetchError::new(
                SignalErrorKind::InvalidJson,
                url_str,
                "signals body is not a JSON object",
            )),
            Err(err) => Err(SignalFetchError::new(
                SignalErrorKind::InvalidJson,
                url_str,
                err.to_string(),
            )),
        }
    }

    fn check_headers(&self, url: &str, headers: &HeaderMap) -> Result<(), SignalFetchError> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !is_json_content_type(content_type) {
            return Err(SignalFetchError::new(
                SignalErrorKind::ContentType,
                url,
                format!("expected application/json, got '{content_type}'"),
            ));
        }

        if self.require_allow_header {
            let allowed = headers
                .get(ALLOW_HEADER)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"));
            if !allowed {
                return Err(SignalFetchError::new(
                    SignalErrorKind::MissingAllowHeader,
                    url,
                    format!("response lacks {ALLOW_HEADER}: true"),
                ));
            }
        }
        Ok(())
    }
}

fn is_json_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

fn too_large(url: &str, max: usize) -> SignalFetchError {
    SignalFetchError::new(
        SignalErrorKind::TooLarge,
        url,
        format!("response exceeds {max} bytes"),
    )
}
