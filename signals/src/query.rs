//! Signal request URL construction.

use url::{Url, form_urlencoded};

use crate::error::{SignalErrorKind, SignalFetchError};

/// Parse a configured signals endpoint. Only absolute http(s) URLs qualify.
pub fn parse_signals_url(raw: &str) -> Result<Url, SignalFetchError> {
    let url = Url::parse(raw).map_err(|err| {
        SignalFetchError::new(SignalErrorKind::InvalidUrl, raw, err.to_string())
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(SignalFetchError::new(
            SignalErrorKind::InvalidUrl,
            raw,
            format!("scheme '{scheme}' not allowed; only http and https are supported"),
        )),
    }
}

/// `<base>?hostname=<origin>`, keeping any query the base already has.
pub fn bidding_signals_url(base: &str, hostname: &str) -> Result<Url, SignalFetchError> {
    let mut url = parse_signals_url(base)?;
    url.query_pairs_mut().append_pair("hostname", hostname);
    Ok(url)
}

/// `<base>?keys=<k1>,<k2>,...` with each key escaped individually.
///
/// Commas separating keys stay literal; commas inside a key become `%2C`.
pub fn scoring_signals_url(base: &str, keys: &[String]) -> Result<Url, SignalFetchError> {
    let mut url = parse_signals_url(base)?;
    let joined = keys
        .iter()
        .map(|key| form_urlencoded::byte_serialize(key.as_bytes()).collect::<String>())
        .collect::<Vec<_>>()
        .join(",");
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&keys={joined}"),
        _ => format!("keys={joined}"),
    };
    url.set_query(Some(&query));
    Ok(url)
}
