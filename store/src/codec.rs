//! Canonical record codec.
//!
//! A stored record is the JSON array `[trustedBiddingSignalsUrl | null, [[renderUrl, price], ...]]`
//! keyed by the group name. Decoding never fails loudly: malformed data is
//! reported as [`MalformedRecord`] and the caller skips the row.

use serde_json::{Value, json};
use thiserror::Error;

use fledge_types::{Ad, InterestGroup, NonEmptyString};

/// A persisted row that does not have the canonical shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed record for key {key:?}: {reason}")]
pub struct MalformedRecord {
    pub key: String,
    pub reason: &'static str,
}

impl MalformedRecord {
    fn new(key: &str, reason: &'static str) -> Self {
        Self {
            key: key.to_string(),
            reason,
        }
    }
}

/// Decode a stored JSON value into the canonical entity.
pub fn decode(key: &str, raw: &Value) -> Result<InterestGroup, MalformedRecord> {
    let name = NonEmptyString::new(key).map_err(|_| MalformedRecord::new(key, "empty key"))?;

    let [url, ad_records] = raw
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| MalformedRecord::new(key, "record is not an array"))?
    else {
        return Err(MalformedRecord::new(key, "record must have exactly two elements"));
    };

    let trusted_bidding_signals_url = match url {
        Value::Null => None,
        Value::String(url) => Some(url.clone()),
        _ => return Err(MalformedRecord::new(key, "signals url is not a string")),
    };

    let ad_records = ad_records
        .as_array()
        .ok_or_else(|| MalformedRecord::new(key, "ads is not an array"))?;

    let mut ads = Vec::with_capacity(ad_records.len());
    for ad_record in ad_records {
        let Some([render_url, price]) = ad_record.as_array().map(Vec::as_slice) else {
            return Err(MalformedRecord::new(key, "ad is not a two-element array"));
        };
        let (Some(render_url), Some(price)) = (render_url.as_str(), price.as_f64()) else {
            return Err(MalformedRecord::new(key, "ad fields have the wrong types"));
        };
        ads.push(Ad::new(render_url, price));
    }

    Ok(InterestGroup {
        name,
        trusted_bidding_signals_url,
        ads,
    })
}

/// Decode the stored text of a row, logging and discarding anything malformed.
pub fn decode_text(key: &str, raw: &str) -> Option<InterestGroup> {
    let result = serde_json::from_str::<Value>(raw)
        .map_err(|_| MalformedRecord::new(key, "record is not valid JSON"))
        .and_then(|value| decode(key, &value));
    match result {
        Ok(group) => Some(group),
        Err(err) => {
            tracing::warn!(key, record = raw, reason = err.reason, "Malformed interest group record");
            None
        }
    }
}

/// Encode the canonical entity as its stored record. The name lives in the key.
#[must_use]
pub fn encode(group: &InterestGroup) -> Value {
    let ads: Vec<Value> = group
        .ads
        .iter()
        .map(|ad| json!([ad.render_url, ad.price]))
        .collect();
    json!([group.trusted_bidding_signals_url, ads])
}
