//! Decoding of untyped inbound messages into [`Request`]s.
//!
//! Two wire forms are accepted:
//!
//! ```text
//! [0, [name, ads | null, trustedBiddingSignalsUrl | null]]    join (url optional)
//! [1, name]                                                   leave
//! [2, trustedScoringSignalsUrl]                               run auction
//!
//! {"type": "joinAdInterestGroup", "group": {...}}
//! {"type": "leaveAdInterestGroup", "name": ...}
//! {"type": "runAdAuction", "config": {"trustedScoringSignalsUrl": ...}}
//! ```
//!
//! Array-form ads are `[renderUrl, price]` pairs; object-form ads are
//! `{"renderUrl", "price"}` objects. Anything else, including unknown
//! object fields and extra array elements, is a [`ShapeViolation`].
//!
//! The array-form tag must be a JSON integer: `[2.0, url]` is rejected even
//! though it compares equal to `2`.

use serde_json::{Map, Value};
use url::Url;

use fledge_signals::query::parse_signals_url;
use fledge_types::{
    Ad, AuctionConfig, NonEmptyString, PartialInterestGroup, Request, RequestKind,
};

use crate::error::ShapeViolation;

type Result<T> = std::result::Result<T, ShapeViolation>;

/// Parse an inbound message. Never touches any state.
pub fn parse_request(value: &Value) -> Result<Request> {
    match value {
        Value::Array(items) => parse_tagged(items),
        Value::Object(fields) => parse_typed(fields),
        other => Err(unexpected("request", "an array or object", other)),
    }
}

fn parse_tagged(items: &[Value]) -> Result<Request> {
    let [tag, payload] = items else {
        return Err(ShapeViolation::new(format!(
            "expected [tag, payload], got {} elements",
            items.len()
        )));
    };
    let kind = tag
        .as_u64()
        .and_then(RequestKind::from_tag)
        .ok_or_else(|| ShapeViolation::new(format!("unknown request tag {tag}")))?;

    match kind {
        RequestKind::Join => parse_tagged_join(payload).map(Request::Join),
        RequestKind::Leave => group_name(payload).map(Request::Leave),
        RequestKind::RunAuction => auction_config(payload).map(Request::RunAuction),
    }
}

fn parse_tagged_join(payload: &Value) -> Result<PartialInterestGroup> {
    let Value::Array(fields) = payload else {
        return Err(unexpected("join payload", "an array", payload));
    };
    let (name, ads, url) = match fields.as_slice() {
        [name, ads] => (name, ads, None),
        [name, ads, url] => (name, ads, Some(url)),
        _ => {
            return Err(ShapeViolation::new(format!(
                "join payload must have 2 or 3 elements, got {}",
                fields.len()
            )));
        }
    };

    let mut group = PartialInterestGroup::named(group_name(name)?);
    group.ads = present(ads)
        .map(|ads| ad_list(ads, tagged_ad))
        .transpose()?;
    group.trusted_bidding_signals_url = url
        .and_then(present)
        .map(|url| signals_url(url, "trustedBiddingSignalsUrl"))
        .transpose()?;
    Ok(group)
}

fn tagged_ad(value: &Value) -> Result<Ad> {
    match value {
        Value::Array(pair) => match pair.as_slice() {
            [url, amount] => Ok(Ad::new(render_url(url)?, price(amount)?)),
            _ => Err(ShapeViolation::new(format!(
                "ad must be [renderUrl, price], got {} elements",
                pair.len()
            ))),
        },
        other => Err(unexpected("ad", "an array", other)),
    }
}

fn parse_typed(fields: &Map<String, Value>) -> Result<Request> {
    let kind = match fields.get("type") {
        Some(Value::String(name)) => RequestKind::from_type_name(name)
            .ok_or_else(|| ShapeViolation::new(format!("unknown request type '{name}'")))?,
        Some(other) => return Err(unexpected("type", "a string", other)),
        None => return Err(ShapeViolation::new("missing field 'type'")),
    };

    match kind {
        RequestKind::Join => {
            expect_fields(fields, &["type", "group"])?;
            typed_group(required(fields, "group")?).map(Request::Join)
        }
        RequestKind::Leave => {
            expect_fields(fields, &["type", "name"])?;
            group_name(required(fields, "name")?).map(Request::Leave)
        }
        RequestKind::RunAuction => {
            expect_fields(fields, &["type", "config"])?;
            let config = object(required(fields, "config")?, "config")?;
            expect_fields(config, &["trustedScoringSignalsUrl"])?;
            auction_config(required(config, "trustedScoringSignalsUrl")?).map(Request::RunAuction)
        }
    }
}

fn typed_group(value: &Value) -> Result<PartialInterestGroup> {
    let fields = object(value, "group")?;
    expect_fields(fields, &["name", "trustedBiddingSignalsUrl", "ads"])?;

    let mut group = PartialInterestGroup::named(group_name(required(fields, "name")?)?);
    group.trusted_bidding_signals_url = optional(fields, "trustedBiddingSignalsUrl")
        .map(|url| signals_url(url, "trustedBiddingSignalsUrl"))
        .transpose()?;
    group.ads = optional(fields, "ads")
        .map(|ads| ad_list(ads, typed_ad))
        .transpose()?;
    Ok(group)
}

fn typed_ad(value: &Value) -> Result<Ad> {
    let fields = object(value, "ad")?;
    expect_fields(fields, &["renderUrl", "price"])?;
    Ok(Ad::new(
        render_url(required(fields, "renderUrl")?)?,
        price(required(fields, "price")?)?,
    ))
}

fn ad_list(value: &Value, parse_ad: fn(&Value) -> Result<Ad>) -> Result<Vec<Ad>> {
    match value {
        Value::Array(items) => items.iter().map(parse_ad).collect(),
        other => Err(unexpected("ads", "an array", other)),
    }
}

fn group_name(value: &Value) -> Result<NonEmptyString> {
    let Value::String(name) = value else {
        return Err(unexpected("name", "a string", value));
    };
    NonEmptyString::new(name.as_str())
        .map_err(|_| ShapeViolation::new("interest group name must not be empty"))
}

fn render_url(value: &Value) -> Result<String> {
    let Value::String(raw) = value else {
        return Err(unexpected("renderUrl", "a string", value));
    };
    Url::parse(raw)
        .map_err(|err| ShapeViolation::new(format!("renderUrl '{raw}' is not a URL: {err}")))?;
    Ok(raw.clone())
}

fn price(value: &Value) -> Result<f64> {
    value
        .as_f64()
        .filter(|price| price.is_finite())
        .ok_or_else(|| unexpected("price", "a finite number", value))
}

fn signals_url(value: &Value, field: &str) -> Result<String> {
    let Value::String(raw) = value else {
        return Err(unexpected(field, "a string", value));
    };
    parse_signals_url(raw).map_err(|err| ShapeViolation::new(format!("{field}: {}", err.message)))?;
    Ok(raw.clone())
}

fn auction_config(value: &Value) -> Result<AuctionConfig> {
    Ok(AuctionConfig {
        trusted_scoring_signals_url: signals_url(value, "trustedScoringSignalsUrl")?,
    })
}

fn object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(unexpected(what, "an object", other)),
    }
}

fn expect_fields(fields: &Map<String, Value>, allowed: &[&str]) -> Result<()> {
    match fields.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(ShapeViolation::new(format!("unknown field '{key}'"))),
        None => Ok(()),
    }
}

/// A field that must be present and non-null.
fn required<'a>(fields: &'a Map<String, Value>, key: &str) -> Result<&'a Value> {
    optional(fields, key).ok_or_else(|| ShapeViolation::new(format!("missing field '{key}'")))
}

fn optional<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    fields.get(key).and_then(present)
}

fn present(value: &Value) -> Option<&Value> {
    (!value.is_null()).then_some(value)
}

fn unexpected(what: &str, expected: &str, got: &Value) -> ShapeViolation {
    let got = match got {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    ShapeViolation::new(format!("{what} must be {expected}, got {got}"))
}
