//! Interest group entity types.

use serde::Serialize;

use crate::NonEmptyString;

/// A renderable creative plus the metadata bidding logic sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ad {
    pub render_url: String,
    pub price: f64,
}

impl Ad {
    #[must_use]
    pub fn new(render_url: impl Into<String>, price: f64) -> Self {
        Self {
            render_url: render_url.into(),
            price,
        }
    }
}

/// An interest group as it exists in the store: every field resolved.
///
/// `name` is the store key and never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestGroup {
    pub name: NonEmptyString,
    pub trusted_bidding_signals_url: Option<String>,
    pub ads: Vec<Ad>,
}

impl InterestGroup {
    /// A group with no signals URL and no ads.
    #[must_use]
    pub fn empty(name: NonEmptyString) -> Self {
        Self {
            name,
            trusted_bidding_signals_url: None,
            ads: Vec::new(),
        }
    }
}

/// An interest group as supplied by a join request.
///
/// `None` means "leave unchanged" when the group already exists and
/// "absent" (URL) or "empty" (ads) when it is created.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialInterestGroup {
    pub name: NonEmptyString,
    pub trusted_bidding_signals_url: Option<String>,
    pub ads: Option<Vec<Ad>>,
}

impl PartialInterestGroup {
    #[must_use]
    pub fn named(name: NonEmptyString) -> Self {
        Self {
            name,
            trusted_bidding_signals_url: None,
            ads: None,
        }
    }

    #[must_use]
    pub fn with_trusted_bidding_signals_url(mut self, url: impl Into<String>) -> Self {
        self.trusted_bidding_signals_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_ads(mut self, ads: Vec<Ad>) -> Self {
        self.ads = Some(ads);
        self
    }
}
