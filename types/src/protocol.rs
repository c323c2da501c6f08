//! Typed request and response variants exchanged with the embedding page.

use serde_json::{Value, json};

use crate::{AuctionToken, NonEmptyString, PartialInterestGroup};

/// Seller-side auction configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionConfig {
    pub trusted_scoring_signals_url: String,
}

/// A validated inbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Join(PartialInterestGroup),
    Leave(NonEmptyString),
    RunAuction(AuctionConfig),
}

/// Discriminant of [`Request`], used for logging and tag lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Join,
    Leave,
    RunAuction,
}

impl RequestKind {
    /// Numeric tag used by the array wire form.
    #[must_use]
    pub const fn tag(self) -> u64 {
        match self {
            Self::Join => 0,
            Self::Leave => 1,
            Self::RunAuction => 2,
        }
    }

    #[must_use]
    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            0 => Some(Self::Join),
            1 => Some(Self::Leave),
            2 => Some(Self::RunAuction),
            _ => None,
        }
    }

    /// Discriminant used by the object wire form.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Join => "joinAdInterestGroup",
            Self::Leave => "leaveAdInterestGroup",
            Self::RunAuction => "runAdAuction",
        }
    }

    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "joinAdInterestGroup" => Some(Self::Join),
            "leaveAdInterestGroup" => Some(Self::Leave),
            "runAdAuction" => Some(Self::RunAuction),
            _ => None,
        }
    }
}

impl Request {
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Join(_) => RequestKind::Join,
            Self::Leave(_) => RequestKind::Leave,
            Self::RunAuction(_) => RequestKind::RunAuction,
        }
    }
}

/// Outcome of an auction as posted on the reply port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuctionResponse {
    Winner(AuctionToken),
    NoWinner,
}

impl AuctionResponse {
    /// Wire encoding: `[true, token]` or `[false]`.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Winner(token) => json!([true, token.as_str()]),
            Self::NoWinner => json!([false]),
        }
    }

    #[must_use]
    pub fn token(&self) -> Option<&AuctionToken> {
        match self {
            Self::Winner(token) => Some(token),
            Self::NoWinner => None,
        }
    }
}
