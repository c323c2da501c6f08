//! Session-scoped token store.
//!
//! Maps auction tokens to the render URL they stand for. Entries live as long
//! as the process (the browsing session) and are never written to disk.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use fledge_types::AuctionToken;

#[derive(Debug, Default)]
pub struct SessionTokens {
    entries: Mutex<HashMap<AuctionToken, String>>,
}

impl SessionTokens {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the render URL a freshly minted token stands for.
    pub fn insert(&self, token: AuctionToken, render_url: impl Into<String>) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if entries.insert(token, render_url.into()).is_some() {
            tracing::warn!("Auction token collision; previous mapping replaced");
        }
    }

    #[must_use]
    pub fn get(&self, token: &AuctionToken) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get() {
        let tokens = SessionTokens::new();
        assert!(tokens.is_empty());

        tokens.insert(AuctionToken::new("t1"), "about:blank");
        assert_eq!(
            tokens.get(&AuctionToken::new("t1")).as_deref(),
            Some("about:blank")
        );
        assert_eq!(tokens.get(&AuctionToken::new("t2")), None);
        assert_eq!(tokens.len(), 1);
    }
}
