//! Auction orchestration.
//!
//! One auction runs in three phases:
//!
//! 1. Scan the store and fetch bidding signals for every group that declares
//!    a `trustedBiddingSignalsUrl`, all fetches in flight at once.
//! 2. Once every bidding fetch has settled, fetch scoring signals for the
//!    de-duplicated candidate render URLs.
//! 3. Hand both to the [`AdScorer`] and mint a token for its pick.
//!
//! Every failure along the way degrades to [`AuctionResponse::NoWinner`];
//! nothing here rejects the call.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;
use uuid::Uuid;

use fledge_signals::SignalsClient;
use fledge_store::{InterestGroupStore, SessionTokens};
use fledge_types::{AuctionConfig, AuctionResponse, AuctionToken, InterestGroup};

/// One group taking part in an auction.
#[derive(Debug, Clone, PartialEq)]
pub struct BidderInput {
    pub group: InterestGroup,
    /// `None` when the group declares no bidding signals URL.
    pub bidding_signals: Option<Value>,
}

/// Everything the scoring collaborator sees.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionInput {
    /// Origin the auction runs on behalf of.
    pub hostname: String,
    pub bidders: Vec<BidderInput>,
    /// Render URLs of every bidder's ads, first occurrence order.
    pub candidates: Vec<String>,
    pub scoring_signals: Value,
}

/// Picks the winning ad of an auction.
///
/// Implementations return one of `input.candidates`, or `None` for no
/// winner. Anything outside the candidate set is treated as no winner.
pub trait AdScorer: Send + Sync {
    fn select_winner(&self, input: &AuctionInput) -> Option<String>;
}

pub struct AuctionOrchestrator {
    store: Arc<InterestGroupStore>,
    tokens: Arc<SessionTokens>,
    signals: SignalsClient,
    scorer: Arc<dyn AdScorer>,
}

impl AuctionOrchestrator {
    pub fn new(
        store: Arc<InterestGroupStore>,
        tokens: Arc<SessionTokens>,
        signals: SignalsClient,
        scorer: Arc<dyn AdScorer>,
    ) -> Self {
        Self {
            store,
            tokens,
            signals,
            scorer,
        }
    }

    pub async fn run(&self, config: &AuctionConfig, hostname: &str) -> AuctionResponse {
        let mut groups = Vec::new();
        if !self.store.for_each(|group| groups.push(group)) {
            tracing::warn!("Interest group scan failed; auction has no bidders");
            return AuctionResponse::NoWinner;
        }

        let bidders: Vec<BidderInput> = join_all(
            groups
                .into_iter()
                .map(|group| self.collect_bidder(group, hostname)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        let candidates = candidate_render_urls(&bidders);
        if candidates.is_empty() {
            tracing::debug!(bidders = bidders.len(), "No candidate ads; skipping scoring");
            return AuctionResponse::NoWinner;
        }

        let scoring_signals = match self
            .signals
            .fetch_scoring_signals(&config.trusted_scoring_signals_url, &candidates)
            .await
        {
            Ok(signals) => signals,
            Err(err) => {
                tracing::warn!(error = %err, "Scoring signals fetch failed");
                return AuctionResponse::NoWinner;
            }
        };

        let input = AuctionInput {
            hostname: hostname.to_string(),
            bidders,
            candidates,
            scoring_signals,
        };
        let Some(winner) = self.scorer.select_winner(&input) else {
            tracing::debug!(candidates = input.candidates.len(), "Scorer picked no winner");
            return AuctionResponse::NoWinner;
        };
        if !input.candidates.contains(&winner) {
            tracing::warn!(render_url = %winner, "Scorer picked an ad outside the candidate set");
            return AuctionResponse::NoWinner;
        }

        let token = mint_token();
        self.tokens.insert(token.clone(), winner);
        tracing::debug!(token = %token, "Auction produced a winner");
        AuctionResponse::Winner(token)
    }

    /// Attach bidding signals to `group`, or drop it if the fetch fails.
    async fn collect_bidder(&self, group: InterestGroup, hostname: &str) -> Option<BidderInput> {
        let Some(url) = group.trusted_bidding_signals_url.clone() else {
            return Some(BidderInput {
                group,
                bidding_signals: None,
            });
        };
        match self.signals.fetch_bidding_signals(&url, hostname).await {
            Ok(signals) => Some(BidderInput {
                group,
                bidding_signals: Some(signals),
            }),
            Err(err) => {
                tracing::warn!(
                    group = %group.name,
                    error = %err,
                    "Bidding signals fetch failed; dropping group from auction"
                );
                None
            }
        }
    }
}

fn candidate_render_urls(bidders: &[BidderInput]) -> Vec<String> {
    let mut seen = HashSet::new();
    bidders
        .iter()
        .flat_map(|bidder| &bidder.group.ads)
        .filter(|ad| seen.insert(ad.render_url.as_str()))
        .map(|ad| ad.render_url.clone())
        .collect()
}

fn mint_token() -> AuctionToken {
    AuctionToken::new(Uuid::new_v4().simple().to_string())
}
