//! Routing of validated requests to the store or the auction.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use fledge_config::{FailurePolicy, FledgeConfig};
use fledge_signals::SignalsClient;
use fledge_store::{InterestGroupStore, SessionTokens};
use fledge_types::{AuctionResponse, Request};

use crate::auction::{AdScorer, AuctionOrchestrator};
use crate::error::{RequestError, ShapeViolation};
use crate::reply::ReplyPort;
use crate::validator::parse_request;

/// Entry point for inbound messages.
///
/// Join and leave go straight to the store and never use a reply port.
/// An auction replies on the first supplied port only.
pub struct RequestHandler {
    store: Arc<InterestGroupStore>,
    auction: AuctionOrchestrator,
    failure_policy: FailurePolicy,
}

impl RequestHandler {
    pub fn new(
        store: Arc<InterestGroupStore>,
        tokens: Arc<SessionTokens>,
        signals: SignalsClient,
        scorer: Arc<dyn AdScorer>,
    ) -> Self {
        Self {
            auction: AuctionOrchestrator::new(Arc::clone(&store), tokens, signals, scorer),
            store,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Build a handler over the configured store path and signals settings.
    pub fn from_config(
        config: &FledgeConfig,
        tokens: Arc<SessionTokens>,
        scorer: Arc<dyn AdScorer>,
    ) -> Result<Self> {
        let path = config
            .resolved_store_path()
            .context("No interest group store path configured and no home directory")?;
        let store = InterestGroupStore::open(&path)?;
        let signals = SignalsClient::new(&config.resolved_signals())
            .context("Failed to build signals HTTP client")?;
        Ok(Self::new(Arc::new(store), tokens, signals, scorer)
            .with_failure_policy(config.failure_policy()))
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[must_use]
    pub fn store(&self) -> &InterestGroupStore {
        &self.store
    }

    /// Validate and act on one inbound message.
    ///
    /// A malformed message mutates nothing and, under
    /// [`FailurePolicy::PostFailure`], gets the no-winner marker on every
    /// supplied port before the call is rejected.
    pub async fn handle_request(
        &self,
        value: &Value,
        ports: Vec<ReplyPort>,
        hostname: &str,
    ) -> Result<(), RequestError> {
        let request = match parse_request(value) {
            Ok(request) => request,
            Err(violation) => return Err(self.reject(violation, ports)),
        };

        match request {
            Request::Join(group) => {
                tracing::debug!(group = %group.name, "Joining interest group");
                if self.store.upsert_merge(&group) {
                    Ok(())
                } else {
                    Err(RequestError::StorageFailure { operation: "join" })
                }
            }
            Request::Leave(name) => {
                tracing::debug!(group = %name, "Leaving interest group");
                if self.store.remove(&name) {
                    Ok(())
                } else {
                    Err(RequestError::StorageFailure { operation: "leave" })
                }
            }
            Request::RunAuction(config) => {
                let Some(port) = ports.into_iter().next() else {
                    return Err(self.reject(
                        ShapeViolation::new("runAdAuction requires a reply port"),
                        Vec::new(),
                    ));
                };
                tracing::debug!(
                    hostname,
                    scoring_url = %config.trusted_scoring_signals_url,
                    "Running ad auction"
                );
                let response = self.auction.run(&config, hostname).await;
                port.post(&response);
                Ok(())
            }
        }
    }

    fn reject(&self, violation: ShapeViolation, ports: Vec<ReplyPort>) -> RequestError {
        tracing::warn!(
            detail = violation.detail(),
            ports = ports.len(),
            policy = self.failure_policy.as_str(),
            "Rejecting malformed request"
        );
        if self.failure_policy == FailurePolicy::PostFailure {
            for port in ports {
                port.post(&AuctionResponse::NoWinner);
            }
        }
        RequestError::Shape(violation)
    }
}
