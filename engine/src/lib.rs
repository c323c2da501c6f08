//! Fledge frame runtime: request validation, dispatch and auctions.
//!
//! The host feeds each inbound message to [`RequestHandler::handle_request`]
//! together with any reply ports and the embedding page's hostname:
//!
//! ```text
//! message ─► validator ─► dispatcher ─┬─► store (join / leave)
//!                                     └─► auction ─► reply port
//! ```
//!
//! Scoring is delegated to an [`AdScorer`] supplied by the host.

mod auction;
mod dispatcher;
mod error;
mod reply;
mod validator;

pub use auction::{AdScorer, AuctionInput, AuctionOrchestrator, BidderInput};
pub use dispatcher::RequestHandler;
pub use error::{RequestError, ShapeViolation};
pub use reply::ReplyPort;
pub use validator::parse_request;

pub use fledge_config::FailurePolicy;
