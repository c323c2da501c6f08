//! Durable interest group state and the ephemeral auction token map.
//!
//! # Architecture
//!
//! ```text
//! InterestGroupStore (SQLite, one transaction per operation)
//! ├── codec: stored record <-> InterestGroup
//! └── merge: pure (existing, incoming) -> InterestGroup
//!
//! SessionTokens (in-memory, process lifetime)
//! ```

pub mod codec;
mod interest_groups;
mod session;
mod sqlite_security;

pub use codec::MalformedRecord;
pub use interest_groups::{InterestGroupStore, merge};
pub use session::SessionTokens;
