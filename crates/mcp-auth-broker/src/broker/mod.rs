//! The authorization-code broker core.
//!
//! Issues short-lived broker codes bound to each client's original request
//! context, carries that context through the upstream round trip in a
//! versioned state blob, and enforces PKCE and single-use redemption at
//! the token endpoint.

pub mod classify;
pub mod pkce;
pub mod state;
pub mod store;
pub mod types;

pub use classify::ClientType;
pub use state::EncodedState;
pub use store::CodeStore;
pub use types::{BrokerCode, TokenResponse, UpstreamGrant, UpstreamTokens};
