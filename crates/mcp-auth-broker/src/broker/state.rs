//! Encoding and decoding of the state blob carried through the upstream
//! round trip.
//!
//! The broker sends one opaque `state` value to the upstream provider and
//! gets it back verbatim on the callback. It carries the originating
//! client's context: original redirect URI, original state, an optional
//! broker-code reference, and (for directly-tested flows only) a PKCE
//! verifier. There is exactly one wire format — version-tagged JSON,
//! base64url-encoded without padding. Anything else, including the legacy
//! plain-JSON blobs older deployments produced, decodes as an error.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, BrokerResult};

/// Current state format version.
const STATE_VERSION: u8 = 1;

/// Client context carried across the upstream round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedState {
    /// Format version tag.
    #[serde(rename = "v")]
    pub version: u8,

    /// The client's original `state` parameter, returned unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// The client's original redirect URI.
    pub redirect_uri: String,

    /// Broker-issued code reference; absent for directly-tested flows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_code: Option<String>,

    /// PKCE verifier, present only for directly-tested flows where the
    /// broker completes the exchange itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,

    /// Resource indicator from the original request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl EncodedState {
    /// Build a state blob for a brokered flow.
    #[must_use]
    pub fn new(redirect_uri: String, state: Option<String>, broker_code: Option<String>) -> Self {
        Self {
            version: STATE_VERSION,
            state,
            redirect_uri,
            broker_code,
            code_verifier: None,
            resource: None,
        }
    }

    /// Encode to the wire form: base64url(JSON), no padding.
    #[must_use]
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("state struct serializes to JSON");
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a wire-form state blob.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the blob is not base64url, not JSON, or
    /// carries an unknown version. Garbage is never treated as valid state.
    pub fn decode(raw: &str) -> BrokerResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|_| BrokerError::invalid_state("state is not base64url"))?;
        let decoded: Self = serde_json::from_slice(&bytes)
            .map_err(|_| BrokerError::invalid_state("state is not a valid state document"))?;
        if decoded.version != STATE_VERSION {
            return Err(BrokerError::invalid_state(format!(
                "unsupported state version {}",
                decoded.version
            )));
        }
        Ok(decoded)
    }
}
