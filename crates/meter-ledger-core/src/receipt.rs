//! Receipt: a client's signed claim about one relay session.
//!
//! The server never measures traffic itself. A receipt is the only evidence
//! it has, so everything that affects credits must be inside the signed
//! fields.

use serde::{Deserialize, Serialize};

use crate::canonical::signed_message;
use crate::crypto::{ClientIdentity, Ed25519Signature, Keypair};
use crate::error::CanonicalError;
use crate::types::SessionId;

/// The six fields a client signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedFields {
    /// Public key of the signer. Also the ledger key.
    pub identity: ClientIdentity,

    /// Client-chosen, unique per identity.
    pub session_id: SessionId,

    /// Session start (Unix milliseconds, client clock).
    pub start_ts: i64,

    /// Session end (Unix milliseconds, client clock). Must exceed `start_ts`.
    pub end_ts: i64,

    /// Bytes received by the client.
    pub bytes_in: u64,

    /// Bytes sent by the client.
    pub bytes_out: u64,
}

impl SignedFields {
    /// Claimed session length in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        self.end_ts.saturating_sub(self.start_ts)
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_in.saturating_add(self.bytes_out)
    }
}

/// A complete receipt: signed fields, signature, and unsigned extras.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub fields: SignedFields,

    /// Ed25519 signature over the canonical encoding of `fields`.
    pub signature: Ed25519Signature,

    /// Local proxy port the client used. Informational and NOT signed.
    pub auxiliary_port: Option<u16>,
}

impl Receipt {
    pub fn identity(&self) -> &ClientIdentity {
        &self.fields.identity
    }

    pub fn session_id(&self) -> &SessionId {
        &self.fields.session_id
    }

    /// The exact bytes the signature covers.
    pub fn message(&self) -> Result<Vec<u8>, CanonicalError> {
        signed_message(&self.fields)
    }

    /// Convert to the wire form a client would submit.
    pub fn to_request(&self) -> SubmitRequest {
        SubmitRequest {
            client_pub: Some(self.fields.identity.to_base64()),
            session_id: Some(self.fields.session_id.as_str().to_string()),
            start_ts: Some(self.fields.start_ts),
            end_ts: Some(self.fields.end_ts),
            bytes_in: Some(self.fields.bytes_in as i64),
            bytes_out: Some(self.fields.bytes_out as i64),
            socks_port: self.auxiliary_port,
            signature: Some(self.signature.to_base64()),
        }
    }
}

/// A submission as it arrives from a client.
///
/// Every field is optional so that missing and mistyped input can be told
/// apart and reported precisely by [`crate::validation::parse_request`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_pub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_out: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socks_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Builder for creating signed receipts.
pub struct ReceiptBuilder {
    identity: ClientIdentity,
    session_id: SessionId,
    start_ts: i64,
    end_ts: i64,
    bytes_in: u64,
    bytes_out: u64,
    auxiliary_port: Option<u16>,
}

impl ReceiptBuilder {
    /// Start building a receipt.
    pub fn new(identity: ClientIdentity, session_id: impl Into<SessionId>) -> Self {
        Self {
            identity,
            session_id: session_id.into(),
            start_ts: 0,
            end_ts: 0,
            bytes_in: 0,
            bytes_out: 0,
            auxiliary_port: None,
        }
    }

    /// Set the session window in Unix milliseconds.
    pub fn window(mut self, start_ts: i64, end_ts: i64) -> Self {
        self.start_ts = start_ts;
        self.end_ts = end_ts;
        self
    }

    /// Set the byte counters.
    pub fn bytes(mut self, bytes_in: u64, bytes_out: u64) -> Self {
        self.bytes_in = bytes_in;
        self.bytes_out = bytes_out;
        self
    }

    pub fn auxiliary_port(mut self, port: u16) -> Self {
        self.auxiliary_port = Some(port);
        self
    }

    /// Build and sign the receipt.
    pub fn sign(self, keypair: &Keypair) -> Result<Receipt, CanonicalError> {
        let fields = SignedFields {
            identity: self.identity,
            session_id: self.session_id,
            start_ts: self.start_ts,
            end_ts: self.end_ts,
            bytes_in: self.bytes_in,
            bytes_out: self.bytes_out,
        };
        let message = signed_message(&fields)?;
        let signature = keypair.sign(&message);

        Ok(Receipt {
            fields,
            signature,
            auxiliary_port: self.auxiliary_port,
        })
    }
}
