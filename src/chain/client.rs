//! Chain server client abstractions.
//!
//! A [`ChainTransport`] dials the remote chain-data server and hands back a
//! [`ChainClient`] session. The session stays usable until
//! [`ChainClient::wait_for_shutdown`] resolves.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Credentials presented to the chain server.
#[derive(Clone, Default)]
pub struct ChainCredentials {
    pub username: String,
    pub password: String,
}

impl ChainCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for ChainCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Errors from a dial attempt.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("invalid chain server address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("chain server rejected credentials for user '{0}'")]
    Auth(String),

    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),
}

impl DialError {
    /// True if the server answered but refused the credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, DialError::Auth(_))
    }
}

/// Errors from a call made over a live session.
#[derive(Debug, Error)]
pub enum ChainCallError {
    #[error("chain server disconnected")]
    Disconnected,

    #[error("chain server error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("chain request timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed chain server message: {0}")]
    Protocol(String),
}

/// A live session with the chain server.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Identifier unique to this session within the process.
    fn id(&self) -> u64;

    /// Address the session was dialed at.
    fn address(&self) -> &str;

    /// False once the transport has shut down.
    fn is_connected(&self) -> bool;

    /// Issue a JSON-RPC call.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, ChainCallError>;

    /// Close the session. `wait_for_shutdown` resolves afterwards.
    fn disconnect(&self);

    /// Resolves when the session ends, deliberately or not.
    async fn wait_for_shutdown(&self);
}

impl fmt::Debug for dyn ChainClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainClient")
            .field("id", &self.id())
            .field("address", &self.address())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Dials chain server sessions.
#[async_trait]
pub trait ChainTransport: Send + Sync {
    async fn dial(
        &self,
        address: &str,
        credentials: &ChainCredentials,
    ) -> Result<Arc<dyn ChainClient>, DialError>;
}
