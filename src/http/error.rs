//! Web listener startup failures.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Why the web listener could not start.
///
/// The variant is decided where the failure happens (key material loading or
/// binding), so recovery never has to inspect message text.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The key store is missing, unreadable, or holds no usable certificate/key.
    #[error("no valid keystore at {path:?}: {reason}")]
    KeyStoreInvalid { path: PathBuf, reason: String },

    /// The key store's private key could not be decrypted with the passphrase.
    #[error("keystore password was incorrect for {path:?}")]
    KeyStorePassphraseInvalid { path: PathBuf },

    /// The listen address could not be bound.
    #[error("could not bind web listener on {addr}: {source}")]
    ListenerBindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called before the one-time initialization.
    #[error("web surface started before initialization")]
    NotInitialized,
}

impl ListenerError {
    /// Whether the failure comes from the configured key material.
    pub fn is_key_store(&self) -> bool {
        matches!(
            self,
            ListenerError::KeyStoreInvalid { .. } | ListenerError::KeyStorePassphraseInvalid { .. }
        )
    }
}
