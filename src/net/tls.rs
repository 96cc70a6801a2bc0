//! TLS key store loading.
//!
//! The key store is a PEM bundle holding the certificate chain and the
//! private key. The key may be a PKCS#8 `ENCRYPTED PRIVATE KEY`, unlocked
//! with the configured passphrase.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use pkcs8::der::pem::{Decoder as PemDecoder, PemLabel};
use pkcs8::EncryptedPrivateKeyInfo;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;

use crate::http::ListenerError;

const PRE_BOUNDARY: &str = "-----BEGIN ";

/// Load the key store into an axum-server TLS configuration.
pub fn load_keystore(path: &Path, passphrase: &str) -> Result<RustlsConfig, ListenerError> {
    let config = load_server_config(path, passphrase)?;
    Ok(RustlsConfig::from_config(Arc::new(config)))
}

/// Build a rustls server configuration from the key store.
pub fn load_server_config(path: &Path, passphrase: &str) -> Result<ServerConfig, ListenerError> {
    let invalid = |reason: String| ListenerError::KeyStoreInvalid {
        path: path.to_path_buf(),
        reason,
    };

    let pem = fs::read(path).map_err(|e| invalid(e.to_string()))?;
    let certs = read_certificates(&pem).map_err(|e| invalid(e.to_string()))?;
    if certs.is_empty() {
        return Err(invalid("no certificate found".to_string()));
    }
    let key = read_private_key(path, &pem, passphrase)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| invalid(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| invalid(e.to_string()))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    tracing::debug!(path = ?path, "Key store loaded");
    Ok(config)
}

fn read_certificates(pem: &[u8]) -> std::io::Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut &pem[..]).collect()
}

fn read_private_key(
    path: &Path,
    pem: &[u8],
    passphrase: &str,
) -> Result<PrivateKeyDer<'static>, ListenerError> {
    let invalid = |reason: String| ListenerError::KeyStoreInvalid {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(block) = pem_blocks(pem).into_iter().find(|block| is_encrypted_key(block)) {
        if passphrase.is_empty() {
            return Err(ListenerError::KeyStorePassphraseInvalid {
                path: path.to_path_buf(),
            });
        }
        let (_, document) = pkcs8::Document::from_pem(block).map_err(|e| invalid(e.to_string()))?;
        let encrypted = EncryptedPrivateKeyInfo::try_from(document.as_bytes())
            .map_err(|e| invalid(e.to_string()))?;
        let decrypted =
            encrypted
                .decrypt(passphrase)
                .map_err(|_| ListenerError::KeyStorePassphraseInvalid {
                    path: path.to_path_buf(),
                })?;
        return Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            decrypted.as_bytes().to_vec(),
        )));
    }

    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| invalid(e.to_string()))?
        .ok_or_else(|| invalid("no private key found".to_string()))
}

/// Every PEM block in the bundle, armour included, in file order.
fn pem_blocks(pem: &[u8]) -> Vec<&str> {
    let Ok(text) = std::str::from_utf8(pem) else {
        return Vec::new();
    };
    let starts: Vec<usize> = text.match_indices(PRE_BOUNDARY).map(|(at, _)| at).collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| &text[start..starts.get(i + 1).copied().unwrap_or(text.len())])
        .collect()
}

fn is_encrypted_key(block: &str) -> bool {
    PemDecoder::new(block.as_bytes())
        .map(|decoder| decoder.type_label() == EncryptedPrivateKeyInfo::PEM_LABEL)
        .unwrap_or(false)
}
