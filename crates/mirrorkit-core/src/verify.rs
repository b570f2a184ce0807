//! Detached signature verification of Release files.

use std::{fs, path::PathBuf};

use miette::Diagnostic;
use minisign_verify::{PublicKey, Signature};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Diagnostic, Debug)]
pub enum VerifyError {
    #[error("Failed to read keyring {path}")]
    #[diagnostic(code(mirrorkit::verify::read_key))]
    ReadKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid public key in {origin}: {reason}")]
    #[diagnostic(
        code(mirrorkit::verify::invalid_key),
        help("Keyrings must be minisign public key files")
    )]
    InvalidKey { origin: String, reason: String },

    #[error("No trusted keys configured")]
    #[diagnostic(
        code(mirrorkit::verify::no_keys),
        help("Add a keyring with --keyring, or disable signature verification")
    )]
    NoKeys,
}

/// Checks a document against its detached signature.
pub trait Verifier: Send + Sync {
    /// Name of the signature file published next to the Release file.
    fn signature_file(&self) -> &str;

    /// Returns `Ok(true)` when `signature` is a valid signature over `document`
    /// by a trusted key. A missing or unreadable signature is not authentic.
    fn verify(&self, document: &[u8], signature: Option<&[u8]>) -> Result<bool, VerifyError>;
}

/// Verifies minisign signatures against a set of trusted public keys.
pub struct MinisignVerifier {
    keys: Vec<PublicKey>,
}

impl MinisignVerifier {
    pub const SIGNATURE_FILE: &'static str = "Release.minisig";

    /// Loads one key from each minisign `.pub` file.
    pub fn from_keyrings(paths: &[PathBuf]) -> Result<Self, VerifyError> {
        let mut encoded = Vec::with_capacity(paths.len());
        for path in paths {
            let content = fs::read_to_string(path).map_err(|err| {
                VerifyError::ReadKey {
                    path: path.clone(),
                    source: err,
                }
            })?;
            // The key is the last line; anything before it is a comment.
            let line = content
                .lines()
                .map(str::trim)
                .rfind(|l| !l.is_empty())
                .unwrap_or_default()
                .to_string();
            encoded.push((path.display().to_string(), line));
        }

        Self::from_encoded(encoded)
    }

    pub fn from_base64(keys: &[&str]) -> Result<Self, VerifyError> {
        Self::from_encoded(
            keys.iter()
                .enumerate()
                .map(|(idx, key)| (format!("key #{}", idx + 1), key.to_string()))
                .collect(),
        )
    }

    fn from_encoded(encoded: Vec<(String, String)>) -> Result<Self, VerifyError> {
        if encoded.is_empty() {
            return Err(VerifyError::NoKeys);
        }

        let keys = encoded
            .into_iter()
            .map(|(origin, key)| {
                PublicKey::from_base64(&key).map_err(|err| {
                    VerifyError::InvalidKey {
                        origin,
                        reason: err.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(keys = keys.len(), "loaded trusted keys");
        Ok(Self { keys })
    }
}

impl Verifier for MinisignVerifier {
    fn signature_file(&self) -> &str {
        Self::SIGNATURE_FILE
    }

    fn verify(&self, document: &[u8], signature: Option<&[u8]>) -> Result<bool, VerifyError> {
        let Some(signature) = signature else {
            return Ok(false);
        };
        let Ok(text) = std::str::from_utf8(signature) else {
            return Ok(false);
        };
        let signature = match Signature::decode(text) {
            Ok(signature) => signature,
            Err(err) => {
                trace!(error = %err, "undecodable signature");
                return Ok(false);
            }
        };

        Ok(self
            .keys
            .iter()
            .any(|key| key.verify(document, &signature, false).is_ok()))
    }
}
