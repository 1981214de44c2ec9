//! Pack signature verification.
//!
//! The signature covers the JCS-canonical JSON form of the manifest with the
//! `signature` and `signature_algorithm` fields removed, so the signed bytes
//! are stable across YAML formatting. Only ed25519 is accepted.

use super::PackManifest;
use crate::errors::SignatureError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use raxe_common::sha256_hex;

/// Accepted value for `signature_algorithm`.
pub const SIGNATURE_ALGORITHM_ED25519: &str = "ed25519";

/// A configured trust anchor for pack verification.
#[derive(Debug, Clone)]
pub struct PackVerifyingKey {
    key: VerifyingKey,
}

impl PackVerifyingKey {
    /// Build from raw 32-byte ed25519 public key material.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, String> {
        VerifyingKey::from_bytes(bytes)
            .map(|key| Self { key })
            .map_err(|e| format!("invalid ed25519 public key: {e}"))
    }

    /// Build from a base64-encoded 32-byte public key.
    pub fn from_base64(encoded: &str) -> Result<Self, String> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| format!("invalid base64 public key: {e}"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "public key must be exactly 32 bytes".to_string())?;
        Self::from_bytes(&bytes)
    }
}

/// Canonical signing payload for a manifest: JCS JSON with signature fields
/// stripped. Also used for the pack content digest.
pub(crate) fn canonical_payload(manifest: &PackManifest) -> Result<Vec<u8>, String> {
    let mut unsigned = manifest.clone();
    unsigned.signature = None;
    unsigned.signature_algorithm = None;
    serde_jcs::to_vec(&unsigned).map_err(|e| format!("failed to canonicalize manifest: {e}"))
}

/// SHA-256 hex digest of the canonical manifest body.
pub(crate) fn content_digest(manifest: &PackManifest) -> Result<String, String> {
    let payload = canonical_payload(manifest)?;
    // Payload is UTF-8 JSON; hash the text form for a stable hex digest.
    let text = String::from_utf8(payload).map_err(|e| e.to_string())?;
    Ok(sha256_hex(&text))
}

/// Verify the manifest's detached signature against `key`.
///
/// Manifests without a signature pass trivially; a present signature that
/// fails to verify is fatal for the pack.
pub fn verify_manifest_signature(
    manifest: &PackManifest,
    key: Option<&PackVerifyingKey>,
) -> Result<(), SignatureError> {
    let Some(signature_b64) = &manifest.signature else {
        return Ok(());
    };
    let pack_id = manifest.id.clone();

    match manifest.signature_algorithm.as_deref() {
        Some(SIGNATURE_ALGORITHM_ED25519) => {}
        Some(other) => {
            return Err(SignatureError::UnsupportedAlgorithm {
                pack_id,
                algorithm: other.to_string(),
            })
        }
        None => {
            return Err(SignatureError::Malformed {
                pack_id,
                reason: "signature present without signature_algorithm".into(),
            })
        }
    }

    let Some(key) = key else {
        return Err(SignatureError::NoPublicKey { pack_id });
    };

    let sig_bytes = BASE64
        .decode(signature_b64.trim())
        .map_err(|e| SignatureError::Malformed {
            pack_id: pack_id.clone(),
            reason: format!("signature is not valid base64: {e}"),
        })?;
    let signature =
        Signature::from_slice(&sig_bytes).map_err(|e| SignatureError::Malformed {
            pack_id: pack_id.clone(),
            reason: format!("signature has wrong length: {e}"),
        })?;

    let payload = canonical_payload(manifest).map_err(|reason| SignatureError::Malformed {
        pack_id: pack_id.clone(),
        reason,
    })?;

    key.key
        .verify(&payload, &signature)
        .map_err(|_| SignatureError::VerificationFailed { pack_id })
}
