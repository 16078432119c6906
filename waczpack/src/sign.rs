//! The signing collaborator seam and the WACZ signature-format assertion.
//!
//! The packager never speaks to a signing service itself; it consumes an
//! injected [`Signer`]. The canonical implementation is an HTTP POST to an
//! authsign-style endpoint, but that lives with the caller. Whatever the
//! signer returns must pass [`SignedData::validate`] before it is embedded
//! in `datapackage-digest.json`.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::DateTime;
use data_encoding::BASE64;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{PackError, PackResult};

/// Default deadline for a [`Signer::sign`] call.
pub const DEFAULT_SIGNER_DEADLINE: Duration = Duration::from_secs(30);

/// An error reported by a signing collaborator.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SignError(pub String);

/// A capability that attests to a datapackage hash.
pub trait Signer: Send + Sync {
    /// Sign the given `sha256:<hex>` hash, observed at `created` (ISO-8601).
    fn sign(&self, hash: &str, created: &str) -> Result<SignedData, SignError>;
}

/// How the signer identifies itself.
///
/// Anonymous signers hand out a bare public key; domain-identified signers
/// present a certificate chain for their domain plus a signed timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SignerIdentity {
    Domain {
        domain: String,
        #[serde(rename = "domainCert")]
        domain_cert: String,
        #[serde(rename = "timeSignature")]
        time_signature: String,
        #[serde(rename = "timestampCert")]
        timestamp_cert: String,
    },
    Anonymous {
        #[serde(rename = "publicKey")]
        public_key: String,
    },
}

/// A signature attesting to one datapackage hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedData {
    /// The hash that was signed, `sha256:` + 64 hex digits.
    pub hash: String,
    /// When the hash was produced, ISO-8601.
    pub created: String,
    /// The software that produced the signature.
    pub software: String,
    /// Base64 signature over the hash.
    pub signature: String,
    #[serde(flatten)]
    pub identity: SignerIdentity,
    /// Optional additional chain cross-signing the signing certificate.
    #[serde(rename = "crossSignedCert", skip_serializing_if = "Option::is_none")]
    pub cross_signed_cert: Option<String>,
}

impl SignedData {
    /// Assert the WACZ signature format, as a replay-side validator would.
    ///
    /// This checks shape, not cryptography: field presence, hash agreement,
    /// parseable timestamps, decodable Base64, PEM-looking certificate
    /// chains.
    pub fn validate(&self, expected_hash: &str) -> Result<(), String> {
        if self.hash != expected_hash {
            return Err(format!(
                "signed hash {} does not match datapackage hash {}",
                self.hash, expected_hash
            ));
        }
        let hex_part = self
            .hash
            .strip_prefix("sha256:")
            .ok_or_else(|| String::from("hash is not sha256-labelled"))?;
        if hex_part.len() != 64 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err("hash is not 64 hex digits".into());
        }
        if DateTime::parse_from_rfc3339(&self.created).is_err() {
            return Err(format!("created {:?} is not ISO-8601", self.created));
        }
        if self.software.trim().is_empty() {
            return Err("software is empty".into());
        }
        check_base64("signature", &self.signature)?;

        match &self.identity {
            SignerIdentity::Anonymous { public_key } => {
                check_base64("publicKey", public_key)?;
            }
            SignerIdentity::Domain {
                domain,
                domain_cert,
                time_signature,
                timestamp_cert,
            } => {
                if domain.trim().is_empty() {
                    return Err("domain is empty".into());
                }
                check_pem("domainCert", domain_cert)?;
                check_base64("timeSignature", time_signature)?;
                check_pem("timestampCert", timestamp_cert)?;
            }
        }
        if let Some(chain) = &self.cross_signed_cert {
            check_pem("crossSignedCert", chain)?;
        }
        Ok(())
    }
}

fn check_base64(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} is empty"));
    }
    BASE64
        .decode(value.trim().as_bytes())
        .map(|_| ())
        .map_err(|e| format!("{field} is not valid Base64: {e}"))
}

fn check_pem(field: &str, value: &str) -> Result<(), String> {
    if value.contains("-----BEGIN CERTIFICATE-----") {
        Ok(())
    } else {
        Err(format!("{field} is not a PEM certificate chain"))
    }
}

/// Invoke a signer with a deadline.
///
/// The call runs on a helper thread; if it does not answer in time the run
/// fails with [`PackError::SignerTimeout`] and the thread is abandoned (the
/// run is being torn down either way).
pub(crate) fn sign_with_deadline(
    signer: &Arc<dyn Signer>,
    hash: &str,
    created: &str,
    deadline: Duration,
) -> PackResult<SignedData> {
    let (tx, rx) = mpsc::channel();
    let signer = Arc::clone(signer);
    let hash = hash.to_owned();
    let created = created.to_owned();
    thread::spawn(move || {
        let _ = tx.send(signer.sign(&hash, &created));
    });

    match rx.recv_timeout(deadline) {
        Ok(Ok(signed)) => {
            debug!("signer answered for {}", signed.hash);
            Ok(signed)
        }
        Ok(Err(e)) => Err(PackError::SigningFailed(e.to_string())),
        Err(_) => Err(PackError::SignerTimeout),
    }
}
