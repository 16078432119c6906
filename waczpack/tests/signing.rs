//! End-to-end signing: the digest file either embeds a validated signature
//! or the whole run fails and the output disappears.

mod support;

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use waczpack::{
    PackError, Run, SignError, SignedData, Signer, SignerIdentity, WaczConfig,
};

use support::*;

/// A signer that answers with well-formed anonymous SignedData.
struct GoodSigner;

impl Signer for GoodSigner {
    fn sign(&self, hash: &str, created: &str) -> Result<SignedData, SignError> {
        Ok(SignedData {
            hash: hash.to_owned(),
            created: created.to_owned(),
            software: "test-signer 1.0".into(),
            signature: "c2lnbmF0dXJl".into(),
            identity: SignerIdentity::Anonymous {
                public_key: "cHVibGlja2V5".into(),
            },
            cross_signed_cert: None,
        })
    }
}

/// A signer whose response fails the signature-format assertion.
struct BadSigner;

impl Signer for BadSigner {
    fn sign(&self, hash: &str, created: &str) -> Result<SignedData, SignError> {
        Ok(SignedData {
            hash: hash.to_owned(),
            created: created.to_owned(),
            software: "".into(), // empty software fails validation
            signature: "c2lnbmF0dXJl".into(),
            identity: SignerIdentity::Anonymous {
                public_key: "cHVibGlja2V5".into(),
            },
            cross_signed_cert: None,
        })
    }
}

/// A signer that reports failure outright.
struct RefusingSigner;

impl Signer for RefusingSigner {
    fn sign(&self, _: &str, _: &str) -> Result<SignedData, SignError> {
        Err(SignError("no certificate loaded".into()))
    }
}

fn config_with_signer(
    dir: &TempDir,
    signer: Arc<dyn Signer>,
) -> (WaczConfig, std::path::PathBuf) {
    let input = dir.path().join("input.warc.gz");
    fs::write(&input, gzip_members(&[warcinfo_record()])).unwrap();
    let output = dir.path().join("out.wacz");
    let (clock, ids) = deterministic_seams();
    let config = WaczConfig::new([input], &output)
        .unwrap()
        .clock(clock)
        .page_ids(ids)
        .signer(signer);
    (config, output)
}

#[test]
fn valid_signer_response_is_embedded() {
    let dir = TempDir::new().unwrap();
    let (config, output) = config_with_signer(&dir, Arc::new(GoodSigner));

    Run::new(config).process().expect("signed run should succeed");

    let entries = read_zip_entries(&fs::read(&output).unwrap());
    let digest_bytes = &entries
        .iter()
        .find(|(n, _)| n == "datapackage-digest.json")
        .unwrap()
        .1;
    let digest: serde_json::Value = serde_json::from_slice(digest_bytes).unwrap();

    let signed: SignedData =
        serde_json::from_value(digest["signedData"].clone()).expect("signedData should round-trip");
    let expected_hash = digest["hash"].as_str().unwrap();
    assert_eq!(signed.validate(expected_hash), Ok(()));
    assert_eq!(signed.created, "2023-02-22T12:00:00Z");
    assert!(matches!(signed.identity, SignerIdentity::Anonymous { .. }));
}

#[test]
fn invalid_signer_response_fails_and_removes_output() {
    let dir = TempDir::new().unwrap();
    let (config, output) = config_with_signer(&dir, Arc::new(BadSigner));

    let mut run = Run::new(config);
    assert!(matches!(run.process(), Err(PackError::SignatureInvalid(_))));
    assert!(!output.exists());
}

#[test]
fn signer_errors_fail_the_run() {
    let dir = TempDir::new().unwrap();
    let (config, output) = config_with_signer(&dir, Arc::new(RefusingSigner));

    let mut run = Run::new(config);
    match run.process() {
        Err(PackError::SigningFailed(message)) => {
            assert!(message.contains("no certificate loaded"));
        }
        other => panic!("expected SigningFailed, got {other:?}"),
    }
    assert!(!output.exists());
}
