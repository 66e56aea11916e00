mod util;

use keytool::error::KeyToolError;
use keytool::fixtures::{TEST_KEY_PASSWORD, TEST_KEY_STORE_PASSWORD, TEST_WRONG_PASSWORD};
use keytool::key_and_cert::KeyAndCert;
use keytool::keystore::{KeyStore, KeyStoreEntry};
use util::key_tool;

/// A private key entry survives a trip through the filesystem with its key,
/// certificate, and chain intact.
#[test]
fn test_key_store_file_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("server.p12");

    let ca = key_tool().create_ca("MyCA")?;
    let server = ca.sign("server")?;
    server
        .store_key_and_cert(TEST_KEY_PASSWORD)?
        .save(&path, TEST_KEY_STORE_PASSWORD)?;

    let store = KeyStore::load(&path, TEST_KEY_STORE_PASSWORD)?;
    assert_eq!(store.len(), 1);

    let entry = store.private_key_entries().next().expect("private key entry");
    assert_eq!(entry.alias(), "server");
    assert_eq!(entry.certificate(), server.certificate());
    assert_eq!(entry.issuer_chain(), &[ca.certificate().clone()]);

    let chain = entry.certificate_chain();
    assert_eq!(chain.len(), 2);
    assert!(chain.last().expect("root").is_self_issued());

    let key = entry.decrypt_key(TEST_KEY_PASSWORD)?;
    assert_eq!(key.public_key(), server.certificate().public_key()?);
    Ok(())
}

#[test]
fn test_wrong_store_password() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("server.p12");

    let ca = key_tool().create_ca("MyCA")?;
    ca.sign("server")?
        .store_key_and_cert(TEST_KEY_PASSWORD)?
        .save(&path, TEST_KEY_STORE_PASSWORD)?;

    assert_eq!(
        KeyStore::load(&path, TEST_WRONG_PASSWORD).unwrap_err(),
        KeyToolError::WrongStorePassword
    );
    Ok(())
}

/// The store opens with the store password, but the key stays sealed under
/// any other key password, including the store password itself.
#[test]
fn test_wrong_key_password() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("server.p12");

    let ca = key_tool().create_ca("MyCA")?;
    ca.sign("server")?
        .store_key_and_cert(TEST_KEY_PASSWORD)?
        .save(&path, TEST_KEY_STORE_PASSWORD)?;

    let store = KeyStore::load(&path, TEST_KEY_STORE_PASSWORD)?;
    let entry = store.private_key_entries().next().expect("private key entry");
    assert_eq!(
        entry.decrypt_key(TEST_WRONG_PASSWORD).unwrap_err(),
        KeyToolError::WrongKeyPassword
    );
    assert_eq!(
        entry.decrypt_key(TEST_KEY_STORE_PASSWORD).unwrap_err(),
        KeyToolError::WrongKeyPassword
    );
    Ok(())
}

#[test]
fn test_missing_key_store() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("absent.p12");

    let err = KeyStore::load(&path, TEST_KEY_STORE_PASSWORD).unwrap_err();
    assert!(matches!(err, KeyToolError::KeyStoreNotFound(p) if p.ends_with("absent.p12")));
    Ok(())
}

#[test]
fn test_truncated_key_store() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("truncated.p12");

    let ca = key_tool().create_ca("MyCA")?;
    let der = ca.store_cert()?.to_pkcs12(TEST_KEY_STORE_PASSWORD)?;
    std::fs::write(&path, &der[..der.len() / 2])?;

    assert!(matches!(
        KeyStore::load(&path, TEST_KEY_STORE_PASSWORD),
        Err(KeyToolError::MalformedKeyStore(_))
    ));
    Ok(())
}

/// A failed save leaves nothing behind.
#[test]
fn test_save_into_missing_directory() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("missing").join("ca.p12");

    let ca = key_tool().create_ca("MyCA")?;
    let err = ca.store_cert()?.save(&path, TEST_KEY_STORE_PASSWORD).unwrap_err();

    assert!(matches!(err, KeyToolError::ExportError(_)));
    assert!(!path.exists());
    Ok(())
}

/// A trust store holds the certificate alone and rebuilds into a bundle that
/// cannot sign.
#[test]
fn test_trust_store_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ca.p12");

    let ca = key_tool().create_ca("MyCA")?;
    ca.store_cert()?.save(&path, TEST_KEY_STORE_PASSWORD)?;

    let store = KeyStore::load(&path, TEST_KEY_STORE_PASSWORD)?;
    assert_eq!(store.private_key_entries().count(), 0);
    match store.entry("MyCA") {
        Some(KeyStoreEntry::TrustedCertificate(entry)) => {
            assert_eq!(entry.certificate(), ca.certificate());
        }
        other => panic!("expected a trusted certificate entry, got {other:?}"),
    }

    let rebuilt = KeyAndCert::from_keystore(&store, None)?;
    assert_eq!(rebuilt.subject(), "MyCA");
    assert!(rebuilt.key().is_none());
    assert!(matches!(rebuilt.sign("server"), Err(KeyToolError::SigningError(_))));
    Ok(())
}

/// A root restored from its key store keeps signing leaves that chain to the
/// original certificate.
#[test]
fn test_restored_ca_can_sign() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ca-with-key.p12");

    let ca = key_tool().create_ca("MyCA")?;
    ca.store_key_and_cert(TEST_KEY_PASSWORD)?
        .save(&path, TEST_KEY_STORE_PASSWORD)?;

    let store = KeyStore::load(&path, TEST_KEY_STORE_PASSWORD)?;
    let restored = KeyAndCert::from_keystore(&store, Some(TEST_KEY_PASSWORD))?;
    assert_eq!(restored.certificate(), ca.certificate());

    let server = restored.sign("server")?;
    assert!(server.certificate().is_issued_by(ca.certificate()));
    server
        .certificate()
        .verify_signature(&ca.certificate().public_key()?)?;
    Ok(())
}

#[test]
fn test_empty_key_store_has_no_bundle() -> anyhow::Result<()> {
    let der = KeyStore::new().to_pkcs12(TEST_KEY_STORE_PASSWORD)?;
    let store = KeyStore::from_pkcs12(&der, TEST_KEY_STORE_PASSWORD)?;

    assert!(store.is_empty());
    assert!(matches!(
        KeyAndCert::from_keystore(&store, None),
        Err(KeyToolError::MissingKeyEntry(_))
    ));
    Ok(())
}
