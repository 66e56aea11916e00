mod util;

use std::sync::Arc;

use keytool::error::KeyToolError;
use keytool::fixtures::{
    self, TEST_KEY_PASSWORD, TEST_KEY_STORE_PASSWORD, TEST_WRONG_PASSWORD, TlsFixtures,
};
use keytool::tls::{KeyStoreSettings, TlsSettings};
use util::{do_tls_handshake, key_tool};

fn generate_fixtures() -> TlsFixtures {
    TlsFixtures::generate_with(&key_tool()).expect("fixtures")
}

async fn handshake(server: &TlsSettings, client: &TlsSettings) -> [Result<(), String>; 2] {
    let server_config = server.server_config().expect("server config");
    let client_config = client.client_config().expect("client config");
    do_tls_handshake(Arc::new(client_config), Arc::new(server_config), "localhost").await
}

/// Server and client both hold leaves signed by `MyCA` and trust `MyCA`.
#[tokio::test]
async fn test_client_cert_can_work() {
    let fixtures = generate_fixtures();
    let [client_result, server_result] =
        handshake(&fixtures.server_settings(), &fixtures.client_settings()).await;

    client_result.unwrap();
    server_result.unwrap();
}

/// The server's own name is also in its certificate.
#[tokio::test]
async fn test_server_name_matches_subject() {
    let fixtures = generate_fixtures();
    let server_config = fixtures.server_settings().server_config().unwrap();
    let client_config = fixtures.client_settings().client_config().unwrap();

    let [client_result, server_result] =
        do_tls_handshake(Arc::new(client_config), Arc::new(server_config), "server").await;
    client_result.unwrap();
    server_result.unwrap();
}

/// A client certificate signed by `WrongCA` is rejected by the server.
#[tokio::test]
async fn test_wrong_client_cert_cannot_work() {
    let fixtures = generate_fixtures();
    let client = TlsSettings {
        key_store: Some(fixtures::key_store(fixtures.wrong_client_cert.path())),
        ..fixtures.client_settings()
    };

    let [_client_result, server_result] = handshake(&fixtures.server_settings(), &client).await;
    let err = server_result.unwrap_err();
    assert!(err.contains("Server didn't accept"), "{err}");
    assert!(err.contains("UnknownIssuer"), "{err}");
}

/// A client that presents no certificate is rejected when the server
/// requires one.
#[tokio::test]
async fn test_missing_client_cert_cannot_work() {
    let fixtures = generate_fixtures();
    let client = TlsSettings {
        key_store: None,
        ..fixtures.client_settings()
    };

    let [_client_result, server_result] = handshake(&fixtures.server_settings(), &client).await;
    assert!(server_result.is_err());
}

/// A client that trusts only `WrongCA` rejects the server.
#[tokio::test]
async fn test_wrong_trust_store_cannot_work() {
    let fixtures = generate_fixtures();
    let client = TlsSettings {
        trust_store: Some(fixtures::trust_store(fixtures.wrong_ca_cert.path())),
        ..fixtures.client_settings()
    };

    let [client_result, _server_result] = handshake(&fixtures.server_settings(), &client).await;
    let err = client_result.unwrap_err();
    assert!(err.contains("Client didn't connect"), "{err}");
    assert!(err.contains("UnknownIssuer"), "{err}");
}

/// Without a trust store the server asks for no client certificate.
#[tokio::test]
async fn test_client_can_start_without_key_store() {
    let fixtures = generate_fixtures();
    let server = TlsSettings {
        trust_store: None,
        ..fixtures.server_settings()
    };
    let client = TlsSettings {
        key_store: None,
        ..fixtures.client_settings()
    };

    let [client_result, server_result] = handshake(&server, &client).await;
    client_result.unwrap();
    server_result.unwrap();
}

#[test]
fn test_wrong_key_password_cause_failure() {
    let fixtures = generate_fixtures();
    let client = TlsSettings {
        key_store: Some(
            KeyStoreSettings::builder()
                .path(fixtures.client_cert.path())
                .store_password(TEST_KEY_STORE_PASSWORD)
                .key_password(TEST_WRONG_PASSWORD)
                .build(),
        ),
        ..fixtures.client_settings()
    };

    assert_eq!(client.client_config().unwrap_err(), KeyToolError::WrongKeyPassword);
}

#[test]
fn test_wrong_store_password_cause_failure() {
    let fixtures = generate_fixtures();
    let server = TlsSettings {
        key_store: Some(
            KeyStoreSettings::builder()
                .path(fixtures.server_cert.path())
                .store_password(TEST_WRONG_PASSWORD)
                .key_password(TEST_KEY_PASSWORD)
                .build(),
        ),
        ..fixtures.server_settings()
    };

    assert_eq!(server.server_config().unwrap_err(), KeyToolError::WrongStorePassword);
}

#[test]
fn test_non_exist_key_store_cause_failure() {
    let fixtures = generate_fixtures();
    let dir = tempfile::tempdir().unwrap();
    let client = TlsSettings {
        key_store: Some(fixtures::key_store(&dir.path().join("notExist.p12"))),
        ..fixtures.client_settings()
    };

    assert!(matches!(
        client.client_config(),
        Err(KeyToolError::KeyStoreNotFound(_))
    ));
}

/// A server needs an identity and a client needs anchors.
#[test]
fn test_incomplete_settings_are_rejected() {
    let fixtures = generate_fixtures();
    let no_identity = TlsSettings {
        key_store: None,
        ..fixtures.server_settings()
    };
    let no_anchors = TlsSettings {
        trust_store: None,
        ..fixtures.client_settings()
    };

    assert!(matches!(
        no_identity.server_config(),
        Err(KeyToolError::InvalidInput(_))
    ));
    assert!(matches!(
        no_anchors.client_config(),
        Err(KeyToolError::InvalidInput(_))
    ));
}
