//! Ready-made key stores for mutual-TLS tests.
//!
//! [`TlsFixtures::generate`] mints two unrelated authorities, `MyCA` and
//! `WrongCA`, and writes:
//!
//! * `server` and `client` key stores signed by `MyCA`;
//! * a `client` key store signed by `WrongCA`;
//! * one trust store per authority.
//!
//! Every file is a fresh temporary `.p12` removed when the fixtures are
//! dropped. All stores use [`TEST_KEY_STORE_PASSWORD`]; all private keys use
//! [`TEST_KEY_PASSWORD`].

use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::Result;
use crate::key_and_cert::KeyAndCert;
use crate::key_tool::KeyTool;
use crate::keystore::KeyStore;
use crate::tls::{KeyStoreSettings, TlsSettings, TrustStoreSettings};

pub const TEST_KEY_STORE_PASSWORD: &str = "test-key-store-password";
pub const TEST_KEY_PASSWORD: &str = "test-key-password";
pub const TEST_WRONG_PASSWORD: &str = "test-wrong-password";

pub struct TlsFixtures {
    /// Trust store holding `MyCA`.
    pub ca_cert: NamedTempFile,
    /// Trust store holding `WrongCA`.
    pub wrong_ca_cert: NamedTempFile,
    /// Key store for `server`, signed by `MyCA`.
    pub server_cert: NamedTempFile,
    /// Key store for `client`, signed by `MyCA`.
    pub client_cert: NamedTempFile,
    /// Key store for `client`, signed by `WrongCA`.
    pub wrong_client_cert: NamedTempFile,
}

impl TlsFixtures {
    pub fn generate() -> Result<Self> {
        Self::generate_with(&KeyTool::new())
    }

    pub fn generate_with(tool: &KeyTool) -> Result<Self> {
        let ca = tool.create_ca("MyCA")?;
        let server_cert = save_key_and_cert(&ca.sign("server")?)?;
        let client_cert = save_key_and_cert(&ca.sign("client")?)?;

        let wrong_ca = tool.create_ca("WrongCA")?;
        let wrong_client = wrong_ca.sign("client")?;
        let wrong_ca_cert = save_cert(&wrong_ca)?;
        let wrong_client_cert = save_key_and_cert(&wrong_client)?;

        let ca_cert = save_cert(&ca)?;

        Ok(Self {
            ca_cert,
            wrong_ca_cert,
            server_cert,
            client_cert,
            wrong_client_cert,
        })
    }

    /// The server side: `server` identity, clients must chain to `MyCA`.
    pub fn server_settings(&self) -> TlsSettings {
        TlsSettings {
            key_store: Some(key_store(self.server_cert.path())),
            trust_store: Some(trust_store(self.ca_cert.path())),
        }
    }

    /// The client side: `client` identity signed by `MyCA`, trusting `MyCA`.
    pub fn client_settings(&self) -> TlsSettings {
        TlsSettings {
            key_store: Some(key_store(self.client_cert.path())),
            trust_store: Some(trust_store(self.ca_cert.path())),
        }
    }
}

/// Settings for the key store at `path` with the fixture passwords.
pub fn key_store(path: &Path) -> KeyStoreSettings {
    KeyStoreSettings::builder()
        .path(path)
        .store_password(TEST_KEY_STORE_PASSWORD)
        .key_password(TEST_KEY_PASSWORD)
        .build()
}

/// Settings for the trust store at `path` with the fixture password.
pub fn trust_store(path: &Path) -> TrustStoreSettings {
    TrustStoreSettings::builder()
        .path(path)
        .password(TEST_KEY_STORE_PASSWORD)
        .build()
}

fn save_key_and_cert(key_cert: &KeyAndCert) -> Result<NamedTempFile> {
    save_key_store(key_cert.subject(), key_cert.store_key_and_cert(TEST_KEY_PASSWORD)?)
}

fn save_cert(key_cert: &KeyAndCert) -> Result<NamedTempFile> {
    save_key_store(key_cert.subject(), key_cert.store_cert()?)
}

fn save_key_store(prefix: &str, store: KeyStore) -> Result<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".p12")
        .tempfile()?;
    store.save(file.path(), TEST_KEY_STORE_PASSWORD)?;
    debug!(path = %file.path().display(), prefix, "saved fixture key store");
    Ok(file)
}
