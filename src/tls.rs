//! rustls configurations built from key store and trust store files.
//!
//! Trust is always explicit: each configuration trusts exactly the anchors in
//! the trust store it is given, never the platform roots.

use std::path::PathBuf;
use std::sync::Arc;

use bon::Builder;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tracing::info;

use crate::error::{KeyToolError, Result};
use crate::keystore::KeyStore;
use crate::trust::TrustStore;

/// A key store file holding the local identity.
#[derive(Clone, Debug, Builder)]
pub struct KeyStoreSettings {
    #[builder(into)]
    pub path: PathBuf,
    #[builder(into)]
    pub store_password: String,
    #[builder(into)]
    pub key_password: String,
}

/// A key store file whose trusted certificates are the only accepted anchors.
#[derive(Clone, Debug, Builder)]
pub struct TrustStoreSettings {
    #[builder(into)]
    pub path: PathBuf,
    #[builder(into)]
    pub password: String,
}

/// Key store and trust store for one side of a TLS connection.
#[derive(Clone, Debug, Default, Builder)]
pub struct TlsSettings {
    pub key_store: Option<KeyStoreSettings>,
    pub trust_store: Option<TrustStoreSettings>,
}

struct Identity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl KeyStoreSettings {
    fn load_identity(&self) -> Result<Identity> {
        let store = KeyStore::load(&self.path, &self.store_password)?;
        let entry = store.private_key_entries().next().ok_or_else(|| {
            KeyToolError::MissingKeyEntry(self.path.display().to_string())
        })?;
        let key = entry.decrypt_key(&self.key_password)?;
        let key_der = key.to_pkcs8_der()?;

        let chain = entry
            .certificate_chain()
            .iter()
            .map(|cert| cert.to_der().map(CertificateDer::from))
            .collect::<Result<Vec<_>>>()?;

        Ok(Identity {
            chain,
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der.as_bytes().to_vec())),
        })
    }
}

impl TrustStoreSettings {
    fn load_roots(&self) -> Result<RootCertStore> {
        let store = KeyStore::load(&self.path, &self.password)?;
        let trust = TrustStore::from_keystore(&store)?;

        let mut roots = RootCertStore::empty();
        for anchor in trust.anchors() {
            roots.add(CertificateDer::from(anchor.to_der()?))?;
        }
        Ok(roots)
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

impl TlsSettings {
    /// Server configuration presenting the key store's identity.
    ///
    /// With a trust store, clients must present a certificate that chains to
    /// one of its anchors.
    pub fn server_config(&self) -> Result<ServerConfig> {
        let key_store = self.key_store.as_ref().ok_or_else(|| {
            KeyToolError::InvalidInput("a TLS server needs a key store".to_string())
        })?;
        let identity = key_store.load_identity()?;

        let provider = provider();
        let builder = ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;
        let builder = match &self.trust_store {
            Some(trust_store) => {
                let roots = Arc::new(trust_store.load_roots()?);
                let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider)
                    .build()
                    .map_err(|e| KeyToolError::Tls(e.to_string()))?;
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };
        let config = builder.with_single_cert(identity.chain, identity.key)?;

        info!(
            key_store = %key_store.path.display(),
            client_auth = self.trust_store.is_some(),
            "built TLS server configuration"
        );
        Ok(config)
    }

    /// Client configuration trusting only the trust store's anchors, and
    /// presenting the key store's identity when one is set.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let trust_store = self.trust_store.as_ref().ok_or_else(|| {
            KeyToolError::InvalidInput("a TLS client needs a trust store".to_string())
        })?;

        let builder = ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?
            .with_root_certificates(trust_store.load_roots()?);
        let config = match &self.key_store {
            Some(key_store) => {
                let identity = key_store.load_identity()?;
                builder.with_client_auth_cert(identity.chain, identity.key)?
            }
            None => builder.with_no_client_auth(),
        };

        info!(
            trust_store = %trust_store.path.display(),
            client_cert = self.key_store.is_some(),
            "built TLS client configuration"
        );
        Ok(config)
    }
}
