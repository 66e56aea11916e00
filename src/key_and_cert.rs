use time::OffsetDateTime;
use tracing::info;
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::cert::params::{CertificationRequestInfo, DistinguishedName};
use crate::error::{KeyToolError, Result};
use crate::issuer::Issuer;
use crate::key::KeyPair;
use crate::key_tool::KeyToolConfig;
use crate::keystore::{KeyStore, KeyStoreEntry, PrivateKeyEntry, TrustedCertificateEntry};
use crate::policy::leaf_dns_names;

/// A subject name, its certificate, the private key the certificate
/// certifies (when held), and copies of the issuer certificates up to the
/// root.
///
/// Instances are immutable; [`KeyAndCert::sign`] returns a new instance.
#[derive(Debug)]
pub struct KeyAndCert {
    subject: String,
    key: Option<KeyPair>,
    certificate: Certificate,
    issuer_chain: Vec<Certificate>,
    config: KeyToolConfig,
}

impl KeyAndCert {
    /// Assembles a bundle from existing material.
    ///
    /// Consistency between `key` and `certificate` is checked when the bundle
    /// signs or exports.
    pub fn from_parts(
        subject: impl Into<String>,
        key: Option<KeyPair>,
        certificate: Certificate,
        issuer_chain: Vec<Certificate>,
    ) -> Self {
        Self {
            subject: subject.into(),
            key,
            certificate,
            issuer_chain,
            config: KeyToolConfig::default(),
        }
    }

    /// Replaces the settings used for certificates signed and key stores
    /// exported by this bundle.
    pub fn with_config(mut self, config: KeyToolConfig) -> Self {
        self.config = config;
        self
    }

    /// Rebuilds a bundle from a key store.
    ///
    /// With a key password, the first private key entry is decrypted and the
    /// bundle can sign and export keys again. Without one, or when the store
    /// only holds trusted certificates, the bundle carries the certificate
    /// alone.
    pub fn from_keystore(store: &KeyStore, key_password: Option<&str>) -> Result<Self> {
        if let Some(entry) = store.private_key_entries().next() {
            let key = key_password
                .map(|password| entry.decrypt_key(password))
                .transpose()?;
            return Ok(Self::from_parts(
                entry.alias(),
                key,
                entry.certificate().clone(),
                entry.issuer_chain().to_vec(),
            ));
        }

        let entry = store.trusted_certificates().next().ok_or_else(|| {
            KeyToolError::MissingKeyEntry("key store holds no entries".to_string())
        })?;
        Ok(Self::from_parts(
            entry.alias(),
            None,
            entry.certificate().clone(),
            Vec::new(),
        ))
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn key(&self) -> Option<&KeyPair> {
        self.key.as_ref()
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Issuer certificates, nearest issuer first; empty for a root.
    pub fn issuer_chain(&self) -> &[Certificate] {
        &self.issuer_chain
    }

    /// The issuer's certificate, `None` for a root.
    pub fn issuer(&self) -> Option<&Certificate> {
        self.issuer_chain.first()
    }

    pub fn config(&self) -> &KeyToolConfig {
        &self.config
    }

    /// Issues a leaf certificate for `CN=name` with a fresh key pair, signed by
    /// this bundle's key.
    ///
    /// The leaf is usable for both TLS server and client authentication, and
    /// its validity lies within this bundle's validity. Fails with
    /// [`KeyToolError::SigningError`] when this bundle holds no private key,
    /// its key does not match its certificate, or its certificate is not a CA.
    pub fn sign(&self, name: &str) -> Result<KeyAndCert> {
        let signing_key = self.signing_key()?;
        if signing_key.public_key().to_spki_der()? != self.certificate.spki_der()? {
            return Err(KeyToolError::SigningError(format!(
                "private key of {} does not match its certificate",
                self.subject
            )));
        }
        if !self.certificate.is_ca()? {
            return Err(KeyToolError::SigningError(format!(
                "{} is not a certificate authority",
                self.subject
            )));
        }

        let validity = self
            .config
            .validity
            .leaf_window(OffsetDateTime::now_utc(), &self.certificate.validity())?;

        let key = self.config.key_algorithm.generate()?;
        let request = CertificationRequestInfo::builder()
            .subject(DistinguishedName::from_common_name(name))
            .subject_public_key(key.public_key())
            .usages(vec![
                ExtendedKeyUsageOption::ServerAuth,
                ExtendedKeyUsageOption::ClientAuth,
            ])
            .dns_names(leaf_dns_names(name, &self.config.extra_dns_names))
            .build();
        let certificate = self.issue(&request, validity)?;

        info!(
            subject = name,
            issuer = %self.subject,
            serial = %certificate.serial_hex(),
            "issued certificate"
        );

        let issuer_chain = std::iter::once(self.certificate.clone())
            .chain(self.issuer_chain.iter().cloned())
            .collect();
        Ok(KeyAndCert {
            subject: name.to_string(),
            key: Some(key),
            certificate,
            issuer_chain,
            config: self.config.clone(),
        })
    }

    /// A key store with one private key entry, aliased by the subject, holding
    /// the key encrypted with `key_password` and the chain up to the root.
    ///
    /// Fails with [`KeyToolError::ExportError`] when no private key is held.
    pub fn store_key_and_cert(&self, key_password: &str) -> Result<KeyStore> {
        let key = self.key.as_ref().ok_or_else(|| {
            KeyToolError::ExportError(format!("{} holds no private key", self.subject))
        })?;
        let entry = PrivateKeyEntry::new(
            self.subject.as_str(),
            key,
            self.certificate.clone(),
            self.issuer_chain.clone(),
            key_password,
            self.config.key_protection_iterations,
        )?;

        let mut store = KeyStore::new().with_mac_iterations(self.config.mac_iterations);
        store.add_entry(entry);
        Ok(store)
    }

    /// A key store with one trusted certificate entry and no key.
    pub fn store_cert(&self) -> Result<KeyStore> {
        let mut store = KeyStore::new().with_mac_iterations(self.config.mac_iterations);
        store.add_entry(KeyStoreEntry::TrustedCertificate(TrustedCertificateEntry::new(
            self.subject.as_str(),
            self.certificate.clone(),
        )));
        Ok(store)
    }
}

impl Issuer for KeyAndCert {
    fn issuer_name(&self) -> Result<Name> {
        Ok(self.certificate.inner.tbs_certificate.subject.clone())
    }

    fn signing_key(&self) -> Result<&KeyPair> {
        self.key.as_ref().ok_or_else(|| {
            KeyToolError::SigningError(format!("{} holds no private key", self.subject))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_tool::KeyTool;

    #[test]
    fn test_certificate_only_bundle_cannot_sign() {
        let ca = KeyTool::new().create_ca("MyCA").unwrap();
        let store = ca.store_cert().unwrap();
        let rebuilt = KeyAndCert::from_keystore(&store, None).unwrap();

        assert!(rebuilt.key().is_none());
        assert!(matches!(
            rebuilt.sign("server"),
            Err(KeyToolError::SigningError(_))
        ));
        assert!(matches!(
            rebuilt.store_key_and_cert("pw"),
            Err(KeyToolError::ExportError(_))
        ));
    }

    #[test]
    fn test_leaf_cannot_sign() {
        let ca = KeyTool::new().create_ca("MyCA").unwrap();
        let server = ca.sign("server").unwrap();
        assert!(matches!(
            server.sign("nested"),
            Err(KeyToolError::SigningError(_))
        ));
    }

    #[test]
    fn test_mismatched_key_cannot_sign() {
        let ca = KeyTool::new().create_ca("MyCA").unwrap();
        let impostor = KeyAndCert::from_parts(
            "MyCA",
            Some(KeyPair::generate_ecdsa_p256()),
            ca.certificate().clone(),
            Vec::new(),
        );
        assert!(matches!(
            impostor.sign("server"),
            Err(KeyToolError::SigningError(_))
        ));
    }

    #[test]
    fn test_signed_leaf_records_issuer_chain() {
        let ca = KeyTool::new().create_ca("MyCA").unwrap();
        let server = ca.sign("server").unwrap();

        assert_eq!(server.subject(), "server");
        assert_eq!(server.issuer(), Some(ca.certificate()));
        assert!(server.certificate().is_issued_by(ca.certificate()));
        assert_eq!(
            server.certificate().dns_names().unwrap(),
            vec!["server".to_string(), "localhost".to_string()]
        );
    }

    /// Leaves name their issuer with the authority's subject exactly as
    /// encoded, whatever attributes and order it was imported with.
    #[test]
    fn test_imported_subject_is_copied_into_leaves() {
        let ca = KeyTool::new().create_ca("MyCA").unwrap();
        let mut certificate = ca.certificate().clone();
        certificate.inner.tbs_certificate.subject =
            "CN=MyCA,OU=Unit,O=Org".parse::<Name>().unwrap();
        let key_der = ca.key().unwrap().to_pkcs8_der().unwrap();
        let key = KeyPair::from_pkcs8_der(key_der.as_bytes()).unwrap();
        let imported = KeyAndCert::from_parts("MyCA", Some(key), certificate.clone(), Vec::new());

        let server = imported.sign("server").unwrap();
        let issuer = &server.certificate().inner.tbs_certificate.issuer;
        assert_eq!(issuer, &certificate.inner.tbs_certificate.subject);
        assert!(server.certificate().is_issued_by(&certificate));
    }
}
