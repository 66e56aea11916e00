use bon::Builder;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::cert::params::{CertificationRequestInfo, DistinguishedName};
use crate::error::Result;
use crate::issuer::{Issuer, SelfIssuer};
use crate::key::KeyAlgorithm;
use crate::key_and_cert::KeyAndCert;
use crate::keystore::{DEFAULT_KEY_PROTECTION_ITERATIONS, DEFAULT_MAC_ITERATIONS};
use crate::policy::ValidityPolicy;

/// Settings shared by every certificate and key store a [`KeyTool`] produces.
///
/// # Example
/// ```
/// use keytool::key::KeyAlgorithm;
/// use keytool::key_tool::KeyToolConfig;
///
/// let config = KeyToolConfig::builder()
///     .key_algorithm(KeyAlgorithm::EcdsaP384)
///     .extra_dns_names(vec!["localhost".to_string(), "config-server".to_string()])
///     .build();
/// assert_eq!(config.mac_iterations, 10_000);
/// ```
#[derive(Clone, Debug, Builder, PartialEq, Eq)]
pub struct KeyToolConfig {
    #[builder(default)]
    pub key_algorithm: KeyAlgorithm,
    #[builder(default)]
    pub validity: ValidityPolicy,
    /// DNS names added to every leaf besides its own subject.
    #[builder(default = vec!["localhost".to_string()])]
    pub extra_dns_names: Vec<String>,
    /// PBKDF2 rounds protecting private keys in exported key stores.
    #[builder(default = DEFAULT_KEY_PROTECTION_ITERATIONS)]
    pub key_protection_iterations: u32,
    /// KDF rounds for the key store integrity MAC.
    #[builder(default = DEFAULT_MAC_ITERATIONS)]
    pub mac_iterations: u32,
}

impl Default for KeyToolConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Creates root certificate authorities.
#[derive(Clone, Debug, Default)]
pub struct KeyTool {
    config: KeyToolConfig,
}

impl KeyTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: KeyToolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KeyToolConfig {
        &self.config
    }

    /// Creates a self-signed certificate authority named `CN=name` with a
    /// fresh key pair.
    ///
    /// Fails with [`crate::error::KeyToolError::KeyGenerationError`] when the
    /// configured key algorithm cannot be generated, and with
    /// [`crate::error::KeyToolError::InvalidInput`] when the validity policy
    /// reaches past the years a certificate can carry.
    pub fn create_ca(&self, name: &str) -> Result<KeyAndCert> {
        let key = self.config.key_algorithm.generate()?;
        debug!(subject = name, algorithm = ?self.config.key_algorithm, "generated CA key pair");

        let subject = DistinguishedName::from_common_name(name);
        let request = CertificationRequestInfo::builder()
            .subject(subject.clone())
            .subject_public_key(key.public_key())
            .is_ca(true)
            .build();
        let validity = self.config.validity.ca_window(OffsetDateTime::now_utc())?;

        let certificate = SelfIssuer {
            name: subject,
            key: &key,
        }
        .issue(&request, validity)?;

        info!(
            subject = name,
            serial = %certificate.serial_hex(),
            not_after = %validity.not_after,
            "created certificate authority"
        );

        Ok(KeyAndCert::from_parts(name, Some(key), certificate, Vec::new())
            .with_config(self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KeyToolConfig::default();
        assert_eq!(config.key_algorithm, KeyAlgorithm::EcdsaP256);
        assert_eq!(config.extra_dns_names, vec!["localhost".to_string()]);
        assert_eq!(config.key_protection_iterations, DEFAULT_KEY_PROTECTION_ITERATIONS);
    }

    #[test]
    fn test_create_ca_is_self_signed() {
        let ca = KeyTool::new().create_ca("MyCA").unwrap();
        let cert = ca.certificate();
        assert!(cert.is_self_issued());
        assert!(cert.is_ca().unwrap());
        assert_eq!(cert.subject().unwrap().common_name, "MyCA");
        cert.verify_signature(&cert.public_key().unwrap()).unwrap();
    }

    #[test]
    fn test_create_ca_rejects_unsupported_rsa_size() {
        let config = KeyToolConfig::builder()
            .key_algorithm(KeyAlgorithm::Rsa { bits: 1024 })
            .build();
        let err = KeyTool::with_config(config).create_ca("MyCA").unwrap_err();
        assert!(matches!(err, crate::error::KeyToolError::KeyGenerationError(_)));
    }

    #[test]
    fn test_create_ca_rejects_out_of_range_lifetime() {
        let config = KeyToolConfig::builder()
            .validity(
                ValidityPolicy::builder()
                    .ca_lifetime(time::Duration::days(5_000_000))
                    .build(),
            )
            .build();
        let err = KeyTool::with_config(config).create_ca("MyCA").unwrap_err();
        assert!(matches!(err, crate::error::KeyToolError::InvalidInput(_)));
    }
}
