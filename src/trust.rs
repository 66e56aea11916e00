use time::OffsetDateTime;
use tracing::debug;

use crate::cert::Certificate;
use crate::error::{KeyToolError, Result};
use crate::keystore::KeyStore;

/// A set of trust anchors against which certificate chains are checked.
#[derive(Clone, Debug, Default)]
pub struct TrustStore {
    anchors: Vec<Certificate>,
}

impl TrustStore {
    pub fn new(anchors: Vec<Certificate>) -> Self {
        Self { anchors }
    }

    /// Trusts every trusted certificate entry of `store`.
    pub fn from_keystore(store: &KeyStore) -> Result<Self> {
        let anchors: Vec<Certificate> = store
            .trusted_certificates()
            .map(|entry| entry.certificate().clone())
            .collect();
        if anchors.is_empty() {
            return Err(KeyToolError::InvalidInput(
                "key store holds no trusted certificates".to_string(),
            ));
        }
        Ok(Self { anchors })
    }

    pub fn anchors(&self) -> &[Certificate] {
        &self.anchors
    }

    /// Checks that `chain` (leaf first, then any intermediates) leads to one of
    /// the anchors.
    ///
    /// Every link must carry a valid signature from its issuer, every
    /// certificate must be valid at `at`, and every issuer must be a CA.
    pub fn verify(&self, chain: &[Certificate], at: OffsetDateTime) -> Result<()> {
        let leaf = chain
            .first()
            .ok_or_else(|| untrusted("empty certificate chain".to_string()))?;
        let result = self.walk(leaf, &chain[1..], at);
        if let Err(e) = &result {
            debug!(
                subject = %leaf.subject().map(|name| name.to_string()).unwrap_or_default(),
                error = %e,
                "rejected certificate chain"
            );
        }
        result
    }

    fn walk(
        &self,
        leaf: &Certificate,
        intermediates: &[Certificate],
        at: OffsetDateTime,
    ) -> Result<()> {
        let mut current = leaf;
        check_validity(current, at)?;

        for _ in 0..=intermediates.len() {
            if self.anchors.contains(current) {
                return Ok(());
            }

            if let Some(anchor) = self
                .anchors
                .iter()
                .find(|anchor| current.is_issued_by(anchor) && signed_by(current, anchor))
            {
                check_issuer(anchor, at)?;
                return Ok(());
            }

            let Some(next) = intermediates
                .iter()
                .find(|candidate| current.is_issued_by(candidate) && *candidate != current)
            else {
                return Err(untrusted(format!(
                    "no trusted issuer found for {}",
                    describe(current)
                )));
            };
            if !signed_by(current, next) {
                return Err(untrusted(format!(
                    "signature of {} does not verify against its issuer",
                    describe(current)
                )));
            }
            check_issuer(next, at)?;
            current = next;
        }

        Err(untrusted("certificate chain does not terminate".to_string()))
    }
}

fn signed_by(cert: &Certificate, issuer: &Certificate) -> bool {
    issuer
        .public_key()
        .and_then(|key| cert.verify_signature(&key))
        .is_ok()
}

fn check_issuer(issuer: &Certificate, at: OffsetDateTime) -> Result<()> {
    if !issuer.is_ca()? {
        return Err(untrusted(format!(
            "{} is not a certificate authority",
            describe(issuer)
        )));
    }
    check_validity(issuer, at)
}

fn check_validity(cert: &Certificate, at: OffsetDateTime) -> Result<()> {
    if cert.validity().is_valid_at(at) {
        Ok(())
    } else {
        Err(untrusted(format!("{} is not valid at {at}", describe(cert))))
    }
}

fn describe(cert: &Certificate) -> String {
    cert.subject()
        .map(|name| name.to_string())
        .unwrap_or_else(|_| format!("certificate {}", cert.serial_hex()))
}

fn untrusted(message: String) -> KeyToolError {
    KeyToolError::UntrustedCertificate(message)
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::key_tool::KeyTool;

    #[test]
    fn test_leaf_verifies_against_its_ca() {
        let tool = KeyTool::new();
        let ca = tool.create_ca("MyCA").unwrap();
        let server = ca.sign("server").unwrap();
        let trust = TrustStore::new(vec![ca.certificate().clone()]);

        trust
            .verify(&[server.certificate().clone()], OffsetDateTime::now_utc())
            .unwrap();
        trust
            .verify(&[ca.certificate().clone()], OffsetDateTime::now_utc())
            .unwrap();
    }

    #[test]
    fn test_foreign_leaf_is_untrusted() {
        let tool = KeyTool::new();
        let ca = tool.create_ca("MyCA").unwrap();
        let wrong_ca = tool.create_ca("WrongCA").unwrap();
        let client = wrong_ca.sign("client").unwrap();
        let trust = TrustStore::new(vec![ca.certificate().clone()]);

        let err = trust
            .verify(&[client.certificate().clone()], OffsetDateTime::now_utc())
            .unwrap_err();
        assert!(matches!(err, KeyToolError::UntrustedCertificate(_)));
    }

    #[test]
    fn test_same_name_different_key_is_untrusted() {
        let tool = KeyTool::new();
        let ca = tool.create_ca("MyCA").unwrap();
        let impostor = tool.create_ca("MyCA").unwrap();
        let server = impostor.sign("server").unwrap();
        let trust = TrustStore::new(vec![ca.certificate().clone()]);

        assert!(trust
            .verify(&[server.certificate().clone()], OffsetDateTime::now_utc())
            .is_err());
    }

    #[test]
    fn test_expired_leaf_is_untrusted() {
        let tool = KeyTool::new();
        let ca = tool.create_ca("MyCA").unwrap();
        let server = ca.sign("server").unwrap();
        let trust = TrustStore::new(vec![ca.certificate().clone()]);
        let later = server.certificate().validity().not_after + Duration::days(1);

        assert!(matches!(
            trust.verify(&[server.certificate().clone()], later),
            Err(KeyToolError::UntrustedCertificate(_))
        ));
    }

    #[test]
    fn test_empty_chain_is_untrusted() {
        let trust = TrustStore::default();
        assert!(matches!(
            trust.verify(&[], OffsetDateTime::now_utc()),
            Err(KeyToolError::UntrustedCertificate(_))
        ));
    }
}
