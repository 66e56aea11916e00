use der::asn1::BitString;
use tracing::debug;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAltName,
    SubjectKeyIdentifier, key_identifier,
};
use crate::cert::params::{CertificationRequestInfo, DistinguishedName, ExtensionParam, Validity};
use crate::error::{KeyToolError, Result};
use crate::key::KeyPair;
use crate::policy::random_serial_number;
use crate::tbs_certificate::TbsCertificate;

/// Represents an entity capable of issuing certificates.
pub trait Issuer {
    /// The issuer name written into issued certificates.
    ///
    /// Must be byte-for-byte the subject of the issuer's own certificate, or
    /// the issued certificates will not chain to it.
    fn issuer_name(&self) -> Result<Name>;

    /// Returns the signing key of the issuer, or a [`KeyToolError::SigningError`]
    /// when the issuer holds none.
    fn signing_key(&self) -> Result<&KeyPair>;

    /// Issues a certificate for `cert_request`, valid for `validity`.
    ///
    /// CA requests get critical basic constraints `CA=true, pathLen=0` and
    /// certificate-signing key usage; everything else gets `CA=false` and
    /// end-entity key usage. Every certificate carries subject and authority
    /// key identifiers and a fresh random serial number.
    fn issue(
        &self,
        cert_request: &CertificationRequestInfo,
        validity: Validity,
    ) -> Result<Certificate> {
        let signing_key = self.signing_key()?;
        let signature_algorithm = signing_key.signature_algorithm();

        let subject_spki = cert_request.subject_public_key.to_x509spki()?;
        let issuer_spki = signing_key.as_spki()?;

        let (basic_constraints, key_usage) = if cert_request.is_ca {
            (
                BasicConstraints {
                    is_ca: true,
                    max_path_length: Some(0),
                },
                KeyUsage::certificate_authority(),
            )
        } else {
            (BasicConstraints::default(), KeyUsage::end_entity())
        };

        let mut extensions: Vec<ExtensionParam> = vec![
            ExtensionParam::from_extension(basic_constraints, true)?,
            ExtensionParam::from_extension(key_usage, true)?,
            ExtensionParam::from_extension(
                SubjectKeyIdentifier(key_identifier(&subject_spki)),
                false,
            )?,
            ExtensionParam::from_extension(
                AuthorityKeyIdentifier {
                    key_identifier: key_identifier(&issuer_spki),
                },
                false,
            )?,
        ];

        if !cert_request.usages.is_empty() {
            let extended_key_usage = ExtendedKeyUsage {
                usage: cert_request.usages.clone(),
            };
            extensions.push(ExtensionParam::from_extension(extended_key_usage, false)?);
        }

        if !cert_request.dns_names.is_empty() {
            let subject_alt_name = SubjectAltName {
                names: cert_request.dns_names.clone(),
            };
            extensions.push(ExtensionParam::from_extension(subject_alt_name, false)?);
        }

        extensions.extend(cert_request.extensions.iter().cloned());

        let tbs_cert = TbsCertificate {
            serial_number: random_serial_number(),
            signature_algorithm,
            issuer: self.issuer_name()?,
            validity,
            subject: cert_request.subject.clone(),
            subject_public_key: cert_request.subject_public_key.clone(),
            extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;
        let tbs_der = der::Encode::to_der(&tbs_cert_inner)?;
        let signature = signing_key.sign_data(&tbs_der)?;

        debug!(
            subject = %cert_request.subject,
            issuer = %tbs_cert.issuer,
            ca = cert_request.is_ca,
            "signed certificate"
        );

        let cert_inner = CertificateInner {
            signature_algorithm: tbs_cert_inner.signature.clone(),
            tbs_certificate: tbs_cert_inner,
            signature: BitString::from_bytes(&signature)
                .map_err(|e| KeyToolError::SigningError(e.to_string()))?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}

/// Issues a certificate whose issuer is its own subject, signed by its own key.
pub struct SelfIssuer<'a> {
    pub name: DistinguishedName,
    pub key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Result<Name> {
        self.name.as_x509_name()
    }

    fn signing_key(&self) -> Result<&KeyPair> {
        Ok(self.key)
    }
}
