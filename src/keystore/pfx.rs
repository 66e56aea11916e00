//! ASN.1 structures of a PKCS#12 PFX (RFC 7292) and the PKCS#7 containers
//! it is built from.

use const_oid::ObjectIdentifier;
use der::asn1::{Any, OctetString, SetOfVec};
use der::{Decode, Encode, Sequence, Tag, Tagged};
use x509_cert::attr::Attribute;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{KeyToolError, Result};

pub const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
pub const ID_ENCRYPTED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.6");

pub const KEY_BAG: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.1");
pub const PKCS8_SHROUDED_KEY_BAG: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.2");
pub const CERT_BAG: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.3");
pub const X509_CERTIFICATE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.22.1");

pub const FRIENDLY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.20");
pub const LOCAL_KEY_ID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.21");

/// Marks a certificate bag as a trust anchor for Java key stores.
pub const ORACLE_TRUSTED_KEY_USAGE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.113894.746875.1.1");
pub const ANY_EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37.0");

pub const PFX_VERSION: u8 = 3;

/// ```text
/// PFX ::= SEQUENCE {
///     version     INTEGER {v3(3)}(v3,...),
///     authSafe    ContentInfo,
///     macData     MacData OPTIONAL
/// }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Pfx {
    pub version: u8,
    pub auth_safe: ContentInfo,
    pub mac_data: Option<MacData>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ContentInfo {
    pub content_type: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub content: Option<Any>,
}

impl ContentInfo {
    /// Wraps `bytes` as a PKCS#7 `data` content.
    pub fn data(bytes: Vec<u8>) -> Result<Self> {
        Ok(Self {
            content_type: ID_DATA,
            content: Some(Any::encode_from(&OctetString::new(bytes)?)?),
        })
    }

    /// Octets of a `data` content.
    pub fn data_content(&self) -> Result<Vec<u8>> {
        if self.content_type != ID_DATA {
            return Err(KeyToolError::MalformedKeyStore(format!(
                "expected data content, found {}",
                self.content_type
            )));
        }
        let content = self
            .content
            .as_ref()
            .ok_or_else(|| KeyToolError::MalformedKeyStore("data content is empty".to_string()))?;
        let octets = content
            .decode_as::<OctetString>()
            .map_err(|e| KeyToolError::MalformedKeyStore(e.to_string()))?;
        Ok(octets.into_bytes())
    }
}

/// ```text
/// MacData ::= SEQUENCE {
///     mac         DigestInfo,
///     macSalt     OCTET STRING,
///     iterations  INTEGER DEFAULT 1
/// }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct MacData {
    pub mac: DigestInfo,
    pub mac_salt: OctetString,
    #[asn1(default = "default_mac_iterations")]
    pub iterations: u32,
}

fn default_mac_iterations() -> u32 {
    1
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct DigestInfo {
    pub algorithm: AlgorithmIdentifierOwned,
    pub digest: OctetString,
}

/// ```text
/// SafeBag ::= SEQUENCE {
///     bagId          BAG-TYPE.&id ({PKCS12BagSet}),
///     bagValue       [0] EXPLICIT BAG-TYPE.&Type({PKCS12BagSet}{@bagId}),
///     bagAttributes  SET OF PKCS12Attribute OPTIONAL
/// }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct SafeBag {
    pub bag_id: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT")]
    pub bag_value: Any,
    pub bag_attributes: Option<SetOfVec<Attribute>>,
}

impl SafeBag {
    pub fn friendly_name(&self) -> Option<String> {
        let value = self.attribute(FRIENDLY_NAME)?;
        if value.tag() != Tag::BmpString {
            return None;
        }
        let units: Vec<u16> = value
            .value()
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).ok()
    }

    pub fn local_key_id(&self) -> Option<Vec<u8>> {
        self.attribute(LOCAL_KEY_ID)?
            .decode_as::<OctetString>()
            .ok()
            .map(OctetString::into_bytes)
    }

    pub fn has_attribute(&self, oid: ObjectIdentifier) -> bool {
        self.attribute(oid).is_some()
    }

    fn attribute(&self, oid: ObjectIdentifier) -> Option<&Any> {
        self.bag_attributes
            .as_ref()?
            .iter()
            .find(|attr| attr.oid == oid)?
            .values
            .iter()
            .next()
    }
}

/// Builds the attribute set of a bag.
#[derive(Default)]
pub struct BagAttributes {
    attributes: Vec<Attribute>,
}

impl BagAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn friendly_name(mut self, name: &str) -> Result<Self> {
        let utf16: Vec<u8> = name.encode_utf16().flat_map(u16::to_be_bytes).collect();
        self.attributes
            .push(attribute(FRIENDLY_NAME, Any::new(Tag::BmpString, utf16)?)?);
        Ok(self)
    }

    pub fn local_key_id(mut self, id: &[u8]) -> Result<Self> {
        self.attributes
            .push(attribute(LOCAL_KEY_ID, Any::encode_from(&OctetString::new(id)?)?)?);
        Ok(self)
    }

    pub fn trusted_for_any_usage(mut self) -> Result<Self> {
        self.attributes.push(attribute(
            ORACLE_TRUSTED_KEY_USAGE,
            Any::encode_from(&ANY_EXTENDED_KEY_USAGE)?,
        )?);
        Ok(self)
    }

    pub fn build(self) -> Result<Option<SetOfVec<Attribute>>> {
        if self.attributes.is_empty() {
            return Ok(None);
        }
        Ok(Some(SetOfVec::try_from(self.attributes)?))
    }
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![value])?,
    })
}

/// ```text
/// CertBag ::= SEQUENCE {
///     certId      BAG-TYPE.&id   ({CertTypes}),
///     certValue   [0] EXPLICIT BAG-TYPE.&Type ({CertTypes}{@certId})
/// }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertBag {
    pub cert_id: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT")]
    pub cert_value: OctetString,
}

impl CertBag {
    pub fn x509(der: Vec<u8>) -> Result<Self> {
        Ok(Self {
            cert_id: X509_CERTIFICATE,
            cert_value: OctetString::new(der)?,
        })
    }
}

/// PKCS#7 `encryptedData`, as produced by tools that encrypt certificate bags.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct EncryptedData {
    pub version: u8,
    pub encrypted_content_info: EncryptedContentInfo,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct EncryptedContentInfo {
    pub content_type: ObjectIdentifier,
    pub content_encryption_algorithm: AlgorithmIdentifierOwned,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub encrypted_content: Option<OctetString>,
}

impl EncryptedData {
    /// Decrypts the content with a PBES2 scheme keyed by `password`.
    pub fn decrypt(&self, password: &str) -> Result<Vec<u8>> {
        let info = &self.encrypted_content_info;
        let ciphertext = info
            .encrypted_content
            .as_ref()
            .ok_or_else(|| KeyToolError::MalformedKeyStore("encrypted data is empty".to_string()))?;
        let algorithm = info.content_encryption_algorithm.to_der()?;
        let scheme = pkcs8::pkcs5::EncryptionScheme::from_der(&algorithm)
            .map_err(|e| KeyToolError::MalformedKeyStore(format!("unsupported encryption: {e}")))?;
        scheme
            .decrypt(password, ciphertext.as_bytes())
            .map_err(|e| {
                KeyToolError::MalformedKeyStore(format!("cannot decrypt safe contents: {e}"))
            })
    }
}
