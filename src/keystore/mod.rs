//! Password-protected key stores in PKCS#12 (PFX) format.
//!
//! A [`KeyStore`] holds private key entries (an encrypted PKCS#8 key plus its
//! certificate chain) and trusted certificate entries (a certificate alone).
//! Two passwords are involved and they are independent:
//!
//! * the *store password* keys the HMAC that protects the whole file;
//! * the *key password* encrypts each private key (PBES2, PBKDF2-HMAC-SHA256,
//!   AES-256-CBC).
//!
//! Certificates are stored unencrypted and covered by the MAC. Every entry is
//! addressed by an alias, written as the bag's `friendlyName`.

mod kdf;
mod pfx;

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::Path;

use der::asn1::{Any, OctetString};
use der::{Decode, Encode};
use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};
use x509_cert::spki::AlgorithmIdentifierOwned;

pub use kdf::MacAlgorithm;
use pfx::{
    BagAttributes, CERT_BAG, CertBag, ContentInfo, DigestInfo, EncryptedData, ID_DATA,
    ID_ENCRYPTED_DATA, KEY_BAG, MacData, ORACLE_TRUSTED_KEY_USAGE, PFX_VERSION,
    PKCS8_SHROUDED_KEY_BAG, Pfx, SafeBag, X509_CERTIFICATE,
};

use crate::cert::Certificate;
use crate::error::{KeyToolError, Result};
use crate::key::KeyPair;

/// PBKDF2 rounds used when encrypting private keys.
pub const DEFAULT_KEY_PROTECTION_ITERATIONS: u32 = 10_000;

/// PKCS#12 KDF rounds used for the integrity MAC.
pub const DEFAULT_MAC_ITERATIONS: u32 = 10_000;

/// A private key, encrypted under its key password, with the certificate
/// that certifies it and the certificates of its issuers up to the root.
#[derive(Clone, Debug)]
pub struct PrivateKeyEntry {
    alias: String,
    local_key_id: Vec<u8>,
    encrypted_key: Vec<u8>,
    certificate: Certificate,
    issuer_chain: Vec<Certificate>,
}

impl PrivateKeyEntry {
    /// Encrypts `key` with `key_password` and binds it to `certificate`.
    ///
    /// Fails with [`KeyToolError::ExportError`] when the key does not match
    /// the certificate's public key.
    pub fn new(
        alias: impl Into<String>,
        key: &KeyPair,
        certificate: Certificate,
        issuer_chain: Vec<Certificate>,
        key_password: &str,
        iterations: u32,
    ) -> Result<Self> {
        if certificate.spki_der()? != key.public_key().to_spki_der()? {
            return Err(KeyToolError::ExportError(
                "private key does not match certificate".to_string(),
            ));
        }

        let document = key.to_pkcs8_der()?;
        let info = pkcs8::PrivateKeyInfo::try_from(document.as_bytes())
            .map_err(|e| KeyToolError::ExportError(e.to_string()))?;
        let salt = rand::random::<[u8; 16]>();
        let iv = rand::random::<[u8; 16]>();
        let params =
            pkcs8::pkcs5::pbes2::Parameters::pbkdf2_sha256_aes256cbc(iterations, &salt, &iv)
                .map_err(|e| KeyToolError::ExportError(e.to_string()))?;
        let encrypted = info
            .encrypt_with_params(params, key_password)
            .map_err(|e| KeyToolError::ExportError(e.to_string()))?;

        Ok(Self {
            alias: alias.into(),
            local_key_id: Sha1::digest(certificate.to_der()?).to_vec(),
            encrypted_key: encrypted.as_bytes().to_vec(),
            certificate,
            issuer_chain,
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The certificate of the key's owner.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Issuer certificates, nearest issuer first, ending at the root.
    pub fn issuer_chain(&self) -> &[Certificate] {
        &self.issuer_chain
    }

    /// The owner's certificate followed by the issuer chain.
    pub fn certificate_chain(&self) -> Vec<Certificate> {
        std::iter::once(self.certificate.clone())
            .chain(self.issuer_chain.iter().cloned())
            .collect()
    }

    /// Decrypts the private key.
    ///
    /// Fails with [`KeyToolError::WrongKeyPassword`] when `key_password` is not
    /// the password the key was stored with, and with
    /// [`KeyToolError::MalformedKeyStore`] when the key is protected by a
    /// scheme this crate cannot decrypt.
    pub fn decrypt_key(&self, key_password: &str) -> Result<KeyPair> {
        let encrypted = pkcs8::EncryptedPrivateKeyInfo::try_from(self.encrypted_key.as_slice())
            .map_err(|e| KeyToolError::MalformedKeyStore(e.to_string()))?;
        let document = encrypted.decrypt(key_password).map_err(|e| match e {
            pkcs8::Error::EncryptedPrivateKey(pkcs8::pkcs5::Error::DecryptFailed) => {
                KeyToolError::WrongKeyPassword
            }
            e => KeyToolError::MalformedKeyStore(format!("unsupported key encryption: {e}")),
        })?;
        // Padding can check out by chance under a wrong password; the payload won't parse.
        if pkcs8::PrivateKeyInfo::try_from(document.as_bytes()).is_err() {
            return Err(KeyToolError::WrongKeyPassword);
        }

        let key = KeyPair::from_pkcs8_der(document.as_bytes())?;
        if key.public_key().to_spki_der()? != self.certificate.spki_der()? {
            return Err(KeyToolError::MalformedKeyStore(format!(
                "private key of entry {} does not match its certificate",
                self.alias
            )));
        }
        Ok(key)
    }
}

/// A certificate stored without a key, trusted as an anchor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustedCertificateEntry {
    alias: String,
    certificate: Certificate,
}

impl TrustedCertificateEntry {
    pub fn new(alias: impl Into<String>, certificate: Certificate) -> Self {
        Self {
            alias: alias.into(),
            certificate,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

#[derive(Clone, Debug)]
pub enum KeyStoreEntry {
    PrivateKey(PrivateKeyEntry),
    TrustedCertificate(TrustedCertificateEntry),
}

impl KeyStoreEntry {
    pub fn alias(&self) -> &str {
        match self {
            KeyStoreEntry::PrivateKey(entry) => entry.alias(),
            KeyStoreEntry::TrustedCertificate(entry) => entry.alias(),
        }
    }
}

impl From<PrivateKeyEntry> for KeyStoreEntry {
    fn from(entry: PrivateKeyEntry) -> Self {
        KeyStoreEntry::PrivateKey(entry)
    }
}

impl From<TrustedCertificateEntry> for KeyStoreEntry {
    fn from(entry: TrustedCertificateEntry) -> Self {
        KeyStoreEntry::TrustedCertificate(entry)
    }
}

/// An in-memory key store.
#[derive(Clone, Debug)]
pub struct KeyStore {
    entries: Vec<KeyStoreEntry>,
    mac_algorithm: MacAlgorithm,
    mac_iterations: u32,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            mac_algorithm: MacAlgorithm::default(),
            mac_iterations: DEFAULT_MAC_ITERATIONS,
        }
    }
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mac_algorithm(mut self, mac_algorithm: MacAlgorithm) -> Self {
        self.mac_algorithm = mac_algorithm;
        self
    }

    pub fn with_mac_iterations(mut self, mac_iterations: u32) -> Self {
        self.mac_iterations = mac_iterations.max(1);
        self
    }

    /// Adds an entry, replacing any entry with the same alias.
    pub fn add_entry(&mut self, entry: impl Into<KeyStoreEntry>) {
        let entry = entry.into();
        self.entries.retain(|existing| existing.alias() != entry.alias());
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[KeyStoreEntry] {
        &self.entries
    }

    pub fn entry(&self, alias: &str) -> Option<&KeyStoreEntry> {
        self.entries.iter().find(|entry| entry.alias() == alias)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn private_key_entries(&self) -> impl Iterator<Item = &PrivateKeyEntry> {
        self.entries.iter().filter_map(|entry| match entry {
            KeyStoreEntry::PrivateKey(entry) => Some(entry),
            KeyStoreEntry::TrustedCertificate(_) => None,
        })
    }

    pub fn trusted_certificates(&self) -> impl Iterator<Item = &TrustedCertificateEntry> {
        self.entries.iter().filter_map(|entry| match entry {
            KeyStoreEntry::TrustedCertificate(entry) => Some(entry),
            KeyStoreEntry::PrivateKey(_) => None,
        })
    }

    pub fn mac_algorithm(&self) -> MacAlgorithm {
        self.mac_algorithm
    }

    /// Serializes the store as a DER-encoded PFX whose MAC is keyed from
    /// `store_password`.
    pub fn to_pkcs12(&self, store_password: &str) -> Result<Vec<u8>> {
        self.encode_pkcs12(store_password).map_err(|e| match e {
            KeyToolError::DecodingError(message) | KeyToolError::EncodingError(message) => {
                KeyToolError::ExportError(message)
            }
            other => other,
        })
    }

    fn encode_pkcs12(&self, store_password: &str) -> Result<Vec<u8>> {
        let mut cert_bags = Vec::new();
        let mut key_bags = Vec::new();
        let mut written_issuers: Vec<Vec<u8>> = Vec::new();

        for entry in &self.entries {
            match entry {
                KeyStoreEntry::PrivateKey(entry) => {
                    key_bags.push(SafeBag {
                        bag_id: PKCS8_SHROUDED_KEY_BAG,
                        bag_value: Any::from_der(&entry.encrypted_key)?,
                        bag_attributes: key_attributes(entry)?,
                    });
                    cert_bags.push(cert_bag(&entry.certificate, key_attributes(entry)?)?);
                    for issuer in &entry.issuer_chain {
                        let der = issuer.to_der()?;
                        if !written_issuers.contains(&der) {
                            cert_bags.push(cert_bag(issuer, None)?);
                            written_issuers.push(der);
                        }
                    }
                }
                KeyStoreEntry::TrustedCertificate(entry) => {
                    let attributes = BagAttributes::new()
                        .friendly_name(&entry.alias)?
                        .trusted_for_any_usage()?
                        .build()?;
                    cert_bags.push(cert_bag(&entry.certificate, attributes)?);
                }
            }
        }

        let mut contents = vec![ContentInfo::data(cert_bags.to_der()?)?];
        if !key_bags.is_empty() {
            contents.push(ContentInfo::data(key_bags.to_der()?)?);
        }
        let auth_safe = contents.to_der()?;

        let salt = rand::random::<[u8; 16]>();
        let mac = self
            .mac_algorithm
            .compute(store_password, &salt, self.mac_iterations, &auth_safe)?;

        let pfx = Pfx {
            version: PFX_VERSION,
            auth_safe: ContentInfo::data(auth_safe)?,
            mac_data: Some(MacData {
                mac: DigestInfo {
                    algorithm: AlgorithmIdentifierOwned {
                        oid: self.mac_algorithm.digest_oid(),
                        parameters: Some(Any::null()),
                    },
                    digest: OctetString::new(mac)?,
                },
                mac_salt: OctetString::new(salt.to_vec())?,
                iterations: self.mac_iterations,
            }),
        };

        let der = pfx.to_der()?;
        debug!(
            entries = self.entries.len(),
            keys = key_bags.len(),
            certificates = cert_bags.len(),
            bytes = der.len(),
            "encoded keystore"
        );
        Ok(der)
    }

    /// Parses a DER-encoded PFX, checking its MAC against `store_password`.
    ///
    /// Private keys stay encrypted until [`PrivateKeyEntry::decrypt_key`].
    pub fn from_pkcs12(der: &[u8], store_password: &str) -> Result<Self> {
        let pfx = Pfx::from_der(der).map_err(malformed)?;
        if pfx.version != PFX_VERSION {
            return Err(KeyToolError::MalformedKeyStore(format!(
                "unsupported PFX version {}",
                pfx.version
            )));
        }
        let auth_safe = pfx.auth_safe.data_content()?;

        let mut store = KeyStore::new();
        match &pfx.mac_data {
            Some(mac_data) => {
                let algorithm = MacAlgorithm::from_digest_oid(mac_data.mac.algorithm.oid)?;
                let verified = algorithm.verify(
                    store_password,
                    mac_data.mac_salt.as_bytes(),
                    mac_data.iterations,
                    &auth_safe,
                    mac_data.mac.digest.as_bytes(),
                )?;
                if !verified {
                    return Err(KeyToolError::WrongStorePassword);
                }
                store.mac_algorithm = algorithm;
                store.mac_iterations = mac_data.iterations.max(1);
            }
            None => warn!("keystore carries no integrity MAC; contents are unauthenticated"),
        }

        let mut bags = Vec::new();
        for content in Vec::<ContentInfo>::from_der(&auth_safe).map_err(malformed)? {
            let safe_contents = match content.content_type {
                ID_DATA => content.data_content()?,
                ID_ENCRYPTED_DATA => content
                    .content
                    .as_ref()
                    .ok_or_else(|| {
                        KeyToolError::MalformedKeyStore("encrypted data is empty".to_string())
                    })?
                    .decode_as::<EncryptedData>()
                    .map_err(malformed)?
                    .decrypt(store_password)?,
                other => {
                    debug!(content_type = %other, "skipping unsupported safe contents");
                    continue;
                }
            };
            bags.extend(Vec::<SafeBag>::from_der(&safe_contents).map_err(malformed)?);
        }

        store.entries = entries_from_bags(bags)?;
        debug!(entries = store.entries.len(), "decoded keystore");
        Ok(store)
    }

    /// Writes the store to `path`.
    ///
    /// The file is only created once the store has been fully encoded, and it
    /// is removed again if writing fails.
    pub fn save(&self, path: impl AsRef<Path>, store_password: &str) -> Result<()> {
        let path = path.as_ref();
        let der = self.to_pkcs12(store_password)?;

        let written = File::create(path).and_then(|mut file| {
            file.write_all(&der)?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = std::fs::remove_file(path);
            return Err(KeyToolError::ExportError(format!(
                "failed to write keystore {}: {e}",
                path.display()
            )));
        }

        info!(path = %path.display(), entries = self.entries.len(), "wrote keystore");
        Ok(())
    }

    /// Reads and parses the store at `path`.
    pub fn load(path: impl AsRef<Path>, store_password: &str) -> Result<Self> {
        let path = path.as_ref();
        let der = std::fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => KeyToolError::KeyStoreNotFound(path.display().to_string()),
            _ => KeyToolError::Io(format!("{}: {e}", path.display())),
        })?;
        let store = Self::from_pkcs12(&der, store_password)?;
        debug!(path = %path.display(), entries = store.entries.len(), "loaded keystore");
        Ok(store)
    }
}

fn malformed(err: der::Error) -> KeyToolError {
    KeyToolError::MalformedKeyStore(err.to_string())
}

fn key_attributes(
    entry: &PrivateKeyEntry,
) -> Result<Option<der::asn1::SetOfVec<x509_cert::attr::Attribute>>> {
    BagAttributes::new()
        .friendly_name(&entry.alias)?
        .local_key_id(&entry.local_key_id)?
        .build()
}

fn cert_bag(
    certificate: &Certificate,
    bag_attributes: Option<der::asn1::SetOfVec<x509_cert::attr::Attribute>>,
) -> Result<SafeBag> {
    Ok(SafeBag {
        bag_id: CERT_BAG,
        bag_value: Any::encode_from(&CertBag::x509(certificate.to_der()?)?)?,
        bag_attributes,
    })
}

struct LoadedCertificate {
    certificate: Certificate,
    alias: Option<String>,
    local_key_id: Option<Vec<u8>>,
    trusted: bool,
}

struct LoadedKey {
    alias: Option<String>,
    local_key_id: Option<Vec<u8>>,
    encrypted_key: Vec<u8>,
}

/// Pairs each key with the certificate sharing its local key id, walks
/// issuer names to rebuild the chain, and turns every certificate left over
/// into a trusted certificate entry.
fn entries_from_bags(bags: Vec<SafeBag>) -> Result<Vec<KeyStoreEntry>> {
    let mut keys = Vec::new();
    let mut certs = Vec::new();

    for bag in bags {
        match bag.bag_id {
            PKCS8_SHROUDED_KEY_BAG => keys.push(LoadedKey {
                alias: bag.friendly_name(),
                local_key_id: bag.local_key_id(),
                encrypted_key: bag.bag_value.to_der()?,
            }),
            CERT_BAG => {
                let cert_bag = bag.bag_value.decode_as::<CertBag>().map_err(malformed)?;
                if cert_bag.cert_id != X509_CERTIFICATE {
                    debug!(cert_id = %cert_bag.cert_id, "skipping non-X.509 certificate bag");
                    continue;
                }
                let certificate = Certificate::from_der(cert_bag.cert_value.as_bytes())
                    .map_err(|e| KeyToolError::MalformedKeyStore(e.to_string()))?;
                certs.push(LoadedCertificate {
                    certificate,
                    alias: bag.friendly_name(),
                    local_key_id: bag.local_key_id(),
                    trusted: bag.has_attribute(ORACLE_TRUSTED_KEY_USAGE),
                });
            }
            KEY_BAG => debug!("skipping unencrypted key bag"),
            other => debug!(bag_id = %other, "skipping unsupported bag"),
        }
    }

    let mut used = vec![false; certs.len()];
    let mut entries = Vec::new();

    for key in keys {
        let leaf_index = key
            .local_key_id
            .as_deref()
            .and_then(|id| {
                certs
                    .iter()
                    .position(|cert| cert.local_key_id.as_deref() == Some(id))
            })
            .or_else(|| {
                key.alias.as_deref().and_then(|alias| {
                    certs
                        .iter()
                        .position(|cert| cert.alias.as_deref() == Some(alias))
                })
            })
            .ok_or_else(|| {
                KeyToolError::MalformedKeyStore(
                    "private key has no matching certificate".to_string(),
                )
            })?;
        used[leaf_index] = true;
        let certificate = certs[leaf_index].certificate.clone();

        let mut issuer_chain: Vec<Certificate> = Vec::new();
        let mut current = certificate.clone();
        while !current.is_self_issued() && issuer_chain.len() < certs.len() {
            let Some(index) = certs.iter().position(|cert| {
                current.is_issued_by(&cert.certificate) && cert.certificate != current
            }) else {
                break;
            };
            used[index] = true;
            current = certs[index].certificate.clone();
            issuer_chain.push(current.clone());
        }

        let alias = match key.alias {
            Some(alias) => alias,
            None => certificate.subject()?.common_name,
        };
        let local_key_id = match key.local_key_id {
            Some(id) => id,
            None => Sha1::digest(certificate.to_der()?).to_vec(),
        };
        entries.push(KeyStoreEntry::PrivateKey(PrivateKeyEntry {
            alias,
            local_key_id,
            encrypted_key: key.encrypted_key,
            certificate,
            issuer_chain,
        }));
    }

    for (cert, used) in certs.into_iter().zip(used) {
        if used && !cert.trusted {
            continue;
        }
        let alias = match cert.alias {
            Some(alias) => alias,
            None => cert.certificate.subject()?.common_name,
        };
        entries.push(KeyStoreEntry::TrustedCertificate(TrustedCertificateEntry {
            alias,
            certificate: cert.certificate,
        }));
    }

    Ok(entries)
}
