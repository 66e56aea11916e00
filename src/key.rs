use std::fmt;

use der::{Decode, Encode};
use ed25519_dalek::{SigningKey as Ed25519SigningKey, VerifyingKey as Ed25519VerifyingKey};
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, SecretDocument};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::SignatureAlgorithm;
use crate::error::{KeyToolError, Result};

/// RSA modulus sizes accepted by [`KeyPair::generate_rsa`].
pub const SUPPORTED_RSA_BITS: [usize; 3] = [2048, 3072, 4096];

/// Key algorithm used when minting fresh key pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyAlgorithm {
    /// RSA with the given modulus size, signing with SHA-256 / PKCS#1 v1.5.
    Rsa { bits: usize },
    /// ECDSA on NIST P-256 with SHA-256.
    #[default]
    EcdsaP256,
    /// ECDSA on NIST P-384 with SHA-384.
    EcdsaP384,
    /// Ed25519.
    Ed25519,
}

impl KeyAlgorithm {
    /// Generates a fresh key pair of this algorithm.
    pub fn generate(self) -> Result<KeyPair> {
        match self {
            KeyAlgorithm::Rsa { bits } => KeyPair::generate_rsa(bits),
            KeyAlgorithm::EcdsaP256 => Ok(KeyPair::generate_ecdsa_p256()),
            KeyAlgorithm::EcdsaP384 => Ok(KeyPair::generate_ecdsa_p384()),
            KeyAlgorithm::Ed25519 => Ok(KeyPair::generate_ed25519()),
        }
    }
}

/// Supported key types for certificate operations.
pub enum KeyPair {
    Rsa {
        private: Box<RsaPrivateKey>,
        public: RsaPublicKey,
    },
    EcdsaP256 {
        signing_key: P256SigningKey,
        verifying_key: P256VerifyingKey,
    },
    EcdsaP384 {
        signing_key: P384SigningKey,
        verifying_key: P384VerifyingKey,
    },
    Ed25519 {
        signing_key: Ed25519SigningKey,
    },
}

// Private material never reaches logs.
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generates a key pair for `algorithm`.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        algorithm.generate()
    }

    /// Generate an RSA key pair with the specified number of bits.
    ///
    /// Only the sizes in [`SUPPORTED_RSA_BITS`] are accepted.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        if !SUPPORTED_RSA_BITS.contains(&bits) {
            return Err(KeyToolError::KeyGenerationError(format!(
                "unsupported RSA key size {bits}, expected one of {SUPPORTED_RSA_BITS:?}"
            )));
        }
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair::Rsa {
            private: Box::new(private),
            public,
        })
    }

    /// Generate an ECDSA P-256 key pair.
    pub fn generate_ecdsa_p256() -> Self {
        let mut rng = rand_core::OsRng;
        let signing_key = P256SigningKey::random(&mut rng);
        let verifying_key = signing_key.verifying_key().to_owned();
        KeyPair::EcdsaP256 {
            signing_key,
            verifying_key,
        }
    }

    /// Generate an ECDSA P-384 key pair.
    pub fn generate_ecdsa_p384() -> Self {
        let mut rng = rand_core::OsRng;
        let signing_key = P384SigningKey::random(&mut rng);
        let verifying_key = signing_key.verifying_key().to_owned();
        KeyPair::EcdsaP384 {
            signing_key,
            verifying_key,
        }
    }

    /// Generate an Ed25519 key pair.
    pub fn generate_ed25519() -> Self {
        let mut rng = rand_core::OsRng;
        let signing_key = Ed25519SigningKey::generate(&mut rng);
        KeyPair::Ed25519 { signing_key }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            KeyPair::Rsa { public, .. } => KeyAlgorithm::Rsa {
                bits: rsa::traits::PublicKeyParts::size(public) * 8,
            },
            KeyPair::EcdsaP256 { .. } => KeyAlgorithm::EcdsaP256,
            KeyPair::EcdsaP384 { .. } => KeyAlgorithm::EcdsaP384,
            KeyPair::Ed25519 { .. } => KeyAlgorithm::Ed25519,
        }
    }

    /// The signature algorithm certificates signed by this key carry.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            KeyPair::Rsa { .. } => SignatureAlgorithm::Sha256WithRSA,
            KeyPair::EcdsaP256 { .. } => SignatureAlgorithm::Sha256WithECDSA,
            KeyPair::EcdsaP384 { .. } => SignatureAlgorithm::Sha384WithECDSA,
            KeyPair::Ed25519 { .. } => SignatureAlgorithm::Ed25519,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_key_pair(self)
    }

    /// The subject public key info of this key pair.
    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        self.public_key().to_x509spki()
    }

    /// Signs `data` and returns the signature in the encoding X.509 expects
    /// (DER for ECDSA, raw for RSA and Ed25519).
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signature = match self {
            KeyPair::Rsa { private, .. } => {
                let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new((**private).clone());
                signing_key.try_sign(data).map(|sig| sig.to_vec())
            }
            KeyPair::EcdsaP256 { signing_key, .. } => {
                Signer::<p256::ecdsa::Signature>::try_sign(signing_key, data)
                    .map(|sig| sig.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP384 { signing_key, .. } => {
                Signer::<p384::ecdsa::Signature>::try_sign(signing_key, data)
                    .map(|sig| sig.to_der().as_bytes().to_vec())
            }
            KeyPair::Ed25519 { signing_key } => signing_key
                .try_sign(data)
                .map(|sig| sig.to_bytes().to_vec()),
        };
        signature.map_err(|e| KeyToolError::SigningError(e.to_string()))
    }

    /// Encodes the private key as an unencrypted PKCS#8 document.
    pub fn to_pkcs8_der(&self) -> Result<SecretDocument> {
        let document = match self {
            KeyPair::Rsa { private, .. } => private.to_pkcs8_der(),
            KeyPair::EcdsaP256 { signing_key, .. } => signing_key.to_pkcs8_der(),
            KeyPair::EcdsaP384 { signing_key, .. } => signing_key.to_pkcs8_der(),
            KeyPair::Ed25519 { signing_key } => signing_key.to_pkcs8_der(),
        };
        document.map_err(|e| KeyToolError::EncodingError(e.to_string()))
    }

    /// Imports a key pair from an unencrypted PKCS#8 document.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = pkcs8::PrivateKeyInfo::try_from(der)
            .map_err(|e| KeyToolError::DecodingError(e.to_string()))?;
        let decode_err = |e: pkcs8::Error| KeyToolError::DecodingError(e.to_string());

        match info.algorithm.oid {
            const_oid::db::rfc5912::RSA_ENCRYPTION => {
                let private = RsaPrivateKey::from_pkcs8_der(der).map_err(decode_err)?;
                let public = RsaPublicKey::from(&private);
                Ok(KeyPair::Rsa {
                    private: Box::new(private),
                    public,
                })
            }
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => {
                let curve = info
                    .algorithm
                    .parameters_oid()
                    .map_err(|e| KeyToolError::DecodingError(e.to_string()))?;
                match curve {
                    const_oid::db::rfc5912::SECP_256_R_1 => {
                        let signing_key = P256SigningKey::from_pkcs8_der(der).map_err(decode_err)?;
                        let verifying_key = signing_key.verifying_key().to_owned();
                        Ok(KeyPair::EcdsaP256 {
                            signing_key,
                            verifying_key,
                        })
                    }
                    const_oid::db::rfc5912::SECP_384_R_1 => {
                        let signing_key = P384SigningKey::from_pkcs8_der(der).map_err(decode_err)?;
                        let verifying_key = signing_key.verifying_key().to_owned();
                        Ok(KeyPair::EcdsaP384 {
                            signing_key,
                            verifying_key,
                        })
                    }
                    other => Err(KeyToolError::DecodingError(format!(
                        "unsupported elliptic curve {other}"
                    ))),
                }
            }
            const_oid::db::rfc8410::ID_ED_25519 => {
                let signing_key = Ed25519SigningKey::from_pkcs8_der(der).map_err(decode_err)?;
                Ok(KeyPair::Ed25519 { signing_key })
            }
            other => Err(KeyToolError::DecodingError(format!(
                "unsupported private key algorithm {other}"
            ))),
        }
    }
}

/// The public half of a [`KeyPair`], as carried in a certificate.
#[derive(Clone, Debug)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
    EcdsaP384(P384VerifyingKey),
    Ed25519(Ed25519VerifyingKey),
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        match (self.to_spki_der(), other.to_spki_der()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl PublicKey {
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        match key_pair {
            KeyPair::Rsa { public, .. } => PublicKey::Rsa(public.clone()),
            KeyPair::EcdsaP256 { verifying_key, .. } => PublicKey::EcdsaP256(verifying_key.clone()),
            KeyPair::EcdsaP384 { verifying_key, .. } => PublicKey::EcdsaP384(verifying_key.clone()),
            KeyPair::Ed25519 { signing_key } => PublicKey::Ed25519(signing_key.verifying_key()),
        }
    }

    /// Encodes the key as a DER `SubjectPublicKeyInfo`.
    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        let document = match self {
            PublicKey::Rsa(public) => public.to_public_key_der(),
            PublicKey::EcdsaP256(verifying_key) => verifying_key.to_public_key_der(),
            PublicKey::EcdsaP384(verifying_key) => verifying_key.to_public_key_der(),
            PublicKey::Ed25519(verifying_key) => verifying_key.to_public_key_der(),
        };
        document
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| KeyToolError::EncodingError(e.to_string()))
    }

    pub fn to_x509spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        Ok(SubjectPublicKeyInfoOwned::from_der(&self.to_spki_der()?)?)
    }

    /// Reads a public key out of a certificate's `SubjectPublicKeyInfo`.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = spki.to_der()?;
        let decode_err = |e: pkcs8::spki::Error| KeyToolError::DecodingError(e.to_string());

        match spki.algorithm.oid {
            const_oid::db::rfc5912::RSA_ENCRYPTION => Ok(PublicKey::Rsa(
                RsaPublicKey::from_public_key_der(&der).map_err(decode_err)?,
            )),
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .ok_or_else(|| {
                        KeyToolError::DecodingError("EC key without curve parameters".to_string())
                    })?
                    .decode_as::<const_oid::ObjectIdentifier>()?;
                match curve {
                    const_oid::db::rfc5912::SECP_256_R_1 => Ok(PublicKey::EcdsaP256(
                        P256VerifyingKey::from_public_key_der(&der).map_err(decode_err)?,
                    )),
                    const_oid::db::rfc5912::SECP_384_R_1 => Ok(PublicKey::EcdsaP384(
                        P384VerifyingKey::from_public_key_der(&der).map_err(decode_err)?,
                    )),
                    other => Err(KeyToolError::DecodingError(format!(
                        "unsupported elliptic curve {other}"
                    ))),
                }
            }
            const_oid::db::rfc8410::ID_ED_25519 => Ok(PublicKey::Ed25519(
                Ed25519VerifyingKey::from_public_key_der(&der).map_err(decode_err)?,
            )),
            other => Err(KeyToolError::DecodingError(format!(
                "unsupported public key algorithm {other}"
            ))),
        }
    }

    /// Checks `signature` over `data`, expecting the same encodings
    /// [`KeyPair::sign_data`] produces.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let malformed = |e: rsa::signature::Error| KeyToolError::CertificateError(e.to_string());
        let verified = match self {
            PublicKey::Rsa(public) => {
                let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public.clone());
                let signature =
                    rsa::pkcs1v15::Signature::try_from(signature).map_err(malformed)?;
                verifying_key.verify(data, &signature)
            }
            PublicKey::EcdsaP256(verifying_key) => {
                let signature = p256::ecdsa::Signature::from_der(signature).map_err(malformed)?;
                verifying_key.verify(data, &signature)
            }
            PublicKey::EcdsaP384(verifying_key) => {
                let signature = p384::ecdsa::Signature::from_der(signature).map_err(malformed)?;
                verifying_key.verify(data, &signature)
            }
            PublicKey::Ed25519(verifying_key) => {
                let signature = ed25519_dalek::Signature::from_slice(signature).map_err(malformed)?;
                verifying_key.verify(data, &signature)
            }
        };
        verified.map_err(|_| {
            KeyToolError::CertificateError("signature verification failed".to_string())
        })
    }
}
