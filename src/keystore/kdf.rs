//! PKCS#12 password-based key derivation (RFC 7292, appendix B) and the
//! integrity MAC computed over a keystore's authenticated safe.

use const_oid::ObjectIdentifier;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{KeyToolError, Result};

/// Diversifier for MAC key material.
pub const MAC_KEY_ID: u8 = 3;

/// Hash block length `v` for both supported digests.
const BLOCK_LEN: usize = 64;

const SHA1_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
const SHA256_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

/// Digest used for the keystore integrity MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacAlgorithm {
    /// Accepted when reading stores written by older tools.
    HmacSha1,
    #[default]
    HmacSha256,
}

impl MacAlgorithm {
    pub fn digest_oid(self) -> ObjectIdentifier {
        match self {
            MacAlgorithm::HmacSha1 => SHA1_OID,
            MacAlgorithm::HmacSha256 => SHA256_OID,
        }
    }

    pub fn from_digest_oid(oid: ObjectIdentifier) -> Result<Self> {
        match oid {
            SHA1_OID => Ok(MacAlgorithm::HmacSha1),
            SHA256_OID => Ok(MacAlgorithm::HmacSha256),
            other => Err(KeyToolError::MalformedKeyStore(format!(
                "unsupported MAC digest {other}"
            ))),
        }
    }

    /// HMAC over `data` keyed from `password`.
    pub fn compute(
        self,
        password: &str,
        salt: &[u8],
        iterations: u32,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let tag = match self {
            MacAlgorithm::HmacSha1 => {
                let key = mac_key::<Sha1>(password, salt, iterations);
                let mut mac = Hmac::<Sha1>::new_from_slice(&key)
                    .map_err(|e| KeyToolError::ExportError(e.to_string()))?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            MacAlgorithm::HmacSha256 => {
                let key = mac_key::<Sha256>(password, salt, iterations);
                let mut mac = Hmac::<Sha256>::new_from_slice(&key)
                    .map_err(|e| KeyToolError::ExportError(e.to_string()))?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        };
        Ok(tag)
    }

    /// Constant-time check of `expected` against the MAC for `password`.
    pub fn verify(
        self,
        password: &str,
        salt: &[u8],
        iterations: u32,
        data: &[u8],
        expected: &[u8],
    ) -> Result<bool> {
        let verified = match self {
            MacAlgorithm::HmacSha1 => {
                let key = mac_key::<Sha1>(password, salt, iterations);
                let mut mac = Hmac::<Sha1>::new_from_slice(&key)
                    .map_err(|e| KeyToolError::MalformedKeyStore(e.to_string()))?;
                mac.update(data);
                mac.verify_slice(expected).is_ok()
            }
            MacAlgorithm::HmacSha256 => {
                let key = mac_key::<Sha256>(password, salt, iterations);
                let mut mac = Hmac::<Sha256>::new_from_slice(&key)
                    .map_err(|e| KeyToolError::MalformedKeyStore(e.to_string()))?;
                mac.update(data);
                mac.verify_slice(expected).is_ok()
            }
        };
        Ok(verified)
    }
}

fn mac_key<D: Digest>(password: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
    derive_key::<D>(password, salt, iterations, MAC_KEY_ID, <D as Digest>::output_size())
}

/// Password as a NUL-terminated big-endian BMPString.
pub fn bmp_password(password: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = password.encode_utf16().flat_map(u16::to_be_bytes).collect();
    bytes.extend_from_slice(&[0, 0]);
    bytes
}

/// Derives `len` bytes of key material for diversifier `id`.
pub fn derive_key<D: Digest>(
    password: &str,
    salt: &[u8],
    iterations: u32,
    id: u8,
    len: usize,
) -> Vec<u8> {
    let diversifier = [id; BLOCK_LEN];

    let mut input = repeat_to_blocks(salt);
    input.extend(repeat_to_blocks(&bmp_password(password)));

    let mut output = Vec::with_capacity(len + <D as Digest>::output_size());
    loop {
        let mut block = D::new()
            .chain_update(diversifier)
            .chain_update(&input)
            .finalize();
        for _ in 1..iterations {
            block = D::digest(&block);
        }
        output.extend_from_slice(&block);
        if output.len() >= len {
            break;
        }

        // I_j = (I_j + B + 1) mod 2^(v*8) for every v-byte block of I.
        let b: Vec<u8> = block.iter().copied().cycle().take(BLOCK_LEN).collect();
        for chunk in input.chunks_mut(BLOCK_LEN) {
            let mut carry = 1u16;
            for (x, y) in chunk.iter_mut().zip(b.iter()).rev() {
                let sum = u16::from(*x) + u16::from(*y) + carry;
                *x = sum as u8;
                carry = sum >> 8;
            }
        }
    }
    output.truncate(len);
    output
}

fn repeat_to_blocks(bytes: &[u8]) -> Vec<u8> {
    if bytes.is_empty() {
        return Vec::new();
    }
    let len = BLOCK_LEN * bytes.len().div_ceil(BLOCK_LEN);
    bytes.iter().copied().cycle().take(len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bmp_password_is_nul_terminated() {
        assert_eq!(bmp_password("ab"), vec![0, b'a', 0, b'b', 0, 0]);
        assert_eq!(bmp_password(""), vec![0, 0]);
    }

    #[test]
    fn test_derive_key_depends_on_every_input() {
        let base = derive_key::<Sha256>("secret", b"saltsalt", 2, MAC_KEY_ID, 32);
        assert_eq!(base, derive_key::<Sha256>("secret", b"saltsalt", 2, MAC_KEY_ID, 32));
        assert_ne!(base, derive_key::<Sha256>("Secret", b"saltsalt", 2, MAC_KEY_ID, 32));
        assert_ne!(base, derive_key::<Sha256>("secret", b"saltsalT", 2, MAC_KEY_ID, 32));
        assert_ne!(base, derive_key::<Sha256>("secret", b"saltsalt", 3, MAC_KEY_ID, 32));
        assert_ne!(base, derive_key::<Sha256>("secret", b"saltsalt", 2, 1, 32));
    }

    #[test]
    fn test_derive_key_longer_than_digest() {
        let short = derive_key::<Sha1>("sesame", &[0xff; 8], 5, 1, 20);
        let long = derive_key::<Sha1>("sesame", &[0xff; 8], 5, 1, 50);
        assert_eq!(long.len(), 50);
        assert_eq!(&long[..20], short.as_slice());
    }

    #[test]
    fn test_mac_rejects_wrong_password() {
        for algorithm in [MacAlgorithm::HmacSha1, MacAlgorithm::HmacSha256] {
            let mac = algorithm.compute("store", b"12345678", 100, b"payload").unwrap();
            assert!(algorithm.verify("store", b"12345678", 100, b"payload", &mac).unwrap());
            assert!(!algorithm.verify("other", b"12345678", 100, b"payload", &mac).unwrap());
            assert!(!algorithm.verify("store", b"12345678", 100, b"tampered", &mac).unwrap());
        }
    }
}
