//! use keytool::error::KeyToolError;

use thiserror::Error;

/// Represents errors that can occur while issuing certificates or packaging keystores.
///
/// Load-time failures are split into separate variants so callers can tell a wrong
/// password apart from a missing file, malformed data, or an untrusted peer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyToolError {
    /// The cryptographic provider could not produce a key pair.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// The issuer cannot sign: it holds no private key, its key does not match its
    /// certificate, or it is not a certificate authority.
    #[error("Signing error: {0}")]
    SigningError(String),

    /// A keystore could not be produced or written.
    #[error("Export error: {0}")]
    ExportError(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error related to certificate contents.
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// The keystore file does not exist.
    #[error("Keystore not found: {0}")]
    KeyStoreNotFound(String),

    /// The keystore integrity check failed for the supplied store password.
    #[error("Keystore password was incorrect")]
    WrongStorePassword,

    /// The private key could not be decrypted with the supplied key password.
    #[error("Key password was incorrect")]
    WrongKeyPassword,

    /// The keystore bytes are not a PKCS#12 structure this crate understands.
    #[error("Malformed keystore: {0}")]
    MalformedKeyStore(String),

    /// The keystore holds no private key entry.
    #[error("Keystore holds no private key entry: {0}")]
    MissingKeyEntry(String),

    /// A certificate chain does not lead to a trusted anchor.
    #[error("Untrusted certificate: {0}")]
    UntrustedCertificate(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Failure while assembling a TLS configuration.
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KeyToolError>;

impl From<der::Error> for KeyToolError {
    /// Converts a `der::Error` into a `KeyToolError`.
    fn from(err: der::Error) -> Self {
        KeyToolError::DecodingError(err.to_string())
    }
}

impl From<rsa::Error> for KeyToolError {
    fn from(err: rsa::Error) -> Self {
        KeyToolError::KeyGenerationError(err.to_string())
    }
}

impl From<std::io::Error> for KeyToolError {
    fn from(err: std::io::Error) -> Self {
        KeyToolError::Io(err.to_string())
    }
}

impl From<rustls::Error> for KeyToolError {
    fn from(err: rustls::Error) -> Self {
        KeyToolError::Tls(err.to_string())
    }
}
