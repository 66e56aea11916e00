//! # KeyTool - Throwaway PKI for Mutual-TLS Tests
//!
//! KeyTool mints a miniature public-key infrastructure for test runs: root
//! certificate authorities, leaf certificates they sign, and password-protected
//! PKCS#12 key stores and trust stores that a TLS stack can load. Every call
//! produces fresh key material and fresh serial numbers.
//!
//! ## Supported Key Types
//!
//! - **ECDSA**: P-256 (default) and P-384
//! - **RSA**: 2048, 3072, and 4096-bit keys
//! - **Ed25519**
//!
//! ## Certificate Shape
//!
//! - Roots are self-signed with critical basic constraints `CA=true, pathLen=0`
//!   and key usage `keyCertSign | cRLSign | digitalSignature`.
//! - Leaves carry `CA=false`, key usage `digitalSignature | keyEncipherment`,
//!   extended key usage `serverAuth, clientAuth`, and DNS names for the
//!   subject and `localhost`, so one leaf works on either side of a handshake.
//! - Leaf validity always lies within the issuer's validity.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keytool::key_tool::KeyTool;
//! use keytool::keystore::KeyStore;
//!
//! # fn main() -> Result<(), keytool::error::KeyToolError> {
//! let tool = KeyTool::new();
//! let ca = tool.create_ca("MyCA")?;
//! let server = ca.sign("server")?;
//!
//! // Private key entry: key encrypted with the key password, chain up to MyCA.
//! server
//!     .store_key_and_cert("key-password")?
//!     .save("server.p12", "store-password")?;
//!
//! // Trusted certificate entry: MyCA alone.
//! ca.store_cert()?.save("ca.p12", "store-password")?;
//!
//! let loaded = KeyStore::load("server.p12", "store-password")?;
//! let entry = loaded.private_key_entries().next().expect("one entry");
//! let _key = entry.decrypt_key("key-password")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Load failures are reported as distinct variants:
//!
//! ```rust
//! use keytool::{error::KeyToolError, keystore::KeyStore};
//!
//! match KeyStore::load("/nonexistent/store.p12", "password") {
//!     Ok(_) => println!("loaded"),
//!     Err(KeyToolError::KeyStoreNotFound(path)) => println!("no key store at {path}"),
//!     Err(KeyToolError::WrongStorePassword) => println!("store password rejected"),
//!     Err(KeyToolError::WrongKeyPassword) => println!("key password rejected"),
//!     Err(e) => println!("other error: {e}"),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`key_tool`]: Root CA creation and shared configuration
//! - [`key_and_cert`]: Signing leaves and exporting key stores
//! - [`keystore`]: PKCS#12 key stores and trust stores
//! - [`trust`]: Offline chain validation against trust anchors
//! - [`tls`]: rustls configurations built from key store files
//! - [`fixtures`]: Ready-made `MyCA` / `WrongCA` key stores for tests
//! - [`key`]: Key generation, PKCS#8 encoding, and signatures
//! - [`cert`]: Certificate encoding, decoding, and extension codecs
//! - [`issuer`]: Certificate issuing
//! - [`policy`]: Validity windows, serial numbers, and DNS names
//! - [`error`]: Error types
//! - [`tbs_certificate`]: Low-level certificate structure manipulation

pub mod cert;
pub mod error;
pub mod fixtures;
pub mod issuer;
pub mod key;
pub mod key_and_cert;
pub mod key_tool;
pub mod keystore;
pub mod policy;
pub mod tbs_certificate;
pub mod tls;
pub mod trust;
