//! CipherGate - Certificate Issuance and RSA-OAEP Encryption Service
//!
//! A small PKI and payload-encryption service: it issues a self-signed
//! certificate authority and a server certificate signed by it, then serves
//! an RSA-OAEP encrypt/decrypt API keyed to that certificate's key pair,
//! over TLS when credentials are available.
//!
//! # Architecture
//!
//! ```text
//! RsaCaBuilder (self-signed CA)
//!   └── RsaServerCertBuilder (server certificate, signed by CA)
//!         │
//!         ▼ four PEM artifacts, written once, out of band
//!
//! KeyMaterialSource chain (environment → files)
//!   └── CredentialBundle (immutable, one per process lifetime)
//!         ├── EncryptionService / DecryptionService (RSA-OAEP, base64)
//!         └── TLS listener (axum + rustls)
//! ```
//!
//! The system consists of several key modules:
//!
//! - [`generate_ca`]: Self-signed CA certificate generation
//! - [`generate_server_cert`]: Server certificate generation (signed by the CA)
//! - [`key_material`]: Ordered-source credential resolution and the
//!   immutable [`key_material::CredentialBundle`]
//! - [`encryption`]: RSA-OAEP encrypt/decrypt over the resolved bundle
//! - [`webserver`]: HTTPS dispatch for `POST /encrypt` and `POST /decrypt`
//! - [`configs`]: TOML configuration with built-in defaults
//!
//! # Quick Start
//!
//! ```bash
//! # Generate CA and server certificates (first run only)
//! cargo run -- generate
//!
//! # Start the HTTPS service
//! cargo run
//! ```
//!
//! # Example Usage
//!
//! ```bash
//! curl -k https://localhost:8443/encrypt \
//!   -H 'Content-Type: application/json' \
//!   -d '{"data": "hello"}'
//! ```

pub mod configs;
pub mod encryption;
pub mod generate_ca;
pub mod generate_server_cert;
pub mod key_material;
pub mod webserver;

pub use configs::AppConfig;
pub use encryption::{decrypt_data, encrypt_data, CryptoError};
pub use generate_ca::RsaCaBuilder;
pub use generate_server_cert::RsaServerCertBuilder;
pub use key_material::{
    default_sources, resolve_credentials, CredentialBundle, CredentialState, KeyMaterialSource,
};
pub use webserver::start_webserver;
