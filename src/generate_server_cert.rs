//! TLS Server Certificate Generation Module
//!
//! Generates the end-entity certificate the service presents for TLS and
//! uses for RSA-OAEP payload encryption. The certificate is signed by the
//! CA produced by [`crate::generate_ca`], forming a two-link chain:
//!
//! **Certificate Chain**: Root CA → Server Certificate
//!
//! # X.509 Extensions
//! Server certificates include:
//! - **Key Usage**: `digitalSignature`, `keyEncipherment`
//! - **Extended Key Usage**: `serverAuth`
//! - **Subject Alternative Name (SAN)**: Default entries for local development
//!   - DNS: `localhost`
//!   - IP: `127.0.0.1` (IPv4 loopback)
//!   - IP: `::1` (IPv6 loopback)
//!   - DNS: Common Name from certificate (as specified in builder)
//!
//! # Example
//! ```rust,no_run
//! use cipher_gate::RsaServerCertBuilder;
//! # use anyhow::Result;
//! # use openssl::pkey::PKey;
//! # use openssl::x509::X509;
//! # fn example(ca_key: PKey<openssl::pkey::Private>, ca_cert: X509) -> Result<()> {
//! let (server_key, server_cert) = RsaServerCertBuilder::new(ca_key, ca_cert)
//!     .subject_common_name("localhost".to_string())
//!     .validity_days(365)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use anyhow::{anyhow, Result};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

// Add X.509v3 extensions
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const RSA_KEY_SIZE: u32 = 2048;

// ================= RSA Server Certificate Builder =================

/// Builder for generating an RSA key pair and server certificate signed by the CA
///
/// Creates the end-entity certificate for the encryption service. The subject
/// carries only a common name (the service identity); the issuer name is
/// copied verbatim from the signing CA certificate's subject, never
/// re-derived from configuration.
///
/// # Certificate Chain
/// Server certificates:
/// - Are signed by the root CA's private key with SHA-256
/// - Have `CA=false` (end-entity, cannot sign other certificates)
/// - Carry a serial number independent of the CA's serial
/// - Should have shorter validity than the CA (default 1 year)
pub struct RsaServerCertBuilder {
    subject_common_name: String,
    validity_days: u32,
    signing_key: PKey<Private>,
    signing_cert: X509,
}

impl RsaServerCertBuilder {
    /// Create a new server certificate builder
    ///
    /// # Arguments
    /// * `ca_key` - CA's private key for signing the server certificate
    /// * `ca_cert` - CA's certificate (issuer information)
    pub fn new(ca_key: PKey<Private>, ca_cert: X509) -> Self {
        Self {
            subject_common_name: String::new(),
            validity_days: 365, // Default 1 year
            signing_key: ca_key,
            signing_cert: ca_cert,
        }
    }

    /// Set the common name (CN) for the server certificate
    ///
    /// This should be the hostname clients will connect to (e.g.,
    /// "localhost", "vault.example.com").
    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    /// Set validity period in days
    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// Build the RSA key pair and server certificate signed by the CA
    ///
    /// Generates a new RSA-2048 key pair and creates an X.509v3 certificate
    /// signed by the CA provided during builder construction.
    ///
    /// # Returns
    /// * `Ok((PKey<Private>, X509))` - Tuple of (private key, signed certificate)
    /// * `Err(anyhow::Error)` - If key generation, extension creation, or signing fails
    pub fn build(self) -> Result<(PKey<Private>, X509)> {
        // Generate RSA key pair for the server
        let rsa = openssl::rsa::Rsa::generate(RSA_KEY_SIZE)
            .map_err(|e| anyhow!("Failed to generate RSA keypair: {}", e))?;

        let private_key =
            PKey::from_rsa(rsa).map_err(|e| anyhow!("Failed to create private key: {}", e))?;

        // Build X509 certificate
        let mut builder =
            X509::builder().map_err(|e| anyhow!("Failed to create X509 builder: {}", e))?;

        builder
            .set_version(X509_VERSION_3)
            .map_err(|e| anyhow!("Failed to set version: {}", e))?;

        // Generate random 128-bit (16-byte) serial number
        let mut serial = BigNum::new()?;
        serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
        let asn1_serial = serial.to_asn1_integer()?;
        builder.set_serial_number(&asn1_serial)?;

        // Build subject name: the service identity is the common name only
        let mut name_builder = openssl::x509::X509Name::builder()
            .map_err(|e| anyhow!("Failed to create name builder: {}", e))?;
        name_builder
            .append_entry_by_nid(openssl::nid::Nid::COMMONNAME, &self.subject_common_name)
            .map_err(|e| anyhow!("Failed to set CN: {}", e))?;

        let subject_name = name_builder.build();

        builder
            .set_subject_name(&subject_name)
            .map_err(|e| anyhow!("Failed to set subject: {}", e))?;

        // Set issuer to the CA's subject, copied from the signing certificate
        builder
            .set_issuer_name(self.signing_cert.subject_name())
            .map_err(|e| anyhow!("Failed to set issuer from CA: {}", e))?;

        let not_before = openssl::asn1::Asn1Time::days_from_now(0)
            .map_err(|e| anyhow!("Failed to create not_before: {}", e))?;
        builder
            .set_not_before(&not_before)
            .map_err(|e| anyhow!("Failed to set not_before: {}", e))?;

        let not_after = openssl::asn1::Asn1Time::days_from_now(self.validity_days)
            .map_err(|e| anyhow!("Failed to create not_after: {}", e))?;
        builder
            .set_not_after(&not_after)
            .map_err(|e| anyhow!("Failed to set not_after: {}", e))?;

        // Set public key (extracted from private_key automatically)
        builder
            .set_pubkey(&private_key)
            .map_err(|e| anyhow!("Failed to set public key: {}", e))?;

        // Add Basic Constraints: CA=false (end-entity server certificate)
        let bc = BasicConstraints::new()
            .critical()
            .build()
            .map_err(|e| anyhow!("Failed to build BasicConstraints: {}", e))?;
        builder
            .append_extension(bc)
            .map_err(|e| anyhow!("Failed to add BasicConstraints: {}", e))?;

        // Add Key Usage extension for a TLS/HTTPS server certificate
        let ku = KeyUsage::new()
            .critical()
            .digital_signature() // For TLS handshakes and signatures
            .key_encipherment() // For RSA key exchange in TLS
            .build()
            .map_err(|e| anyhow!("Failed to build KeyUsage: {}", e))?;
        builder
            .append_extension(ku)
            .map_err(|e| anyhow!("Failed to add KeyUsage: {}", e))?;

        // Add Extended Key Usage: serverAuth (required for TLS/HTTPS servers)
        let eku = ExtendedKeyUsage::new()
            .server_auth()
            .build()
            .map_err(|e| anyhow!("Failed to build ExtendedKeyUsage: {}", e))?;
        builder
            .append_extension(eku)
            .map_err(|e| anyhow!("Failed to add ExtendedKeyUsage: {}", e))?;

        // Add Subject Alternative Name (SAN) - required by modern browsers
        // Default SAN entries for local development: localhost, 127.0.0.1, and ::1
        let san = SubjectAlternativeName::new()
            .dns("localhost")
            .ip("127.0.0.1")
            .ip("::1")
            .dns(&self.subject_common_name) // Also include the CN
            .build(&builder.x509v3_context(Some(&self.signing_cert), None))
            .map_err(|e| anyhow!("Failed to build SubjectAlternativeName: {}", e))?;
        builder
            .append_extension(san)
            .map_err(|e| anyhow!("Failed to add SubjectAlternativeName: {}", e))?;

        // Sign with the CA's private key
        builder
            .sign(&self.signing_key, MessageDigest::sha256())
            .map_err(|e| anyhow!("Failed to sign certificate: {}", e))?;

        let x509 = builder.build();

        Ok((private_key, x509))
    }
}
