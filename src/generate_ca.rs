//! Certificate Authority Generation Module
//!
//! Generates the self-signed root CA that anchors trust for this service.
//! The CA signs exactly one class of certificate: the TLS/encryption leaf
//! produced by [`crate::generate_server_cert`].
//!
//! # Certificate Properties
//! - **Self-signed**: Issuer and subject are the same
//! - **Key Usage**: keyCertSign, cRLSign, digitalSignature
//! - **Basic Constraints**: CA=true
//! - **Key Size**: RSA 2048-bit
//! - **Default Validity**: 3650 days (10 years)
//! - **Version**: X.509v3 with extensions
//!
//! # Example
//! ```rust,no_run
//! use cipher_gate::RsaCaBuilder;
//! # use anyhow::Result;
//! # fn example() -> Result<()> {
//! let (ca_key, ca_cert) = RsaCaBuilder::new()
//!     .subject_common_name("CipherGate Root CA".to_string())
//!     .organization("CipherGate Labs".to_string())
//!     .locality("Toronto".to_string())
//!     .state("Ontario".to_string())
//!     .country("CA".to_string())
//!     .validity_days(3650)
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
use openssl::x509::extension::{BasicConstraints, KeyUsage};

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const RSA_KEY_SIZE: u32 = 2048;

// ================= RSA CA Key and Certificate Builder =================

/// Builder for generating an RSA key pair and self-signed CA certificate
///
/// Creates the trust anchor for the service. The CA is self-signed, so the
/// issuer and subject names are identical and the signature verifies against
/// the certificate's own public key.
///
/// # Required Fields
/// All distinguished name fields must be set before calling `build()`:
/// - `subject_common_name` - CA name (e.g., "CipherGate Root CA")
/// - `organization` - Organization name
/// - `locality` - City
/// - `state` - State or province
/// - `country` - Two-letter ISO country code
pub struct RsaCaBuilder {
    subject_common_name: String,
    organization: String,
    locality: String,
    state: String,
    country: String,
    validity_days: u32,
}

impl RsaCaBuilder {
    /// Create a new CA builder with default values
    pub fn new() -> Self {
        Self {
            subject_common_name: String::new(),
            organization: String::new(),
            locality: String::new(),
            state: String::new(),
            country: String::new(),
            validity_days: 3650, // Default 10 years
        }
    }

    /// Set the common name (CN) for the certificate
    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    /// Set the organization (O) for the certificate
    pub fn organization(mut self, org: String) -> Self {
        self.organization = org;
        self
    }

    /// Set the locality (L) for the certificate
    pub fn locality(mut self, locality: String) -> Self {
        self.locality = locality;
        self
    }

    /// Set the state/province (ST) for the certificate
    pub fn state(mut self, state: String) -> Self {
        self.state = state;
        self
    }

    /// Set the country (C) for the certificate (2-letter ISO code)
    pub fn country(mut self, country: String) -> Self {
        self.country = country;
        self
    }

    /// Set validity period in days
    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// Build the RSA key pair and self-signed CA certificate
    ///
    /// Generates a new RSA-2048 key pair and creates a self-signed X.509v3
    /// certificate with CA capabilities.
    ///
    /// # Certificate Properties
    /// - **Version**: X.509v3
    /// - **Signature Algorithm**: SHA-256 with RSA
    /// - **Basic Constraints**: CA=true, critical
    /// - **Key Usage**: keyCertSign, cRLSign, digitalSignature
    /// - **Serial Number**: Random 128-bit number
    /// - **Issuer**: Same as subject (self-signed)
    ///
    /// # Returns
    /// * `Ok((PKey<Private>, X509))` - Tuple of (private key, self-signed certificate)
    /// * `Err(anyhow::Error)` - If key generation, extension creation, or signing fails
    pub fn build(self) -> Result<(PKey<Private>, X509)> {
        // Generate RSA key pair
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

        // Build subject/issuer name
        let mut name_builder = openssl::x509::X509Name::builder()
            .map_err(|e| anyhow!("Failed to create name builder: {}", e))?;
        name_builder
            .append_entry_by_nid(openssl::nid::Nid::COMMONNAME, &self.subject_common_name)
            .map_err(|e| anyhow!("Failed to set CN: {}", e))?;

        name_builder
            .append_entry_by_nid(openssl::nid::Nid::COUNTRYNAME, &self.country)
            .map_err(|e| anyhow!("Failed to set country: {}", e))?;

        name_builder
            .append_entry_by_nid(openssl::nid::Nid::STATEORPROVINCENAME, &self.state)
            .map_err(|e| anyhow!("Failed to set state/province: {}", e))?;

        name_builder
            .append_entry_by_nid(openssl::nid::Nid::LOCALITYNAME, &self.locality)
            .map_err(|e| anyhow!("Failed to set locality: {}", e))?;

        name_builder
            .append_entry_by_nid(openssl::nid::Nid::ORGANIZATIONNAME, &self.organization)
            .map_err(|e| anyhow!("Failed to set organization: {}", e))?;

        let name = name_builder.build();

        builder
            .set_subject_name(&name)
            .map_err(|e| anyhow!("Failed to set subject: {}", e))?;

        builder
            .set_issuer_name(&name)
            .map_err(|e| anyhow!("Failed to set issuer: {}", e))?;

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

        let mut bc = BasicConstraints::new();
        bc.critical().ca();

        let extension = bc
            .build()
            .map_err(|e| anyhow!("Failed to build BasicConstraints: {}", e))?;
        builder
            .append_extension(extension)
            .map_err(|e| anyhow!("Failed to add BasicConstraints: {}", e))?;

        // Add Key Usage extension
        let mut ku = KeyUsage::new();
        ku.critical();
        ku.key_cert_sign();
        ku.crl_sign();
        ku.digital_signature();
        let ku_extension = ku
            .build()
            .map_err(|e| anyhow!("Failed to build KeyUsage: {}", e))?;
        builder
            .append_extension(ku_extension)
            .map_err(|e| anyhow!("Failed to add KeyUsage: {}", e))?;

        builder
            .sign(&private_key, MessageDigest::sha256())
            .map_err(|e| anyhow!("Failed to sign certificate: {}", e))?;

        let x509 = builder.build();
        Ok((private_key, x509))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ca() -> (PKey<Private>, X509) {
        RsaCaBuilder::new()
            .subject_common_name("Test Root CA".to_string())
            .organization("Test Org".to_string())
            .locality("Toronto".to_string())
            .state("Ontario".to_string())
            .country("CA".to_string())
            .validity_days(3650)
            .build()
            .unwrap()
    }

    #[test]
    fn test_ca_is_self_verifying() {
        let (_key, cert) = test_ca();
        let public_key = cert.public_key().unwrap();
        assert!(cert.verify(&public_key).unwrap());
    }

    #[test]
    fn test_ca_subject_equals_issuer() {
        let (_key, cert) = test_ca();
        let subject: Vec<String> = cert
            .subject_name()
            .entries()
            .map(|e| e.data().as_utf8().unwrap().to_string())
            .collect();
        let issuer: Vec<String> = cert
            .issuer_name()
            .entries()
            .map(|e| e.data().as_utf8().unwrap().to_string())
            .collect();
        assert_eq!(subject, issuer);
        assert!(subject.contains(&"Test Root CA".to_string()));
    }

    #[test]
    fn test_ca_key_is_2048_bit_rsa() {
        let (key, _cert) = test_ca();
        assert_eq!(key.rsa().unwrap().size(), 256);
    }

    #[test]
    fn test_ca_does_not_verify_under_foreign_key() {
        let (_key, cert) = test_ca();
        let (_other_key, other_cert) = test_ca();
        let foreign = other_cert.public_key().unwrap();
        assert!(!cert.verify(&foreign).unwrap());
    }
}
