//! Key Material Resolution Module
//!
//! Resolves the private key and certificate (plus optional CA certificate)
//! the service runs with. Sources are tried in strict priority order:
//!
//! 1. Environment variables carrying PEM strings ([`EnvSource`])
//! 2. PEM files at configured filesystem paths ([`FileSource`])
//!
//! Resolution is all-or-nothing per source: a source counts only if it holds
//! both a private key and a certificate that parse successfully; the CA
//! certificate is optional. When no source resolves, the service runs in the
//! [`CredentialState::Unavailable`] state and the encryption endpoints
//! report it per request instead of the process crashing.
//!
//! The resolved private key is held in a [`secrecy::Secret`] wrapper so it
//! is zeroized on drop and never appears in debug output; it is
//! reconstructed from the wrapper for each operation that needs it.

use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use secrecy::{ExposeSecret, Secret, Zeroize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::configs::KeyMaterialConfig;

/// Environment variable holding the server private key PEM
pub const ENV_PRIVATE_KEY: &str = "CIPHER_GATE_PRIVATE_KEY";
/// Environment variable holding the server certificate PEM
pub const ENV_CERTIFICATE: &str = "CIPHER_GATE_CERTIFICATE";
/// Environment variable holding the optional CA certificate PEM
pub const ENV_CA_CERTIFICATE: &str = "CIPHER_GATE_CA_CERTIFICATE";

/// Failure to use key material that a source actually holds.
///
/// Absence of material is not an error: sources report it as `Ok(None)`
/// from [`KeyMaterialSource::load`]. These variants cover material that is
/// present but unreadable or unparseable, which callers may want to surface
/// differently from a plain "not found".
#[derive(Debug, Error)]
pub enum KeySourceError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },
}

/// Unparsed PEM material gathered from a single source
pub struct RawKeyMaterial {
    pub private_key_pem: Vec<u8>,
    pub certificate_pem: Vec<u8>,
    pub ca_certificate_pem: Option<Vec<u8>>,
}

/// A place key material may come from
///
/// Implementations return `Ok(Some(_))` only when both the private key and
/// the certificate are present; `Ok(None)` when either is missing; `Err`
/// when material exists but cannot be read.
pub trait KeyMaterialSource {
    /// Human-readable name for resolution diagnostics
    fn describe(&self) -> String;

    /// Gather the raw PEM material held by this source
    fn load(&self) -> Result<Option<RawKeyMaterial>, KeySourceError>;
}

/// Key material supplied through process environment variables
pub struct EnvSource {
    key_var: String,
    cert_var: String,
    ca_var: String,
}

impl EnvSource {
    pub fn new() -> Self {
        Self::with_vars(ENV_PRIVATE_KEY, ENV_CERTIFICATE, ENV_CA_CERTIFICATE)
    }

    /// Use non-default variable names (test fixtures)
    pub fn with_vars(key_var: &str, cert_var: &str, ca_var: &str) -> Self {
        Self {
            key_var: key_var.to_string(),
            cert_var: cert_var.to_string(),
            ca_var: ca_var.to_string(),
        }
    }
}

impl KeyMaterialSource for EnvSource {
    fn describe(&self) -> String {
        format!("environment ({}, {})", self.key_var, self.cert_var)
    }

    fn load(&self) -> Result<Option<RawKeyMaterial>, KeySourceError> {
        let key = env::var(&self.key_var).ok();
        let cert = env::var(&self.cert_var).ok();

        let (key, cert) = match (key, cert) {
            (Some(k), Some(c)) => (k, c),
            _ => return Ok(None),
        };

        let ca = env::var(&self.ca_var).ok();

        Ok(Some(RawKeyMaterial {
            private_key_pem: key.into_bytes(),
            certificate_pem: cert.into_bytes(),
            ca_certificate_pem: ca.map(String::into_bytes),
        }))
    }
}

/// Key material stored as PEM files on disk
pub struct FileSource {
    private_key_path: PathBuf,
    certificate_path: PathBuf,
    ca_certificate_path: PathBuf,
}

impl FileSource {
    pub fn new(config: &KeyMaterialConfig) -> Self {
        Self {
            private_key_path: config.private_key_path.clone(),
            certificate_path: config.certificate_path.clone(),
            ca_certificate_path: config.ca_certificate_path.clone(),
        }
    }

    /// Read a file, mapping absence to `None` and any other failure to
    /// [`KeySourceError::Io`].
    fn read_optional(path: &PathBuf) -> Result<Option<Vec<u8>>, KeySourceError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KeySourceError::Io {
                path: path.clone(),
                source: e,
            }),
        }
    }
}

impl KeyMaterialSource for FileSource {
    fn describe(&self) -> String {
        format!(
            "files ({}, {})",
            self.private_key_path.display(),
            self.certificate_path.display()
        )
    }

    fn load(&self) -> Result<Option<RawKeyMaterial>, KeySourceError> {
        let key = Self::read_optional(&self.private_key_path)?;
        let cert = Self::read_optional(&self.certificate_path)?;

        let (key, cert) = match (key, cert) {
            (Some(k), Some(c)) => (k, c),
            _ => return Ok(None),
        };

        let ca = Self::read_optional(&self.ca_certificate_path)?;

        Ok(Some(RawKeyMaterial {
            private_key_pem: key,
            certificate_pem: cert,
            ca_certificate_pem: ca,
        }))
    }
}

/// Private key PEM bytes that zeroize on drop
struct SecurePrivateKeyPem {
    pem_bytes: Vec<u8>,
}

impl Zeroize for SecurePrivateKeyPem {
    fn zeroize(&mut self) {
        self.pem_bytes.zeroize();
    }
}

impl fmt::Debug for SecurePrivateKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurePrivateKeyPem")
            .field("pem_bytes", &"<redacted>")
            .finish()
    }
}

/// The immutable credential set the service runs with
///
/// Constructed once at startup from the first fully-available source and
/// shared behind an `Arc` for the process's lifetime. The private key stays
/// inside a `Secret` wrapper and is reconstructed per operation.
pub struct CredentialBundle {
    private_key: Secret<SecurePrivateKeyPem>,
    certificate: X509,
    ca_certificate: Option<X509>,
    certificate_pem: Vec<u8>,
    ca_certificate_pem: Option<Vec<u8>>,
}

impl CredentialBundle {
    /// Parse raw PEM material into a usable bundle
    ///
    /// # Errors
    /// Returns [`KeySourceError::Parse`] for malformed PEM or a private key
    /// that is not RSA.
    pub fn from_raw(raw: RawKeyMaterial) -> Result<Self, KeySourceError> {
        let private_key =
            PKey::private_key_from_pem(&raw.private_key_pem).map_err(|e| KeySourceError::Parse {
                what: "private key",
                reason: e.to_string(),
            })?;

        // The encryption services are RSA-OAEP only
        if private_key.rsa().is_err() {
            return Err(KeySourceError::Parse {
                what: "private key",
                reason: "key is not RSA".to_string(),
            });
        }

        let certificate =
            X509::from_pem(&raw.certificate_pem).map_err(|e| KeySourceError::Parse {
                what: "certificate",
                reason: e.to_string(),
            })?;

        let ca_certificate = match &raw.ca_certificate_pem {
            Some(pem) => Some(X509::from_pem(pem).map_err(|e| KeySourceError::Parse {
                what: "CA certificate",
                reason: e.to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            private_key: Secret::new(SecurePrivateKeyPem {
                pem_bytes: raw.private_key_pem,
            }),
            certificate,
            ca_certificate,
            certificate_pem: raw.certificate_pem,
            ca_certificate_pem: raw.ca_certificate_pem,
        })
    }

    /// The server certificate whose public key encrypts payloads
    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    /// The CA certificate, when the source supplied one
    pub fn ca_certificate(&self) -> Option<&X509> {
        self.ca_certificate.as_ref()
    }

    /// Reconstruct the private key for one operation
    ///
    /// The key is rebuilt from the zeroizing wrapper each call so the parsed
    /// form does not outlive the operation that needed it.
    pub fn private_key(&self) -> Result<PKey<Private>, KeySourceError> {
        PKey::private_key_from_pem(&self.private_key.expose_secret().pem_bytes).map_err(|e| {
            KeySourceError::Parse {
                what: "private key",
                reason: e.to_string(),
            }
        })
    }

    /// PEM chain for the TLS listener: server certificate first, then the
    /// CA certificate when present
    pub fn tls_chain_pem(&self) -> Vec<u8> {
        let mut chain = self.certificate_pem.clone();
        if let Some(ca_pem) = &self.ca_certificate_pem {
            if !chain.ends_with(b"\n") {
                chain.push(b'\n');
            }
            chain.extend_from_slice(ca_pem);
        }
        chain
    }

    /// Private key PEM for the TLS listener
    pub fn tls_private_key_pem(&self) -> Vec<u8> {
        self.private_key.expose_secret().pem_bytes.clone()
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("private_key", &"<securely stored>")
            .field("has_ca_certificate", &self.ca_certificate.is_some())
            .finish()
    }
}

/// Whether credentials resolved at startup
///
/// Fixed for the process lifetime: there is no transition back from `Ready`
/// and no re-resolution after startup.
#[derive(Debug, Clone)]
pub enum CredentialState {
    Ready(Arc<CredentialBundle>),
    Unavailable,
}

impl CredentialState {
    pub fn is_ready(&self) -> bool {
        matches!(self, CredentialState::Ready(_))
    }

    pub fn bundle(&self) -> Option<&Arc<CredentialBundle>> {
        match self {
            CredentialState::Ready(bundle) => Some(bundle),
            CredentialState::Unavailable => None,
        }
    }
}

/// The default source priority: environment first, then configured files
pub fn default_sources(config: &KeyMaterialConfig) -> Vec<Box<dyn KeyMaterialSource>> {
    vec![
        Box::new(EnvSource::new()),
        Box::new(FileSource::new(config)),
    ]
}

/// Walk the source list in order and return the first fully-usable bundle
///
/// A source that holds nothing is skipped silently; a source that holds
/// unreadable or unparseable material is logged with its error and skipped.
/// Exhausting the list yields [`CredentialState::Unavailable`], never a
/// fatal error: the endpoints observe the state per request.
pub fn resolve_credentials(sources: &[Box<dyn KeyMaterialSource>]) -> CredentialState {
    for source in sources {
        match source.load() {
            Ok(Some(raw)) => match CredentialBundle::from_raw(raw) {
                Ok(bundle) => {
                    info!(source = %source.describe(), "key material resolved");
                    return CredentialState::Ready(Arc::new(bundle));
                }
                Err(e) => {
                    warn!(source = %source.describe(), error = %e, "key material present but unusable");
                }
            },
            Ok(None) => {
                debug!(source = %source.describe(), "no key material");
            }
            Err(e) => {
                warn!(source = %source.describe(), error = %e, "key material source failed");
            }
        }
    }

    warn!("no key material resolved; encrypt/decrypt endpoints will report unavailable");
    CredentialState::Unavailable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_ca::RsaCaBuilder;
    use crate::generate_server_cert::RsaServerCertBuilder;
    use openssl::nid::Nid;

    fn test_material() -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let (ca_key, ca_cert) = RsaCaBuilder::new()
            .subject_common_name("Test Root CA".to_string())
            .organization("Test Org".to_string())
            .locality("Toronto".to_string())
            .state("Ontario".to_string())
            .country("CA".to_string())
            .build()
            .unwrap();
        let (server_key, server_cert) = RsaServerCertBuilder::new(ca_key, ca_cert.clone())
            .subject_common_name("localhost".to_string())
            .build()
            .unwrap();
        (
            server_key.private_key_to_pem_pkcs8().unwrap(),
            server_cert.to_pem().unwrap(),
            ca_cert.to_pem().unwrap(),
        )
    }

    fn common_name(cert: &X509) -> String {
        cert.subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .unwrap()
            .data()
            .as_utf8()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_bundle_parses_valid_material() {
        let (key_pem, cert_pem, ca_pem) = test_material();
        let bundle = CredentialBundle::from_raw(RawKeyMaterial {
            private_key_pem: key_pem,
            certificate_pem: cert_pem,
            ca_certificate_pem: Some(ca_pem),
        })
        .unwrap();

        assert_eq!(common_name(bundle.certificate()), "localhost");
        assert!(bundle.ca_certificate().is_some());
        assert!(bundle.private_key().is_ok());
    }

    #[test]
    fn test_malformed_pem_is_parse_kind() {
        let (_key_pem, cert_pem, _ca_pem) = test_material();
        let err = CredentialBundle::from_raw(RawKeyMaterial {
            private_key_pem: b"not a pem".to_vec(),
            certificate_pem: cert_pem,
            ca_certificate_pem: None,
        })
        .unwrap_err();

        assert!(matches!(err, KeySourceError::Parse { what: "private key", .. }));
    }

    #[test]
    fn test_non_rsa_key_rejected() {
        let ec_group =
            openssl::ec::EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let ec_key = openssl::ec::EcKey::generate(&ec_group).unwrap();
        let ec_pem = PKey::from_ec_key(ec_key)
            .unwrap()
            .private_key_to_pem_pkcs8()
            .unwrap();
        let (_key_pem, cert_pem, _ca_pem) = test_material();

        let err = CredentialBundle::from_raw(RawKeyMaterial {
            private_key_pem: ec_pem,
            certificate_pem: cert_pem,
            ca_certificate_pem: None,
        })
        .unwrap_err();

        assert!(matches!(err, KeySourceError::Parse { what: "private key", .. }));
    }

    #[test]
    fn test_file_source_missing_files_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = KeyMaterialConfig {
            private_key_path: dir.path().join("missing-key.pem"),
            certificate_path: dir.path().join("missing-cert.pem"),
            ca_certificate_path: dir.path().join("missing-ca.pem"),
        };

        let loaded = FileSource::new(&config).load().unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_file_source_partial_material_is_not_found() {
        let (key_pem, _cert_pem, _ca_pem) = test_material();
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("server-key.pem");
        std::fs::write(&key_path, key_pem).unwrap();

        let config = KeyMaterialConfig {
            private_key_path: key_path,
            certificate_path: dir.path().join("missing-cert.pem"),
            ca_certificate_path: dir.path().join("missing-ca.pem"),
        };

        // Key alone does not make the source usable
        let loaded = FileSource::new(&config).load().unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_file_source_resolves_bundle() {
        let (key_pem, cert_pem, ca_pem) = test_material();
        let dir = tempfile::tempdir().unwrap();
        let config = KeyMaterialConfig {
            private_key_path: dir.path().join("server-key.pem"),
            certificate_path: dir.path().join("server-cert.pem"),
            ca_certificate_path: dir.path().join("ca-cert.pem"),
        };
        std::fs::write(&config.private_key_path, key_pem).unwrap();
        std::fs::write(&config.certificate_path, cert_pem).unwrap();
        std::fs::write(&config.ca_certificate_path, ca_pem).unwrap();

        let sources: Vec<Box<dyn KeyMaterialSource>> =
            vec![Box::new(FileSource::new(&config))];
        let state = resolve_credentials(&sources);

        let bundle = state.bundle().expect("bundle should resolve");
        assert!(bundle.ca_certificate().is_some());
    }

    #[test]
    fn test_env_source_takes_priority_over_files() {
        let (key_pem, cert_pem, _ca_pem) = test_material();

        // Distinct CN for the env material so the winner is observable
        let (ca_key, ca_cert) = RsaCaBuilder::new()
            .subject_common_name("Env Root CA".to_string())
            .organization("Test Org".to_string())
            .locality("Toronto".to_string())
            .state("Ontario".to_string())
            .country("CA".to_string())
            .build()
            .unwrap();
        let (env_key, env_cert) = RsaServerCertBuilder::new(ca_key, ca_cert)
            .subject_common_name("env.localhost".to_string())
            .build()
            .unwrap();

        env::set_var(
            "CG_TEST_PRIORITY_KEY",
            String::from_utf8(env_key.private_key_to_pem_pkcs8().unwrap()).unwrap(),
        );
        env::set_var(
            "CG_TEST_PRIORITY_CERT",
            String::from_utf8(env_cert.to_pem().unwrap()).unwrap(),
        );

        let dir = tempfile::tempdir().unwrap();
        let config = KeyMaterialConfig {
            private_key_path: dir.path().join("server-key.pem"),
            certificate_path: dir.path().join("server-cert.pem"),
            ca_certificate_path: dir.path().join("ca-cert.pem"),
        };
        std::fs::write(&config.private_key_path, key_pem).unwrap();
        std::fs::write(&config.certificate_path, cert_pem).unwrap();

        let sources: Vec<Box<dyn KeyMaterialSource>> = vec![
            Box::new(EnvSource::with_vars(
                "CG_TEST_PRIORITY_KEY",
                "CG_TEST_PRIORITY_CERT",
                "CG_TEST_PRIORITY_CA",
            )),
            Box::new(FileSource::new(&config)),
        ];
        let state = resolve_credentials(&sources);

        let bundle = state.bundle().expect("bundle should resolve");
        assert_eq!(common_name(bundle.certificate()), "env.localhost");

        env::remove_var("CG_TEST_PRIORITY_KEY");
        env::remove_var("CG_TEST_PRIORITY_CERT");
    }

    #[test]
    fn test_exhausted_sources_yield_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = KeyMaterialConfig {
            private_key_path: dir.path().join("missing-key.pem"),
            certificate_path: dir.path().join("missing-cert.pem"),
            ca_certificate_path: dir.path().join("missing-ca.pem"),
        };

        let sources: Vec<Box<dyn KeyMaterialSource>> = vec![
            Box::new(EnvSource::with_vars(
                "CG_TEST_ABSENT_KEY",
                "CG_TEST_ABSENT_CERT",
                "CG_TEST_ABSENT_CA",
            )),
            Box::new(FileSource::new(&config)),
        ];
        let state = resolve_credentials(&sources);

        assert!(!state.is_ready());
        assert!(state.bundle().is_none());
    }

    #[test]
    fn test_malformed_source_falls_through_to_next() {
        let (key_pem, cert_pem, _ca_pem) = test_material();
        let dir = tempfile::tempdir().unwrap();

        let bad_config = KeyMaterialConfig {
            private_key_path: dir.path().join("bad-key.pem"),
            certificate_path: dir.path().join("bad-cert.pem"),
            ca_certificate_path: dir.path().join("bad-ca.pem"),
        };
        std::fs::write(&bad_config.private_key_path, b"garbage").unwrap();
        std::fs::write(&bad_config.certificate_path, b"garbage").unwrap();

        let good_config = KeyMaterialConfig {
            private_key_path: dir.path().join("server-key.pem"),
            certificate_path: dir.path().join("server-cert.pem"),
            ca_certificate_path: dir.path().join("ca-cert.pem"),
        };
        std::fs::write(&good_config.private_key_path, key_pem).unwrap();
        std::fs::write(&good_config.certificate_path, cert_pem).unwrap();

        let sources: Vec<Box<dyn KeyMaterialSource>> = vec![
            Box::new(FileSource::new(&bad_config)),
            Box::new(FileSource::new(&good_config)),
        ];
        let state = resolve_credentials(&sources);

        assert!(state.is_ready());
    }

    #[test]
    fn test_debug_output_redacts_key() {
        let (key_pem, cert_pem, _ca_pem) = test_material();
        let bundle = CredentialBundle::from_raw(RawKeyMaterial {
            private_key_pem: key_pem,
            certificate_pem: cert_pem,
            ca_certificate_pem: None,
        })
        .unwrap();

        let debug_str = format!("{:?}", bundle);
        assert!(!debug_str.contains("PRIVATE KEY"));
        assert!(debug_str.contains("securely stored"));
    }

    #[test]
    fn test_tls_chain_appends_ca() {
        let (key_pem, cert_pem, ca_pem) = test_material();
        let bundle = CredentialBundle::from_raw(RawKeyMaterial {
            private_key_pem: key_pem,
            certificate_pem: cert_pem.clone(),
            ca_certificate_pem: Some(ca_pem.clone()),
        })
        .unwrap();

        let chain = bundle.tls_chain_pem();
        assert!(chain.starts_with(&cert_pem[..]));
        assert!(chain.len() >= cert_pem.len() + ca_pem.len());
    }
}
