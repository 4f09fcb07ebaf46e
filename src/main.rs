mod configs;
mod encryption;
mod generate_ca;
mod generate_server_cert;
mod key_material;
mod webserver;

use anyhow::{Context, Result};
use configs::AppConfig;
use generate_ca::RsaCaBuilder;
use generate_server_cert::RsaServerCertBuilder;
use std::env;
use tracing_subscriber::EnvFilter;

const CA_KEY_PATH: &str = "ca-key.pem";
const CA_CERT_PATH: &str = "ca-cert.pem";
const SERVER_KEY_PATH: &str = "server-key.pem";
const SERVER_CERT_PATH: &str = "server-cert.pem";

fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("generate") => generate_certificates(&config),
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .init();

            let sources = key_material::default_sources(&config.key_material);
            let credentials = key_material::resolve_credentials(&sources);
            webserver::start_webserver(config, credentials)
        }
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Usage: cipher-gate [generate]");
            std::process::exit(2);
        }
    }
}

/// One-shot offline artifact generation
///
/// Builds the CA and the server certificate fully in memory, then writes
/// the four PEM files. Any failure aborts before a partial or corrupt
/// artifact reaches disk.
fn generate_certificates(config: &AppConfig) -> Result<()> {
    println!("=== CipherGate Certificate Generation ===\n");

    let ca = &config.ca_defaults;
    let (ca_key, ca_cert) = RsaCaBuilder::new()
        .subject_common_name(ca.common_name.clone())
        .organization(ca.organization.clone())
        .locality(ca.locality.clone())
        .state(ca.state.clone())
        .country(ca.country.clone())
        .validity_days(ca.validity_days)
        .build()
        .context("Failed to generate CA certificate")?;
    println!("✓ CA certificate generated ({})", ca.common_name);

    let ca_key_pem = ca_key
        .private_key_to_pem_pkcs8()
        .context("Failed to encode CA private key")?;
    let ca_cert_pem = ca_cert.to_pem().context("Failed to encode CA certificate")?;

    let leaf = &config.server_cert_defaults;
    let (server_key, server_cert) = RsaServerCertBuilder::new(ca_key, ca_cert)
        .subject_common_name(leaf.common_name.clone())
        .validity_days(leaf.validity_days)
        .build()
        .context("Failed to generate server certificate")?;
    println!("✓ Server certificate generated ({})", leaf.common_name);

    let server_key_pem = server_key
        .private_key_to_pem_pkcs8()
        .context("Failed to encode server private key")?;
    let server_cert_pem = server_cert
        .to_pem()
        .context("Failed to encode server certificate")?;

    // All signing and encoding succeeded; now persist the four artifacts
    std::fs::write(CA_KEY_PATH, ca_key_pem).context("Failed to write CA private key")?;
    std::fs::write(CA_CERT_PATH, ca_cert_pem).context("Failed to write CA certificate")?;
    std::fs::write(SERVER_KEY_PATH, server_key_pem)
        .context("Failed to write server private key")?;
    std::fs::write(SERVER_CERT_PATH, server_cert_pem)
        .context("Failed to write server certificate")?;

    println!("✓ Artifacts written:");
    println!("   {}", CA_KEY_PATH);
    println!("   {}", CA_CERT_PATH);
    println!("   {}", SERVER_KEY_PATH);
    println!("   {}", SERVER_CERT_PATH);
    println!("\n✅ All files generated successfully!");

    Ok(())
}
