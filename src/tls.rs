//! Self-signed certificate generation
//!
//! Everything is delegated to the `openssl` command line tool: an RSA key,
//! a CSR carrying the configured subject and extensions, and a certificate
//! signed with that same key.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tokio::process::Command;

pub const RSA_KEY_BITS: u32 = 2048;
pub const CERT_VALIDITY_DAYS: u32 = 3650;

/// Locations of the generated key material
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TlsPaths {
    pub dir: PathBuf,
    pub key: PathBuf,
    pub csr: PathBuf,
    pub crt: PathBuf,
}

impl Default for TlsPaths {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./ssl"),
            key: PathBuf::from("./ssl/server.key"),
            csr: PathBuf::from("./ssl/server.csr"),
            crt: PathBuf::from("./ssl/server.crt"),
        }
    }
}

/// Distinguished name and SAN entries for the CSR
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CertificateSubject {
    pub country: String,
    pub state: String,
    pub locality: String,
    pub postal_code: String,
    pub street: String,
    pub organization: String,
    pub organizational_unit: String,
    pub common_names: Vec<String>,
    pub email: String,
}

impl Default for CertificateSubject {
    fn default() -> Self {
        Self {
            country: "US".to_string(),
            state: "Louisiana".to_string(),
            locality: "Slidell".to_string(),
            postal_code: "70458".to_string(),
            street: "1001 Gause Blvd.".to_string(),
            organization: "SMH".to_string(),
            organizational_unit: "IT".to_string(),
            common_names: vec!["localhost".to_string()],
            email: "test@test.com".to_string(),
        }
    }
}

impl CertificateSubject {
    /// Render as an openssl `-subj` string
    pub fn to_subj(&self) -> String {
        let fields = [
            ("C", self.country.as_str()),
            ("ST", self.state.as_str()),
            ("L", self.locality.as_str()),
            ("postalCode", self.postal_code.as_str()),
            ("street", self.street.as_str()),
            ("O", self.organization.as_str()),
            ("OU", self.organizational_unit.as_str()),
        ]
        .into_iter()
        .chain(self.common_names.iter().map(|cn| ("CN", cn.as_str())))
        .chain(std::iter::once(("emailAddress", self.email.as_str())));

        fields
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("/{}={}", key, escape_subj_value(value)))
            .collect()
    }

    /// Render the common names as a `subjectAltName` extension value
    pub fn subject_alt_name(&self) -> Option<String> {
        if self.common_names.is_empty() {
            return None;
        }
        let dns: Vec<String> = self
            .common_names
            .iter()
            .map(|name| format!("DNS:{}", name))
            .collect();
        Some(dns.join(","))
    }
}

fn escape_subj_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('/', "\\/")
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// `openssl genrsa` arguments
pub fn genrsa_args(paths: &TlsPaths) -> Vec<String> {
    vec![
        "genrsa".to_string(),
        "-out".to_string(),
        path_arg(&paths.key),
        RSA_KEY_BITS.to_string(),
    ]
}

/// `openssl req` arguments producing the CSR
pub fn req_args(paths: &TlsPaths, subject: &CertificateSubject) -> Vec<String> {
    let mut args = vec![
        "req".to_string(),
        "-new".to_string(),
        "-sha512".to_string(),
        "-key".to_string(),
        path_arg(&paths.key),
        "-out".to_string(),
        path_arg(&paths.csr),
        "-subj".to_string(),
        subject.to_subj(),
        "-addext".to_string(),
        "basicConstraints=critical,CA:TRUE,pathlen:1".to_string(),
        "-addext".to_string(),
        "keyUsage=digitalSignature,keyEncipherment".to_string(),
        "-addext".to_string(),
        "extendedKeyUsage=critical,serverAuth,clientAuth".to_string(),
    ];

    if let Some(san) = subject.subject_alt_name() {
        args.push("-addext".to_string());
        args.push(format!("subjectAltName={}", san));
    }

    args
}

/// `openssl x509` arguments self-signing the CSR.
///
/// `-copy_extensions` (OpenSSL 3) carries the CSR extensions into the
/// certificate; without it the SANs are dropped.
pub fn x509_args(paths: &TlsPaths) -> Vec<String> {
    vec![
        "x509".to_string(),
        "-in".to_string(),
        path_arg(&paths.csr),
        "-out".to_string(),
        path_arg(&paths.crt),
        "-req".to_string(),
        "-signkey".to_string(),
        path_arg(&paths.key),
        "-days".to_string(),
        CERT_VALIDITY_DAYS.to_string(),
        "-copy_extensions".to_string(),
        "copy".to_string(),
    ]
}

/// Generate key, CSR and certificate by running `openssl` three times
pub async fn generate(paths: &TlsPaths, subject: &CertificateSubject, openssl: &str) -> Result<()> {
    log::info!("Generating ssl certificates in {}", paths.dir.display());

    for file in [&paths.key, &paths.csr, &paths.crt] {
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create ssl directory: {}", parent.display()))?;
        }
    }

    run_openssl(openssl, &genrsa_args(paths)).await?;
    run_openssl(openssl, &req_args(paths, subject)).await?;
    run_openssl(openssl, &x509_args(paths)).await?;

    log::info!("Generated ssl certificate {}", paths.crt.display());
    Ok(())
}

/// Delete the ssl directory and everything in it
pub async fn remove(paths: &TlsPaths) -> Result<()> {
    if !paths.dir.exists() {
        return Ok(());
    }
    tokio::fs::remove_dir_all(&paths.dir)
        .await
        .with_context(|| format!("Failed to remove ssl directory: {}", paths.dir.display()))?;
    log::info!("Removed ssl certificates");
    Ok(())
}

async fn run_openssl(program: &str, args: &[String]) -> Result<()> {
    log::debug!("Running {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to run {}", program))?;

    if !output.status.success() {
        bail!(
            "{} {} failed with {}: {}",
            program,
            args.first().map(String::as_str).unwrap_or_default(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}
