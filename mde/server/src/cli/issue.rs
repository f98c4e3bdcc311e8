use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;
use data_encoding::BASE64;

use mde_pki::{CaIdentity, EnrollmentType, IssueRequest};

#[derive(Parser, Debug)]
pub struct IssueCommand {
    /// Certificate request file (PEM, base64 or DER)
    pub csr: PathBuf,

    /// PEM certificate of the issuing CA
    #[arg(long, env = "MDE_CA_CERT")]
    pub ca_cert: PathBuf,

    /// PEM private key of the issuing CA
    #[arg(long, env = "MDE_CA_KEY")]
    pub ca_key: PathBuf,

    /// Common name of the issued certificate
    #[arg(long)]
    pub common_name: String,

    /// Device identifier embedded in the certificate
    #[arg(long)]
    pub device_id: String,

    /// Issue a device certificate instead of a user certificate
    #[arg(long)]
    pub device: bool,

    /// Write the issued certificate (DER) to this file
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

impl IssueCommand {
    pub fn run(self) -> Result<()> {
        let ca = CaIdentity::load(&self.ca_cert, &self.ca_key)?;
        let raw = std::fs::read(&self.csr)
            .with_context(|| format!("reading {}", self.csr.display()))?;
        let der = request_der(&raw)?;

        let enrollment_type = if self.device {
            EnrollmentType::Device
        } else {
            EnrollmentType::User
        };
        let request = IssueRequest {
            enrollment_type,
            common_name: &self.common_name,
            device_id: &self.device_id,
        };
        let bundle = mde_pki::issue(&der, &request, &ca, Utc::now())?;

        println!("Issued certificate for {}", bundle.subject);
        println!("  Store:       My\\{}", bundle.enrollment_type.store());
        println!("  Serial:      {}", bundle.serial);
        println!("  Fingerprint: {}", bundle.leaf_fingerprint);
        println!("  Issuer:      {}", bundle.root_fingerprint);

        if let Some(out) = &self.out {
            std::fs::write(out, &bundle.leaf_der)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("  Written to:  {}", out.display());
        }
        Ok(())
    }
}

/**
    Accept a PEM `CERTIFICATE REQUEST`, bare base64, or raw DER.
*/
fn request_der(raw: &[u8]) -> Result<Vec<u8>> {
    // DER always starts with a SEQUENCE tag
    if raw.first() == Some(&0x30) {
        return Ok(raw.to_vec());
    }
    let Ok(text) = std::str::from_utf8(raw) else {
        bail!("certificate request is neither DER nor text");
    };
    let body: String = text
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .flat_map(|line| line.chars())
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    BASE64
        .decode(body.as_bytes())
        .context("certificate request is not valid base64")
}
