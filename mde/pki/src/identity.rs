use std::fmt;
use std::path::Path;

use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::DecodeRsaPrivateKey,
    pkcs1v15::SigningKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey},
};
use sha2::Sha256;
use x509_cert::{
    Certificate,
    der::{DecodePem, Encode},
    name::Name,
};

use crate::error::{CaError, CaResult};
use crate::fingerprint;

/**
    The certificate authority that signs device identity certificates.

    Loaded once at startup and shared read-only between requests.
*/
pub struct CaIdentity {
    certificate: Certificate,
    certificate_der: Vec<u8>,
    fingerprint: String,
    public_key: RsaPublicKey,
    signing_key: SigningKey<Sha256>,
}

impl CaIdentity {
    /**
        Build the identity from a PEM certificate and an RSA private key
        in PKCS#8 or PKCS#1 PEM form.
    */
    pub fn from_pem(certificate_pem: &str, key_pem: &str) -> CaResult<Self> {
        let certificate = Certificate::from_pem(certificate_pem)
            .map_err(|e| CaError::InvalidCertificate(e.to_string()))?;
        let certificate_der = certificate
            .to_der()
            .map_err(|e| CaError::InvalidCertificate(e.to_string()))?;

        let spki_der = certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| CaError::InvalidCertificate(e.to_string()))?;
        let public_key = RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| CaError::InvalidCertificate(format!("not an RSA certificate: {e}")))?;

        let private_key = parse_private_key(key_pem)?;
        if private_key.to_public_key() != public_key {
            return Err(CaError::KeyMismatch);
        }

        Ok(Self {
            fingerprint: fingerprint(&certificate_der),
            certificate,
            certificate_der,
            public_key,
            signing_key: SigningKey::new(private_key),
        })
    }

    /**
        Read the certificate and key from disk.
    */
    pub fn load(certificate_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> CaResult<Self> {
        let certificate_pem = read(certificate_path.as_ref())?;
        let key_pem = read(key_path.as_ref())?;
        Self::from_pem(&certificate_pem, &key_pem)
    }

    pub fn subject(&self) -> &Name {
        &self.certificate.tbs_certificate.subject
    }

    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    /**
        Upper-case hex SHA-1 of the CA certificate.
    */
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub(crate) fn signing_key(&self) -> &SigningKey<Sha256> {
        &self.signing_key
    }
}

impl fmt::Debug for CaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaIdentity")
            .field("subject", &self.subject().to_string())
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

fn parse_private_key(pem: &str) -> CaResult<RsaPrivateKey> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs1_pem(pem).map_err(|_| CaError::InvalidKey)
}

fn read(path: &Path) -> CaResult<String> {
    std::fs::read_to_string(path).map_err(|e| CaError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
