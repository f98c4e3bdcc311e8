use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/**
    An issued certificate, as handed to a [`CertificateSink`].
*/
#[derive(Debug, Clone)]
pub struct CertificateRecord {
    pub fingerprint: String,
    pub der: Vec<u8>,
    pub subject: String,
    pub serial: String,
    pub device_id: String,
}

/**
    Where issued certificates are recorded once enrollment succeeds.
*/
pub trait CertificateSink: Send + Sync {
    fn persist(&self, record: &CertificateRecord) -> Result<(), SinkError>;
}

/// Records nothing beyond a log line.
pub struct LogSink;

impl CertificateSink for LogSink {
    fn persist(&self, record: &CertificateRecord) -> Result<(), SinkError> {
        tracing::info!(
            fingerprint = %record.fingerprint,
            subject = %record.subject,
            serial = %record.serial,
            device_id = %record.device_id,
            "certificate issued"
        );
        Ok(())
    }
}

/**
    Writes each certificate as `<fingerprint>.der` into a directory.
*/
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| SinkError::Write {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }
}

impl CertificateSink for DirectorySink {
    fn persist(&self, record: &CertificateRecord) -> Result<(), SinkError> {
        let path = self.dir.join(format!("{}.der", record.fingerprint));
        std::fs::write(&path, &record.der).map_err(|source| SinkError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::info!(
            path = %path.display(),
            subject = %record.subject,
            device_id = %record.device_id,
            "certificate stored"
        );
        Ok(())
    }
}
