//! Client certificate material for mutual-TLS calls
//!
//! Certificate and key are written to disk right before a call and removed right after,
//! whether the call succeeded or not.

use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Certificate/key pair on disk; both files are removed on drop
#[derive(Debug)]
pub struct CertificateFiles {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl CertificateFiles {
    /// Writes `cert_<id>.pem` and `key_<id>.key` into `dir`
    pub fn write(dir: &Path, certificate: &str, key: &str) -> Result<Self> {
        let id = uuid::Uuid::new_v4();
        let cert_path = dir.join(format!("cert_{}.pem", id));
        let key_path = dir.join(format!("key_{}.key", id));

        fs::write(&cert_path, certificate)?;
        let files = Self {
            cert_path,
            key_path,
        };
        // From here on drop cleans up the certificate even if the key write fails
        fs::write(&files.key_path, key)?;
        debug!("wrote client certificate {:?}", files.cert_path);
        Ok(files)
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Loads the pair as a reqwest identity
    pub fn identity(&self) -> std::result::Result<reqwest::Identity, String> {
        let mut pem = fs::read(&self.cert_path).map_err(|e| e.to_string())?;
        pem.push(b'\n');
        pem.extend(fs::read(&self.key_path).map_err(|e| e.to_string())?);
        reqwest::Identity::from_pem(&pem).map_err(|e| format!("invalid client certificate: {}", e))
    }
}

impl Drop for CertificateFiles {
    fn drop(&mut self) {
        for path in [&self.cert_path, &self.key_path] {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("could not remove {:?}: {}", path, e);
                }
            }
        }
    }
}

/// PEM certificate and private key held in memory
#[derive(Clone)]
pub struct ClientCertificate {
    pub certificate: String,
    pub key: String,
}

impl ClientCertificate {
    pub fn new(certificate: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            certificate: certificate.into(),
            key: key.into(),
        }
    }

    pub fn write_to(&self, dir: &Path) -> Result<CertificateFiles> {
        CertificateFiles::write(dir, &self.certificate, &self.key)
    }
}

impl std::fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("certificate", &format!("{} bytes", self.certificate.len()))
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_files_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let files = CertificateFiles::write(dir.path(), "CERT", "KEY").unwrap();
            assert_eq!(fs::read_to_string(files.cert_path()).unwrap(), "CERT");
            assert_eq!(fs::read_to_string(files.key_path()).unwrap(), "KEY");
            assert_eq!(entries(dir.path()), 2);
        }
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn test_invalid_pem_fails_and_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let result = {
            let files = ClientCertificate::new("not a certificate", "not a key")
                .write_to(dir.path())
                .unwrap();
            files.identity()
        };
        assert!(result.is_err());
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn test_debug_hides_key() {
        let cert = ClientCertificate::new("CERT", "SECRET");
        assert!(!format!("{:?}", cert).contains("SECRET"));
    }
}
