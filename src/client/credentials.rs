use std::fmt;
use std::io;
use std::path::Path;

use parking_lot::RwLock;
use reqwest::{Certificate, Identity};
use tracing::{debug, error, info};

use crate::metrics;
use crate::models::DataSourceOptions;
use crate::{BridgeError, Result};

/// Where credential files are read from.
pub trait CredentialSource: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsSource;

impl CredentialSource for FsSource {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// The three configured file paths. Empty means "not configured".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialPaths {
    pub cert: String,
    pub key: String,
    pub ca: String,
}

impl From<&DataSourceOptions> for CredentialPaths {
    fn from(options: &DataSourceOptions) -> Self {
        CredentialPaths {
            cert: options.client_certificate_path.clone(),
            key: options.client_key_path.clone(),
            ca: options.certificate_authority_path.clone(),
        }
    }
}

/// Credential material from a single reload generation.
#[derive(Clone, Default)]
pub struct CredentialSnapshot {
    pub generation: u64,
    pub identity: Option<Identity>,
    pub roots: Option<Vec<Certificate>>,
}

impl fmt::Debug for CredentialSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSnapshot")
            .field("generation", &self.generation)
            .field("identity", &self.identity.is_some())
            .field("roots", &self.roots.as_ref().map(Vec::len))
            .finish()
    }
}

#[derive(Default)]
struct Loaded {
    paths: CredentialPaths,
    snapshot: CredentialSnapshot,
}

/// Process-lifetime cache of the client certificate and trust roots.
///
/// Material is reloaded from disk only when the configured paths differ from
/// the ones it was last loaded from. Writers hold the lock exclusively for the
/// whole compare-and-reload; readers clone a snapshot under the same lock, so
/// no reader can pair a certificate and roots from different generations.
pub struct CredentialStore {
    state: RwLock<Loaded>,
    source: Box<dyn CredentialSource>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::with_source(FsSource)
    }

    pub fn with_source(source: impl CredentialSource + 'static) -> Self {
        Self {
            state: RwLock::new(Loaded::default()),
            source: Box::new(source),
        }
    }

    pub fn changed(&self, wanted: &CredentialPaths) -> bool {
        self.state.read().paths != *wanted
    }

    /// Brings the loaded material in line with `wanted`.
    ///
    /// A failed certificate or CA load leaves that credential and its recorded
    /// path as they were, so the next call retries the load.
    pub fn refresh(&self, wanted: &CredentialPaths) -> Result<()> {
        if !self.changed(wanted) {
            return Ok(());
        }

        let mut state = self.state.write();
        // another caller may have reloaded while we waited for the lock
        if state.paths == *wanted {
            return Ok(());
        }

        if state.paths.cert != wanted.cert || state.paths.key != wanted.key {
            let identity = self.load_identity(&wanted.cert, &wanted.key)?;
            state.snapshot.identity = identity;
            state.snapshot.generation += 1;
            state.paths.cert = wanted.cert.clone();
            state.paths.key = wanted.key.clone();
            metrics::record_credential_reload();
        }

        if state.paths.ca != wanted.ca {
            let roots = self.load_roots(&wanted.ca)?;
            state.snapshot.roots = roots;
            state.snapshot.generation += 1;
            state.paths.ca = wanted.ca.clone();
            metrics::record_credential_reload();
        }

        Ok(())
    }

    pub fn snapshot(&self) -> CredentialSnapshot {
        self.state.read().snapshot.clone()
    }

    fn load_identity(&self, cert_path: &str, key_path: &str) -> Result<Option<Identity>> {
        if cert_path.is_empty() || key_path.is_empty() {
            if !cert_path.is_empty() || !key_path.is_empty() {
                info!(
                    cert_path,
                    key_path,
                    "Both cert_path and key_path are required. Client connection updated with no client certificate."
                );
            }
            return Ok(None);
        }

        let identity = self
            .read_pem(cert_path)
            .and_then(|mut pem| {
                pem.push(b'\n');
                pem.extend(self.read_pem(key_path)?);
                Identity::from_pem(&pem).map_err(|e| e.to_string())
            })
            .and_then(|identity| {
                check_key_pair(&identity)?;
                Ok(identity)
            })
            .map_err(|e| {
                error!(cert_path, key_path, error = %e, "Failed to setup client certificate");
                BridgeError::ClientCertificate
            })?;

        debug!(cert_path, key_path, "Completed setup of client certificate");
        Ok(Some(identity))
    }

    fn load_roots(&self, ca_path: &str) -> Result<Option<Vec<Certificate>>> {
        if ca_path.is_empty() {
            debug!("Client connection updated with no certificate authority");
            return Ok(None);
        }

        let roots = self
            .read_pem(ca_path)
            .and_then(|pem| Certificate::from_pem_bundle(&pem).map_err(|e| e.to_string()))
            .map_err(|e| {
                error!(ca_path, error = %e, "Failed to setup certificate authority");
                BridgeError::CertificateAuthority
            })?;

        debug!(ca_path, certificates = roots.len(), "Completed setup of certificate authority");
        Ok(Some(roots))
    }

    fn read_pem(&self, path: &str) -> std::result::Result<Vec<u8>, String> {
        self.source
            .read(Path::new(path))
            .map_err(|e| format!("{}: {}", path, e))
    }
}

/// Parsing a PEM identity does not tie the key to the certificate; the TLS
/// config build does.
fn check_key_pair(identity: &Identity) -> std::result::Result<(), String> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .identity(identity.clone())
        .build()
        .map(drop)
        .map_err(|e| format!("certificate and key do not match: {}", e))
}
