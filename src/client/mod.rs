pub mod credentials;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::models::DataSourceOptions;
use crate::{BridgeError, Result};

pub use credentials::{CredentialPaths, CredentialSnapshot, CredentialSource, CredentialStore, FsSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ClientKey {
    generation: u64,
    with_identity: bool,
    insecure: bool,
}

/// Hands out HTTPS clients for the backend, reloading credentials through the
/// [`CredentialStore`] only when the configured paths change.
///
/// Built clients are cached per credential generation so connection pools are
/// reused; a reload bumps the generation and retires the old clients.
pub struct HttpClientProvider {
    store: CredentialStore,
    clients: Mutex<HashMap<ClientKey, reqwest::Client>>,
}

impl Default for HttpClientProvider {
    fn default() -> Self {
        Self::new(CredentialStore::new())
    }
}

impl HttpClientProvider {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            store,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn get_client(
        &self,
        options: &DataSourceOptions,
        prefer_client_cert: bool,
    ) -> Result<reqwest::Client> {
        debug!(allow_insecure_ssl = options.allow_insecure_ssl, "Getting client");
        self.store.refresh(&CredentialPaths::from(options))?;

        let snapshot = self.store.snapshot();
        let key = ClientKey {
            generation: snapshot.generation,
            with_identity: prefer_client_cert && snapshot.identity.is_some(),
            insecure: options.allow_insecure_ssl,
        };

        if let Some(client) = self.clients.lock().get(&key) {
            return Ok(client.clone());
        }

        let client = build_client(&snapshot, key.with_identity, key.insecure)?;
        let mut clients = self.clients.lock();
        clients.retain(|k, _| k.generation >= key.generation);
        Ok(clients.entry(key).or_insert(client).clone())
    }

    /// [`get_client`](Self::get_client) for async callers. A pending reload
    /// reads credential files, so it runs on the blocking pool.
    pub async fn client_for(
        self: &Arc<Self>,
        options: &DataSourceOptions,
        prefer_client_cert: bool,
    ) -> Result<reqwest::Client> {
        if self.store.changed(&CredentialPaths::from(options)) {
            let provider = Arc::clone(self);
            let options = options.clone();
            return tokio::task::spawn_blocking(move || {
                provider.get_client(&options, prefer_client_cert)
            })
            .await
            .map_err(|e| BridgeError::Internal(format!("credential reload task failed: {}", e)))?;
        }
        self.get_client(options, prefer_client_cert)
    }

    #[cfg(test)]
    fn cached_clients(&self) -> usize {
        self.clients.lock().len()
    }
}

fn build_client(
    snapshot: &CredentialSnapshot,
    with_identity: bool,
    insecure: bool,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .danger_accept_invalid_certs(insecure);

    if with_identity {
        if let Some(identity) = &snapshot.identity {
            builder = builder.identity(identity.clone());
        }
    }

    // a configured CA bundle replaces the built-in roots
    if let Some(roots) = &snapshot.roots {
        builder = builder.tls_built_in_root_certs(false);
        for cert in roots {
            builder = builder.add_root_certificate(cert.clone());
        }
    }

    builder
        .build()
        .map_err(|e| BridgeError::ClientBuild(e.to_string()))
}
