//! A local HTTPS stand-in for the metrics backend. It records every request
//! and answers the handful of paths the bridge talks to.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension, Json, Router,
};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, SanType};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;

use timely_bridge::models::DataSourceOptions;

/// Series the fake backend returns for every `/api/query` call.
pub const QUERY_RESPONSE: &str = r#"[{"metric":"cpu","tags":{"host":"a"},"aggregatedTags":[],"dps":{"2000":2.0,"1000":1.0}}]"#;

/// Test CA plus a server and a client certificate it signed, with the
/// client-side files written to a temp dir.
pub struct Pki {
    _dir: TempDir,
    pub ca_path: String,
    pub client_cert_path: String,
    pub client_key_path: String,
    ca_der: Vec<u8>,
    server_cert_der: Vec<u8>,
    server_key_der: Vec<u8>,
}

fn params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new());
    params.distinguished_name.push(DnType::CommonName, common_name);
    params
}

impl Pki {
    pub fn generate() -> Self {
        let mut ca_params = params("bridge test ca");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca = Certificate::from_params(ca_params).unwrap();

        let mut server_params = params("backend");
        server_params
            .subject_alt_names
            .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        let server = Certificate::from_params(server_params).unwrap();

        let client = Certificate::from_params(params("bridge client")).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, contents: String| {
            let path = dir.path().join(name);
            std::fs::write(&path, contents).unwrap();
            path.to_string_lossy().into_owned()
        };
        let ca_path = write("ca.pem", ca.serialize_pem().unwrap());
        let client_cert_path = write("client.crt", client.serialize_pem_with_signer(&ca).unwrap());
        let client_key_path = write("client.key", client.serialize_private_key_pem());

        Pki {
            ca_der: ca.serialize_der().unwrap(),
            server_cert_der: server.serialize_der_with_signer(&ca).unwrap(),
            server_key_der: server.serialize_private_key_der(),
            ca_path,
            client_cert_path,
            client_key_path,
            _dir: dir,
        }
    }
}

/// One request as the backend saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub client_cert: bool,
}

#[derive(Debug, Clone, Copy)]
struct PeerCertificate(bool);

type Requests = Arc<Mutex<Vec<Recorded>>>;

pub struct TestBackend {
    pub addr: SocketAddr,
    requests: Requests,
}

impl TestBackend {
    /// Serves TLS on an ephemeral port. Client certificates signed by the
    /// test CA are requested but not required.
    pub async fn start(pki: &Pki) -> Self {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut roots = RootCertStore::empty();
        roots.add(CertificateDer::from(pki.ca_der.clone())).unwrap();
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .allow_unauthenticated()
            .build()
            .unwrap();

        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_client_cert_verifier(verifier)
            .with_single_cert(
                vec![CertificateDer::from(pki.server_cert_der.clone())],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pki.server_key_der.clone())),
            )
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Requests::default();
        let app = Router::new().fallback(record).with_state(requests.clone());

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                let app = app.clone();
                tokio::spawn(async move {
                    let Ok(tls) = acceptor.accept(tcp).await else {
                        return;
                    };
                    let peer = PeerCertificate(tls.get_ref().1.peer_certificates().is_some());
                    let service = hyper::service::service_fn(
                        move |mut req: hyper::Request<hyper::body::Incoming>| {
                            req.extensions_mut().insert(peer);
                            app.clone().oneshot(req)
                        },
                    );
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(tls), service)
                        .await;
                });
            }
        });

        TestBackend { addr, requests }
    }

    /// Datasource options pointing at this backend and trusting the test CA.
    pub fn options(&self, pki: &Pki) -> DataSourceOptions {
        DataSourceOptions {
            timely_host: self.addr.ip().to_string(),
            https_port: self.addr.port(),
            certificate_authority_path: pki.ca_path.clone(),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Recorded {
        self.requests().pop().expect("backend saw no requests")
    }
}

async fn record(
    State(requests): State<Requests>,
    Extension(peer): Extension<PeerCertificate>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    requests.lock().push(Recorded {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: header("authorization"),
        content_type: header("content-type"),
        body: body.clone(),
        client_cert: peer.0,
    });

    match uri.path() {
        "/api/query" => ([(CONTENT_TYPE, "application/json")], QUERY_RESPONSE).into_response(),
        "/api/suggest" => Json(json!(["cpu.idle", "cpu.load"])).into_response(),
        "/api/aggregators" => ([(CONTENT_TYPE, "application/json")], body).into_response(),
        "/api/search/lookup" => StatusCode::NO_CONTENT.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
