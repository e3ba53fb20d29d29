//! Forwarding engine.
//!
//! # Responsibilities
//! - Rewrite the inbound path by stripping the configured prefix
//! - Rewrite authority/Host to the upstream target
//! - Inject diagnostic headers, pass Authorization through
//! - Stream request and response bodies without buffering
//! - Splice upgraded (WebSocket-style) connections bidirectionally
//! - Enforce the forwarding deadline and isolate upstream failures
//!
//! # Design Decisions
//! - Exactly one forwarding attempt per client request; retries would
//!   break idempotency assumptions for non-idempotent methods
//! - Client disconnect drops this future, which cancels the in-flight
//!   upstream request and releases its connection

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::HOST,
        uri::{Authority, PathAndQuery, Scheme},
        HeaderValue, Request, Response, StatusCode, Uri,
    },
};
use hyper::upgrade::OnUpgrade;
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
    rt::TokioIo,
};
use url::Url;

use crate::config::{Environment, UpstreamConfig};
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::security::headers::{inject_proxy_headers, strip_hop_by_hop};

/// Reverse-proxy client bound to a single upstream target.
///
/// Clones share the underlying connection pool.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    scheme: Scheme,
    authority: Authority,
    host_value: HeaderValue,
    path_prefix: String,
    request_timeout: Duration,
}

impl Forwarder {
    /// Build a forwarder from upstream configuration. Fails on a malformed
    /// target URL; callers treat that as a fatal startup error.
    ///
    /// `https` targets get certificate verification in production; in
    /// development any upstream certificate is accepted, matching local
    /// self-signed setups.
    pub fn new(config: &UpstreamConfig, environment: Environment) -> Result<Self, String> {
        let url = Url::parse(&config.target_url).map_err(|e| e.to_string())?;
        let scheme: Scheme = url.scheme().parse().map_err(|_| {
            format!("unsupported upstream scheme '{}'", url.scheme())
        })?;
        let host = url.host_str().ok_or("upstream URL missing host")?;
        let authority: Authority = match url.port() {
            Some(port) => format!("{host}:{port}").parse(),
            None => host.parse(),
        }
        .map_err(|_| "upstream URL has an invalid authority")?;
        let host_value = HeaderValue::from_str(authority.as_str())
            .map_err(|_| "upstream authority is not a valid Host header")?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        connector.enforce_http(false);

        Ok(Self {
            client: Client::builder(TokioExecutor::new()).build(tls_connector(
                environment,
                connector,
            )),
            scheme,
            authority,
            host_value,
            path_prefix: config.path_prefix.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Forward one admitted request upstream and relay the response.
    pub async fn forward(
        &self,
        mut request: Request<Body>,
        client_addr: SocketAddr,
    ) -> Result<Response<Body>, GatewayError> {
        // The upgrade handle must be detached before the request is
        // consumed; it completes once we reply 101 to the client.
        let client_upgrade = request.extensions_mut().remove::<OnUpgrade>();
        let upgrading = wants_upgrade(&request) && client_upgrade.is_some();

        let (mut parts, body) = request.into_parts();

        let uri = self.rewrite_uri(&parts.uri)?;
        strip_hop_by_hop(&mut parts.headers, upgrading);
        inject_proxy_headers(&mut parts.headers, &client_addr, std::process::id());
        // Equivalent of changing the origin: the upstream sees itself as
        // the requested host.
        parts.headers.insert(HOST, self.host_value.clone());

        let mut upstream_request = Request::builder()
            .method(parts.method.clone())
            .uri(uri)
            .body(body)
            .map_err(|_| GatewayError::Internal)?;
        *upstream_request.headers_mut() = parts.headers;

        let mut upstream_response =
            match tokio::time::timeout(self.request_timeout, self.client.request(upstream_request))
                .await
            {
                Ok(Ok(response)) => response,
                Ok(Err(error)) => {
                    tracing::error!(error = %error, "Upstream request failed");
                    metrics::record_upstream_failure("unreachable");
                    return Err(GatewayError::UpstreamUnreachable);
                }
                Err(_) => {
                    tracing::error!(
                        timeout_secs = self.request_timeout.as_secs(),
                        "Upstream request timed out"
                    );
                    metrics::record_upstream_failure("timeout");
                    return Err(GatewayError::UpstreamTimeout);
                }
            };

        if upstream_response.status() == StatusCode::SWITCHING_PROTOCOLS {
            if let Some(client_upgrade) = client_upgrade {
                let upstream_upgrade = hyper::upgrade::on(&mut upstream_response);
                tokio::spawn(splice_upgraded(client_upgrade, upstream_upgrade));
            }
            let (mut parts, _) = upstream_response.into_parts();
            strip_hop_by_hop(&mut parts.headers, true);
            return Ok(Response::from_parts(parts, Body::empty()));
        }

        let (mut parts, body) = upstream_response.into_parts();
        strip_hop_by_hop(&mut parts.headers, false);
        Ok(Response::from_parts(parts, Body::new(body)))
    }

    /// Replace scheme/authority with the upstream target and strip the
    /// proxy prefix from the path. Query strings pass through untouched.
    fn rewrite_uri(&self, original: &Uri) -> Result<Uri, GatewayError> {
        let path = original.path();
        let stripped = match path.strip_prefix(self.path_prefix.as_str()) {
            Some(rest) if rest.is_empty() => "/",
            Some(rest) => rest,
            None => path,
        };
        let path_and_query: PathAndQuery = match original.query() {
            Some(query) => format!("{stripped}?{query}")
                .parse()
                .map_err(|_| GatewayError::Internal)?,
            None => stripped.parse().map_err(|_| GatewayError::Internal)?,
        };

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|_| GatewayError::Internal)
    }
}

/// Build the connector the forwarding client dials upstreams with. Plain
/// HTTP targets pass straight through; `https` targets are verified against
/// the bundled web roots in production, while development accepts any
/// certificate.
fn tls_connector(
    environment: Environment,
    connector: HttpConnector,
) -> HttpsConnector<HttpConnector> {
    let builder = if environment.is_production() {
        hyper_rustls::HttpsConnectorBuilder::new().with_webpki_roots()
    } else {
        let provider = rustls::crypto::aws_lc_rs::default_provider();
        let tls = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
            .with_no_client_auth();
        hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(tls)
    };
    builder
        .https_or_http()
        .enable_http1()
        .wrap_connector(connector)
}

/// Certificate verifier that accepts any upstream certificate. Development
/// mode only; signatures are still checked against the presented key.
#[derive(Debug)]
struct AcceptAnyServerCert(rustls::crypto::CryptoProvider);

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Does the request ask for a protocol upgrade?
fn wants_upgrade(request: &Request<Body>) -> bool {
    request
        .headers()
        .get("connection")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false)
}

/// Pump bytes both ways between the upgraded client and upstream
/// connections until either side closes.
async fn splice_upgraded(client_upgrade: OnUpgrade, upstream_upgrade: OnUpgrade) {
    let (client_io, upstream_io) = match tokio::join!(client_upgrade, upstream_upgrade) {
        (Ok(client_io), Ok(upstream_io)) => (client_io, upstream_io),
        (client, upstream) => {
            tracing::error!(
                client_ok = client.is_ok(),
                upstream_ok = upstream.is_ok(),
                "Upgrade handshake failed"
            );
            return;
        }
    };

    let mut client_io = TokioIo::new(client_io);
    let mut upstream_io = TokioIo::new(upstream_io);
    match tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io).await {
        Ok((to_upstream, to_client)) => {
            tracing::debug!(to_upstream, to_client, "Upgraded connection closed");
        }
        Err(error) => {
            tracing::debug!(error = %error, "Upgraded connection ended with error");
        }
    }
}
