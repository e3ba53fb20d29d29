//! Header manipulation for forwarded requests and responses.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Inject diagnostic headers: X-Proxy-Time, X-Worker-Pid, X-Forwarded-For
//! - Preserve Authorization toward the upstream
//!
//! # Design Decisions
//! - The client's observed address is appended to any existing
//!   X-Forwarded-For chain, never trusted to replace it
//! - Upgrade/Connection survive stripping only during upgrade negotiation

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::header::{HeaderMap, HeaderName, HeaderValue};

/// Unix-millisecond timestamp of proxy receipt.
pub const X_PROXY_TIME: HeaderName = HeaderName::from_static("x-proxy-time");

/// Identifier of the worker process that handled the request.
pub const X_WORKER_PID: HeaderName = HeaderName::from_static("x-worker-pid");

/// Client address chain.
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that are connection-scoped and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    HeaderName::from_static("connection"),
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-authenticate"),
    HeaderName::from_static("proxy-authorization"),
    HeaderName::from_static("te"),
    HeaderName::from_static("trailer"),
    HeaderName::from_static("transfer-encoding"),
    HeaderName::from_static("upgrade"),
];

/// Remove hop-by-hop headers. When `preserve_upgrade` is set (an upgrade
/// handshake in flight), `Connection` and `Upgrade` are kept so the
/// upstream sees the negotiation.
pub fn strip_hop_by_hop(headers: &mut HeaderMap, preserve_upgrade: bool) {
    // Headers named by the Connection header are hop-by-hop too.
    let named: Vec<HeaderName> = headers
        .get_all("connection")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| name.trim().parse().ok())
        .collect();

    for name in named {
        if !(preserve_upgrade && name.as_str() == "upgrade") {
            headers.remove(&name);
        }
    }
    for name in &HOP_BY_HOP {
        if preserve_upgrade && (name.as_str() == "connection" || name.as_str() == "upgrade") {
            continue;
        }
        headers.remove(name);
    }
}

/// Inject the diagnostic headers the upstream contract requires.
pub fn inject_proxy_headers(headers: &mut HeaderMap, client_addr: &SocketAddr, pid: u32) {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    if let Ok(value) = HeaderValue::from_str(&now_ms.to_string()) {
        headers.insert(X_PROXY_TIME, value);
    }
    if let Ok(value) = HeaderValue::from_str(&pid.to_string()) {
        headers.insert(X_WORKER_PID, value);
    }

    let client_ip = client_addr.ip().to_string();
    let forwarded = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {client_ip}"),
        None => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_standard_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));

        strip_hop_by_hop(&mut headers, false);

        assert!(headers.get("connection").is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get("transfer-encoding").is_none());
        // End-to-end headers survive.
        assert!(headers.get("authorization").is_some());
    }

    #[test]
    fn strips_connection_named_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("x-custom-hop"));
        headers.insert("x-custom-hop", HeaderValue::from_static("1"));

        strip_hop_by_hop(&mut headers, false);
        assert!(headers.get("x-custom-hop").is_none());
    }

    #[test]
    fn preserves_upgrade_negotiation() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("Upgrade"));
        headers.insert("upgrade", HeaderValue::from_static("websocket"));

        strip_hop_by_hop(&mut headers, true);
        assert!(headers.get("connection").is_some());
        assert!(headers.get("upgrade").is_some());
    }

    #[test]
    fn injects_and_chains_forwarded_for() {
        let addr: SocketAddr = "10.0.0.7:55000".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("192.168.1.1"));

        inject_proxy_headers(&mut headers, &addr, 4242);

        assert_eq!(
            headers.get(X_FORWARDED_FOR).unwrap(),
            "192.168.1.1, 10.0.0.7"
        );
        assert_eq!(headers.get(X_WORKER_PID).unwrap(), "4242");
        let ms: u128 = headers
            .get(X_PROXY_TIME)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(ms > 0);
    }
}
