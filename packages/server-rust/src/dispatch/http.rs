//! Conversion of an inbound HTTP request into an [`HttpRequest`] payload.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};
use faas_core::{headers, HttpRequest};
use tracing::warn;

/// Builds the payload for an HTTP-shaped invocation.
///
/// Multi-valued query parameters and headers are joined with `,`. The
/// remote address comes from the connection unless the proxy supplied both
/// `X-Real-Ip` and `X-Real-Port`.
#[must_use]
pub fn build_http_request(
    parts: &Parts,
    remote_addr: Option<SocketAddr>,
    body: Vec<u8>,
) -> HttpRequest {
    HttpRequest {
        http_method: parts.method.as_str().to_string(),
        path: parts.uri.path().to_string(),
        remote_addr: resolve_remote_addr(&parts.headers, remote_addr),
        path_parameters: HashMap::new(),
        query_string_parameters: query_parameters(&parts.uri),
        headers: header_parameters(&parts.headers),
        body,
    }
}

fn resolve_remote_addr(map: &HeaderMap, remote_addr: Option<SocketAddr>) -> String {
    let real = |name: &'static str| {
        map.get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    };
    match (real(headers::REAL_IP), real(headers::REAL_PORT)) {
        (Some(ip), Some(port)) => format!("{ip}:{port}"),
        _ => remote_addr.map(|addr| addr.to_string()).unwrap_or_default(),
    }
}

/// Parses the query one `&`-separated pair at a time, so a malformed pair
/// only drops itself. Pairs containing `;` or a bad percent escape are
/// skipped.
fn query_parameters(uri: &Uri) -> HashMap<String, String> {
    let mut params: HashMap<String, String> = HashMap::new();
    let segments = uri.query().unwrap_or_default().split('&');
    for segment in segments.filter(|s| !s.is_empty()) {
        if segment.contains(';') || !has_valid_escapes(segment) {
            warn!(segment, "ignoring malformed query parameter");
            continue;
        }
        let pairs = match serde_urlencoded::from_str::<Vec<(String, String)>>(segment) {
            Ok(pairs) => pairs,
            Err(err) => {
                warn!(segment, error = %err, "ignoring malformed query parameter");
                continue;
            }
        };
        for (key, value) in pairs {
            params
                .entry(key)
                .and_modify(|joined| {
                    joined.push(',');
                    joined.push_str(&value);
                })
                .or_insert(value);
        }
    }
    params
}

/// Every `%` must be followed by two hex digits.
fn has_valid_escapes(segment: &str) -> bool {
    segment
        .split('%')
        .skip(1)
        .all(|rest| rest.len() >= 2 && rest.as_bytes()[..2].iter().all(u8::is_ascii_hexdigit))
}

fn header_parameters(map: &HeaderMap) -> HashMap<String, String> {
    map.keys()
        .map(|name| {
            let joined = map
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()))
                .collect::<Vec<_>>()
                .join(",");
            (name.as_str().to_string(), joined)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn copies_method_path_and_body() {
        let parts = parts(Request::builder().method("PUT").uri("/items/7?x=1"));
        let req = build_http_request(&parts, None, b"payload".to_vec());

        assert_eq!(req.http_method, "PUT");
        assert_eq!(req.path, "/items/7");
        assert_eq!(req.body, b"payload");
        assert!(req.path_parameters.is_empty());
        assert_eq!(req.remote_addr, "");
    }

    #[test]
    fn joins_repeated_query_parameters() {
        let parts = parts(Request::builder().uri("/?tag=a&tag=b&name=x%20y&empty="));
        let req = build_http_request(&parts, None, Vec::new());

        assert_eq!(req.query_string_parameters["tag"], "a,b");
        assert_eq!(req.query_string_parameters["name"], "x y");
        assert_eq!(req.query_string_parameters["empty"], "");
    }

    #[test]
    fn joins_repeated_headers() {
        let parts = parts(
            Request::builder()
                .uri("/")
                .header("accept", "text/plain")
                .header("accept", "application/json")
                .header("x-single", "1"),
        );
        let req = build_http_request(&parts, None, Vec::new());

        assert_eq!(req.headers["accept"], "text/plain,application/json");
        assert_eq!(req.header("X-Single"), Some("1"));
    }

    #[test]
    fn remote_addr_from_connection() {
        let parts = parts(Request::builder().uri("/"));
        let addr: SocketAddr = "10.0.0.1:4321".parse().unwrap();
        let req = build_http_request(&parts, Some(addr), Vec::new());
        assert_eq!(req.remote_addr, "10.0.0.1:4321");
    }

    #[test]
    fn real_ip_and_port_override_remote_addr() {
        let addr: SocketAddr = "10.0.0.1:4321".parse().unwrap();

        let both = parts(
            Request::builder()
                .uri("/")
                .header("x-real-ip", "1.2.3.4")
                .header("x-real-port", "80"),
        );
        assert_eq!(build_http_request(&both, Some(addr), Vec::new()).remote_addr, "1.2.3.4:80");

        let ip_only = parts(Request::builder().uri("/").header("x-real-ip", "1.2.3.4"));
        assert_eq!(
            build_http_request(&ip_only, Some(addr), Vec::new()).remote_addr,
            "10.0.0.1:4321"
        );
    }

    #[test]
    fn malformed_query_pair_drops_only_itself() {
        let parts = parts(Request::builder().uri("/?a=1&bad=%zz&b=2&&a=3&c;d=4&tail=%4"));
        let req = build_http_request(&parts, None, Vec::new());

        assert_eq!(req.query_string_parameters.len(), 2);
        assert_eq!(req.query_string_parameters["a"], "1,3");
        assert_eq!(req.query_string_parameters["b"], "2");
    }

    #[test]
    fn escape_validation() {
        assert!(has_valid_escapes("plain"));
        assert!(has_valid_escapes("x%20y%2Fz"));
        assert!(!has_valid_escapes("%zz"));
        assert!(!has_valid_escapes("end%4"));
        assert!(!has_valid_escapes("%%41"));
    }
}
