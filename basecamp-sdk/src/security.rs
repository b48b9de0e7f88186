// ABOUTME: Security guards shared across the SDK
// ABOUTME: Bounded body reads, origin comparison, and endpoint scheme checks

use futures_util::StreamExt;
use url::Url;

use crate::error::{Error, Result};

/// Reads a response body up to `max_bytes`, failing once the limit is crossed.
///
/// The body is consumed as a stream so an oversized response is rejected
/// without ever buffering more than the limit.
pub(crate) async fn read_body_limited(
    response: reqwest::Response,
    max_bytes: usize,
) -> Result<Vec<u8>> {
    let status = response.status().as_u16();
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > max_bytes {
            return Err(Error::api(
                status,
                format!("Response body exceeds {max_bytes} byte limit"),
            ));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Whether two URLs share an origin: scheme, host (case-insensitive), and
/// port after normalizing scheme defaults (http 80, https 443).
pub(crate) fn is_same_origin(a: &Url, b: &Url) -> bool {
    let host_a = a.host_str().map(str::to_ascii_lowercase);
    let host_b = b.host_str().map(str::to_ascii_lowercase);
    a.scheme() == b.scheme()
        && host_a.is_some()
        && host_a == host_b
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Whether the URL points at the local machine.
pub(crate) fn is_localhost(url: &Url) -> bool {
    match url.host_str().map(str::to_ascii_lowercase).as_deref() {
        Some("localhost") | Some("127.0.0.1") | Some("[::1]") | Some("::1") => true,
        Some(host) => host.ends_with(".localhost"),
        None => false,
    }
}

/// Rejects URLs that would send credentials over plaintext to a remote host.
pub(crate) fn require_https(url: &Url) -> Result<()> {
    if url.scheme() == "https" || is_localhost(url) {
        return Ok(());
    }
    Err(Error::usage(format!(
        "Insecure URL {url}: only https or localhost endpoints are allowed"
    )))
}
