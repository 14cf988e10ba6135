//! Connectivity probe.
//!
//! Fetches the check page over a plain hyper HTTP/1.1 connection and looks
//! for a proof phrase. The request goes out like any other request from the
//! app, so it only succeeds when traffic is actually being proxied.

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use http_body_util::{BodyExt, Empty, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HOST, USER_AGENT};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};
use url::Url;

/// Check pages are small; anything bigger is not the page we want.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Outcome of a connectivity check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connectivity {
    /// A proof phrase was found in the check page
    pub ok: bool,
    /// Human-readable explanation
    pub detail: String,
}

#[derive(Debug, Error)]
enum ProbeError {
    #[error("network timeout")]
    NetworkTimeout,

    #[error("network error: {0}")]
    NetworkError(String),
}

/// Aborts the spawned connection task when the probe is done or cancelled.
struct ConnectionGuard(JoinHandle<()>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Tor connectivity probe.
pub struct ConnectivityProbe {
    check_url: String,
    proof_phrases: Vec<String>,
    user_agent: String,
    tls: TlsConnector,
}

impl ConnectivityProbe {
    pub fn new(config: &ProxyConfig) -> Self {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Self {
            check_url: config.check_url.clone(),
            proof_phrases: config
                .proof_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            user_agent: config.user_agent.clone(),
            tls: TlsConnector::from(Arc::new(tls_config)),
        }
    }

    /// Fetch the check page within `timeout`.
    ///
    /// Network failures and timeouts are reported as `ok: false`. Only a
    /// malformed check URL is an error.
    pub async fn check(&self, timeout: Duration) -> Result<Connectivity, ProxyError> {
        let url = self.parse_url()?;
        let start = Instant::now();

        let result = match tokio::time::timeout(timeout, self.fetch(&url)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::NetworkTimeout),
        };

        let connectivity = match result {
            Ok((status, body)) => {
                let body = body.to_lowercase();
                match self.proof_phrases.iter().find(|p| body.contains(p.as_str())) {
                    Some(phrase) => Connectivity {
                        ok: true,
                        detail: format!("check page confirmed ('{}')", phrase),
                    },
                    None => Connectivity {
                        ok: false,
                        detail: format!("HTTP {}: traffic is not proxied", status.as_u16()),
                    },
                }
            }
            Err(e) => {
                warn!("Connectivity check failed: {}", e);
                Connectivity {
                    ok: false,
                    detail: e.to_string(),
                }
            }
        };

        info!(
            "Connectivity check {} in {:?}",
            if connectivity.ok { "passed" } else { "failed" },
            start.elapsed()
        );
        Ok(connectivity)
    }

    fn parse_url(&self) -> Result<Url, ProxyError> {
        let invalid = |reason: String| ProxyError::InvalidProbeUrl {
            url: self.check_url.clone(),
            reason,
        };

        let url = Url::parse(&self.check_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(invalid("no host".to_string()));
        }
        Ok(url)
    }

    async fn fetch(&self, url: &Url) -> Result<(StatusCode, String), ProbeError> {
        let host = url
            .host_str()
            .ok_or_else(|| ProbeError::NetworkError("no host".to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProbeError::NetworkError("no port".to_string()))?;
        let is_https = url.scheme() == "https";

        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let host_header = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let request = Request::builder()
            .uri(path)
            .header(HOST, host_header)
            .header(USER_AGENT, &self.user_agent)
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeError::NetworkError(e.to_string()))?;

        let stream = tokio::net::TcpStream::connect((host, port))
            .await
            .map_err(|e| ProbeError::NetworkError(format!("connect: {e}")))?;

        let (response, _guard) = if is_https {
            let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
                .map_err(|_| ProbeError::NetworkError("invalid server name".to_string()))?;
            let tls_stream = self
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|e| ProbeError::NetworkError(format!("tls: {e}")))?;
            send(tls_stream, request).await?
        } else {
            send(stream, request).await?
        };

        let status = response.status();
        let collected = Limited::new(response.into_body(), MAX_BODY_SIZE)
            .collect()
            .await
            .map_err(|e| ProbeError::NetworkError(format!("body: {e}")))?;
        let body = String::from_utf8_lossy(&collected.to_bytes()).into_owned();

        debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok((status, body))
    }
}

async fn send<S>(
    stream: S,
    request: Request<Empty<Bytes>>,
) -> Result<(Response<Incoming>, ConnectionGuard), ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| ProbeError::NetworkError(e.to_string()))?;

    let guard = ConnectionGuard(tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("Probe connection closed: {}", e);
        }
    }));

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| ProbeError::NetworkError(e.to_string()))?;
    Ok((response, guard))
}

impl std::fmt::Debug for ConnectivityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityProbe")
            .field("check_url", &self.check_url)
            .field("proof_phrases", &self.proof_phrases)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn probe_for(url: String) -> ConnectivityProbe {
        ConnectivityProbe::new(&ProxyConfig {
            check_url: url,
            ..ProxyConfig::default()
        })
    }

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_proof_phrase_detected() {
        let url =
            serve_once("<h1>Congratulations. This browser is configured to use Tor.</h1>").await;
        let result = probe_for(url).check(Duration::from_secs(5)).await.unwrap();
        assert!(result.ok, "{}", result.detail);
    }

    #[tokio::test]
    async fn test_missing_phrase_is_not_ok() {
        let url = serve_once("<h1>Sorry. You are not using Tor.</h1>").await;
        let result = probe_for(url).check(Duration::from_secs(5)).await.unwrap();
        assert!(!result.ok);
        assert!(result.detail.contains("200"));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out_quickly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and never answer
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                if let Ok((socket, _)) = listener.accept().await {
                    held.push(socket);
                }
            }
        });

        let probe = probe_for(format!("http://{}/", addr));
        let start = Instant::now();
        let result = probe.check(Duration::from_millis(1)).await.unwrap();

        assert!(!result.ok);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_refused_connection_is_not_ok() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = probe_for(format!("http://{}/", addr))
            .check(Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!result.ok);
    }

    #[tokio::test]
    async fn test_invalid_url_is_error() {
        for url in ["not a url", "ftp://example.com/"] {
            let err = probe_for(url.to_string())
                .check(Duration::from_secs(1))
                .await
                .unwrap_err();
            assert!(matches!(err, ProxyError::InvalidProbeUrl { .. }));
        }
    }
}
