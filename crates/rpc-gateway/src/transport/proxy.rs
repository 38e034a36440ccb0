//! Proxy tunnels (HTTP CONNECT and SOCKS5)

use rpc_common::{ProxyConfig, ProxyScheme};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;

use crate::error::ConnectError;

// Upper bound for a CONNECT response header
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// Open a TCP stream to `host:port`, through `proxy` if given
///
/// Failures talking to the proxy are reported as `ConnectError::Proxy`.
pub async fn open_tunnel(
    host: &str,
    port: u16,
    proxy: Option<&ProxyConfig>,
) -> Result<TcpStream, ConnectError> {
    let Some(proxy) = proxy else {
        return Ok(TcpStream::connect((host, port)).await?);
    };

    tracing::debug!(proxy = %proxy.url(), target = %format!("{host}:{port}"), "Opening proxy tunnel");

    match proxy.scheme {
        ProxyScheme::Http => http_connect(proxy, host, port).await,
        ProxyScheme::Socks5 => {
            let stream = Socks5Stream::connect(proxy.address().as_str(), (host, port))
                .await
                .map_err(|e| ConnectError::Proxy(format!("SOCKS5: {e}")))?;
            Ok(stream.into_inner())
        }
    }
}

async fn http_connect(proxy: &ProxyConfig, host: &str, port: u16) -> Result<TcpStream, ConnectError> {
    let mut stream = TcpStream::connect(proxy.address())
        .await
        .map_err(|e| ConnectError::Proxy(format!("cannot reach proxy: {e}")))?;

    let request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| ConnectError::Proxy(e.to_string()))?;

    // Read byte-wise so nothing after the header is consumed
    let mut response = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        if response.len() >= MAX_CONNECT_RESPONSE {
            return Err(ConnectError::Proxy("CONNECT response too large".to_string()));
        }
        let read = stream
            .read(&mut byte)
            .await
            .map_err(|e| ConnectError::Proxy(e.to_string()))?;
        if read == 0 {
            return Err(ConnectError::Proxy("proxy closed the connection".to_string()));
        }
        response.push(byte[0]);
    }

    let status = parse_status(&response)
        .ok_or_else(|| ConnectError::Proxy("malformed CONNECT response".to_string()))?;
    if !(200..300).contains(&status) {
        return Err(ConnectError::Proxy(format!("CONNECT refused with HTTP {status}")));
    }

    Ok(stream)
}

/// Status code of an HTTP/1.x response head
fn parse_status(head: &[u8]) -> Option<u16> {
    let text = std::str::from_utf8(head).ok()?;
    let status_line = text.lines().next()?;
    let mut parts = status_line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/1.") {
        return None;
    }
    parts.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status(b"HTTP/1.1 200 Connection established\r\n\r\n"), Some(200));
        assert_eq!(parse_status(b"HTTP/1.0 407 Proxy Authentication Required\r\n\r\n"), Some(407));
        assert_eq!(parse_status(b"SSH-2.0-OpenSSH\r\n\r\n"), None);
    }

    async fn fake_proxy(reply: &'static [u8]) -> ProxyConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            assert!(String::from_utf8_lossy(&buf[..n]).starts_with("CONNECT gateway.test:443"));
            socket.write_all(reply).await.unwrap();
            // Keep the socket open for the caller
            let _ = socket.read(&mut buf).await;
        });
        ProxyConfig::parse(&format!("http://127.0.0.1:{port}")).unwrap()
    }

    #[tokio::test]
    async fn test_http_connect_success() {
        let proxy = fake_proxy(b"HTTP/1.1 200 OK\r\n\r\n").await;
        assert!(open_tunnel("gateway.test", 443, Some(&proxy)).await.is_ok());
    }

    #[tokio::test]
    async fn test_http_connect_refused_is_proxy_error() {
        let proxy = fake_proxy(b"HTTP/1.1 403 Forbidden\r\n\r\n").await;
        let err = open_tunnel("gateway.test", 443, Some(&proxy)).await.unwrap_err();
        assert!(err.is_proxy());
    }

    #[tokio::test]
    async fn test_unreachable_proxy_is_proxy_error() {
        let proxy = ProxyConfig::parse("http://127.0.0.1:9").unwrap();
        let err = open_tunnel("gateway.test", 443, Some(&proxy)).await.unwrap_err();
        assert!(err.is_proxy());
    }

    /// SOCKS5 server that answers the method negotiation with `method`
    /// and, if it accepted, grants the CONNECT request
    async fn fake_socks5(method: u8) -> ProxyConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 512];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(buf[0], 5);
            assert!(n >= 3);
            socket.write_all(&[5, method]).await.unwrap();
            if method == 0 {
                let n = socket.read(&mut buf).await.unwrap();
                // Domain target, resolved by the proxy
                assert_eq!(&buf[..4], &[5, 1, 0, 3]);
                assert_eq!(&buf[5..n - 2], b"gateway.test");
                socket.write_all(&[5, 0, 0, 1, 127, 0, 0, 1, 0, 80]).await.unwrap();
            }
            let _ = socket.read(&mut buf).await;
        });
        ProxyConfig::parse(&format!("socks5://127.0.0.1:{port}")).unwrap()
    }

    #[tokio::test]
    async fn test_socks5_success() {
        let proxy = fake_socks5(0).await;
        assert!(open_tunnel("gateway.test", 443, Some(&proxy)).await.is_ok());
    }

    #[tokio::test]
    async fn test_socks5_refused_is_proxy_error() {
        // No acceptable authentication method
        let proxy = fake_socks5(0xFF).await;
        let err = open_tunnel("gateway.test", 443, Some(&proxy)).await.unwrap_err();
        assert!(err.is_proxy());
    }

    #[tokio::test]
    async fn test_unreachable_socks5_is_proxy_error() {
        let proxy = ProxyConfig::parse("socks5://127.0.0.1:9").unwrap();
        let err = open_tunnel("gateway.test", 443, Some(&proxy)).await.unwrap_err();
        assert!(err.is_proxy());
    }
}
