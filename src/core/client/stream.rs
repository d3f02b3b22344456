// src/core/client/stream.rs

//! An enum to abstract over different stream types (plain TCP or TLS),
//! allowing the polling logic to be generic over the transport layer.

use crate::config::Endpoint;
use crate::core::FleetMonError;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::{TlsConnector, rustls};

pub enum SiteStream {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl SiteStream {
    /// Opens a connection to the endpoint, wrapping it in TLS before the
    /// first byte when requested. A timeout is reported distinctly from a
    /// refused or failed connect, because the two are logged differently.
    pub async fn connect(
        endpoint: &Endpoint,
        tls_enabled: bool,
        timeout: Duration,
    ) -> Result<Self, FleetMonError> {
        let addr = format!("{}:{}", endpoint.host, endpoint.port);
        let tcp_stream = match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Err(_) => return Err(FleetMonError::ConnectTimeout(timeout)),
            Ok(Err(e)) => return Err(FleetMonError::ConnectError(format!("{addr}: {e}"))),
            Ok(Ok(stream)) => stream,
        };

        if !tls_enabled {
            return Ok(SiteStream::Tcp(tcp_stream));
        }

        let mut root_cert_store = rustls::RootCertStore::empty();
        root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(tls_config));

        let domain = rustls::pki_types::ServerName::try_from(endpoint.host.as_str())
            .map_err(|_| FleetMonError::TlsError(format!("Invalid TLS domain name '{}'", endpoint.host)))?
            .to_owned();

        let tls_stream = match tokio::time::timeout(timeout, connector.connect(domain, tcp_stream)).await {
            Err(_) => return Err(FleetMonError::ConnectTimeout(timeout)),
            Ok(Err(e)) => return Err(FleetMonError::TlsError(format!("Handshake with {addr} failed: {e}"))),
            Ok(Ok(stream)) => stream,
        };
        Ok(SiteStream::Tls(Box::new(tls_stream)))
    }
}

// --- Trait Implementations for SiteStream ---
// These implementations simply delegate the calls to the underlying stream type.

impl AsyncRead for SiteStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SiteStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            SiteStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SiteStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        match self.get_mut() {
            SiteStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            SiteStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            SiteStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            SiteStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            SiteStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            SiteStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
