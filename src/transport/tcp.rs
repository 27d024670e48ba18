//! Plain TCP link (Wi-Fi or wired)

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::Transport;
use crate::{Error, Result};

/// Connect attempt deadline
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`Transport`] over a host TCP socket
#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
}

impl TcpTransport {
    #[must_use]
    pub const fn new() -> Self {
        Self { stream: None }
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::Transport("not connected".to_string()))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.stream = None;

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::Timeout(format!("connecting to {host}:{port}")))?
            .map_err(|e| Error::Transport(format!("connect to {host}:{port} failed: {e}")))?;
        stream.set_nodelay(true)?;

        tracing::debug!(host, port, "tcp connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream()?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn receive_chunk(&mut self, buf: &mut [u8], idle: Duration) -> Result<usize> {
        let stream = self.stream()?;
        match tokio::time::timeout(idle, stream.read(buf)).await {
            Ok(read) => Ok(read?),
            Err(_) => Err(Error::Timeout(format!(
                "no data for {}ms",
                idle.as_millis()
            ))),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(error = %e, "tcp shutdown failed");
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_exchange_with_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(b"pong").await.unwrap();
            buf
        });

        let mut transport = TcpTransport::new();
        transport.connect("127.0.0.1", port).await.unwrap();
        assert!(transport.is_connected());
        transport.send(b"hello").await.unwrap();

        let mut buf = [0u8; 16];
        let mut received = Vec::new();
        loop {
            let n = transport
                .receive_chunk(&mut buf, Duration::from_secs(2))
                .await
                .unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }

        assert_eq!(received, b"pong");
        assert_eq!(&server.await.unwrap(), b"hello");

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_idle_receive_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let mut transport = TcpTransport::new();
        transport.connect("127.0.0.1", port).await.unwrap();

        let mut buf = [0u8; 8];
        let result = transport
            .receive_chunk(&mut buf, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_send_without_connect_fails() {
        let mut transport = TcpTransport::new();
        assert!(matches!(
            transport.send(b"x").await,
            Err(Error::Transport(_))
        ));
        tokio_test::assert_ok!(transport.close().await);
    }
}
