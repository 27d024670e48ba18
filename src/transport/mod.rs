//! Network links to the assistant server
//!
//! Each link implements [`Transport`] so the session logic never branches on
//! link type.

mod cellular;
mod tcp;

use std::time::Duration;

use async_trait::async_trait;

pub use cellular::CellularTransport;
pub use tcp::TcpTransport;

use crate::Result;

/// Byte stream to the assistant server
#[async_trait]
pub trait Transport: Send {
    /// Short link name for logs
    fn name(&self) -> &'static str;

    /// Open a connection to `host:port`
    async fn connect(&mut self, host: &str, port: u16) -> Result<()>;

    /// Send all of `data`
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Wait for the next inbound chunk
    ///
    /// Returns `Ok(0)` when the peer ends the stream and
    /// [`Error::Timeout`](crate::Error::Timeout) when nothing arrives for `idle`.
    async fn receive_chunk(&mut self, buf: &mut [u8], idle: Duration) -> Result<usize>;

    /// Close the connection; closing an already closed link is not an error
    async fn close(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;
}
