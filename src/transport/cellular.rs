//! Cellular link through the AT-command module

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep};

use super::Transport;
use crate::modem::{Modem, ModemHealth, ModemState, PowerControl, SerialLink};
use crate::{Error, Result};

/// Largest single `AT+MIPSEND` payload
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Pause between upload chunks
const CHUNK_PAUSE: Duration = Duration::from_millis(5);

/// Settle time between opening the socket and the first send
const SEND_SETTLE: Duration = Duration::from_millis(200);

/// Back-off while no payload is buffered
const RECEIVE_POLL: Duration = Duration::from_millis(2);

/// [`Transport`] over a [`Modem`] TCP socket
///
/// Owns the receive loop: [`receive_chunk`](Transport::receive_chunk) pumps
/// the UART and pops demultiplexed payload until data arrives or the link
/// goes idle.
pub struct CellularTransport<S, P> {
    modem: Modem<S, P>,
    chunk_size: usize,
    settle_pending: bool,
}

impl<S: SerialLink, P: PowerControl> CellularTransport<S, P> {
    /// Wrap a modem that has already been brought up
    pub fn new(modem: Modem<S, P>) -> Self {
        Self::with_chunk_size(modem, DEFAULT_CHUNK_SIZE)
    }

    /// Wrap a modem with a custom upload chunk size (clamped to at least 1)
    pub fn with_chunk_size(modem: Modem<S, P>, chunk_size: usize) -> Self {
        Self {
            modem,
            chunk_size: chunk_size.max(1),
            settle_pending: false,
        }
    }

    #[must_use]
    pub const fn modem(&self) -> &Modem<S, P> {
        &self.modem
    }

    pub const fn modem_mut(&mut self) -> &mut Modem<S, P> {
        &mut self.modem
    }

    /// Give the modem back
    pub fn into_inner(self) -> Modem<S, P> {
        self.modem
    }
}

#[async_trait]
impl<S: SerialLink, P: PowerControl> Transport for CellularTransport<S, P> {
    fn name(&self) -> &'static str {
        "cellular"
    }

    async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if self.modem.health() == ModemHealth::NotResponding {
            return Err(Error::Modem("module not responding".to_string()));
        }
        if !self.modem.connect_tcp(host, port).await? {
            return Err(Error::Transport(format!(
                "cellular connect to {host}:{port} failed"
            )));
        }
        self.settle_pending = true;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.settle_pending {
            sleep(SEND_SETTLE).await;
            self.settle_pending = false;
        }

        let total = data.chunks(self.chunk_size).len();
        for (index, chunk) in data.chunks(self.chunk_size).enumerate() {
            if !self.modem.send(chunk).await? {
                return Err(Error::Transport(format!(
                    "cellular send failed at chunk {}/{total}",
                    index + 1
                )));
            }
            if index + 1 < total {
                sleep(CHUNK_PAUSE).await;
            }
        }
        Ok(())
    }

    async fn receive_chunk(&mut self, buf: &mut [u8], idle: Duration) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let deadline = Instant::now() + idle;
        loop {
            let n = self.modem.pop_payload(buf);
            if n > 0 {
                return Ok(n);
            }

            if self.modem.pump()? > 0 {
                continue;
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "no data for {}ms",
                    idle.as_millis()
                )));
            }
            sleep(RECEIVE_POLL).await;
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.settle_pending = false;
        if !self.modem.close_tcp().await? {
            tracing::debug!("cellular close not acknowledged");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.modem.state() == ModemState::TcpOpen
    }
}
