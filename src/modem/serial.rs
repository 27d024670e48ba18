//! UART access for the cellular module

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};

use crate::Result;

/// Read timeout on the underlying port; reads are gated by `bytes_to_read`
const PORT_TIMEOUT: Duration = Duration::from_millis(10);

/// Byte-level serial link owned by a [`Modem`](super::Modem)
pub trait SerialLink: Send {
    /// Reconfigure the link baud rate
    ///
    /// # Errors
    ///
    /// Returns error if the port rejects the rate
    fn set_baud_rate(&mut self, baud: u32) -> Result<()>;

    /// Write all bytes
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Read whatever is already buffered, returning 0 if nothing is
    ///
    /// # Errors
    ///
    /// Returns error on a hard port failure
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Discard pending input
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be cleared
    fn clear_input(&mut self) -> Result<()>;
}

/// [`SerialLink`] backed by a host serial device
pub struct UartPort {
    port: Box<dyn SerialPort>,
}

impl UartPort {
    /// Open `path` at `baud`
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(path, baud).timeout(PORT_TIMEOUT).open()?;
        tracing::debug!(path, baud, "serial port opened");
        Ok(Self { port })
    }
}

impl SerialLink for UartPort {
    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        self.port.set_baud_rate(baud)?;
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pending = usize::try_from(self.port.bytes_to_read()?).unwrap_or(usize::MAX);
        if pending == 0 || buf.is_empty() {
            return Ok(0);
        }

        let want = pending.min(buf.len());
        match self.port.read(&mut buf[..want]) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
