//! Infrared remote-control hand-off
//!
//! The server ships IR codes as hex strings inside the control directive. This
//! module only validates and carries the bytes; bit timing belongs to the
//! transmitter implementation.

use std::fmt;

use crate::{Error, Result};

/// Raw IR frame bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrCode(Vec<u8>);

impl IrCode {
    /// Parse a hex string such as `"b24d1fe040bf"`
    ///
    /// # Errors
    ///
    /// Returns error if the string is empty, has odd length or is not hex
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let trimmed = hex_str.trim();
        if trimmed.is_empty() {
            return Err(Error::Ir("empty ir code".to_string()));
        }
        if trimmed.len() % 2 != 0 {
            return Err(Error::Ir(format!(
                "ir code has odd length {}",
                trimmed.len()
            )));
        }
        Ok(Self(hex::decode(trimmed)?))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for IrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// Sends IR frames
pub trait IrTransmitter: Send {
    /// Emit one code
    ///
    /// # Errors
    ///
    /// Returns error if the hardware rejects the code
    fn transmit(&mut self, code: &IrCode) -> Result<()>;
}

/// [`IrTransmitter`] for hosts without an IR LED
#[derive(Debug, Default)]
pub struct LogIrTransmitter {
    sent: usize,
}

impl LogIrTransmitter {
    /// Codes transmitted so far
    #[must_use]
    pub const fn sent(&self) -> usize {
        self.sent
    }
}

impl IrTransmitter for LogIrTransmitter {
    fn transmit(&mut self, code: &IrCode) -> Result<()> {
        self.sent += 1;
        tracing::info!(bytes = code.len(), code = %code, "ir transmit");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_code() {
        let code = IrCode::from_hex("B24D1FE040BF").unwrap();
        assert_eq!(code.as_bytes(), &[0xB2, 0x4D, 0x1F, 0xE0, 0x40, 0xBF]);
        assert_eq!(code.to_string(), "b24d1fe040bf");
    }

    #[test]
    fn test_reject_malformed_codes() {
        assert!(matches!(IrCode::from_hex(""), Err(Error::Ir(_))));
        assert!(matches!(IrCode::from_hex("abc"), Err(Error::Ir(_))));
        assert!(matches!(IrCode::from_hex("zz"), Err(Error::Hex(_))));
    }

    #[test]
    fn test_log_transmitter_counts() {
        let mut tx = LogIrTransmitter::default();
        let code = IrCode::from_hex("00ff").unwrap();
        tx.transmit(&code).unwrap();
        tx.transmit(&code).unwrap();
        assert_eq!(tx.sent(), 2);
    }
}
