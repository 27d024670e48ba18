//! Module supply and power-key control

/// Drive level for the module's power key line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLevel {
    High,
    Low,
    /// Line released (high impedance)
    Released,
}

/// GPIO lines wired to the cellular module
pub trait PowerControl: Send {
    /// Switch the module supply rail
    fn set_supply(&mut self, on: bool);

    /// Drive the power key
    fn set_power_key(&mut self, level: KeyLevel);
}

/// [`PowerControl`] for hosts without GPIO access; records transitions in the log
#[derive(Debug, Default)]
pub struct LogPowerControl;

impl PowerControl for LogPowerControl {
    fn set_supply(&mut self, on: bool) {
        tracing::debug!(on, "modem supply");
    }

    fn set_power_key(&mut self, level: KeyLevel) {
        tracing::debug!(?level, "modem power key");
    }
}
