//! Control directive sent ahead of the spoken reply

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::ir::IrCode;

/// Top-level reply envelope: `{"control": {...}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlDirective {
    #[serde(default)]
    pub control: Control,
}

/// Device action requested by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    /// Whether the fields below describe an action to carry out
    #[serde(default)]
    pub has_command: bool,

    /// Device being addressed (e.g. "air_conditioner")
    #[serde(default)]
    pub target: String,

    #[serde(default)]
    pub action: String,

    #[serde(default)]
    pub value: String,

    /// Hex-encoded IR frame, when the action is an IR command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ir_code: Option<String>,
}

impl ControlDirective {
    /// Parse from the JSON text the server sends
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed
    pub fn from_json(json: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(json)?)
    }

    #[must_use]
    pub const fn has_command(&self) -> bool {
        self.control.has_command
    }

    /// The IR code to send, if this directive carries one
    ///
    /// Only commands yield a code; an absent or blank `ir_code` is `None`.
    ///
    /// # Errors
    ///
    /// Returns error if the code is present but malformed
    pub fn ir_code(&self) -> Result<Option<IrCode>> {
        if !self.control.has_command {
            return Ok(None);
        }
        match self.control.ir_code.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(hex) => IrCode::from_hex(hex).map(Some),
        }
    }
}
