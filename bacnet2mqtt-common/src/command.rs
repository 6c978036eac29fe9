//! Write command and write status types.
//!
//! Inbound MQTT command messages are decoded into a [`WriteCommand`],
//! the normalized form the orchestrator dispatches to the field
//! transport. The outcome flows back as a [`WriteStatus`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::object::ObjectId;
use crate::value::{ApplicationTag, Value};

/// JSON body of an inbound write-command message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WritePayload {
    /// Value to write.
    pub value: Value,

    /// Write priority 1..=16 (1 highest). Protocol default when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,

    /// Explicit application tag code; inferred from the value kind
    /// when omitted.
    #[serde(
        default,
        rename = "bacnetApplicationTag",
        skip_serializing_if = "Option::is_none"
    )]
    pub application_tag: Option<u8>,
}

/// A normalized, validated field write request.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCommand {
    pub device_id: String,
    pub object: ObjectId,
    pub property_id: u32,
    pub value: Value,
    pub priority: Option<u8>,
    pub application_tag: Option<ApplicationTag>,
}

impl WriteCommand {
    /// Build a command from a decomposed topic and payload, rejecting
    /// out-of-range priorities and unknown tag codes before any
    /// transport call is attempted.
    pub fn from_payload(
        device_id: impl Into<String>,
        object: ObjectId,
        property_id: u32,
        payload: WritePayload,
    ) -> Result<Self> {
        if let Some(priority) = payload.priority {
            if !(1..=16).contains(&priority) {
                return Err(Error::Validation(format!(
                    "priority {} out of range 1..=16",
                    priority
                )));
            }
        }

        let application_tag = match payload.application_tag {
            Some(code) => Some(ApplicationTag::from_code(code).ok_or_else(|| {
                Error::Validation(format!("unknown application tag code {}", code))
            })?),
            None => None,
        };

        Ok(WriteCommand {
            device_id: device_id.into(),
            object,
            property_id,
            value: payload.value,
            priority: payload.priority,
            application_tag,
        })
    }

    /// Tag to put on the wire: the explicit tag verbatim, otherwise
    /// inferred from the value kind.
    pub fn effective_tag(&self) -> ApplicationTag {
        self.application_tag
            .unwrap_or_else(|| ApplicationTag::infer(&self.value))
    }
}

/// Outcome of a write command, published as point-in-time feedback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WriteStatus {
    /// `"success"` or `"error"`.
    pub status: String,

    /// Human-readable detail (acknowledgement or error message).
    pub detail: String,
}

impl WriteStatus {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            detail: detail.into(),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            detail: detail.into(),
        }
    }
}
