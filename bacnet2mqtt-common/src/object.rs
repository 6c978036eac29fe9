use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Property identifier for Present_Value.
pub const PROP_PRESENT_VALUE: u32 = 85;

/// Property identifier for Object_List on the device object.
pub const PROP_OBJECT_LIST: u32 = 76;

/// BACnet object identifier: object type code plus instance number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// Object type code (0 = analog-input, 3 = binary-input, ...).
    #[serde(rename = "type")]
    pub object_type: u16,

    /// Non-negative instance number, unique per type on a device.
    pub instance: u32,
}

impl ObjectId {
    pub fn new(object_type: u16, instance: u32) -> Self {
        Self {
            object_type,
            instance,
        }
    }

    /// Object key used in topics and poll results: `<type>_<instance>`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.object_type, self.instance)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.object_type, self.instance)
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (t, i) = s
            .split_once('_')
            .ok_or_else(|| Error::Topic(format!("Invalid object key '{}'", s)))?;

        let object_type = t
            .parse::<u16>()
            .map_err(|_| Error::Topic(format!("Invalid object type in key '{}'", s)))?;
        let instance = i
            .parse::<u32>()
            .map_err(|_| Error::Topic(format!("Invalid object instance in key '{}'", s)))?;

        Ok(ObjectId {
            object_type,
            instance,
        })
    }
}

/// Map an object type code to the messaging-domain component token used
/// in telemetry topics.
///
/// Binary object kinds become `binary_sensor`, everything else is
/// published as a plain `sensor`.
pub fn component_type(object_type: u16) -> &'static str {
    match object_type {
        // binary-input, binary-output, binary-value
        3 | 4 | 5 => "binary_sensor",
        _ => "sensor",
    }
}
