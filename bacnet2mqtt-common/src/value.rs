use serde::{Deserialize, Serialize};

/// Scalar value carried between BACnet properties and MQTT payloads.
///
/// Serialized untagged, so a payload like `{"value": 42}` maps directly
/// onto the matching variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// BACnet NULL (used to relinquish a commanded priority slot).
    Null,

    /// Boolean value.
    Bool(bool),

    /// Non-negative integer.
    Unsigned(u64),

    /// Negative integer.
    Signed(i64),

    /// Floating point value.
    Real(f64),

    /// Character string.
    Text(String),
}

impl Value {
    /// Render the value as a JSON scalar string (the telemetry payload).
    pub fn to_json(&self) -> String {
        // Serialization of a scalar cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Unsigned(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Signed(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// BACnet application tag: the explicit value-type marker accompanying
/// a written value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ApplicationTag {
    Null = 0,
    Boolean = 1,
    UnsignedInt = 2,
    SignedInt = 3,
    Real = 4,
    Double = 5,
    CharacterString = 7,
    Enumerated = 9,
}

impl ApplicationTag {
    /// Numeric tag code used on the wire and in command payloads.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a tag by its numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ApplicationTag::Null),
            1 => Some(ApplicationTag::Boolean),
            2 => Some(ApplicationTag::UnsignedInt),
            3 => Some(ApplicationTag::SignedInt),
            4 => Some(ApplicationTag::Real),
            5 => Some(ApplicationTag::Double),
            7 => Some(ApplicationTag::CharacterString),
            9 => Some(ApplicationTag::Enumerated),
            _ => None,
        }
    }

    /// Infer the application tag from a value's primitive kind.
    ///
    /// Total over [`Value`]: booleans map to BOOLEAN, non-negative
    /// integers to UNSIGNED_INT, negative integers to SIGNED_INT,
    /// floats to REAL and text to CHARACTER_STRING. An explicit tag
    /// supplied with a write command always takes precedence over
    /// this inference.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Null => ApplicationTag::Null,
            Value::Bool(_) => ApplicationTag::Boolean,
            Value::Unsigned(_) => ApplicationTag::UnsignedInt,
            Value::Signed(n) if *n >= 0 => ApplicationTag::UnsignedInt,
            Value::Signed(_) => ApplicationTag::SignedInt,
            Value::Real(_) => ApplicationTag::Real,
            Value::Text(_) => ApplicationTag::CharacterString,
        }
    }
}
