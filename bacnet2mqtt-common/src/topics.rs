use crate::object::{ObjectId, component_type};

/// Prefix for telemetry state topics (Home Assistant discovery layout).
pub const STATE_PREFIX: &str = "homeassistant";

/// Prefix for inbound write-command topics.
pub const WRITE_PREFIX: &str = "bacnetwrite";

/// Prefix for write-status feedback topics.
pub const WRITE_STATUS_PREFIX: &str = "bacnetwrite_status";

/// Prefix for bridge availability topics.
pub const BRIDGE_PREFIX: &str = "bacnet2mqtt";

/// Telemetry state topic for one object:
/// `homeassistant/<component>/<gatewayId>/<type>_<instance>/state`.
///
/// The component token is derived from the object type code.
pub fn state_topic(gateway_id: &str, object: &ObjectId) -> String {
    format!(
        "{}/{}/{}/{}/state",
        STATE_PREFIX,
        component_type(object.object_type),
        gateway_id,
        object.key()
    )
}

/// Subscription filter matching every write command addressed to this
/// gateway: `bacnetwrite/<gatewayId>/+/+/+/set`.
pub fn command_topic_filter(gateway_id: &str) -> String {
    format!("{}/{}/+/+/+/set", WRITE_PREFIX, gateway_id)
}

/// Write-status topic:
/// `bacnetwrite_status/<gatewayId>/<deviceId>/<type>_<instance>/<propertyId>`.
pub fn write_status_topic(
    gateway_id: &str,
    device_id: &str,
    object: &ObjectId,
    property_id: u32,
) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        WRITE_STATUS_PREFIX,
        gateway_id,
        device_id,
        object.key(),
        property_id
    )
}

/// Retained availability topic: `bacnet2mqtt/<gatewayId>/bridge/state`.
pub fn availability_topic(gateway_id: &str) -> String {
    format!("{}/{}/bridge/state", BRIDGE_PREFIX, gateway_id)
}

/// Decomposed write-command topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommandTopic {
    pub gateway_id: String,
    pub device_id: String,
    pub object: ObjectId,
    pub property_id: u32,
}

/// Parse a topic of shape
/// `bacnetwrite/<gatewayId>/<deviceId>/<type>_<instance>/<propertyId>/set`.
///
/// Returns `None` if the topic does not match the pattern. The caller
/// decides whether a mismatching gateway id is an error or routine
/// cross-gateway traffic on a shared broker.
pub fn parse_command_topic(topic: &str) -> Option<ParsedCommandTopic> {
    let parts: Vec<&str> = topic.split('/').collect();

    if parts.len() != 6 || parts[0] != WRITE_PREFIX || parts[5] != "set" {
        return None;
    }

    let object: ObjectId = parts[3].parse().ok()?;
    let property_id = parts[4].parse::<u32>().ok()?;

    Some(ParsedCommandTopic {
        gateway_id: parts[1].to_string(),
        device_id: parts[2].to_string(),
        object,
        property_id,
    })
}
