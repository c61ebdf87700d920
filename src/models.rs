// ABOUTME: Wire data model for the HTTP submission endpoint and the bus-carried SMS/ACK/DLR events
// ABOUTME: Serialized as JSON; optional echo fields are omitted when empty to mirror upstream behavior

use serde::{Deserialize, Serialize};

/// An outbound (MO) submission, also the payload carried on the MT receive subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sms {
    pub from: String,
    pub to: String,
    pub data: String,
    pub message_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub route_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub smsc_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub smsc_status: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub smsc_extra: String,
}

/// Local acknowledgment that an MO was accepted by the SMSC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub from: String,
    pub to: String,
    pub message_id: String,
    pub route_id: String,
    pub smsc_id: String,
    pub smsc_status: String,
}

/// A parsed SMSC delivery receipt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dlr {
    pub from: String,
    pub to: String,
    pub route_id: String,
    pub smsc_id: String,
    pub smsc_status: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub sub: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub dlvrd: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub submitted_date: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub done_date: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub err: String,
    pub smsc_extra: String,
}

/// Durable queue subjects and consumer naming, keyed off a route id.
///
/// Any composition that drops the route id produces a durable shared across
/// routes and corrupts consumption; always go through these helpers.
pub fn sms_send_subject(route_id: &str) -> String {
    format!("{route_id}.message.send")
}

pub fn sms_send_ack_subject(route_id: &str) -> String {
    format!("{route_id}.message.ack")
}

pub fn sms_receive_subject(route_id: &str) -> String {
    format!("{route_id}.message.receive")
}

pub fn sms_send_dlr_subject(route_id: &str) -> String {
    format!("{route_id}.message.dlr")
}

pub fn send_durable_name(route_id: &str) -> String {
    format!("{route_id}_send_sub")
}

pub fn send_ack_durable_name(route_id: &str) -> String {
    format!("{route_id}_send_ack")
}

pub fn receive_mt_durable_name(route_id: &str) -> String {
    format!("{route_id}_receive_mt")
}

pub fn receive_dlr_durable_name(route_id: &str) -> String {
    format!("{route_id}_receive_dlr")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durable_names_interpolate_route_id() {
        assert_eq!(send_durable_name("r1"), "r1_send_sub");
        assert_eq!(send_ack_durable_name("r1"), "r1_send_ack");
        assert_eq!(receive_mt_durable_name("r1"), "r1_receive_mt");
        assert_eq!(receive_dlr_durable_name("r1"), "r1_receive_dlr");
    }

    #[test]
    fn sms_round_trips_through_json() {
        let sms = Sms {
            from: "SVC".into(),
            to: "254700000001".into(),
            data: "hello".into(),
            message_id: "m1".into(),
            route_id: "r1".into(),
            smsc_id: String::new(),
            smsc_status: String::new(),
            smsc_extra: String::new(),
        };
        let encoded = serde_json::to_string(&sms).unwrap();
        assert!(!encoded.contains("smsc_id"));
        let decoded: Sms = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.from, sms.from);
        assert_eq!(decoded.to, sms.to);
        assert_eq!(decoded.data, sms.data);
        assert_eq!(decoded.message_id, sms.message_id);
    }
}
