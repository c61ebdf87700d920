// ABOUTME: Typed per-route configuration with defaults and coercion, loaded once at startup
// ABOUTME: Keyed `<route_id>.<name>` namespace plus the top-level `active_routes` list

use crate::datatypes::{NumericPlanIndicator, TypeOfNumber};
use crate::session::BindMode;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::path::Path;
use thiserror::Error;

/// Unrecoverable failure loading or parsing the settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// DLR request level requested on `SUBMIT_SM.registered_delivery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlrLevel {
    None,
    Final,
    Failure,
}

impl DlrLevel {
    fn from_u8(raw: u8) -> Self {
        match raw {
            2 => DlrLevel::Final,
            3 => DlrLevel::Failure,
            _ => DlrLevel::None,
        }
    }

    pub fn registered_delivery(self) -> u8 {
        match self {
            DlrLevel::None => 0,
            DlrLevel::Final => 2,
            DlrLevel::Failure => 3,
        }
    }
}

/// Settings snapshot for a single sub-route address.
#[derive(Debug, Clone)]
pub struct RouteSettings {
    pub route_id: String,
    pub addresses: Vec<String>,
    pub user: String,
    pub password: String,
    pub bind_type: BindMode,
    pub system_type: String,
    pub source_ton: TypeOfNumber,
    pub source_npi: NumericPlanIndicator,
    pub destination_ton: TypeOfNumber,
    pub destination_npi: NumericPlanIndicator,
    pub dlr_level: DlrLevel,
    pub sms_receive_url: String,
    pub sms_send_dlr_url: String,
    pub sms_send_ack_url: String,
    pub disable_tlv_options: bool,
    pub smsc_delivery_rate: u32,
    pub operates_synchronously: bool,
    pub dlr_text_err_quirk: bool,
}

/// Raw, file-backed key/value store, parsed into typed [`RouteSettings`] on demand.
///
/// Per-key lookups never fail: a missing or unparsable key degrades to its
/// documented default rather than propagating an error, matching the source's
/// tolerant behavior exactly. Only the initial file load can fail.
#[derive(Debug, Clone)]
pub struct Settings {
    raw: HashMap<String, String>,
}

impl Settings {
    /// Loads settings from a YAML file at `path`. The file is a flat mapping of
    /// string keys (`active_routes`, `<id>.addresses`, ...) to scalar values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, SettingsError> {
        let value: HashMap<String, serde_yaml::Value> =
            serde_yaml::from_str(contents).map_err(|source| SettingsError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        let mut raw = HashMap::new();
        for (key, val) in value {
            raw.insert(key, scalar_to_string(&val));
        }
        Ok(Self { raw })
    }

    /// Route ids enumerated under the top-level `active_routes` key.
    pub fn active_routes(&self) -> Vec<String> {
        self.raw
            .get("active_routes")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default()
    }

    fn get(&self, route_id: &str, name: &str) -> Option<&str> {
        self.raw
            .get(&format!("{route_id}.{name}"))
            .map(|s| s.as_str())
    }

    fn string(&self, route_id: &str, name: &str, default: &str) -> String {
        self.get(route_id, name).unwrap_or(default).to_string()
    }

    fn u32_or(&self, route_id: &str, name: &str, default: u32) -> u32 {
        self.get(route_id, name)
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    fn u8_or(&self, route_id: &str, name: &str, default: u8) -> u8 {
        self.get(route_id, name)
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    fn bool_or(&self, route_id: &str, name: &str, default: bool) -> bool {
        match self.get(route_id, name) {
            Some("true") | Some("1") | Some("yes") => true,
            Some("false") | Some("0") | Some("no") => false,
            _ => default,
        }
    }

    /// Builds a typed settings snapshot for one route id, substituting documented
    /// defaults for anything missing or unparsable.
    pub fn route_settings(&self, route_id: &str) -> RouteSettings {
        let addresses = self
            .get(route_id, "addresses")
            .map(|s| s.split(',').map(|a| a.trim().to_string()).collect())
            .unwrap_or_default();

        let bind_type = match self.get(route_id, "bindType") {
            Some("transmitter") => BindMode::Transmitter,
            _ => BindMode::Transceiver,
        };

        let source_ton =
            TypeOfNumber::try_from(self.u8_or(route_id, "source_ton", 5)).unwrap_or(TypeOfNumber::Alphanumeric);
        let source_npi = NumericPlanIndicator::try_from(self.u8_or(route_id, "source_npi", 0))
            .unwrap_or(NumericPlanIndicator::Unknown);
        let destination_ton = TypeOfNumber::try_from(self.u8_or(route_id, "destination_ton", 1))
            .unwrap_or(TypeOfNumber::International);
        let destination_npi = NumericPlanIndicator::try_from(self.u8_or(route_id, "destination_npi", 1))
            .unwrap_or(NumericPlanIndicator::Isdn);

        RouteSettings {
            route_id: route_id.to_string(),
            addresses,
            user: self.string(route_id, "user", ""),
            password: self.string(route_id, "password", ""),
            bind_type,
            system_type: self.string(route_id, "systemType", ""),
            source_ton,
            source_npi,
            destination_ton,
            destination_npi,
            dlr_level: DlrLevel::from_u8(self.u8_or(route_id, "dlr_level", 3)),
            sms_receive_url: self.string(route_id, "sms_receive_url", ""),
            sms_send_dlr_url: self.string(route_id, "sms_send_dlr_url", ""),
            sms_send_ack_url: self.string(route_id, "sms_send_ack_url", ""),
            disable_tlv_options: self.bool_or(route_id, "disable_tlv_options", false),
            smsc_delivery_rate: self.u32_or(route_id, "smsc_delivery_rate", 50),
            operates_synchronously: self.bool_or(route_id, "operates_synchronously", true),
            dlr_text_err_quirk: self.bool_or(route_id, "dlr_text_err_quirk", false),
        }
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Sequence(seq) => seq
            .iter()
            .map(scalar_to_string)
            .collect::<Vec<_>>()
            .join(","),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Settings {
        Settings::parse(
            r#"
active_routes: "r1,r2"
r1.addresses: "smsc1:2775,smsc2:2775"
r1.user: "alice"
r1.password: "secret"
r1.bindType: "transceiver"
r1.dlr_level: 2
r1.smsc_delivery_rate: 25
r1.operates_synchronously: false
"#,
            Path::new("<test>"),
        )
        .unwrap()
    }

    #[test]
    fn active_routes_parses_comma_list() {
        let settings = sample();
        assert_eq!(settings.active_routes(), vec!["r1", "r2"]);
    }

    #[test]
    fn route_settings_reads_present_keys() {
        let settings = sample();
        let r1 = settings.route_settings("r1");
        assert_eq!(r1.user, "alice");
        assert_eq!(r1.addresses, vec!["smsc1:2775", "smsc2:2775"]);
        assert_eq!(r1.dlr_level, DlrLevel::Final);
        assert_eq!(r1.smsc_delivery_rate, 25);
        assert!(!r1.operates_synchronously);
    }

    #[test]
    fn route_settings_falls_back_to_defaults() {
        let settings = sample();
        let unconfigured = settings.route_settings("ghost");
        assert!(unconfigured.addresses.is_empty());
        assert_eq!(unconfigured.dlr_level, DlrLevel::Failure);
        assert_eq!(unconfigured.smsc_delivery_rate, 50);
        assert!(unconfigured.operates_synchronously);
        assert!(!unconfigured.disable_tlv_options);
    }

    #[test]
    fn bool_or_falls_back_on_unknown_value() {
        let settings = Settings::parse("r1.disable_tlv_options: \"maybe\"", Path::new("<test>")).unwrap();
        assert!(!settings.bool_or("r1", "disable_tlv_options", false));
    }
}
