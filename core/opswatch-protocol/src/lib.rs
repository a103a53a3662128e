//! Wire types shared by the opswatch engine and its clients.
//!
//! Upstream records are decoded leniently: a feed that is not a JSON array (or
//! an object wrapping one) is rejected as a whole, while individual records
//! that fail validation are dropped so one bad row never hides the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const MAX_RECORD_ID_LEN: usize = 128;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
    Info,
}

impl Severity {
    /// Parses an upstream status string. Unknown values fall back to `Info`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Severity::Success,
            "warning" => Severity::Warning,
            "error" => Severity::Error,
            _ => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which upstream feed a notification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Activity,
    Device,
    Pppoe,
}

impl SourceTag {
    pub const ALL: [SourceTag; 3] = [SourceTag::Activity, SourceTag::Device, SourceTag::Pppoe];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Activity => "activity",
            SourceTag::Device => "device",
            SourceTag::Pppoe => "pppoe",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Online,
    Offline,
    Active,
    Inactive,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Online => "online",
            EntityStatus::Offline => "offline",
            EntityStatus::Active => "active",
            EntityStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the operator activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Display string, already formatted by the upstream service.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub status: String,
    /// Machine-readable creation time, when the feed provides one.
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ActivityRecord {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_id(&self.id, "id")?;
        if self.title.trim().is_empty() {
            return Err(ErrorInfo::new("missing_field", "title is required"));
        }
        if let Some(created_at) = self.created_at.as_deref() {
            if parse_rfc3339(created_at).is_none() {
                return Err(ErrorInfo::new(
                    "invalid_timestamp",
                    "createdAt must be RFC3339",
                ));
            }
        }
        Ok(())
    }

    pub fn severity(&self) -> Severity {
        Severity::parse_lenient(&self.status)
    }

    pub fn created_instant(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_rfc3339)
    }
}

/// One device of the managed fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub status: String,
}

impl DeviceRecord {
    /// `id` wins over `serialNumber`; blank values count as absent.
    pub fn identity(&self) -> Option<&str> {
        [self.id.as_deref(), self.serial_number.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
    }

    pub fn entity_status(&self) -> Option<EntityStatus> {
        match self.status.trim().to_ascii_lowercase().as_str() {
            "online" => Some(EntityStatus::Online),
            "offline" => Some(EntityStatus::Offline),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        let identity = self
            .identity()
            .ok_or_else(|| ErrorInfo::new("missing_field", "id or serialNumber is required"))?;
        require_id(identity, "id")?;
        if self.entity_status().is_none() {
            return Err(ErrorInfo::new(
                "invalid_status",
                format!("unknown device status '{}'", self.status),
            ));
        }
        Ok(())
    }
}

/// One row of the router's PPPoE session table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub active: bool,
}

impl SessionRecord {
    pub fn entity_status(&self) -> EntityStatus {
        if self.active {
            EntityStatus::Active
        } else {
            EntityStatus::Inactive
        }
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_id(self.username.trim(), "username")
    }
}

/// A notification as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationItem {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub timestamp: String,
    pub severity: Severity,
    pub source: SourceTag,
    /// Only used for unread computation; never displayed.
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

pub fn parse_activity_feed(payload: Value) -> Result<Vec<ActivityRecord>, ErrorInfo> {
    parse_records(payload, "activity", ActivityRecord::validate)
}

pub fn parse_device_fleet(payload: Value) -> Result<Vec<DeviceRecord>, ErrorInfo> {
    parse_records(payload, "device", DeviceRecord::validate)
}

pub fn parse_session_table(payload: Value) -> Result<Vec<SessionRecord>, ErrorInfo> {
    parse_records(payload, "session", SessionRecord::validate)
}

fn parse_records<T, F>(payload: Value, kind: &str, validate: F) -> Result<Vec<T>, ErrorInfo>
where
    T: serde::de::DeserializeOwned,
    F: Fn(&T) -> Result<(), ErrorInfo>,
{
    let rows = unwrap_rows(payload).ok_or_else(|| {
        ErrorInfo::new(
            "invalid_payload",
            format!("{} feed must be an array or an object with data/items", kind),
        )
    })?;

    Ok(rows
        .into_iter()
        .filter_map(|row| serde_json::from_value::<T>(row).ok())
        .filter(|record| validate(record).is_ok())
        .collect())
}

fn unwrap_rows(payload: Value) -> Option<Vec<Value>> {
    match payload {
        Value::Array(rows) => Some(rows),
        Value::Object(mut map) => ["data", "items"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(rows)) => Some(rows),
                _ => None,
            }),
        _ => None,
    }
}

fn require_id(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        ));
    }
    if value.len() > MAX_RECORD_ID_LEN {
        return Err(ErrorInfo::new(
            "invalid_id",
            format!("{} must be {} characters or fewer", field, MAX_RECORD_ID_LEN),
        ));
    }
    Ok(())
}

pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn activity_feed_accepts_bare_array_and_wrapped_object() {
        let row = json!({
            "id": "a-1",
            "title": "Voucher batch printed",
            "timestamp": "2 min ago",
            "status": "success"
        });

        let bare = parse_activity_feed(json!([row.clone()])).expect("bare array");
        assert_eq!(bare.len(), 1);

        let wrapped = parse_activity_feed(json!({ "data": [row.clone()] })).expect("data");
        assert_eq!(wrapped.len(), 1);

        let items = parse_activity_feed(json!({ "items": [row] })).expect("items");
        assert_eq!(items[0].severity(), Severity::Success);
    }

    #[test]
    fn activity_feed_rejects_non_array_payload() {
        let err = parse_activity_feed(json!({ "message": "unauthorized" })).unwrap_err();
        assert_eq!(err.code, "invalid_payload");
        assert!(parse_activity_feed(json!("oops")).is_err());
    }

    #[test]
    fn activity_feed_drops_invalid_rows() {
        let rows = parse_activity_feed(json!([
            { "id": "", "title": "blank id" },
            { "id": "a-2", "title": "" },
            { "id": "a-3", "title": "ok", "createdAt": "yesterday" },
            { "id": "a-4", "title": "kept", "status": "weird" },
            { "title": "no id at all" },
        ]))
        .expect("parse");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "a-4");
        assert_eq!(rows[0].severity(), Severity::Info);
    }

    #[test]
    fn device_identity_prefers_id_then_serial() {
        let device = DeviceRecord {
            id: Some("  ".to_string()),
            serial_number: Some("SN-42".to_string()),
            status: "ONLINE".to_string(),
        };
        assert_eq!(device.identity(), Some("SN-42"));
        assert_eq!(device.entity_status(), Some(EntityStatus::Online));

        let device = DeviceRecord {
            id: Some("dev-1".to_string()),
            serial_number: Some("SN-42".to_string()),
            status: "offline".to_string(),
        };
        assert_eq!(device.identity(), Some("dev-1"));
    }

    #[test]
    fn device_fleet_skips_unknown_status_and_missing_identity() {
        let rows = parse_device_fleet(json!([
            { "id": "dev-1", "status": "online" },
            { "serialNumber": "SN-2", "status": "offline" },
            { "id": "dev-3", "status": "rebooting" },
            { "status": "online" },
        ]))
        .expect("parse");

        let ids: Vec<_> = rows.iter().filter_map(DeviceRecord::identity).collect();
        assert_eq!(ids, vec!["dev-1", "SN-2"]);
    }

    #[test]
    fn session_table_maps_active_flag() {
        let rows = parse_session_table(json!([
            { "username": "alice", "active": true },
            { "username": "bob" },
            { "username": " ", "active": true },
        ]))
        .expect("parse");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entity_status(), EntityStatus::Active);
        assert_eq!(rows[1].entity_status(), EntityStatus::Inactive);
    }

    #[test]
    fn rejects_long_identity() {
        let record = SessionRecord {
            username: "u".repeat(MAX_RECORD_ID_LEN + 1),
            active: true,
        };
        assert_eq!(record.validate().unwrap_err().code, "invalid_id");
    }

    #[test]
    fn notification_item_serializes_camel_case() {
        let item = NotificationItem {
            id: "device:dev-1:online:0".to_string(),
            title: "Device dev-1 is back online".to_string(),
            description: None,
            timestamp: "2026-01-30 12:00:00".to_string(),
            severity: Severity::Success,
            source: SourceTag::Device,
            created_at: parse_rfc3339("2026-01-30T12:00:00Z").expect("time"),
            read: false,
        };

        let value = serde_json::to_value(&item).expect("serialize");
        assert_eq!(value["createdAt"], "2026-01-30T12:00:00Z");
        assert_eq!(value["severity"], "success");
        assert_eq!(value["source"], "device");
        assert!(value.get("description").is_none());
    }
}
