//! Source adapters for the three upstream feeds.
//!
//! Each adapter fetches one feed and normalizes it before the engine sees it:
//! the activity feed stays a list of raw records, the device fleet and the
//! PPPoE session table become `{identity, status}` pairs. Adapters report
//! failures as errors; deciding that a failure means "no data this cycle" is
//! the engine's job.

mod http;

pub use http::{join_url, ApiClient};

use opswatch_protocol::{
    parse_activity_feed, parse_device_fleet, parse_session_table, ActivityRecord, DeviceRecord,
    SessionRecord, SourceTag,
};
use serde_json::Value;
use tracing::debug;

use crate::config::{ApiConfig, PollConfig};
use crate::error::{Result, WatchError};
use crate::snapshot::TrackedEntity;

#[derive(Debug, Clone, PartialEq)]
pub enum SourceBatch {
    Activity(Vec<ActivityRecord>),
    Entities(Vec<TrackedEntity>),
}

impl SourceBatch {
    pub fn len(&self) -> usize {
        match self {
            SourceBatch::Activity(records) => records.len(),
            SourceBatch::Entities(entities) => entities.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceTag;
    fn fetch(&self) -> Result<SourceBatch>;
}

pub fn normalize_devices(records: Vec<DeviceRecord>) -> Vec<TrackedEntity> {
    records
        .into_iter()
        .filter_map(|record| {
            let status = record.entity_status()?;
            let identity = record.identity()?.to_string();
            Some(TrackedEntity { identity, status })
        })
        .collect()
}

pub fn normalize_sessions(records: Vec<SessionRecord>) -> Vec<TrackedEntity> {
    records
        .into_iter()
        .filter(|record| !record.username.trim().is_empty())
        .map(|record| TrackedEntity {
            identity: record.username.trim().to_string(),
            status: record.entity_status(),
        })
        .collect()
}

fn decode<T>(
    source: SourceTag,
    payload: Value,
    parse: fn(Value) -> std::result::Result<Vec<T>, opswatch_protocol::ErrorInfo>,
) -> Result<Vec<T>> {
    let rows = payload.as_array().map(Vec::len);
    let records = parse(payload).map_err(|info| WatchError::Decode {
        source_tag: source,
        info,
    })?;
    if let Some(rows) = rows {
        if rows != records.len() {
            debug!(
                source = %source,
                skipped = rows - records.len(),
                "Dropped malformed feed records"
            );
        }
    }
    Ok(records)
}

/// Recent operator actions from the dashboard API.
pub struct ActivityFeedAdapter {
    client: ApiClient,
    url: String,
    limit: usize,
}

impl ActivityFeedAdapter {
    pub fn new(client: ApiClient, base_url: &str, limit: usize) -> Self {
        Self {
            client,
            url: join_url(base_url, "activity"),
            limit,
        }
    }
}

impl SourceAdapter for ActivityFeedAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::Activity
    }

    fn fetch(&self) -> Result<SourceBatch> {
        let payload = self.client.get_json(
            SourceTag::Activity,
            &self.url,
            &[("limit", self.limit.to_string())],
        )?;
        let mut records = decode(SourceTag::Activity, payload, parse_activity_feed)?;
        records.truncate(self.limit);
        Ok(SourceBatch::Activity(records))
    }
}

/// CPE fleet from the device-management server.
pub struct DeviceFleetAdapter {
    client: ApiClient,
    url: String,
}

impl DeviceFleetAdapter {
    pub fn new(client: ApiClient, base_url: &str) -> Self {
        Self {
            client,
            url: join_url(base_url, "devices"),
        }
    }
}

impl SourceAdapter for DeviceFleetAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::Device
    }

    fn fetch(&self) -> Result<SourceBatch> {
        let payload = self.client.get_json(SourceTag::Device, &self.url, &[])?;
        let records = decode(SourceTag::Device, payload, parse_device_fleet)?;
        Ok(SourceBatch::Entities(normalize_devices(records)))
    }
}

/// PPPoE session table from the router-management API.
pub struct SessionTableAdapter {
    client: ApiClient,
    url: String,
}

impl SessionTableAdapter {
    pub fn new(client: ApiClient, base_url: &str) -> Self {
        Self {
            client,
            url: join_url(base_url, "pppoe/active"),
        }
    }
}

impl SourceAdapter for SessionTableAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::Pppoe
    }

    fn fetch(&self) -> Result<SourceBatch> {
        let payload = self.client.get_json(SourceTag::Pppoe, &self.url, &[])?;
        let records = decode(SourceTag::Pppoe, payload, parse_session_table)?;
        Ok(SourceBatch::Entities(normalize_sessions(records)))
    }
}

/// Builds the three HTTP adapters sharing one connection pool.
pub fn http_adapters(api: &ApiConfig, poll: &PollConfig) -> Result<Vec<Box<dyn SourceAdapter>>> {
    let client = ApiClient::new(api)?;
    Ok(vec![
        Box::new(ActivityFeedAdapter::new(
            client.clone(),
            &api.dashboard_base_url,
            poll.activity_limit,
        )),
        Box::new(DeviceFleetAdapter::new(client.clone(), &api.device_base_url)),
        Box::new(SessionTableAdapter::new(client, &api.router_base_url)),
    ])
}
