use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A tag filter as authored in the query editor and forwarded verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "type", default)]
    pub filter_type: String,
    #[serde(default)]
    pub tagk: String,
    #[serde(default)]
    pub filter: String,
    #[serde(rename = "groupBy", default)]
    pub group_by: bool,
}

/// Query authored by an interactive dashboard user.
///
/// Counter values are strings because the front end may substitute template
/// variables into them before they are typed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryForm {
    pub metric: String,
    pub alias: String,
    pub aggregator: String,
    pub disable_downsampling: bool,
    pub downsample_aggregator: String,
    pub downsample_fill_policy: String,
    pub downsample_interval: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub filters: Vec<Filter>,
    pub should_compute_rate: bool,
    pub rate_interval: String,
    pub is_counter: bool,
    pub counter_max: String,
    pub counter_reset_value: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tsuids: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub datasource_tags: Vec<String>,
    pub query_type: String,
    pub ref_id: String,

    // dashboard-only metadata, never translated
    #[serde(deserialize_with = "null_as_default")]
    pub datasource: serde_json::Value,
    pub datasource_id: i64,
    pub interval_ms: i64,
    pub max_data_points: i64,
    pub org_id: i64,
}

/// Query issued by a non-interactive caller such as alert evaluation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerQuery {
    pub metric: String,
    pub aggregator: String,
    pub disable_downsampling: bool,
    pub downsample_aggregator: String,
    pub downsample_fill_policy: String,
    pub downsample_interval: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub filters: Vec<Filter>,
    pub should_compute_rate: bool,
    pub rate_interval: String,
    pub is_counter: bool,
    pub counter_max: String,
    pub counter_reset_value: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tsuids: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub datasource_tags: Vec<String>,
    pub query_type: String,
    pub ref_id: String,
}

impl From<ServerQuery> for QueryForm {
    fn from(q: ServerQuery) -> Self {
        QueryForm {
            metric: q.metric,
            aggregator: q.aggregator,
            disable_downsampling: q.disable_downsampling,
            downsample_aggregator: q.downsample_aggregator,
            downsample_fill_policy: q.downsample_fill_policy,
            downsample_interval: q.downsample_interval,
            tags: q.tags,
            filters: q.filters,
            should_compute_rate: q.should_compute_rate,
            rate_interval: q.rate_interval,
            is_counter: q.is_counter,
            counter_max: q.counter_max,
            counter_reset_value: q.counter_reset_value,
            tsuids: q.tsuids,
            datasource_tags: q.datasource_tags,
            query_type: q.query_type,
            ref_id: q.ref_id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateOptions {
    pub counter: bool,
    pub counter_max: i32,
    pub reset_value: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub interval: String,
}

/// Canonical outgoing query, one entry of the envelope's `queries` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatedQuery {
    pub metric: String,
    pub aggregator: String,
    pub rate: bool,
    pub rate_options: RateOptions,
    pub downsample: String,
    pub tags: BTreeMap<String, String>,
    pub filters: Vec<Filter>,
    pub tsuids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEnvelope {
    pub ms_resolution: bool,
    pub global_annotations: bool,
    pub start: i64,
    pub end: i64,
    pub queries: Vec<TranslatedQuery>,
}

impl QueryEnvelope {
    /// Bounds are truncated to whole seconds before scaling to millis.
    pub fn new(range: &TimeRange, queries: Vec<TranslatedQuery>) -> Self {
        QueryEnvelope {
            ms_resolution: true,
            global_annotations: true,
            start: range.from.timestamp() * 1000,
            end: range.to.timestamp() * 1000,
            queries,
        }
    }
}

/// One entry of an inbound batch: the caller's payload plus its reference id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    #[serde(default)]
    pub ref_id: String,
    pub time_range: TimeRange,
    #[serde(default)]
    pub json: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSourceOptions {
    pub timely_host: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub https_port: u16,
    pub allow_insecure_ssl: bool,
    pub oauth_pass_thru: bool,
    pub use_client_cert_when_oauth_missing: bool,
    pub client_certificate_path: String,
    pub client_key_path: String,
    pub certificate_authority_path: String,
    #[serde(deserialize_with = "null_as_default")]
    pub datasource_tags: BTreeMap<String, String>,
}

impl DataSourceOptions {
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.timely_host, self.https_port)
    }
}

/// One series as returned by `/api/query`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeriesResult {
    pub metric: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub aggregated_tags: Vec<String>,
    #[serde(rename = "dps", deserialize_with = "null_as_default")]
    pub data_points: std::collections::HashMap<i64, Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendErrorBody {
    pub response_code: i32,
    pub message: String,
    pub detail_message: String,
}

/// Column-oriented result for one series: `times[i]` pairs with `values[i]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputTable {
    pub name: String,
    pub value_field: String,
    pub labels: BTreeMap<String, String>,
    pub times: Vec<DateTime<Utc>>,
    pub values: Vec<Option<f64>>,
}

impl OutputTable {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Port::Number(n)) => Ok(n),
        Some(Port::Text(s)) if s.trim().is_empty() => Ok(0),
        Some(Port::Text(s)) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
