use axum::{
    extract::{Path, RawQuery, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{debug, error};

use super::AppState;
use crate::executor::parse_options;
use crate::metrics;
use crate::models::DataSourceOptions;
use crate::{BridgeError, Result};

/// Header carrying the datasource configuration JSON for passthrough calls.
pub const DATASOURCE_OPTIONS_HEADER: &str = "x-datasource-options";

const FORWARDED_PREFIXES: &[&str] = &["/api/aggregators", "/api/suggest", "/api/search/lookup"];

/// Backend URL for a resource path, or `None` if the path is not forwarded.
pub fn resource_url(
    options: &DataSourceOptions,
    path: &str,
    raw_query: Option<&str>,
) -> Option<String> {
    if !FORWARDED_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return None;
    }
    let mut url = format!("{}{}", options.base_url(), path);
    if let Some(query) = raw_query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    Some(url)
}

pub async fn call_resource(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let path = format!("/{}", path.trim_start_matches('/'));
    debug!(path = %path, method = %method, body_len = body.len(), "CallResource");

    let datasource = match headers.get(DATASOURCE_OPTIONS_HEADER) {
        Some(raw) => serde_json::from_slice(raw.as_bytes())
            .map_err(|e| BridgeError::InvalidOptions(e.to_string()))?,
        None => serde_json::Value::Null,
    };
    let options = parse_options(&datasource)?;

    // GET forwards the query string, POST forwards the body
    let query = if method == Method::GET { raw_query.as_deref() } else { None };
    let url = resource_url(&options, &path, query)
        .ok_or_else(|| BridgeError::NotFound(path.clone()))?;

    let client = state.provider.client_for(&options, true).await?;
    metrics::record_passthrough();

    let request = if method == Method::POST {
        client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
    } else {
        client.get(&url)
    };
    let response = request.send().await.map_err(|e| {
        error!(url = %url, error = %e, "Error fetching resource");
        BridgeError::from(e)
    })?;

    let status = response.status();
    if !status.is_success() {
        error!(url = %url, response_code = status.as_u16(), "Error fetching resource");
        return Err(BridgeError::Resource {
            url,
            status: status.as_u16(),
        });
    }

    let content_type = response.headers().get(CONTENT_TYPE).cloned();
    let bytes = response.bytes().await.map_err(|e| {
        error!(url = %url, error = %e, "Error reading resource");
        BridgeError::from(e)
    })?;

    let mut out = (status, bytes).into_response();
    if let Some(value) = content_type {
        out.headers_mut().insert(CONTENT_TYPE, value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> DataSourceOptions {
        DataSourceOptions {
            timely_host: "tsdb".to_string(),
            https_port: 4243,
            ..Default::default()
        }
    }

    #[test]
    fn test_forwarded_paths() {
        assert_eq!(
            resource_url(&options(), "/api/suggest", Some("type=metrics&q=cpu")).as_deref(),
            Some("https://tsdb:4243/api/suggest?type=metrics&q=cpu")
        );
        assert_eq!(
            resource_url(&options(), "/api/aggregators", None).as_deref(),
            Some("https://tsdb:4243/api/aggregators")
        );
        assert_eq!(
            resource_url(&options(), "/api/search/lookup", Some("")).as_deref(),
            Some("https://tsdb:4243/api/search/lookup")
        );
    }

    #[test]
    fn test_other_paths_are_not_forwarded() {
        assert!(resource_url(&options(), "/api/query", None).is_none());
        assert!(resource_url(&options(), "/admin", Some("x=1")).is_none());
    }
}
