use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tracing::error;

use crate::models::{BackendErrorBody, OutputTable, SeriesResult};
use crate::{BridgeError, Result};

/// Reads a backend response and converts it into one table per series.
pub async fn normalize(response: reqwest::Response) -> Result<Vec<OutputTable>> {
    let status = response.status();
    let body = response.bytes().await?;
    normalize_body(status, &body)
}

pub fn normalize_body(status: StatusCode, body: &[u8]) -> Result<Vec<OutputTable>> {
    if !status.is_success() {
        return Err(backend_error(status, body));
    }

    let series: Vec<SeriesResult> =
        serde_json::from_slice(body).map_err(|_| BridgeError::MalformedPayload {
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        })?;

    series
        .into_iter()
        .map(|s| to_table(s, status, body))
        .collect()
}

fn backend_error(status: StatusCode, body: &[u8]) -> BridgeError {
    match serde_json::from_slice::<BackendErrorBody>(body) {
        Ok(err) => {
            error!(
                status = status.as_u16(),
                message = %err.message,
                detail_message = %err.detail_message,
                "Query failed"
            );
            BridgeError::Backend {
                status: status.as_u16(),
                message: err.message,
                detail: err.detail_message,
            }
        }
        Err(_) => {
            let body = String::from_utf8_lossy(body).into_owned();
            error!(status = status.as_u16(), body = %body, "Query failed");
            BridgeError::BackendUnparsed {
                status: status.as_u16(),
                body,
            }
        }
    }
}

fn to_table(series: SeriesResult, status: StatusCode, body: &[u8]) -> Result<OutputTable> {
    let mut name = series.metric.clone();
    for (k, v) in &series.tags {
        name.push(' ');
        name.push_str(k);
        name.push('=');
        name.push_str(v);
    }

    let mut points: Vec<(i64, Option<f64>)> = series.data_points.into_iter().collect();
    points.sort_unstable_by_key(|(ts, _)| *ts);

    let mut times = Vec::with_capacity(points.len());
    let mut values = Vec::with_capacity(points.len());
    for (millis, value) in points {
        let instant: DateTime<Utc> =
            DateTime::from_timestamp(millis / 1000, 0).ok_or_else(|| {
                BridgeError::MalformedPayload {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(body).into_owned(),
                }
            })?;
        times.push(instant);
        values.push(value);
    }

    Ok(OutputTable {
        name,
        value_field: series.metric,
        labels: series.tags,
        times,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_orders_points_and_names_series() {
        let body = br#"[{"metric":"cpu","tags":{"host":"a"},"aggregatedTags":[],"dps":{"20000":1.5,"10000":2.5}}]"#;
        let tables = normalize_body(StatusCode::OK, body).unwrap();

        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "cpu host=a");
        assert_eq!(tables[0].value_field, "cpu");
        assert_eq!(tables[0].times, vec![at(10), at(20)]);
        assert_eq!(tables[0].values, vec![Some(2.5), Some(1.5)]);
    }

    #[test]
    fn test_millisecond_keys_truncate_to_seconds() {
        let body = br#"[{"metric":"cpu","tags":{"host":"a"},"dps":{"20":1.5,"10":2.5}}]"#;
        let tables = normalize_body(StatusCode::OK, body).unwrap();
        assert_eq!(tables[0].times, vec![at(0), at(0)]);
        assert_eq!(tables[0].values, vec![Some(2.5), Some(1.5)]);
    }

    #[test]
    fn test_many_series_keep_backend_order() {
        let body = br#"[
            {"metric":"mem","tags":{"host":"b","dc":"east"},"dps":{"3000":3,"1000":1,"2000":2}},
            {"metric":"cpu","tags":{},"dps":{}},
            {"metric":"disk","tags":null,"dps":{"5000":null}}
        ]"#;
        let tables = normalize_body(StatusCode::OK, body).unwrap();

        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["mem dc=east host=b", "cpu", "disk"]);
        assert_eq!(tables[0].values, vec![Some(1.0), Some(2.0), Some(3.0)]);
        assert!(tables[1].is_empty());
        assert_eq!(tables[2].values, vec![None]);
        for table in &tables {
            assert_eq!(table.times.len(), table.values.len());
            assert!(table.times.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_structured_backend_error() {
        let body = br#"{"responseCode":500,"message":"boom","detailMessage":"x"}"#;
        let err = normalize_body(StatusCode::INTERNAL_SERVER_ERROR, body).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("boom"), "{text}");
        assert!(text.contains("x"), "{text}");
        assert!(matches!(err, BridgeError::Backend { status: 500, .. }));
    }

    #[test]
    fn test_opaque_backend_error() {
        let err = normalize_body(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>").unwrap_err();
        match err {
            BridgeError::BackendUnparsed { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "<html>bad gateway</html>");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_malformed_success_payload() {
        let err = normalize_body(StatusCode::OK, br#"{"not":"an array"}"#).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedPayload { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_normalize_reads_response() {
        let response = axum::http::Response::builder()
            .status(200)
            .body(r#"[{"metric":"cpu","tags":{"host":"a"},"dps":{"20000":1.5,"10000":2.5}}]"#)
            .unwrap();
        let tables = normalize(reqwest::Response::from(response)).await.unwrap();
        assert_eq!(tables[0].name, "cpu host=a");
        assert_eq!(tables[0].len(), 2);
    }
}
