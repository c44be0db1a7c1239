use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::AppState;
use crate::executor::QueryContext;
use crate::metrics;
use crate::models::{DataQuery, OutputTable};
use crate::query::Caller;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub login: String,
}

/// A batch of queries as delivered by the dashboard host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryDataRequest {
    pub user: Option<UserInfo>,
    pub headers: HashMap<String, String>,
    pub datasource: Value,
    pub timeout_ms: Option<u64>,
    pub queries: Vec<DataQuery>,
}

impl QueryDataRequest {
    fn context(&self) -> QueryContext {
        let caller = match &self.user {
            Some(user) => Caller::User {
                login: user.login.clone(),
            },
            None => Caller::Service,
        };
        let authorization = self
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .map(|(_, v)| v.clone());
        let deadline = self
            .timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        QueryContext {
            caller,
            authorization,
            deadline,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataResponse {
    pub frames: Vec<OutputTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryDataResponse {
    pub results: BTreeMap<String, DataResponse>,
}

pub async fn query_data(
    State(state): State<AppState>,
    Json(request): Json<QueryDataRequest>,
) -> Json<QueryDataResponse> {
    let request_id = Uuid::new_v4();
    let span = info_span!("query_data", %request_id);
    Json(run_batch(&state, request).instrument(span).await)
}

/// Runs every query of the batch in order. A failing query fills only its
/// own result slot.
pub async fn run_batch(state: &AppState, request: QueryDataRequest) -> QueryDataResponse {
    let ctx = request.context();
    info!(
        queries = request.queries.len(),
        user = ctx.caller.is_user(),
        authorization = ctx.authorization.is_some(),
        "QueryData called"
    );

    let mut response = QueryDataResponse::default();
    for query in &request.queries {
        metrics::record_query();
        let result = match state.executor.run(&ctx, &request.datasource, query).await {
            Ok(frames) => DataResponse {
                frames,
                error: None,
            },
            Err(e) => {
                error!(ref_id = %query.ref_id, error = %e, "Query failed");
                metrics::record_query_failure();
                DataResponse {
                    frames: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };
        response.results.insert(query.ref_id.clone(), result);
    }
    response
}
