use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::client::HttpClientProvider;
use crate::metrics::RequestTimer;
use crate::models::{DataQuery, DataSourceOptions, OutputTable, QueryEnvelope, TimeRange, TranslatedQuery};
use crate::normalize::normalize;
use crate::query::{self, Caller};
use crate::{BridgeError, Result};

pub const QUERY_PATH: &str = "/api/query";

/// Per-batch facts the executor needs from the inbound request.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub caller: Caller,
    pub authorization: Option<String>,
    pub deadline: Option<Instant>,
}

impl QueryContext {
    /// Interactive users present a certificate only when they carry no token
    /// and the datasource opts in; every other caller always does.
    pub fn prefer_client_cert(&self, options: &DataSourceOptions) -> bool {
        !self.caller.is_user()
            || (self.authorization.is_none() && options.use_client_cert_when_oauth_missing)
    }

    /// Runs `fut` under the inbound deadline, if any.
    pub async fn bounded<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| BridgeError::Canceled("deadline exceeded".to_string()))?,
            None => fut.await,
        }
    }
}

pub struct Executor {
    provider: Arc<HttpClientProvider>,
}

impl Executor {
    pub fn new(provider: Arc<HttpClientProvider>) -> Self {
        Self { provider }
    }

    /// Full pipeline for one query: resolve, translate, execute, normalize.
    pub async fn run(
        &self,
        ctx: &QueryContext,
        datasource: &Value,
        query: &DataQuery,
    ) -> Result<Vec<OutputTable>> {
        let form = query::resolve(&ctx.caller, &query.json)?;
        let options = parse_options(datasource)?;
        let translated = query::translate(&form, &options);

        ctx.bounded(async {
            let response = self
                .execute(ctx, &options, &query.time_range, vec![translated])
                .await?;
            normalize(response).await
        })
        .await
    }

    pub async fn execute(
        &self,
        ctx: &QueryContext,
        options: &DataSourceOptions,
        range: &TimeRange,
        queries: Vec<TranslatedQuery>,
    ) -> Result<reqwest::Response> {
        let client = self
            .provider
            .client_for(options, ctx.prefer_client_cert(options))
            .await?;

        let envelope = QueryEnvelope::new(range, queries);
        let request = build_request(&client, options, &envelope, ctx.authorization.as_deref())?;

        let _timer = RequestTimer::new();
        client.execute(request).await.map_err(|e| {
            error!(error = %e, "Error executing query");
            BridgeError::from(e)
        })
    }
}

pub fn parse_options(datasource: &Value) -> Result<DataSourceOptions> {
    if datasource.is_null() {
        return Ok(DataSourceOptions::default());
    }
    DataSourceOptions::deserialize(datasource).map_err(|e| {
        error!(error = %e, "Error unmarshalling datasource JSONData");
        BridgeError::InvalidOptions(e.to_string())
    })
}

pub fn build_request(
    client: &reqwest::Client,
    options: &DataSourceOptions,
    envelope: &QueryEnvelope,
    authorization: Option<&str>,
) -> Result<reqwest::Request> {
    let url = format!("{}{}", options.base_url(), QUERY_PATH);
    let body = serde_json::to_vec(envelope)?;

    let mut builder = client
        .post(&url)
        .header(CONTENT_TYPE, "application/json")
        .body(body);
    if let Some(token) = authorization {
        debug!("Adding Authorization header");
        builder = builder.header(AUTHORIZATION, token);
    }

    let request = builder.build().map_err(|e| {
        error!(url = %url, error = %e, "Failed to create request");
        BridgeError::InvalidOptions(format!("Failed creating query url. error: {}", e))
    })?;
    debug!(url = %url, queries = envelope.queries.len(), "Created query request");
    Ok(request)
}
