pub mod duration;
pub mod translate;

use serde::Deserialize;
use serde_json::Value;

use crate::models::{QueryForm, ServerQuery};
use crate::{BridgeError, Result};

pub use translate::translate;

/// Who issued a batch. Interactive users author `QueryForm`s, everything else
/// sends `ServerQuery`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    User { login: String },
    Service,
}

impl Caller {
    pub fn is_user(&self) -> bool {
        matches!(self, Caller::User { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IncomingQuery {
    UserForm(QueryForm),
    ServerQuery(ServerQuery),
}

impl IncomingQuery {
    /// Decodes a query payload in the shape the caller is expected to send.
    pub fn decode(caller: &Caller, payload: &Value) -> Result<Self> {
        let query = match caller {
            Caller::User { .. } => IncomingQuery::UserForm(parse(payload)?),
            Caller::Service => IncomingQuery::ServerQuery(parse(payload)?),
        };
        Ok(query)
    }

    pub fn into_form(self) -> QueryForm {
        match self {
            IncomingQuery::UserForm(form) => form,
            IncomingQuery::ServerQuery(query) => query.into(),
        }
    }
}

/// Single boundary between caller identity and the translation pipeline.
pub fn resolve(caller: &Caller, payload: &Value) -> Result<QueryForm> {
    IncomingQuery::decode(caller, payload).map(IncomingQuery::into_form)
}

fn parse<'a, T: Deserialize<'a>>(payload: &'a Value) -> Result<T> {
    T::deserialize(payload).map_err(|e| BridgeError::InvalidQuery(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> Value {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_user_payload_decodes_as_form() {
        let caller = Caller::User {
            login: "admin".to_string(),
        };
        let payload = raw(r#"{"metric":"cpu","alias":"CPU","maxDataPoints":500}"#);
        match IncomingQuery::decode(&caller, &payload).unwrap() {
            IncomingQuery::UserForm(form) => {
                assert_eq!(form.alias, "CPU");
                assert_eq!(form.max_data_points, 500);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_service_payload_resolves_to_form() {
        let payload = raw(r#"{"metric":"cpu","aggregator":"max","alias":"ignored"}"#);
        let form = resolve(&Caller::Service, &payload).unwrap();
        assert_eq!(form.metric, "cpu");
        assert_eq!(form.aggregator, "max");
        assert!(form.alias.is_empty());
    }

    #[test]
    fn test_malformed_payload_is_invalid_query() {
        let payload = raw(r#"{"metric":42}"#);
        let err = resolve(&Caller::Service, &payload).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidQuery(_)));
    }
}
