use serde::Serialize;
use serde_json::{Map, Value};

/// Envelope the server sends back: `{"results": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub results: QueryResult,
}

impl From<QueryResult> for Response {
    fn from(results: QueryResult) -> Self {
        Self { results }
    }
}

/// Outcome of a query, shaped the way it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Success {
        #[serde(rename = "Success")]
        message: String,
    },
    Inserted {
        success: bool,
        result_id: String,
        message: String,
    },
    Rejected {
        success: bool,
        message: String,
    },
    Found {
        success: bool,
        count: usize,
        data: Vec<Map<String, Value>>,
    },
    NotFound {
        success: bool,
        collection: String,
        message: String,
    },
    InvalidQuery {
        success: bool,
        collection: String,
        error: String,
        message: String,
    },
    Error {
        #[serde(rename = "Error")]
        message: String,
    },
}

impl QueryResult {
    pub fn error(message: impl Into<String>) -> Self {
        QueryResult::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            QueryResult::Success { .. } => true,
            QueryResult::Inserted { success, .. }
            | QueryResult::Rejected { success, .. }
            | QueryResult::Found { success, .. }
            | QueryResult::NotFound { success, .. }
            | QueryResult::InvalidQuery { success, .. } => *success,
            QueryResult::Error { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn results_serialize_in_wire_shape() {
        let inserted = Response::from(QueryResult::Inserted {
            success: true,
            result_id: "abc".into(),
            message: "Inserted 1 item into temp".into(),
        });
        assert_eq!(
            serde_json::to_string(&inserted).unwrap(),
            r#"{"results":{"success":true,"result_id":"abc","message":"Inserted 1 item into temp"}}"#
        );

        let error = Response::from(QueryResult::error("boom"));
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"results": {"Error": "boom"}})
        );
    }

    #[test]
    fn success_flag_follows_variant() {
        assert!(QueryResult::Success { message: "ok".into() }.is_success());
        assert!(!QueryResult::error("nope").is_success());
        assert!(
            !QueryResult::NotFound {
                success: false,
                collection: "info".into(),
                message: String::new(),
            }
            .is_success()
        );
    }
}
