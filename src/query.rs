//! Query backend.
//!
//! Translates the content of a decoded request into a [`DocumentStore`]
//! operation and shapes the outcome as a [`QueryResult`]. Execution never
//! fails: a missing argument, a bad filter or a storage error all come back as
//! error-shaped results that travel to the client like any other answer.
//!
//! Supported actions:
//!
//! - `test`: no arguments; confirms the client can reach the server.
//! - `insert`: `collection` and `data`, a JSON object (usually JSON-encoded text).
//! - `searchkey`: `collection`, `key` and `value`; documents whose `key` equals `value`.
//! - `search`: `collection` and `params`, a [`Filter`] (usually JSON-encoded text).
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use log::debug;
use serde_json::{Map, Value};

use crate::{
    protocol::{QueryResult, RequestContent},
    storage::{
        DocumentStore, Filter,
        document::{Document, ID_FIELD, id_string},
    },
};

pub const TEST_MESSAGE: &str = "Your client is communicating with the server.";

const LAST_MODIFIED: &str = "last_modified";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Test,
    Insert,
    SearchKey,
    Search,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(Action::Test),
            "insert" => Ok(Action::Insert),
            "searchkey" => Ok(Action::SearchKey),
            "search" => Ok(Action::Search),
            other => Err(format!("Invalid action \"{other}\".")),
        }
    }
}

/// Runs the request `content` against `store`.
pub fn execute(store: &mut dyn DocumentStore, content: &Value) -> QueryResult {
    let content: RequestContent = match serde_json::from_value(content.clone()) {
        Ok(content) => content,
        Err(e) => return QueryResult::error(format!("Malformed request: {e}")),
    };
    let action = match content.action.parse::<Action>() {
        Ok(action) => action,
        Err(message) => return QueryResult::error(message),
    };
    debug!("executing {action:?} request");

    let collection = match (action, content.collection.as_deref()) {
        (Action::Test, _) => return connectivity(),
        (_, Some(collection)) => collection,
        (_, None) => {
            return QueryResult::error("Inserting into mongo needs a specified 'collection'.");
        }
    };

    match action {
        Action::Test => connectivity(),
        Action::Insert => match content.data.as_ref() {
            Some(data) => insert(store, collection, data),
            None => QueryResult::error("Inserting into mongo needs 'data'."),
        },
        Action::SearchKey => match (content.key, content.value) {
            (Some(key), Some(value)) => {
                let mut params = Map::new();
                params.insert(key, value);
                search(store, collection, &Value::Object(params))
            }
            _ => QueryResult::error("Searching mongo needs a key and value."),
        },
        Action::Search => match content.params.as_ref() {
            Some(params) => search(store, collection, params),
            None => QueryResult::error("Searching mongo needs a params object."),
        },
    }
}

fn connectivity() -> QueryResult {
    QueryResult::Success {
        message: TEST_MESSAGE.to_string(),
    }
}

fn insert(store: &mut dyn DocumentStore, collection: &str, data: &Value) -> QueryResult {
    let mut document: Document = match embedded_json(data) {
        Ok(Value::Object(document)) => document,
        Ok(_) => return QueryResult::error("Inserting into mongo needs 'data' to be a JSON object."),
        Err(e) => return QueryResult::error(format!("Inserting into mongo needs valid 'data': {e}")),
    };
    document.insert(
        LAST_MODIFIED.to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );

    match store.insert(collection, document) {
        Ok(result_id) => QueryResult::Inserted {
            success: true,
            result_id,
            message: format!("Inserted 1 item into {collection}"),
        },
        Err(e) => QueryResult::Rejected {
            success: false,
            message: format!("Failed to insert into {collection}: {e}"),
        },
    }
}

fn search(store: &mut dyn DocumentStore, collection: &str, params: &Value) -> QueryResult {
    let invalid = |params: &Value, error: String| QueryResult::InvalidQuery {
        success: false,
        collection: collection.to_string(),
        error,
        message: format!("Invalid query {}", literal(params)),
    };

    let params = match embedded_json(params) {
        Ok(params) => params,
        Err(e) => return invalid(params, e.to_string()),
    };
    let filter = match Filter::parse(&params) {
        Ok(filter) => filter,
        Err(e) => return invalid(&params, e.to_string()),
    };

    let mut data = match store.find(collection, &filter) {
        Ok(data) => data,
        Err(e) => return QueryResult::error(e.to_string()),
    };

    if data.is_empty() {
        return QueryResult::NotFound {
            success: false,
            collection: collection.to_string(),
            message: format!("No results with params {} ", literal(&params)),
        };
    }

    for document in data.iter_mut() {
        if let Some(id) = document.get_mut(ID_FIELD) {
            *id = Value::String(id_string(id));
        }
    }
    QueryResult::Found {
        success: true,
        count: data.len(),
        data,
    }
}

/// Arguments arrive either inline or as JSON-encoded text.
fn embedded_json(value: &Value) -> Result<Value, serde_json::Error> {
    match value {
        Value::String(text) => serde_json::from_str(text),
        other => Ok(other.clone()),
    }
}

/// Renders a value in the mapping-literal notation used by result messages,
/// e.g. `{'Symbol': 'GOOG', 'Year': 2018}`.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(fields) => {
            let fields: Vec<String> = fields
                .iter()
                .map(|(key, value)| format!("{}: {}", quote(key), literal(value)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
    }
}

/// Quotes like a Python `repr`: single quotes unless the text holds a single
/// quote and no double quote.
fn quote(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push(delimiter);
    for c in s.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c == delimiter => {
                quoted.push('\\');
                quoted.push(c);
            }
            c => quoted.push(c),
        }
    }
    quoted.push(delimiter);
    quoted
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{protocol::Response, storage::MemoryStore};

    fn run(store: &mut MemoryStore, content: Value) -> Value {
        serde_json::to_value(Response::from(execute(store, &content))).unwrap()
    }

    #[test]
    fn test_action_confirms_connectivity() {
        let mut store = MemoryStore::new();
        assert_eq!(
            run(&mut store, json!({"action": "test"})),
            json!({"results": {"Success": "Your client is communicating with the server."}})
        );
    }

    #[test]
    fn searchkey_without_matches() {
        let mut store = MemoryStore::new();
        let response = run(
            &mut store,
            json!({"action": "searchkey", "collection": "info", "key": "Symbol", "value": "GOOG"}),
        );

        assert_eq!(
            response,
            json!({"results": {
                "success": false,
                "collection": "info",
                "message": "No results with params {'Symbol': 'GOOG'} ",
            }})
        );
    }

    #[test]
    fn insert_reports_new_id() {
        let mut store = MemoryStore::new();
        let response = run(
            &mut store,
            json!({"action": "insert", "collection": "temp", "data": "{\"stock\":\"GOOG\"}"}),
        );

        let results = &response["results"];
        assert_eq!(results["success"], json!(true));
        assert_eq!(results["message"], json!("Inserted 1 item into temp"));
        assert!(results["result_id"].is_string());
        assert_eq!(store.len("temp"), 1);
    }

    #[test]
    fn insert_without_collection() {
        let mut store = MemoryStore::new();
        assert_eq!(
            run(&mut store, json!({"action": "insert"})),
            json!({"results": {"Error": "Inserting into mongo needs a specified 'collection'."}})
        );
    }

    #[test]
    fn missing_arguments_are_reported() {
        let mut store = MemoryStore::new();
        let cases = [
            (
                json!({"action": "insert", "collection": "temp"}),
                "Inserting into mongo needs 'data'.",
            ),
            (
                json!({"action": "searchkey", "collection": "info", "key": "Symbol"}),
                "Searching mongo needs a key and value.",
            ),
            (
                json!({"action": "search", "collection": "info"}),
                "Searching mongo needs a params object.",
            ),
            (
                json!({"action": "drop", "collection": "info"}),
                "Invalid action \"drop\".",
            ),
        ];

        for (content, message) in cases {
            assert_eq!(
                run(&mut store, content),
                json!({"results": {"Error": message}})
            );
        }
    }

    #[test]
    fn malformed_content_is_an_error_result() {
        let mut store = MemoryStore::new();
        let response = run(&mut store, json!(["not", "a", "request"]));
        let message = response["results"]["Error"].as_str().unwrap();

        assert!(message.starts_with("Malformed request"));
    }

    #[test]
    fn search_returns_matches_with_string_ids() {
        let mut store = MemoryStore::new();
        for data in [
            r#"{"_id": 1, "Symbol": "GOOG", "Year": 2018}"#,
            r#"{"Symbol": "GOOG", "Year": 2017}"#,
            r#"{"Symbol": "AAPL", "Year": 2018}"#,
        ] {
            let inserted = execute(
                &mut store,
                &json!({"action": "insert", "collection": "stockdata", "data": data}),
            );
            assert!(inserted.is_success());
        }

        let response = run(
            &mut store,
            json!({"action": "search", "collection": "stockdata", "params": "{\"Symbol\":\"GOOG\",\"Year\":2018}"}),
        );
        let results = &response["results"];

        assert_eq!(results["success"], json!(true));
        assert_eq!(results["count"], json!(1));
        assert_eq!(results["data"][0]["_id"], json!("1"));
        assert!(results["data"][0][LAST_MODIFIED].is_string());
    }

    #[test]
    fn invalid_query_is_distinct_from_no_results() {
        let mut store = MemoryStore::new();
        let response = run(
            &mut store,
            json!({"action": "search", "collection": "info", "params": "{\"Year\": {\"$regex\": 1}}"}),
        );
        let results = &response["results"];

        assert_eq!(results["success"], json!(false));
        assert_eq!(results["error"], json!("unknown operator '$regex'"));
        assert_eq!(results["message"], json!("Invalid query {'Year': {'$regex': 1}}"));

        let response = run(
            &mut store,
            json!({"action": "search", "collection": "info", "params": "not json"}),
        );
        assert!(response["results"]["error"].is_string());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut store = MemoryStore::new();
        let content = json!({"action": "insert", "collection": "temp", "data": "{\"_id\": \"a\"}"});
        run(&mut store, content.clone());

        assert_eq!(
            run(&mut store, content),
            json!({"results": {
                "success": false,
                "message": "Failed to insert into temp: duplicate _id 'a'",
            }})
        );
    }

    #[test]
    fn literal_renders_mapping_notation() {
        assert_eq!(
            literal(&json!({"a": [1, true, null], "b": "it's"})),
            r#"{'a': [1, True, None], 'b': "it's"}"#
        );
    }

    #[test]
    fn literal_quotes_like_repr() {
        let cases = [
            ("GOOG", r"'GOOG'"),
            ("it's", r#""it's""#),
            (r#"say "hi""#, r#"'say "hi"'"#),
            (r#"it's "x""#, r#"'it\'s "x"'"#),
            ("a\\b\tc", r"'a\\b\tc'"),
        ];

        for (text, expected) in cases {
            assert_eq!(literal(&json!(text)), expected);
        }
    }
}
