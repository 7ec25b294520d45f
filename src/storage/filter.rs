//! Search filters.
//!
//! A filter is compiled from a params mapping such as
//! `{"Symbol": "GOOG", "Year": {"$gte": 2018}}`. Keys are dotted field paths,
//! or `$and` / `$or` holding an array of nested mappings. A field's value is
//! either a literal to compare for equality or a mapping of operators:
//!
//! | operator  | matches when the field...                 |
//! |-----------|-------------------------------------------|
//! | `$eq`     | equals the operand                        |
//! | `$ne`     | does not equal the operand                |
//! | `$gt` ... | compares greater (`$gte`, `$lt`, `$lte`)   |
//! | `$in`     | equals any operand in the array           |
//! | `$nin`    | equals none of the operands               |
//! | `$exists` | is present (`true`) or absent (`false`)   |
//!
//! An array field matches equality and comparisons if any element does.
use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;

use super::Document;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("params must be a JSON object")]
    NotAnObject,

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("field '{0}' mixes operators with plain keys")]
    MixedOperators(String),

    #[error("operator '{operator}' {reason}")]
    InvalidOperand { operator: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Field {
        path: String,
        conditions: Vec<Condition>,
    },
}

impl Filter {
    /// Filter matching every document.
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn parse(params: &Value) -> Result<Self, FilterError> {
        let Value::Object(fields) = params else {
            return Err(FilterError::NotAnObject);
        };

        let mut clauses = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            let clause = match key.as_str() {
                "$and" => Filter::And(parse_clauses(key, value)?),
                "$or" => Filter::Or(parse_clauses(key, value)?),
                operator if operator.starts_with('$') => {
                    return Err(FilterError::UnknownOperator(operator.to_string()));
                }
                path => Filter::Field {
                    path: path.to_string(),
                    conditions: parse_conditions(path, value)?,
                },
            };
            clauses.push(clause);
        }

        Ok(Filter::And(clauses))
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::And(clauses) => clauses.iter().all(|clause| clause.matches(document)),
            Filter::Or(clauses) => clauses.iter().any(|clause| clause.matches(document)),
            Filter::Field { path, conditions } => {
                let field = lookup(document, path);
                conditions
                    .iter()
                    .all(|condition| condition.matches(field))
            }
        }
    }
}

impl Condition {
    fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Condition::Eq(operand) => equals_field(field, operand),
            Condition::Ne(operand) => !equals_field(field, operand),
            Condition::Gt(operand) => compares(field, operand, |o| o == Ordering::Greater),
            Condition::Gte(operand) => compares(field, operand, |o| o != Ordering::Less),
            Condition::Lt(operand) => compares(field, operand, |o| o == Ordering::Less),
            Condition::Lte(operand) => compares(field, operand, |o| o != Ordering::Greater),
            Condition::In(operands) => operands.iter().any(|o| equals_field(field, o)),
            Condition::Nin(operands) => !operands.iter().any(|o| equals_field(field, o)),
            Condition::Exists(expected) => field.is_some() == *expected,
        }
    }
}

fn parse_clauses(operator: &str, value: &Value) -> Result<Vec<Filter>, FilterError> {
    let Value::Array(items) = value else {
        return Err(FilterError::InvalidOperand {
            operator: operator.to_string(),
            reason: "needs an array of objects".to_string(),
        });
    };
    items.iter().map(Filter::parse).collect()
}

fn parse_conditions(path: &str, value: &Value) -> Result<Vec<Condition>, FilterError> {
    let operators = match value {
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => map,
        literal => return Ok(vec![Condition::Eq(literal.clone())]),
    };
    if !operators.keys().all(|k| k.starts_with('$')) {
        return Err(FilterError::MixedOperators(path.to_string()));
    }

    operators
        .iter()
        .map(|(operator, operand)| {
            let condition = match operator.as_str() {
                "$eq" => Condition::Eq(operand.clone()),
                "$ne" => Condition::Ne(operand.clone()),
                "$gt" => Condition::Gt(operand.clone()),
                "$gte" => Condition::Gte(operand.clone()),
                "$lt" => Condition::Lt(operand.clone()),
                "$lte" => Condition::Lte(operand.clone()),
                "$in" => Condition::In(operand_list(operator, operand)?),
                "$nin" => Condition::Nin(operand_list(operator, operand)?),
                "$exists" => match operand {
                    Value::Bool(expected) => Condition::Exists(*expected),
                    _ => {
                        return Err(FilterError::InvalidOperand {
                            operator: operator.clone(),
                            reason: "needs a boolean".to_string(),
                        });
                    }
                },
                other => return Err(FilterError::UnknownOperator(other.to_string())),
            };
            Ok(condition)
        })
        .collect()
}

fn operand_list(operator: &str, operand: &Value) -> Result<Vec<Value>, FilterError> {
    match operand {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(FilterError::InvalidOperand {
            operator: operator.to_string(),
            reason: "needs an array".to_string(),
        }),
    }
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn equals_field(field: Option<&Value>, operand: &Value) -> bool {
    match field {
        None => operand.is_null(),
        Some(Value::Array(items)) if !operand.is_array() => {
            items.iter().any(|item| equals(item, operand))
        }
        Some(value) => equals(value, operand),
    }
}

fn compares(field: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match field {
        None => false,
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| compare(item, operand).is_some_and(&accept)),
        Some(value) => compare(value, operand).is_some_and(accept),
    }
}

/// Structural equality with numbers compared by value.
fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| equals(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| equals(x, y)))
        }
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn matches(params: Value, document: Value) -> bool {
        Filter::parse(&params).unwrap().matches(&doc(document))
    }

    #[test]
    fn literal_fields_match_by_equality() {
        let stock = json!({"Symbol": "GOOG", "Year": 2018, "Price": 1000.88});

        assert!(matches(json!({"Symbol": "GOOG"}), stock.clone()));
        assert!(matches(json!({"Symbol": "GOOG", "Year": 2018.0}), stock.clone()));
        assert!(!matches(json!({"Symbol": "AAPL"}), stock.clone()));
        assert!(!matches(json!({"Missing": "x"}), stock.clone()));
        assert!(matches(json!({}), stock));
    }

    #[test]
    fn comparison_operators() {
        let stock = json!({"Year": 2018, "Symbol": "GOOG"});

        assert!(matches(json!({"Year": {"$gte": 2018, "$lt": 2020}}), stock.clone()));
        assert!(!matches(json!({"Year": {"$gt": 2018}}), stock.clone()));
        assert!(matches(json!({"Symbol": {"$lte": "GOOH"}}), stock.clone()));
        assert!(!matches(json!({"Symbol": {"$gt": 5}}), stock.clone()));
        assert!(matches(json!({"Year": {"$ne": 2017}}), stock));
    }

    #[test]
    fn set_and_existence_operators() {
        let stock = json!({"Symbol": "GOOG"});

        assert!(matches(json!({"Symbol": {"$in": ["AAPL", "GOOG"]}}), stock.clone()));
        assert!(matches(json!({"Symbol": {"$nin": ["AAPL"]}}), stock.clone()));
        assert!(matches(json!({"Year": {"$exists": false}}), stock.clone()));
        assert!(!matches(json!({"Symbol": {"$exists": false}}), stock));
    }

    #[test]
    fn nested_paths_and_arrays() {
        let document = json!({"quote": {"open": 10, "tags": ["tech", "large"]}});

        assert!(matches(json!({"quote.open": 10}), document.clone()));
        assert!(matches(json!({"quote.tags": "tech"}), document.clone()));
        assert!(matches(json!({"quote.tags.1": "large"}), document.clone()));
        assert!(!matches(json!({"quote.open.deep": 10}), document));
    }

    #[test]
    fn logical_operators() {
        let stock = json!({"Symbol": "GOOG", "Year": 2018});

        assert!(matches(
            json!({"$or": [{"Symbol": "AAPL"}, {"Year": 2018}]}),
            stock.clone()
        ));
        assert!(!matches(
            json!({"$and": [{"Symbol": "GOOG"}, {"Year": 2019}]}),
            stock
        ));
    }

    #[test]
    fn invalid_filters_are_rejected() {
        assert_eq!(Filter::parse(&json!("GOOG")), Err(FilterError::NotAnObject));
        assert_eq!(
            Filter::parse(&json!({"$where": "1"})),
            Err(FilterError::UnknownOperator("$where".into()))
        );
        assert_eq!(
            Filter::parse(&json!({"Year": {"$regex": "x"}})),
            Err(FilterError::UnknownOperator("$regex".into()))
        );
        assert_eq!(
            Filter::parse(&json!({"Year": {"$gt": 1, "plain": 2}})),
            Err(FilterError::MixedOperators("Year".into()))
        );
        assert!(matches!(
            Filter::parse(&json!({"Year": {"$in": 2018}})),
            Err(FilterError::InvalidOperand { .. })
        ));
    }
}
