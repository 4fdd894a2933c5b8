//! Filter expressions over work item fields.
//!
//! An [`Expression`] compiles to a parameterized SQL predicate over the
//! `fields_json` column. Field values are addressed with
//! `json_extract(fields_json, '$."<name>"')` and compared in their storage
//! shape, so an `instant` literal is given in microseconds.

use rusqlite::types::ToSql;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for CompareOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" => Ok(Self::Eq),
            "!=" | "<>" | "ne" => Ok(Self::Ne),
            "<" | "lt" => Ok(Self::Lt),
            "<=" | "le" => Ok(Self::Le),
            ">" | "gt" => Ok(Self::Gt),
            ">=" | "ge" => Ok(Self::Ge),
            other => Err(Error::bad_parameter(
                "op",
                format!("unknown comparison '{other}'"),
            )),
        }
    }
}

/// Boolean filter over work item fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    /// Matches every item.
    #[default]
    True,
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    IsNull(String),
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Parse the simple query form: a JSON object whose entries are AND-ed
    /// equality tests, e.g. `{"system.state": "new"}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadParameter`] when `json` is not a JSON object.
    pub fn parse_simple(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|err| Error::bad_parameter("filter", err.to_string()))?;
        let Value::Object(entries) = value else {
            return Err(Error::bad_parameter(
                "filter",
                "simple query must be a JSON object",
            ));
        };
        let mut terms: Vec<Self> = entries
            .into_iter()
            .map(|(field, value)| Self::equals(field, value))
            .collect();
        Ok(match terms.len() {
            0 => Self::True,
            1 => terms.remove(0),
            _ => Self::And(terms),
        })
    }

    /// Compile into a SQL predicate over `column`, appending bind values to
    /// `params` and numbering placeholders after the ones already there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadParameter`] for field names containing `"`, for
    /// array or object literals, and for ordering comparisons with `null`.
    pub fn to_sql(&self, column: &str, params: &mut Vec<Box<dyn ToSql>>) -> Result<String> {
        match self {
            Self::True => Ok("1".to_string()),
            Self::IsNull(field) => {
                let extract = extract(column, field, params)?;
                Ok(format!("{extract} IS NULL"))
            }
            Self::Compare { field, op, value } => {
                let extract = extract(column, field, params)?;
                match (value, op) {
                    (Value::Null, CompareOp::Eq) => return Ok(format!("{extract} IS NULL")),
                    (Value::Null, CompareOp::Ne) => return Ok(format!("{extract} IS NOT NULL")),
                    _ => {}
                }
                push_literal(field, value, params)?;
                Ok(format!("{extract} {} ?{}", op.as_sql(), params.len()))
            }
            Self::And(terms) => join(terms, " AND ", "1", column, params),
            Self::Or(terms) => join(terms, " OR ", "0", column, params),
            Self::Not(inner) => Ok(format!("NOT ({})", inner.to_sql(column, params)?)),
        }
    }
}

fn extract(column: &str, field: &str, params: &mut Vec<Box<dyn ToSql>>) -> Result<String> {
    if field.is_empty() || field.contains('"') {
        return Err(Error::bad_parameter(
            "filter",
            format!("invalid field name '{field}'"),
        ));
    }
    params.push(Box::new(format!("$.\"{field}\"")));
    Ok(format!("json_extract({column}, ?{})", params.len()))
}

fn push_literal(field: &str, value: &Value, params: &mut Vec<Box<dyn ToSql>>) -> Result<()> {
    match value {
        Value::String(s) => params.push(Box::new(s.clone())),
        Value::Bool(b) => params.push(Box::new(i64::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                params.push(Box::new(i));
            } else if let Some(f) = n.as_f64() {
                params.push(Box::new(f));
            } else {
                return Err(Error::bad_parameter(
                    "filter",
                    format!("number {n} for '{field}' is out of range"),
                ));
            }
        }
        Value::Null => {
            return Err(Error::bad_parameter(
                "filter",
                format!("'{field}' can only be compared to null with = or !="),
            ));
        }
        Value::Array(_) | Value::Object(_) => {
            return Err(Error::bad_parameter(
                "filter",
                format!("'{field}' must be compared to a scalar"),
            ));
        }
    }
    Ok(())
}

fn join(
    terms: &[Expression],
    separator: &str,
    empty: &str,
    column: &str,
    params: &mut Vec<Box<dyn ToSql>>,
) -> Result<String> {
    if terms.is_empty() {
        return Ok(empty.to_string());
    }
    let parts = terms
        .iter()
        .map(|term| term.to_sql(column, params))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", parts.join(separator)))
}

#[cfg(test)]
mod tests {
    use super::{CompareOp, Expression};
    use rusqlite::types::ToSql;
    use serde_json::json;

    fn compile(expr: &Expression) -> (String, usize) {
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        let sql = expr.to_sql("w.fields_json", &mut params).expect("compile");
        (sql, params.len())
    }

    #[test]
    fn equality_binds_path_and_value() {
        let (sql, n) = compile(&Expression::equals("system.state", "new"));
        assert_eq!(sql, "json_extract(w.fields_json, ?1) = ?2");
        assert_eq!(n, 2);
    }

    #[test]
    fn compound_expressions_nest() {
        let expr = Expression::And(vec![
            Expression::equals("system.state", "new"),
            Expression::Not(Box::new(Expression::Or(vec![
                Expression::IsNull("system.assignee".to_string()),
                Expression::compare("estimate", CompareOp::Ge, 3),
            ]))),
        ]);
        let (sql, n) = compile(&expr);
        assert_eq!(
            sql,
            "(json_extract(w.fields_json, ?1) = ?2 AND NOT ((json_extract(w.fields_json, ?3) IS NULL OR json_extract(w.fields_json, ?4) >= ?5)))"
        );
        assert_eq!(n, 5);
    }

    #[test]
    fn null_literals_become_is_null() {
        let (sql, n) = compile(&Expression::equals("system.assignee", json!(null)));
        assert_eq!(sql, "json_extract(w.fields_json, ?1) IS NULL");
        assert_eq!(n, 1);
    }

    #[test]
    fn empty_connectives() {
        assert_eq!(compile(&Expression::And(vec![])).0, "1");
        assert_eq!(compile(&Expression::Or(vec![])).0, "0");
        assert_eq!(compile(&Expression::True).0, "1");
    }

    #[test]
    fn rejects_unsafe_field_names_and_compound_literals() {
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        assert!(
            Expression::equals("a\"b", 1)
                .to_sql("c", &mut params)
                .is_err()
        );
        assert!(
            Expression::equals("labels", json!(["x"]))
                .to_sql("c", &mut params)
                .is_err()
        );
        assert!(
            Expression::compare("x", CompareOp::Lt, json!(null))
                .to_sql("c", &mut params)
                .is_err()
        );
    }

    #[test]
    fn simple_query_form() {
        assert_eq!(
            Expression::parse_simple(r#"{"system.state":"new"}"#).unwrap(),
            Expression::equals("system.state", "new")
        );
        assert_eq!(Expression::parse_simple("{}").unwrap(), Expression::True);
        assert!(matches!(
            Expression::parse_simple(r#"{"a":1,"b":2}"#).unwrap(),
            Expression::And(terms) if terms.len() == 2
        ));
        assert!(Expression::parse_simple("[1]").is_err());
        assert!(Expression::parse_simple("nope").is_err());
    }

    #[test]
    fn ops_parse_from_symbols_and_words() {
        assert_eq!("!=".parse::<CompareOp>().unwrap(), CompareOp::Ne);
        assert_eq!("GE".parse::<CompareOp>().unwrap(), CompareOp::Ge);
        assert!("~".parse::<CompareOp>().is_err());
    }
}
