//! Turns a JSON request body into column values for one entity.
//!
//! Errors are collected for every field before anything is written, so a client
//! sees all problems with a payload at once.

use crate::error::{FieldErrors, Result, NON_FIELD_ERRORS};
use crate::password::hash_password;
use crate::schema::{entity_by_name, Entity, Field, FieldDefault, FieldKind, FixedPoint};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};

pub const REQUIRED: &str = "This field is required.";
pub const NOT_NULL: &str = "This field may not be null.";
pub const NOT_BLANK: &str = "This field may not be blank.";

/// Which write is being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    /// PUT: required fields must be present, omitted optional fields keep their value.
    Replace,
    /// PATCH: only the fields present are touched.
    Partial,
}

pub type ColumnValues = Vec<(&'static Field, SqlValue)>;

/// Current time in the format every datetime column uses.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Validate `payload` for `entity`. `current_id` is the row being updated, if any.
pub fn validate_payload(
    conn: &Connection,
    entity: &'static Entity,
    payload: &Map<String, Value>,
    mode: WriteMode,
    current_id: Option<i64>,
) -> Result<ColumnValues> {
    let mut errors = FieldErrors::new();
    let mut values: ColumnValues = Vec::new();

    for field in entity.writable_fields() {
        match payload.get(field.name) {
            Some(Value::Null) if field.nullable => values.push((field, SqlValue::Null)),
            Some(Value::Null) => errors.add(field.name, NOT_NULL),
            Some(raw) => match convert(conn, field, raw) {
                Ok(value) => values.push((field, value)),
                Err(message) => errors.add(field.name, message),
            },
            None => match mode {
                WriteMode::Partial => {}
                _ if field.is_required() => errors.add(field.name, REQUIRED),
                WriteMode::Create => {
                    if let Some(value) = default_value(field) {
                        values.push((field, value));
                    }
                }
                WriteMode::Replace => {}
            },
        }
    }

    check_unique(conn, entity, &values, current_id, &mut errors)?;
    check_unique_together(conn, entity, &values, current_id, &mut errors)?;

    errors.into_result()?;
    Ok(values)
}

fn default_value(field: &Field) -> Option<SqlValue> {
    match field.default {
        FieldDefault::Bool(b) => Some(SqlValue::Integer(b as i64)),
        FieldDefault::Decimal(scaled) => Some(SqlValue::Integer(scaled)),
        FieldDefault::Now => Some(SqlValue::Text(now_timestamp())),
        FieldDefault::None if field.nullable => Some(SqlValue::Null),
        FieldDefault::None => None,
    }
}

fn convert(conn: &Connection, field: &Field, raw: &Value) -> std::result::Result<SqlValue, String> {
    match field.kind {
        FieldKind::Text { max_length } => text(raw, max_length).map(SqlValue::Text),
        FieldKind::Password { max_length } => {
            text(raw, max_length).and_then(|p| hash_password(&p).map(SqlValue::Text))
        }
        FieldKind::Choice { choices } => {
            let code = match raw {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            if choices.iter().any(|(c, _)| *c == code) {
                Ok(SqlValue::Text(code))
            } else {
                Err(format!("\"{code}\" is not a valid choice."))
            }
        }
        FieldKind::Decimal { max_digits, places } => FixedPoint::from_json(raw, max_digits, places)
            .map(|d| SqlValue::Integer(d.scaled()))
            .map_err(|e| e.to_string()),
        FieldKind::Bool => boolean(raw)
            .map(|b| SqlValue::Integer(b as i64))
            .ok_or_else(|| "Must be a valid boolean.".to_string()),
        FieldKind::Date => raw
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            .map(|d| SqlValue::Text(d.format("%Y-%m-%d").to_string()))
            .ok_or_else(|| {
                "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.".to_string()
            }),
        FieldKind::DateTime => raw
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|dt| {
                SqlValue::Text(
                    dt.with_timezone(&Utc)
                        .to_rfc3339_opts(SecondsFormat::Micros, true),
                )
            })
            .ok_or_else(|| {
                "Datetime has wrong format. Use one of these formats instead: YYYY-MM-DDThh:mm[:ss[.uuuuuu]][+HH:MM|-HH:MM|Z].".to_string()
            }),
        FieldKind::ForeignKey { target } => {
            let pk = primary_key(raw)?;
            let table = entity_by_name(target).map_or(target, |e| e.table);
            let exists = conn
                .query_row(
                    &format!("SELECT 1 FROM {table} WHERE id = ?1"),
                    [pk],
                    |_| Ok(()),
                )
                .optional()
                .map_err(|e| e.to_string())?
                .is_some();
            if exists {
                Ok(SqlValue::Integer(pk))
            } else {
                Err(format!("Invalid pk \"{pk}\" - object does not exist."))
            }
        }
        FieldKind::Id => Err("This field is read-only.".to_string()),
    }
}

fn text(raw: &Value, max_length: usize) -> std::result::Result<String, String> {
    let s = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Err("Not a valid string.".to_string()),
    };
    if s.is_empty() {
        return Err(NOT_BLANK.to_string());
    }
    if s.chars().count() > max_length {
        return Err(format!(
            "Ensure this field has no more than {max_length} characters."
        ));
    }
    Ok(s)
}

fn boolean(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn primary_key(raw: &Value) -> std::result::Result<i64, String> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("Incorrect type. Expected pk value, received {n}.")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| "Incorrect type. Expected pk value, received str.".to_string()),
        Value::Bool(_) => Err("Incorrect type. Expected pk value, received bool.".to_string()),
        Value::Array(_) => Err("Incorrect type. Expected pk value, received list.".to_string()),
        _ => Err("Incorrect type. Expected pk value, received dict.".to_string()),
    }
}

fn check_unique(
    conn: &Connection,
    entity: &Entity,
    values: &ColumnValues,
    current_id: Option<i64>,
    errors: &mut FieldErrors,
) -> Result<()> {
    for (field, value) in values.iter().filter(|(f, _)| f.unique) {
        if errors.has(field.name) || matches!(value, SqlValue::Null) {
            continue;
        }
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1 AND id != ?2",
            entity.table, field.column
        );
        let taken = conn
            .query_row(&sql, rusqlite::params![value, current_id.unwrap_or(-1)], |_| Ok(()))
            .optional()?
            .is_some();
        if taken {
            errors.add(
                field.name,
                format!(
                    "{} with this {} already exists.",
                    entity.label,
                    field.name.replace('_', " ")
                ),
            );
        }
    }
    Ok(())
}

fn check_unique_together(
    conn: &Connection,
    entity: &Entity,
    values: &ColumnValues,
    current_id: Option<i64>,
    errors: &mut FieldErrors,
) -> Result<()> {
    'groups: for group in entity.unique_together {
        let mut columns = Vec::with_capacity(group.len());
        let mut params: Vec<SqlValue> = Vec::with_capacity(group.len() + 1);
        for name in group.iter() {
            if errors.has(name) {
                continue 'groups;
            }
            let Some(field) = entity.field(name) else {
                continue 'groups;
            };
            let value = match values.iter().find(|(f, _)| f.name == *name) {
                Some((_, v)) => v.clone(),
                None => match current_id {
                    Some(id) => conn.query_row(
                        &format!("SELECT {} FROM {} WHERE id = ?1", field.column, entity.table),
                        [id],
                        |row| row.get::<_, SqlValue>(0),
                    )?,
                    None => continue 'groups,
                },
            };
            columns.push(field.column);
            params.push(value);
        }

        let conditions: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} AND id != ?{}",
            entity.table,
            conditions.join(" AND "),
            columns.len() + 1
        );
        params.push(SqlValue::Integer(current_id.unwrap_or(-1)));
        let taken = conn
            .query_row(&sql, params_from_iter(params.iter()), |_| Ok(()))
            .optional()?
            .is_some();
        if taken {
            errors.add(
                NON_FIELD_ERRORS,
                format!("The fields {} must make a unique set.", group.join(", ")),
            );
        }
    }
    Ok(())
}
