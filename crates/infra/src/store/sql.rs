//! Translation of [`Predicate`] trees into Postgres `WHERE` fragments.
//!
//! Records live in a `jsonb` column. Each field path becomes a SQL/JSON path
//! with a trailing `[*]`, so in lax mode arrays are flattened at every step,
//! mirroring [`Predicate::matches`]. Only string leaves compare equal.
//!
//! Values and paths are always bound parameters. Path segments are still
//! checked to be plain identifiers so a malformed field fails loudly instead
//! of matching nothing.

use sqlx::{Postgres, QueryBuilder};

use chatdesk_auth::{Field, Predicate};

use super::StoreError;

/// Append `predicate` as a boolean SQL expression over the jsonb `column`.
pub fn push_predicate(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &'static str,
    predicate: &Predicate,
) -> Result<(), StoreError> {
    match predicate {
        Predicate::All => {
            qb.push("TRUE");
        }
        Predicate::Eq { field, value } => {
            push_leaf_test(qb, column, field)?;
            qb.push(" = ");
            qb.push_bind(value.clone());
            qb.push(")");
        }
        Predicate::In { values, .. } if values.is_empty() => {
            qb.push("FALSE");
        }
        Predicate::In { field, values } => {
            push_leaf_test(qb, column, field)?;
            qb.push(" = ANY(");
            qb.push_bind(values.iter().cloned().collect::<Vec<String>>());
            qb.push("))");
        }
        Predicate::And { clauses } => push_joined(qb, column, clauses, " AND ", "TRUE")?,
        Predicate::Or { clauses } => push_joined(qb, column, clauses, " OR ", "FALSE")?,
    }
    Ok(())
}

fn push_joined(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &'static str,
    clauses: &[Predicate],
    separator: &str,
    empty: &str,
) -> Result<(), StoreError> {
    if clauses.is_empty() {
        qb.push(empty);
        return Ok(());
    }
    qb.push("(");
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            qb.push(separator);
        }
        push_predicate(qb, column, clause)?;
    }
    qb.push(")");
    Ok(())
}

/// Opens `EXISTS (... WHERE <leaf text>`; the caller appends the comparison
/// and the closing parenthesis.
fn push_leaf_test(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &'static str,
    field: &Field,
) -> Result<(), StoreError> {
    let path = json_path(field)?;
    qb.push("EXISTS (SELECT 1 FROM jsonb_path_query(");
    qb.push(column);
    qb.push(", ");
    qb.push_bind(path);
    qb.push("::jsonpath) AS leaf(value) WHERE jsonb_typeof(leaf.value) = 'string' AND leaf.value #>> '{}'");
    Ok(())
}

/// `contact.branchId` -> `$.contact.branchId[*]`.
pub fn json_path(field: &Field) -> Result<String, StoreError> {
    let mut path = String::from("$");
    for segment in field.segments() {
        if !is_identifier(segment) {
            return Err(StoreError::InvalidQuery(format!(
                "field path '{}' has an invalid segment '{}'",
                field, segment
            )));
        }
        path.push('.');
        path.push_str(segment);
    }
    path.push_str("[*]");
    Ok(path)
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
