//! Translates typed filters into parameterized SQL conditions.
//!
//! Column identifiers come from registry [`Field`]s; every caller value ends up
//! in the bind list, never in the condition text.

use crate::{
    error::{Result, ServiceError},
    query::statement::SqlBindValue,
    registry::{Column, Field, FieldKind},
    time::range_sentinel_max,
};
use chrono::NaiveDateTime;

/// One filter per query.
///
/// Date ranges use strict bounds on both ends; numeric ranges are inclusive
/// on both ends for every numeric field.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    ExactDate(NaiveDateTime),
    DateRange {
        min: Option<NaiveDateTime>,
        max: Option<NaiveDateTime>,
    },
    NumericRange {
        min: Option<f64>,
        max: Option<f64>,
    },
    CategorySet(Vec<String>),
    /// Canonical label expanded to the raw labels stored for it.
    MappedCategory(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Condition text with `?` placeholders, one per bind.
    pub clause: String,
    pub binds: Vec<SqlBindValue>,
}

impl Predicate {
    pub fn always() -> Self {
        Self {
            clause: "TRUE".to_string(),
            binds: Vec::new(),
        }
    }

    fn never() -> Self {
        Self {
            clause: "FALSE".to_string(),
            binds: Vec::new(),
        }
    }

    fn all_of(parts: Vec<(String, SqlBindValue)>) -> Self {
        if parts.is_empty() {
            return Self::always();
        }
        let (clauses, binds): (Vec<_>, Vec<_>) = parts.into_iter().unzip();
        Self {
            clause: clauses.join(" AND "),
            binds,
        }
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn build(field: &Field, spec: &FilterSpec) -> Result<Predicate> {
    match spec {
        FilterSpec::ExactDate(at) => {
            expect_kind(field, matches!(field.kind, FieldKind::Time), "a date")?;
            let column = single_column(field)?;
            Ok(Predicate {
                clause: format!("{} = ?", quote_ident(column)),
                binds: vec![SqlBindValue::Timestamp(*at)],
            })
        }
        FilterSpec::DateRange { min, max } => {
            expect_kind(
                field,
                matches!(field.kind, FieldKind::Time),
                "a date range",
            )?;
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(ServiceError::InvalidFilterValue(format!(
                        "{}: min {min} is after max {max}",
                        field.name
                    )));
                }
            }

            let (lower, upper) = bound_columns(field);
            let mut parts = Vec::with_capacity(2);
            if let Some(min) = min {
                parts.push((
                    format!("{} > ?", quote_ident(lower)),
                    SqlBindValue::Timestamp(*min),
                ));
            }
            parts.push((
                format!("{} < ?", quote_ident(upper)),
                SqlBindValue::Timestamp(max.unwrap_or_else(range_sentinel_max)),
            ));
            Ok(Predicate::all_of(parts))
        }
        FilterSpec::NumericRange { min, max } => {
            expect_kind(
                field,
                matches!(field.kind, FieldKind::Numeric),
                "a numeric range",
            )?;
            for bound in [min, max].into_iter().flatten() {
                if !bound.is_finite() {
                    return Err(ServiceError::InvalidFilterValue(format!(
                        "{}: range bounds must be finite numbers",
                        field.name
                    )));
                }
            }
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(ServiceError::InvalidFilterValue(format!(
                        "{}: min {min} is greater than max {max}",
                        field.name
                    )));
                }
            }

            let column = quote_ident(single_column(field)?);
            let mut parts = Vec::with_capacity(2);
            if let Some(min) = min {
                parts.push((format!("{column} >= ?"), SqlBindValue::Float(*min)));
            }
            if let Some(max) = max {
                parts.push((format!("{column} <= ?"), SqlBindValue::Float(*max)));
            }
            Ok(Predicate::all_of(parts))
        }
        FilterSpec::CategorySet(values) => {
            expect_kind(
                field,
                matches!(field.kind, FieldKind::Text { .. }),
                "a category set",
            )?;
            let column = single_column(field)?;
            let mut values = values.clone();
            values.sort();
            values.dedup();
            Ok(membership(column, values))
        }
        FilterSpec::MappedCategory(label) => {
            let FieldKind::Text {
                mapping: Some(mapping),
            } = field.kind
            else {
                return Err(ServiceError::InvalidFilterValue(format!(
                    "{} has no canonical categories",
                    field.name
                )));
            };
            let column = single_column(field)?;
            let raw = mapping
                .iter()
                .find(|(canonical, _)| *canonical == label.as_str())
                .map(|(_, raw)| *raw)
                .ok_or_else(|| {
                    let known: Vec<_> = mapping.iter().map(|(canonical, _)| *canonical).collect();
                    ServiceError::InvalidFilterValue(format!(
                        "unknown {} category '{label}' (expected one of {})",
                        field.name,
                        known.join(", ")
                    ))
                })?;
            Ok(membership(
                column,
                raw.iter().map(|value| value.to_string()).collect(),
            ))
        }
    }
}

fn membership(column: &str, values: Vec<String>) -> Predicate {
    if values.is_empty() {
        return Predicate::never();
    }
    Predicate {
        clause: format!("{} = ANY(?)", quote_ident(column)),
        binds: vec![SqlBindValue::TextArray(values)],
    }
}

fn expect_kind(field: &Field, fits: bool, wanted: &str) -> Result<()> {
    if fits {
        Ok(())
    } else {
        Err(ServiceError::InvalidFilterValue(format!(
            "{} cannot be filtered by {wanted}",
            field.name
        )))
    }
}

fn single_column(field: &Field) -> Result<&'static str> {
    match field.column {
        Column::Single(column) => Ok(column),
        Column::Span { .. } => Err(ServiceError::InvalidFilterValue(format!(
            "{} is a period and only accepts date ranges",
            field.name
        ))),
    }
}

fn bound_columns(field: &Field) -> (&'static str, &'static str) {
    match field.column {
        Column::Single(column) => (column, column),
        Column::Span { start, end } => (start, end),
    }
}
