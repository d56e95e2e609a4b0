//! SQL statements for registered datasets.
//!
//! Statement text is assembled only from registry identifiers and predicate
//! clauses; values travel separately as binds.

use crate::{
    filter::{quote_ident, Predicate},
    registry::{DatasetDescriptor, Projection},
};
use chrono::NaiveDateTime;
use diesel::pg::Pg;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};

#[derive(Debug, Clone, PartialEq)]
pub enum SqlBindValue {
    TextArray(Vec<String>),
    Float(f64),
    Timestamp(NaiveDateTime),
}

impl SqlBindValue {
    pub(crate) fn apply<'a>(
        &self,
        query: BoxedSqlQuery<'a, Pg, SqlQuery>,
    ) -> BoxedSqlQuery<'a, Pg, SqlQuery> {
        use diesel::sql_types::{Array, Float8, Text, Timestamp};
        match self {
            SqlBindValue::TextArray(values) => query.bind::<Array<Text>, _>(values.clone()),
            SqlBindValue::Float(value) => query.bind::<Float8, _>(*value),
            SqlBindValue::Timestamp(value) => query.bind::<Timestamp, _>(*value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    binds: Vec<SqlBindValue>,
}

impl Statement {
    fn new(sql: String, binds: Vec<SqlBindValue>) -> Self {
        Self { sql, binds }
    }

    /// Statement text with numbered Postgres placeholders.
    pub fn sql(&self) -> String {
        rewrite_placeholders(&self.sql)
    }

    pub fn binds(&self) -> &[SqlBindValue] {
        &self.binds
    }
}

/// Rows of `descriptor` matching `predicate`, each as a JSON object of
/// columns plus the geometry rendered as GeoJSON text.
pub fn select_rows(descriptor: &DatasetDescriptor, predicate: &Predicate) -> Statement {
    let projection = match descriptor.projection {
        Projection::All => "*".to_string(),
        Projection::Columns(columns) => columns
            .iter()
            .map(|column| quote_ident(column))
            .collect::<Vec<_>>()
            .join(", "),
    };

    let (properties, geometry) = match descriptor.geometry_column {
        Some(column) => (
            format!("to_jsonb(t) - '{column}'"),
            format!("ST_AsGeoJSON(t.{})", quote_ident(column)),
        ),
        None => ("to_jsonb(t)".to_string(), "NULL::text".to_string()),
    };

    let sql = format!(
        "SELECT {properties} AS properties, {geometry} AS geometry\nFROM (SELECT {projection} FROM {table} WHERE {clause}) AS t\nORDER BY t.{time} ASC",
        table = quote_ident(descriptor.table),
        clause = predicate.clause,
        time = quote_ident(descriptor.time_column),
    );

    Statement::new(sql, predicate.binds.clone())
}

pub fn latest_time(descriptor: &DatasetDescriptor) -> Statement {
    Statement::new(
        format!(
            "SELECT max({})::timestamp AS at FROM {}",
            quote_ident(descriptor.time_column),
            quote_ident(descriptor.table)
        ),
        Vec::new(),
    )
}

pub fn distinct_times(descriptor: &DatasetDescriptor) -> Statement {
    let column = quote_ident(descriptor.time_column);
    Statement::new(
        format!(
            "SELECT DISTINCT {column}::timestamp AS at FROM {} WHERE {column} IS NOT NULL ORDER BY at DESC",
            quote_ident(descriptor.table)
        ),
        Vec::new(),
    )
}

pub fn distinct_values(descriptor: &DatasetDescriptor, column: &str) -> Statement {
    let column = quote_ident(column);
    Statement::new(
        format!(
            "SELECT DISTINCT {column}::text AS value FROM {} WHERE {column} IS NOT NULL ORDER BY value ASC",
            quote_ident(descriptor.table)
        ),
        Vec::new(),
    )
}

pub fn extent(descriptor: &DatasetDescriptor, column: &str) -> Statement {
    let column = quote_ident(column);
    Statement::new(
        format!(
            "SELECT min({column})::double precision AS min_value, max({column})::double precision AS max_value FROM {}",
            quote_ident(descriptor.table)
        ),
        Vec::new(),
    )
}

fn rewrite_placeholders(sql: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut index = 1;
    for ch in sql.chars() {
        if ch == '?' {
            result.push('$');
            result.push_str(&index.to_string());
            index += 1;
        } else {
            result.push(ch);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{build, FilterSpec};
    use crate::registry::Dataset;
    use crate::time::parse_time;

    #[test]
    fn layer_rows_use_fixed_projection_and_geojson() {
        let descriptor = Dataset::DroughtCode.descriptor();
        let predicate = build(
            &descriptor.time_field(),
            &FilterSpec::ExactDate(parse_time("2024-06-01").unwrap()),
        )
        .unwrap();
        let statement = select_rows(descriptor, &predicate);
        let sql = statement.sql();

        assert!(
            sql.contains(r#"SELECT "value", "acquisition_date", "lon", "lat", "geometry" FROM "drought_code""#),
            "{sql}"
        );
        assert!(sql.contains(r#"ST_AsGeoJSON(t."geometry") AS geometry"#), "{sql}");
        assert!(sql.contains(r#"WHERE "acquisition_date" = $1"#), "{sql}");
        assert_eq!(statement.binds().len(), 1);
    }

    #[test]
    fn record_rows_select_every_column() {
        let descriptor = Dataset::Perimeters.descriptor();
        let statement = select_rows(descriptor, &Predicate::always());
        let sql = statement.sql();

        assert!(sql.contains(r#"SELECT * FROM "fire_perimeter_estimate" WHERE TRUE"#), "{sql}");
        assert!(sql.contains(r#"ORDER BY t."lastdate" ASC"#), "{sql}");
        assert!(statement.binds().is_empty());
    }

    #[test]
    fn placeholders_are_numbered_in_bind_order() {
        let descriptor = Dataset::FireHistory.descriptor();
        let predicate = build(
            descriptor.field("startdate").unwrap(),
            &FilterSpec::DateRange {
                min: Some(parse_time("2024-01-01").unwrap()),
                max: Some(parse_time("2024-02-01").unwrap()),
            },
        )
        .unwrap();
        let sql = select_rows(descriptor, &predicate).sql();

        assert!(sql.contains(r#""startdate" > $1 AND "startdate" < $2"#), "{sql}");
        assert!(!sql.contains('?'));
    }

    #[test]
    fn latest_time_aggregates_the_time_column() {
        let sql = latest_time(Dataset::M3Hotspots.descriptor()).sql();
        assert_eq!(sql, r#"SELECT max("rep_date")::timestamp AS at FROM "m3_hotspots""#);
    }

    #[test]
    fn facet_statements_target_the_registered_table() {
        let descriptor = Dataset::ForecastStations.descriptor();
        assert!(distinct_times(descriptor)
            .sql()
            .contains(r#"FROM "forecast_weather_stations""#));
        assert!(distinct_values(descriptor, "reporting_agency")
            .sql()
            .starts_with(r#"SELECT DISTINCT "reporting_agency"::text AS value"#));
        assert!(extent(Dataset::M3Hotspots.descriptor(), "temp")
            .sql()
            .contains(r#"max("temp")::double precision AS max_value"#));
    }
}
