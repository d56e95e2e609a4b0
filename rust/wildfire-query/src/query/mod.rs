mod datasets;
mod facets;
pub mod session;
pub mod statement;

pub use session::{Extent, PgSessions, RawRow, Session, SessionSource};

use crate::{
    error::{Result, ServiceError},
    filter::{self, FilterSpec, Predicate},
    geometry::Geometry,
    registry::{Dataset, DatasetDescriptor, DatasetFamily},
    shape,
    time::{parse_optional_time, resolve_slice, TimeSlice},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// Caller-facing filter. Field names and dates are validated when the query is planned.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterRequest {
    /// One acquisition time; the latest available when `date` is absent.
    Slice {
        #[serde(default)]
        date: Option<String>,
    },
    DateRange {
        /// Defaults to the dataset's acquisition-time column.
        #[serde(default)]
        field: Option<String>,
        #[serde(default)]
        min: Option<String>,
        #[serde(default)]
        max: Option<String>,
    },
    NumericRange {
        field: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Category {
        field: String,
        values: OneOrMany,
    },
    MappedCategory {
        field: String,
        label: String,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryRequest {
    /// Family name as listed by `/api/datasets`, e.g. `fire_record`.
    pub family: String,
    /// Category key, or the physical table name for families where callers use it.
    pub dataset: String,
    #[serde(default)]
    pub filter: Option<FilterRequest>,
    /// Caps the result by uniform sampling. No cap unless requested.
    #[serde(default)]
    pub sample: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct QueryResponse {
    pub results: Vec<Row>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slice: Option<TimeSlice>,
}

impl QueryResponse {
    fn new(results: Vec<Row>, slice: Option<TimeSlice>) -> Self {
        Self {
            count: results.len(),
            results,
            slice,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Selection {
    Everything,
    Slice(Option<NaiveDateTime>),
    Filter(Predicate),
}

#[derive(Debug, Clone)]
struct QueryPlan {
    dataset: Dataset,
    selection: Selection,
    sample: Option<usize>,
}

/// Finds the dataset a caller named, by category key first and then by exact table name.
pub fn identify(family: DatasetFamily, candidate: &str) -> Result<Dataset> {
    match family.resolve(candidate) {
        Some(dataset) => Ok(dataset),
        None => family.validate(candidate),
    }
}

fn plan(request: QueryRequest) -> Result<QueryPlan> {
    let family = DatasetFamily::parse(&request.family)?;
    let dataset = identify(family, &request.dataset)?;
    let descriptor = dataset.descriptor();

    let selection = match request.filter {
        None => Selection::Everything,
        Some(FilterRequest::Slice { date }) => {
            Selection::Slice(parse_optional_time(date.as_deref())?)
        }
        Some(FilterRequest::DateRange { field, min, max }) => {
            let field = match field.as_deref() {
                Some(name) => *descriptor.field(name)?,
                None => descriptor.time_field(),
            };
            let spec = FilterSpec::DateRange {
                min: parse_optional_time(min.as_deref())?,
                max: parse_optional_time(max.as_deref())?,
            };
            Selection::Filter(filter::build(&field, &spec)?)
        }
        Some(FilterRequest::NumericRange { field, min, max }) => Selection::Filter(filter::build(
            descriptor.field(&field)?,
            &FilterSpec::NumericRange { min, max },
        )?),
        Some(FilterRequest::Category { field, values }) => Selection::Filter(filter::build(
            descriptor.field(&field)?,
            &FilterSpec::CategorySet(values.into_vec()),
        )?),
        Some(FilterRequest::MappedCategory { field, label }) => Selection::Filter(filter::build(
            descriptor.field(&field)?,
            &FilterSpec::MappedCategory(label),
        )?),
    };

    Ok(QueryPlan {
        dataset,
        selection,
        sample: request.sample,
    })
}

#[derive(Clone)]
pub struct QueryEngine<S = PgSessions> {
    sessions: S,
}

impl<S: SessionSource> QueryEngine<S> {
    pub fn new(sessions: S) -> Self {
        Self { sessions }
    }

    pub async fn execute(&self, request: QueryRequest) -> Result<QueryResponse> {
        let plan = plan(request)?;
        let descriptor = plan.dataset.descriptor();
        let mut session = self.sessions.acquire().await?;

        let (predicate, slice) = match plan.selection {
            Selection::Everything => (Predicate::always(), None),
            Selection::Filter(predicate) => (predicate, None),
            Selection::Slice(requested) => {
                match resolve_slice(&mut session, plan.dataset, requested).await? {
                    Some(slice) => (
                        filter::build(
                            &descriptor.time_field(),
                            &FilterSpec::ExactDate(slice.at()),
                        )?,
                        Some(slice),
                    ),
                    None => {
                        debug!(dataset = descriptor.key, "no acquisition times yet");
                        return Ok(QueryResponse::default());
                    }
                }
            }
        };

        let raw = session
            .load_rows(&statement::select_rows(descriptor, &predicate))
            .await?;
        drop(session);

        let rows = normalize_rows(descriptor, raw)?;
        let results = sample_rows(rows, plan.sample);
        Ok(QueryResponse::new(results, slice))
    }
}

fn sample_rows(rows: Vec<Row>, cap: Option<usize>) -> Vec<Row> {
    let mut rng = rand::thread_rng();
    shape::sample(rows, cap, &mut rng)
}

/// Folds each row's GeoJSON text back into the row as a geometry object.
/// Rows whose geometry cannot be parsed are dropped and logged.
fn normalize_rows(descriptor: &DatasetDescriptor, raw: Vec<RawRow>) -> Result<Vec<Row>> {
    let mut rows = Vec::with_capacity(raw.len());

    for RawRow {
        properties,
        geometry,
    } in raw
    {
        let Value::Object(mut row) = properties else {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "{} row did not decode to an object",
                descriptor.key
            )));
        };

        let Some(column) = descriptor.geometry_column else {
            rows.push(row);
            continue;
        };

        let geometry = match geometry.as_deref().map(Geometry::parse).transpose() {
            Ok(geometry) => geometry,
            Err(err) => {
                warn!(dataset = descriptor.key, error = %err, "skipping row");
                continue;
            }
        };
        let value = match geometry {
            Some(geometry) => {
                serde_json::to_value(geometry).map_err(|err| ServiceError::Internal(err.into()))?
            }
            None => Value::Null,
        };
        row.insert(column.to_string(), value);
        rows.push(row);
    }

    Ok(rows)
}
