//! Pick-list and slider bounds for dataset fields.

use super::{identify, statement, Extent, QueryEngine, Session, SessionSource};
use crate::{
    error::{Result, ServiceError},
    registry::{Column, DatasetFamily, Field, FieldKind},
};
use chrono::NaiveDateTime;

fn plain_column(field: &Field, kind: &str, fits: bool) -> Result<&'static str> {
    match field.column {
        Column::Single(column) if fits => Ok(column),
        _ => Err(ServiceError::InvalidFilterValue(format!(
            "{} is not a {kind} field",
            field.name
        ))),
    }
}

impl<S: SessionSource> QueryEngine<S> {
    /// Distinct acquisition times, newest first.
    pub async fn available_times(
        &self,
        family: DatasetFamily,
        dataset: &str,
    ) -> Result<Vec<NaiveDateTime>> {
        let dataset = identify(family, dataset)?;
        let mut session = self.sessions.acquire().await?;
        let times = session
            .load_times(&statement::distinct_times(dataset.descriptor()))
            .await?;
        Ok(times.into_iter().flatten().collect())
    }

    pub async fn distinct_values(
        &self,
        family: DatasetFamily,
        dataset: &str,
        field: &str,
    ) -> Result<Vec<String>> {
        let dataset = identify(family, dataset)?;
        let descriptor = dataset.descriptor();
        let field = descriptor.field(field)?;
        let column = plain_column(field, "text", matches!(field.kind, FieldKind::Text { .. }))?;

        let mut session = self.sessions.acquire().await?;
        let values = session
            .load_texts(&statement::distinct_values(descriptor, column))
            .await?;
        Ok(values.into_iter().flatten().collect())
    }

    /// Both bounds are `None` when the table is empty.
    pub async fn field_extent(
        &self,
        family: DatasetFamily,
        dataset: &str,
        field: &str,
    ) -> Result<Extent> {
        let dataset = identify(family, dataset)?;
        let descriptor = dataset.descriptor();
        let field = descriptor.field(field)?;
        let column = plain_column(field, "numeric", matches!(field.kind, FieldKind::Numeric))?;

        let mut session = self.sessions.acquire().await?;
        session
            .load_extent(&statement::extent(descriptor, column))
            .await
    }
}
