//! Named queries over the registered datasets.
//!
//! Each is a thin constructor over [`QueryEngine::execute`].

use super::{FilterRequest, OneOrMany, QueryEngine, QueryRequest, QueryResponse, SessionSource};
use crate::{error::Result, registry::DatasetFamily};

fn slice(date: Option<&str>) -> Option<FilterRequest> {
    Some(FilterRequest::Slice {
        date: date.map(str::to_string),
    })
}

fn date_range(field: &str, min: Option<&str>, max: Option<&str>) -> Option<FilterRequest> {
    Some(FilterRequest::DateRange {
        field: Some(field.to_string()),
        min: min.map(str::to_string),
        max: max.map(str::to_string),
    })
}

fn numeric_range(field: &str, min: Option<f64>, max: Option<f64>) -> Option<FilterRequest> {
    Some(FilterRequest::NumericRange {
        field: field.to_string(),
        min,
        max,
    })
}

fn category(field: &str, values: Vec<String>) -> Option<FilterRequest> {
    Some(FilterRequest::Category {
        field: field.to_string(),
        values: OneOrMany::Many(values),
    })
}

impl<S: SessionSource> QueryEngine<S> {
    async fn run(
        &self,
        family: DatasetFamily,
        dataset: &str,
        filter: Option<FilterRequest>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.execute(QueryRequest {
            family: family.to_string(),
            dataset: dataset.to_string(),
            filter,
            sample,
        })
        .await
    }

    /// `layer` is the physical table name of a WCS raster layer.
    pub async fn wcs_layer(
        &self,
        layer: &str,
        date: Option<&str>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(DatasetFamily::WcsRaster, layer, slice(date), sample)
            .await
    }

    pub async fn additional_layer(
        &self,
        layer: &str,
        date: Option<&str>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(DatasetFamily::AdditionalLayer, layer, slice(date), sample)
            .await
    }

    pub async fn active_fires(
        &self,
        min_date: Option<&str>,
        max_date: Option<&str>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::FireRecord,
            "active_fires",
            date_range("startdate", min_date, max_date),
            sample,
        )
        .await
    }

    pub async fn active_fire_by_id(&self, id: &str) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::FireRecord,
            "active_fires",
            category("id", vec![id.to_string()]),
            None,
        )
        .await
    }

    pub async fn fire_danger(
        &self,
        date: Option<&str>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(DatasetFamily::FireRecord, "fire_danger", slice(date), sample)
            .await
    }

    pub async fn fire_history_by_date(
        &self,
        min: Option<&str>,
        max: Option<&str>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::FireRecord,
            "fire_history",
            date_range("startdate", min, max),
            sample,
        )
        .await
    }

    /// `label` is a canonical cause: Human, Natural, Unknown or Prescribed.
    pub async fn fire_history_by_cause(
        &self,
        label: &str,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        let filter = FilterRequest::MappedCategory {
            field: "cause".to_string(),
            label: label.to_string(),
        };
        self.run(DatasetFamily::FireRecord, "fire_history", Some(filter), sample)
            .await
    }

    pub async fn fire_history_by_response(
        &self,
        response: &str,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::FireRecord,
            "fire_history",
            category("response_type", vec![response.to_string()]),
            sample,
        )
        .await
    }

    pub async fn fire_history_by_hectares(
        &self,
        min: Option<f64>,
        max: Option<f64>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::FireRecord,
            "fire_history",
            numeric_range("hectares", min, max),
            sample,
        )
        .await
    }

    /// Perimeters whose active period falls strictly inside `(start, end)`.
    pub async fn perimeters_by_date(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::FireRecord,
            "perimeters",
            date_range("active_period", start, end),
            sample,
        )
        .await
    }

    pub async fn perimeters_by_hotspot_count(
        &self,
        min: Option<f64>,
        max: Option<f64>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::FireRecord,
            "perimeters",
            numeric_range("hcount", min, max),
            sample,
        )
        .await
    }

    pub async fn perimeters_by_area(
        &self,
        min: Option<f64>,
        max: Option<f64>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::FireRecord,
            "perimeters",
            numeric_range("area", min, max),
            sample,
        )
        .await
    }

    pub async fn forecast_stations_by_date(
        &self,
        date: Option<&str>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::WeatherStation,
            "forecast_stations",
            slice(date),
            sample,
        )
        .await
    }

    pub async fn forecast_stations_by_agency(
        &self,
        agencies: Vec<String>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::WeatherStation,
            "forecast_stations",
            category("reporting_agency", agencies),
            sample,
        )
        .await
    }

    pub async fn reporting_stations_by_date(
        &self,
        date: Option<&str>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::WeatherStation,
            "reporting_stations",
            slice(date),
            sample,
        )
        .await
    }

    pub async fn reporting_stations_forecast_by_date(
        &self,
        date: Option<&str>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::WeatherStation,
            "reporting_stations_forecast",
            slice(date),
            sample,
        )
        .await
    }

    pub async fn hotspots_by_date(
        &self,
        date: Option<&str>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(DatasetFamily::Hotspot, "m3_hotspots", slice(date), sample)
            .await
    }

    pub async fn hotspots_by_ecozone(
        &self,
        ecozones: Vec<String>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::Hotspot,
            "m3_hotspots",
            category("ecozone", ecozones),
            sample,
        )
        .await
    }

    pub async fn hotspots_by_temperature(
        &self,
        min: Option<f64>,
        max: Option<f64>,
        sample: Option<usize>,
    ) -> Result<QueryResponse> {
        self.run(
            DatasetFamily::Hotspot,
            "m3_hotspots",
            numeric_range("temp", min, max),
            sample,
        )
        .await
    }
}
