//! Closed catalogue of the wildfire datasets the service can reach.
//!
//! Every physical table name that ever lands in statement text comes from a
//! [`DatasetDescriptor`] defined here. Callers name datasets by category key
//! (or, for the layer families, by table name); anything else is rejected
//! before a statement is built.

use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFamily {
    WcsRaster,
    AdditionalLayer,
    FireRecord,
    WeatherStation,
    Hotspot,
}

impl DatasetFamily {
    pub const ALL: [DatasetFamily; 5] = [
        DatasetFamily::WcsRaster,
        DatasetFamily::AdditionalLayer,
        DatasetFamily::FireRecord,
        DatasetFamily::WeatherStation,
        DatasetFamily::Hotspot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetFamily::WcsRaster => "wcs_raster",
            DatasetFamily::AdditionalLayer => "additional_layer",
            DatasetFamily::FireRecord => "fire_record",
            DatasetFamily::WeatherStation => "weather_station",
            DatasetFamily::Hotspot => "hotspot",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|family| family.as_str() == raw)
            .ok_or_else(|| {
                ServiceError::InvalidIdentifier(format!("unknown dataset family '{raw}'"))
            })
    }

    /// Datasets registered under this family. Registries never overlap.
    pub fn datasets(self) -> &'static [Dataset] {
        match self {
            DatasetFamily::WcsRaster => &WCS_RASTERS,
            DatasetFamily::AdditionalLayer => &ADDITIONAL_LAYERS,
            DatasetFamily::FireRecord => &FIRE_RECORDS,
            DatasetFamily::WeatherStation => &WEATHER_STATIONS,
            DatasetFamily::Hotspot => &HOTSPOTS,
        }
    }

    /// Looks a category key up in this family's registry.
    pub fn resolve(self, key: &str) -> Option<Dataset> {
        self.datasets()
            .iter()
            .copied()
            .find(|dataset| dataset.descriptor().key == key)
    }

    /// Accepts a candidate physical table name only if it is exactly one of
    /// this family's registered tables.
    pub fn validate(self, candidate: &str) -> Result<Dataset> {
        self.datasets()
            .iter()
            .copied()
            .find(|dataset| dataset.descriptor().table == candidate)
            .ok_or_else(|| {
                ServiceError::InvalidIdentifier(format!(
                    "'{candidate}' is not a registered {self} table"
                ))
            })
    }

    /// Resolves a category key, reporting an unregistered key as an invalid identifier.
    pub fn require(self, key: &str) -> Result<Dataset> {
        self.resolve(key).ok_or_else(|| {
            ServiceError::InvalidIdentifier(format!("'{key}' is not a registered {self} dataset"))
        })
    }
}

impl fmt::Display for DatasetFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    DailySeverityRating,
    DroughtCode,
    WindDirection,
    WindSpeed,
    FireType,
    InitialSpreadIndex,
    Precipitation,
    Temperature,
    BulkDensity5cm,
    Clay5cm,
    Landcover,
    Ph5cm,
    Sand5cm,
    Silt5cm,
    Soc5cm,
    ActiveFires,
    FireDanger,
    FireHistory,
    Perimeters,
    ForecastStations,
    ReportingStations,
    ReportingStationsForecast,
    M3Hotspots,
}

const WCS_RASTERS: [Dataset; 8] = [
    Dataset::DailySeverityRating,
    Dataset::DroughtCode,
    Dataset::WindDirection,
    Dataset::WindSpeed,
    Dataset::FireType,
    Dataset::InitialSpreadIndex,
    Dataset::Precipitation,
    Dataset::Temperature,
];

const ADDITIONAL_LAYERS: [Dataset; 7] = [
    Dataset::BulkDensity5cm,
    Dataset::Clay5cm,
    Dataset::Landcover,
    Dataset::Ph5cm,
    Dataset::Sand5cm,
    Dataset::Silt5cm,
    Dataset::Soc5cm,
];

const FIRE_RECORDS: [Dataset; 4] = [
    Dataset::ActiveFires,
    Dataset::FireDanger,
    Dataset::FireHistory,
    Dataset::Perimeters,
];

const WEATHER_STATIONS: [Dataset; 3] = [
    Dataset::ForecastStations,
    Dataset::ReportingStations,
    Dataset::ReportingStationsForecast,
];

const HOTSPOTS: [Dataset; 1] = [Dataset::M3Hotspots];

impl Dataset {
    pub fn descriptor(self) -> &'static DatasetDescriptor {
        match self {
            Dataset::DailySeverityRating => &DAILY_SEVERITY_RATING,
            Dataset::DroughtCode => &DROUGHT_CODE,
            Dataset::WindDirection => &WIND_DIRECTION,
            Dataset::WindSpeed => &WIND_SPEED,
            Dataset::FireType => &FIRE_TYPE,
            Dataset::InitialSpreadIndex => &INITIAL_SPREAD_INDEX,
            Dataset::Precipitation => &PRECIPITATION,
            Dataset::Temperature => &TEMPERATURE,
            Dataset::BulkDensity5cm => &BULK_DENSITY_5CM,
            Dataset::Clay5cm => &CLAY_5CM,
            Dataset::Landcover => &LANDCOVER,
            Dataset::Ph5cm => &PH_5CM,
            Dataset::Sand5cm => &SAND_5CM,
            Dataset::Silt5cm => &SILT_5CM,
            Dataset::Soc5cm => &SOC_5CM,
            Dataset::ActiveFires => &ACTIVE_FIRES,
            Dataset::FireDanger => &FIRE_DANGER,
            Dataset::FireHistory => &FIRE_HISTORY,
            Dataset::Perimeters => &PERIMETERS,
            Dataset::ForecastStations => &FORECAST_STATIONS,
            Dataset::ReportingStations => &REPORTING_STATIONS,
            Dataset::ReportingStationsForecast => &REPORTING_STATIONS_FORECAST,
            Dataset::M3Hotspots => &M3_HOTSPOTS,
        }
    }

    pub fn family(self) -> DatasetFamily {
        self.descriptor().family
    }
}

#[derive(Debug)]
pub struct DatasetDescriptor {
    pub key: &'static str,
    pub table: &'static str,
    pub family: DatasetFamily,
    /// Acquisition-time column used for "latest" resolution.
    pub time_column: &'static str,
    pub geometry_column: Option<&'static str>,
    pub projection: Projection,
    pub fields: &'static [Field],
}

impl DatasetDescriptor {
    pub fn field(&self, name: &str) -> Result<&'static Field> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .ok_or_else(|| {
                ServiceError::InvalidIdentifier(format!(
                    "unsupported filter field '{name}' for {}",
                    self.key
                ))
            })
    }

    /// The field backing the dataset's own time dimension.
    pub fn time_field(&self) -> Field {
        Field::time(self.time_column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    All,
    Columns(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Single(&'static str),
    /// A period stored as two columns; range lower bounds apply to `start`,
    /// upper bounds to `end`.
    Span {
        start: &'static str,
        end: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Time,
    Numeric,
    Text { mapping: Option<CategoryMapping> },
}

/// Canonical label → raw labels as stored by the source agencies.
pub type CategoryMapping = &'static [(&'static str, &'static [&'static str])];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub column: Column,
    pub kind: FieldKind,
}

impl Field {
    const fn time(name: &'static str) -> Self {
        Self {
            name,
            column: Column::Single(name),
            kind: FieldKind::Time,
        }
    }

    const fn numeric(name: &'static str) -> Self {
        Self {
            name,
            column: Column::Single(name),
            kind: FieldKind::Numeric,
        }
    }

    const fn text(name: &'static str) -> Self {
        Self {
            name,
            column: Column::Single(name),
            kind: FieldKind::Text { mapping: None },
        }
    }

    const fn mapped(name: &'static str, mapping: CategoryMapping) -> Self {
        Self {
            name,
            column: Column::Single(name),
            kind: FieldKind::Text {
                mapping: Some(mapping),
            },
        }
    }
}

pub const FIRE_CAUSES: CategoryMapping = &[
    ("Human", &["H", "Human caused"]),
    ("Natural", &["N", "Lightning"]),
    (
        "Unknown",
        &[
            "unknown and under in",
            "U",
            "Under Investigation",
            "under investigation",
            "Undetermined",
        ],
    ),
    ("Prescribed", &["Prescribed Fire", "Rollout on steep ter"]),
];

const LAYER_PROJECTION: Projection =
    Projection::Columns(&["value", "acquisition_date", "lon", "lat", "geometry"]);

const LAYER_FIELDS: &[Field] = &[Field::time("acquisition_date"), Field::numeric("value")];

macro_rules! layer {
    ($name:ident, $key:literal, $family:expr) => {
        static $name: DatasetDescriptor = DatasetDescriptor {
            key: $key,
            table: $key,
            family: $family,
            time_column: "acquisition_date",
            geometry_column: Some("geometry"),
            projection: LAYER_PROJECTION,
            fields: LAYER_FIELDS,
        };
    };
}

layer!(DAILY_SEVERITY_RATING, "daily_severity_rating", DatasetFamily::WcsRaster);
layer!(DROUGHT_CODE, "drought_code", DatasetFamily::WcsRaster);
layer!(WIND_DIRECTION, "wind_direction", DatasetFamily::WcsRaster);
layer!(WIND_SPEED, "wind_speed", DatasetFamily::WcsRaster);
layer!(FIRE_TYPE, "fire_type", DatasetFamily::WcsRaster);
layer!(INITIAL_SPREAD_INDEX, "initial_spread_index", DatasetFamily::WcsRaster);
layer!(PRECIPITATION, "precipitation", DatasetFamily::WcsRaster);
layer!(TEMPERATURE, "temperature", DatasetFamily::WcsRaster);

layer!(BULK_DENSITY_5CM, "bulk_density_5cm", DatasetFamily::AdditionalLayer);
layer!(CLAY_5CM, "clay_5cm", DatasetFamily::AdditionalLayer);
layer!(LANDCOVER, "landcover", DatasetFamily::AdditionalLayer);
layer!(PH_5CM, "ph_5cm", DatasetFamily::AdditionalLayer);
layer!(SAND_5CM, "sand_5cm", DatasetFamily::AdditionalLayer);
layer!(SILT_5CM, "silt_5cm", DatasetFamily::AdditionalLayer);
layer!(SOC_5CM, "soc_5cm", DatasetFamily::AdditionalLayer);

static ACTIVE_FIRES: DatasetDescriptor = DatasetDescriptor {
    key: "active_fires",
    table: "active_fires",
    family: DatasetFamily::FireRecord,
    time_column: "startdate",
    geometry_column: Some("geometry"),
    projection: Projection::All,
    fields: &[
        Field::time("startdate"),
        Field::text("id"),
        Field::numeric("hectares"),
    ],
};

static FIRE_DANGER: DatasetDescriptor = DatasetDescriptor {
    key: "fire_danger",
    table: "fire_danger",
    family: DatasetFamily::FireRecord,
    time_column: "acquisition_date",
    geometry_column: Some("geometry"),
    projection: Projection::All,
    fields: &[Field::time("acquisition_date"), Field::text("danger_rating")],
};

static FIRE_HISTORY: DatasetDescriptor = DatasetDescriptor {
    key: "fire_history",
    table: "fire_history",
    family: DatasetFamily::FireRecord,
    time_column: "startdate",
    geometry_column: Some("geometry"),
    projection: Projection::All,
    fields: &[
        Field::time("startdate"),
        Field::mapped("cause", FIRE_CAUSES),
        Field::text("response_type"),
        Field::numeric("hectares"),
    ],
};

static PERIMETERS: DatasetDescriptor = DatasetDescriptor {
    key: "perimeters",
    table: "fire_perimeter_estimate",
    family: DatasetFamily::FireRecord,
    time_column: "lastdate",
    geometry_column: Some("geometry"),
    projection: Projection::All,
    fields: &[
        Field {
            name: "active_period",
            column: Column::Span {
                start: "firstdate",
                end: "lastdate",
            },
            kind: FieldKind::Time,
        },
        Field::time("firstdate"),
        Field::time("lastdate"),
        Field::numeric("hcount"),
        Field::numeric("area"),
    ],
};

static FORECAST_STATIONS: DatasetDescriptor = DatasetDescriptor {
    key: "forecast_stations",
    table: "forecast_weather_stations",
    family: DatasetFamily::WeatherStation,
    time_column: "rep_date",
    geometry_column: Some("geometry"),
    projection: Projection::All,
    fields: &[Field::time("rep_date"), Field::text("reporting_agency")],
};

static REPORTING_STATIONS: DatasetDescriptor = DatasetDescriptor {
    key: "reporting_stations",
    table: "reporting_weather_stations",
    family: DatasetFamily::WeatherStation,
    time_column: "rep_date",
    geometry_column: Some("geometry"),
    projection: Projection::All,
    fields: &[Field::time("rep_date")],
};

static REPORTING_STATIONS_FORECAST: DatasetDescriptor = DatasetDescriptor {
    key: "reporting_stations_forecast",
    table: "reporting_weather_stations_forecast",
    family: DatasetFamily::WeatherStation,
    time_column: "rep_date",
    geometry_column: Some("geometry"),
    projection: Projection::All,
    fields: &[Field::time("rep_date")],
};

static M3_HOTSPOTS: DatasetDescriptor = DatasetDescriptor {
    key: "m3_hotspots",
    table: "m3_hotspots",
    family: DatasetFamily::Hotspot,
    time_column: "rep_date",
    geometry_column: Some("geometry"),
    projection: Projection::All,
    fields: &[
        Field::time("rep_date"),
        Field::text("ecozone"),
        Field::numeric("temp"),
    ],
};
