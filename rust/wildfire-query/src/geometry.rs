//! GeoJSON geometry objects returned at the service boundary.

use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};

/// `[longitude, latitude]`, optionally followed by elevation.
pub type Position = Vec<f64>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: Position,
    },
    MultiPoint {
        coordinates: Vec<Position>,
    },
    LineString {
        coordinates: Vec<Position>,
    },
    MultiLineString {
        coordinates: Vec<Vec<Position>>,
    },
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
}

impl Geometry {
    /// Parses the GeoJSON text emitted by the storage engine.
    pub fn parse(text: &str) -> Result<Self> {
        let geometry: Geometry = serde_json::from_str(text)
            .map_err(|err| ServiceError::MalformedGeometry(err.to_string()))?;
        geometry.check()?;
        Ok(geometry)
    }

    fn check(&self) -> Result<()> {
        match self {
            Geometry::Point { coordinates } => check_position(coordinates),
            Geometry::MultiPoint { coordinates } | Geometry::LineString { coordinates } => {
                coordinates.iter().try_for_each(|p| check_position(p))
            }
            Geometry::MultiLineString { coordinates } | Geometry::Polygon { coordinates } => {
                coordinates
                    .iter()
                    .flatten()
                    .try_for_each(|p| check_position(p))
            }
            Geometry::MultiPolygon { coordinates } => coordinates
                .iter()
                .flatten()
                .flatten()
                .try_for_each(|p| check_position(p)),
            Geometry::GeometryCollection { geometries } => {
                geometries.iter().try_for_each(Geometry::check)
            }
        }
    }
}

fn check_position(position: &[f64]) -> Result<()> {
    if !(2..=3).contains(&position.len()) {
        return Err(ServiceError::MalformedGeometry(format!(
            "position has {} ordinates",
            position.len()
        )));
    }
    Ok(())
}
