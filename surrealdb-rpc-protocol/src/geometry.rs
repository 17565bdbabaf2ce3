//! Geometry values.

use serde_json::{json, Value as JsonValue};
use std::fmt;

/// An `(x, y)` coordinate pair; `x` is longitude, `y` latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Coord {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// A geometry. Polygons list their exterior ring first, then any holes.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    Line(Vec<Coord>),
    Polygon(Vec<Vec<Coord>>),
    MultiPoint(Vec<Coord>),
    MultiLine(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    Collection(Vec<Geometry>),
}

impl Geometry {
    /// The GeoJSON type name.
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::Line(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::MultiLine(_) => "MultiLineString",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::Collection(_) => "GeometryCollection",
        }
    }

    pub fn to_geojson(&self) -> JsonValue {
        fn coord(c: &Coord) -> JsonValue {
            json!([c.x, c.y])
        }
        fn line(l: &[Coord]) -> JsonValue {
            JsonValue::Array(l.iter().map(coord).collect())
        }
        fn polygon(p: &[Vec<Coord>]) -> JsonValue {
            JsonValue::Array(p.iter().map(|ring| line(ring)).collect())
        }

        match self {
            Geometry::Collection(items) => json!({
                "type": self.kind(),
                "geometries": items.iter().map(Geometry::to_geojson).collect::<Vec<_>>(),
            }),
            _ => {
                let coordinates = match self {
                    Geometry::Point(c) => coord(c),
                    Geometry::Line(l) | Geometry::MultiPoint(l) => line(l),
                    Geometry::Polygon(p) | Geometry::MultiLine(p) => polygon(p),
                    Geometry::MultiPolygon(m) => {
                        JsonValue::Array(m.iter().map(|p| polygon(p)).collect())
                    }
                    Geometry::Collection(_) => JsonValue::Null,
                };
                json!({ "type": self.kind(), "coordinates": coordinates })
            }
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Geometry::Point(c) => write!(f, "({}, {})", c.x, c.y),
            _ => write!(f, "{}", self.to_geojson()),
        }
    }
}
