//! In-memory geometry model and the codecs around it.
//!
//! - `wkb`: ISO WKB encoding and decoding.
//! - `gpb`: the GeoPackage binary header wrapping a WKB payload.
//! - `extent`: bounding envelopes used by the header and the spatial index.
//! - `esri_json`: ArcGIS REST geometry JSON.
//! - `interop`: WKT and GeoJSON (requires the `interop` feature).

mod convert;
pub mod esri_json;
pub mod extent;
pub mod gpb;
mod input;
#[cfg(feature = "interop")]
pub mod interop;
pub mod wkb;

pub use extent::{Envelope, envelope};
pub use gpb::{GeometryHeader, GeometryOptions};
pub use input::{GeometryFormat, GeometryInput};
pub(crate) use input::ResolvedInput;

use std::fmt;

use crate::conversions::{geometry_type_from_str, geometry_type_to_str};
use crate::error::{GpkgError, Result};

/// Byte order used when encoding WKB payloads and GeoPackage headers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Endianness {
    BigEndian,
    #[default]
    LittleEndian,
}

/// Coordinate dimensionality of a geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Dimension {
    #[default]
    Xy,
    Xyz,
    Xym,
    Xyzm,
}

impl Dimension {
    pub fn from_flags(has_z: bool, has_m: bool) -> Self {
        match (has_z, has_m) {
            (false, false) => Self::Xy,
            (true, false) => Self::Xyz,
            (false, true) => Self::Xym,
            (true, true) => Self::Xyzm,
        }
    }

    pub fn has_z(self) -> bool {
        matches!(self, Self::Xyz | Self::Xyzm)
    }

    pub fn has_m(self) -> bool {
        matches!(self, Self::Xym | Self::Xyzm)
    }

    /// Number of ordinates per coordinate.
    pub fn size(self) -> usize {
        2 + usize::from(self.has_z()) + usize::from(self.has_m())
    }
}

/// The geometry types a GeoPackage geometry column can declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

impl GeometryType {
    /// ISO WKB base type code (without the dimension offset).
    pub fn code(self) -> u32 {
        match self {
            Self::Point => 1,
            Self::LineString => 2,
            Self::Polygon => 3,
            Self::MultiPoint => 4,
            Self::MultiLineString => 5,
            Self::MultiPolygon => 6,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Point),
            2 => Some(Self::LineString),
            3 => Some(Self::Polygon),
            4 => Some(Self::MultiPoint),
            5 => Some(Self::MultiLineString),
            6 => Some(Self::MultiPolygon),
            _ => None,
        }
    }

    /// Upper case name as stored in `gpkg_geometry_columns`.
    pub fn name(self) -> &'static str {
        geometry_type_to_str(self)
    }

    /// Case-insensitive parse of a geometry type name.
    pub fn from_name(name: &str) -> Result<Self> {
        geometry_type_from_str(name)
    }

    pub fn is_multi(self) -> bool {
        matches!(
            self,
            Self::MultiPoint | Self::MultiLineString | Self::MultiPolygon
        )
    }

    /// The multi type whose parts are of this type.
    pub fn to_multi(self) -> Self {
        match self {
            Self::Point => Self::MultiPoint,
            Self::LineString => Self::MultiLineString,
            Self::Polygon => Self::MultiPolygon,
            multi => multi,
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single position with optional elevation (`z`) and measure (`m`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: Option<f64>,
}

impl Coord {
    pub fn xy(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            m: None,
        }
    }

    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z: Some(z),
            m: None,
        }
    }

    pub fn xym(x: f64, y: f64, m: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            m: Some(m),
        }
    }

    pub fn xyzm(x: f64, y: f64, z: f64, m: f64) -> Self {
        Self {
            x,
            y,
            z: Some(z),
            m: Some(m),
        }
    }

    pub fn dimension(&self) -> Dimension {
        Dimension::from_flags(self.z.is_some(), self.m.is_some())
    }
}

impl From<(f64, f64)> for Coord {
    fn from((x, y): (f64, f64)) -> Self {
        Self::xy(x, y)
    }
}

/// A geometry value.
///
/// Polygons hold their rings in order; the first ring is the exterior and the
/// rest are holes. `Empty` is an explicit empty geometry, which is different
/// from a row whose geometry column is `NULL`.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Empty,
    Point(Coord),
    MultiPoint(Vec<Coord>),
    LineString(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    Polygon(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
}

impl Geometry {
    /// Geometry type, or `None` for `Empty`.
    pub fn geometry_type(&self) -> Option<GeometryType> {
        match self {
            Self::Empty => None,
            Self::Point(_) => Some(GeometryType::Point),
            Self::MultiPoint(_) => Some(GeometryType::MultiPoint),
            Self::LineString(_) => Some(GeometryType::LineString),
            Self::MultiLineString(_) => Some(GeometryType::MultiLineString),
            Self::Polygon(_) => Some(GeometryType::Polygon),
            Self::MultiPolygon(_) => Some(GeometryType::MultiPolygon),
        }
    }

    /// Dimension of the first coordinate; `Xy` when there is none.
    pub fn dimension(&self) -> Dimension {
        self.coords()
            .next()
            .map(Coord::dimension)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.coords().next().is_none()
    }

    /// Iterate over every coordinate of every part and ring.
    pub fn coords(&self) -> Box<dyn Iterator<Item = &Coord> + '_> {
        match self {
            Self::Empty => Box::new(std::iter::empty()),
            Self::Point(coord) => Box::new(std::iter::once(coord)),
            Self::MultiPoint(coords) | Self::LineString(coords) => Box::new(coords.iter()),
            Self::MultiLineString(parts) | Self::Polygon(parts) => {
                Box::new(parts.iter().flatten())
            }
            Self::MultiPolygon(polygons) => Box::new(polygons.iter().flatten().flatten()),
        }
    }

    /// Wrap a single geometry into its multi counterpart. Other geometries are
    /// returned unchanged.
    pub fn into_multi(self) -> Self {
        match self {
            Self::Point(coord) => Self::MultiPoint(vec![coord]),
            Self::LineString(coords) => Self::MultiLineString(vec![coords]),
            Self::Polygon(rings) => Self::MultiPolygon(vec![rings]),
            other => other,
        }
    }

    /// Check that all coordinates share one dimension and that polygon rings
    /// are closed.
    pub fn validate(&self) -> Result<()> {
        let dimension = self.dimension();
        if let Some(coord) = self.coords().find(|c| c.dimension() != dimension) {
            return Err(GpkgError::InvalidGeometryEncoding(format!(
                "mixed coordinate dimensions: expected {dimension:?}, found {:?}",
                coord.dimension()
            )));
        }

        match self {
            Self::Polygon(rings) => validate_rings(rings),
            Self::MultiPolygon(polygons) => polygons.iter().try_for_each(|r| validate_rings(r)),
            _ => Ok(()),
        }
    }
}

fn validate_rings(rings: &[Vec<Coord>]) -> Result<()> {
    for ring in rings {
        match (ring.first(), ring.last()) {
            (Some(first), Some(last)) if first == last => {}
            (None, _) | (_, None) => {
                return Err(GpkgError::InvalidGeometryEncoding(
                    "polygon ring has no coordinates".to_string(),
                ));
            }
            _ => {
                return Err(GpkgError::InvalidGeometryEncoding(
                    "polygon ring is not closed".to_string(),
                ));
            }
        }
    }
    Ok(())
}
