use geo_traits::{
    CoordTrait, Dimensions, GeometryTrait, LineStringTrait, MultiLineStringTrait, MultiPointTrait,
    MultiPolygonTrait, PointTrait, PolygonTrait,
};

use super::{Coord, Dimension, Geometry};
use crate::error::{GpkgError, Result};

impl Geometry {
    /// Copy any `geo_traits` geometry (for example `wkt::Wkt` or
    /// `wkb::reader::Wkb`) into a [`Geometry`].
    ///
    /// Geometry collections and the non-OGC shapes (`Rect`, `Triangle`,
    /// `Line`) cannot be stored in a GeoPackage geometry column and fail with
    /// `UnsupportedGeometryType`.
    pub fn from_geo_traits<G: GeometryTrait<T = f64>>(geom: &G) -> Result<Self> {
        use geo_traits::GeometryType as GeoType;

        let dimension = match geom.dim() {
            Dimensions::Xy => Dimension::Xy,
            Dimensions::Xyz => Dimension::Xyz,
            Dimensions::Xym => Dimension::Xym,
            Dimensions::Xyzm => Dimension::Xyzm,
            Dimensions::Unknown(n) => {
                return Err(GpkgError::InvalidGeometryEncoding(format!(
                    "unsupported coordinate dimension: {n}"
                )));
            }
        };

        let geometry = match geom.as_type() {
            GeoType::Point(point) => match point.coord() {
                Some(coord) => Geometry::Point(to_coord(&coord, dimension)),
                None => Geometry::Empty,
            },
            GeoType::LineString(line) => Geometry::LineString(line_coords(line, dimension)),
            GeoType::Polygon(polygon) => Geometry::Polygon(polygon_rings(polygon, dimension)),
            GeoType::MultiPoint(multi) => Geometry::MultiPoint(
                multi
                    .points()
                    .map(|point| match point.coord() {
                        Some(c) => to_coord(&c, dimension),
                        None => nan_coord(dimension),
                    })
                    .collect(),
            ),
            GeoType::MultiLineString(multi) => Geometry::MultiLineString(
                multi
                    .line_strings()
                    .map(|line| line_coords(&line, dimension))
                    .collect(),
            ),
            GeoType::MultiPolygon(multi) => Geometry::MultiPolygon(
                multi
                    .polygons()
                    .map(|polygon| polygon_rings(&polygon, dimension))
                    .collect(),
            ),
            GeoType::GeometryCollection(_) => {
                return Err(GpkgError::UnsupportedGeometryType(
                    "GEOMETRYCOLLECTION".to_string(),
                ));
            }
            GeoType::Rect(_) => return Err(GpkgError::UnsupportedGeometryType("RECT".to_string())),
            GeoType::Triangle(_) => {
                return Err(GpkgError::UnsupportedGeometryType("TRIANGLE".to_string()));
            }
            GeoType::Line(_) => return Err(GpkgError::UnsupportedGeometryType("LINE".to_string())),
        };
        Ok(geometry)
    }
}

fn to_coord<C: CoordTrait<T = f64>>(coord: &C, dimension: Dimension) -> Coord {
    let (x, y) = coord.x_y();
    match dimension {
        Dimension::Xy => Coord::xy(x, y),
        Dimension::Xyz => Coord {
            x,
            y,
            z: coord.nth(2),
            m: None,
        },
        Dimension::Xym => Coord {
            x,
            y,
            z: None,
            m: coord.nth(2),
        },
        Dimension::Xyzm => Coord {
            x,
            y,
            z: coord.nth(2),
            m: coord.nth(3),
        },
    }
}

/// Empty members of a multipoint are kept as `NaN` points, as in WKB.
fn nan_coord(dimension: Dimension) -> Coord {
    let nan = |present: bool| present.then_some(f64::NAN);
    Coord {
        x: f64::NAN,
        y: f64::NAN,
        z: nan(matches!(dimension, Dimension::Xyz | Dimension::Xyzm)),
        m: nan(matches!(dimension, Dimension::Xym | Dimension::Xyzm)),
    }
}

fn line_coords<L: LineStringTrait<T = f64>>(line: &L, dimension: Dimension) -> Vec<Coord> {
    line.coords().map(|c| to_coord(&c, dimension)).collect()
}

fn polygon_rings<P: PolygonTrait<T = f64>>(polygon: &P, dimension: Dimension) -> Vec<Vec<Coord>> {
    polygon
        .exterior()
        .into_iter()
        .map(|ring| line_coords(&ring, dimension))
        .chain(polygon.interiors().map(|ring| line_coords(&ring, dimension)))
        .collect()
}
