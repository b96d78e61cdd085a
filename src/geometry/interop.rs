//! WKT and GeoJSON conversions, available with the `interop` feature.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wkt::Wkt;

use super::{Coord, Endianness, Geometry, wkb};
use crate::error::{GpkgError, Result};

/// Parse well-known text.
pub fn from_wkt(text: &str) -> Result<Geometry> {
    let wkt = Wkt::<f64>::from_str(text)
        .map_err(|err| GpkgError::InvalidGeometryEncoding(format!("invalid WKT: {err}")))?;
    Geometry::from_geo_traits(&wkt)
}

/// Format a geometry as well-known text. `Empty` is `POINT EMPTY`.
pub fn to_wkt(geometry: &Geometry) -> Result<String> {
    if matches!(geometry, Geometry::Empty) {
        return Ok("POINT EMPTY".to_string());
    }
    let bytes = wkb::encode(geometry, Endianness::LittleEndian)?;
    wkb_to_wkt(&bytes)
}

/// Format a WKB buffer as well-known text without going through [`Geometry`].
pub fn wkb_to_wkt(bytes: &[u8]) -> Result<String> {
    let reader = ::wkb::reader::Wkb::try_new(bytes)?;
    let mut text = String::new();
    wkt::to_wkt::write_geometry(&mut text, &reader)
        .map_err(|err| GpkgError::InvalidGeometryEncoding(format!("cannot format WKT: {err}")))?;
    Ok(text)
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", content = "coordinates")]
enum GeoJsonGeometry {
    Point(Vec<f64>),
    MultiPoint(Vec<Vec<f64>>),
    LineString(Vec<Vec<f64>>),
    MultiLineString(Vec<Vec<Vec<f64>>>),
    Polygon(Vec<Vec<Vec<f64>>>),
    MultiPolygon(Vec<Vec<Vec<Vec<f64>>>>),
}

/// Parse a GeoJSON geometry object. Positions with three values carry Z and
/// positions with four carry Z and M.
pub fn from_geojson(value: &Value) -> Result<Geometry> {
    if let Some(kind @ ("GeometryCollection" | "Feature" | "FeatureCollection")) =
        value.get("type").and_then(Value::as_str)
    {
        return Err(GpkgError::UnsupportedGeometryType(kind.to_string()));
    }

    let parsed = GeoJsonGeometry::deserialize(value)
        .map_err(|err| GpkgError::InvalidGeometryEncoding(format!("invalid GeoJSON: {err}")))?;
    let geometry = match parsed {
        GeoJsonGeometry::Point(position) if position.is_empty() => Geometry::Empty,
        GeoJsonGeometry::Point(position) => Geometry::Point(to_coord(&position)?),
        GeoJsonGeometry::MultiPoint(positions) => Geometry::MultiPoint(to_coords(&positions)?),
        GeoJsonGeometry::LineString(positions) => Geometry::LineString(to_coords(&positions)?),
        GeoJsonGeometry::MultiLineString(lines) => Geometry::MultiLineString(to_parts(&lines)?),
        GeoJsonGeometry::Polygon(rings) => Geometry::Polygon(to_parts(&rings)?),
        GeoJsonGeometry::MultiPolygon(polygons) => Geometry::MultiPolygon(
            polygons
                .iter()
                .map(|rings| to_parts(rings))
                .collect::<Result<_>>()?,
        ),
    };
    Ok(geometry)
}

/// Serialize a geometry as a GeoJSON geometry object. `Empty` is a point
/// with no coordinates. M values of XYM geometries are dropped.
pub fn to_geojson(geometry: &Geometry) -> Result<Value> {
    let position = |c: &Coord| {
        let mut values = vec![c.x, c.y];
        match (c.z, c.m) {
            (Some(z), Some(m)) => values.extend([z, m]),
            (Some(z), None) => values.push(z),
            // a position cannot carry M without Z
            (None, _) => {}
        }
        values
    };
    let positions = |coords: &[Coord]| coords.iter().map(position).collect::<Vec<_>>();
    let rings = |rings: &[Vec<Coord>]| rings.iter().map(|r| positions(r)).collect::<Vec<_>>();

    let geojson = match geometry {
        Geometry::Empty => GeoJsonGeometry::Point(Vec::new()),
        Geometry::Point(coord) => GeoJsonGeometry::Point(position(coord)),
        Geometry::MultiPoint(coords) => GeoJsonGeometry::MultiPoint(positions(coords)),
        Geometry::LineString(coords) => GeoJsonGeometry::LineString(positions(coords)),
        Geometry::MultiLineString(lines) => GeoJsonGeometry::MultiLineString(rings(lines)),
        Geometry::Polygon(polygon) => GeoJsonGeometry::Polygon(rings(polygon)),
        Geometry::MultiPolygon(polygons) => {
            GeoJsonGeometry::MultiPolygon(polygons.iter().map(|p| rings(p)).collect())
        }
    };
    Ok(serde_json::to_value(geojson)?)
}

fn to_coord(position: &[f64]) -> Result<Coord> {
    match *position {
        [x, y] => Ok(Coord::xy(x, y)),
        [x, y, z] => Ok(Coord::xyz(x, y, z)),
        [x, y, z, m] => Ok(Coord::xyzm(x, y, z, m)),
        _ => Err(GpkgError::InvalidGeometryEncoding(format!(
            "GeoJSON position must have 2 to 4 values, got {}",
            position.len()
        ))),
    }
}

fn to_coords(positions: &[Vec<f64>]) -> Result<Vec<Coord>> {
    positions.iter().map(|p| to_coord(p)).collect()
}

fn to_parts(parts: &[Vec<Vec<f64>>]) -> Result<Vec<Vec<Coord>>> {
    parts.iter().map(|p| to_coords(p)).collect()
}
