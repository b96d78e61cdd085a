//! ArcGIS REST geometry JSON ("EsriJSON").
//!
//! Points are `{"x", "y"[, "z"][, "m"]}`, multipoints carry `points`, lines
//! `paths` and polygons `rings`. Coordinates are arrays whose third and fourth
//! values are interpreted through the `hasZ` and `hasM` flags. Polygon rings
//! are grouped by orientation: a clockwise ring starts a new polygon and
//! counter-clockwise rings are holes of the polygon before them.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{Coord, Dimension, Geometry};
use crate::error::{GpkgError, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EsriGeometry {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    m: Option<f64>,
    points: Option<Vec<Vec<f64>>>,
    paths: Option<Vec<Vec<Vec<f64>>>>,
    rings: Option<Vec<Vec<Vec<f64>>>>,
    #[serde(default)]
    has_z: bool,
    #[serde(default)]
    has_m: bool,
}

/// Parse an EsriJSON geometry object.
pub fn from_value(value: &Value) -> Result<Geometry> {
    let esri = EsriGeometry::deserialize(value)
        .map_err(|err| GpkgError::InvalidGeometryEncoding(format!("invalid EsriJSON: {err}")))?;
    let flags = (esri.has_z, esri.has_m);

    if let Some(points) = &esri.points {
        let coords = points
            .iter()
            .map(|c| to_coord(c, flags))
            .collect::<Result<Vec<_>>>()?;
        return Ok(non_empty(Geometry::MultiPoint(coords)));
    }

    if let Some(paths) = &esri.paths {
        let mut lines = to_parts(paths, flags)?;
        let geometry = if lines.len() == 1 {
            Geometry::LineString(lines.remove(0))
        } else {
            Geometry::MultiLineString(lines)
        };
        return Ok(non_empty(geometry));
    }

    if let Some(rings) = &esri.rings {
        let mut polygons = group_rings(to_parts(rings, flags)?);
        let geometry = if polygons.len() == 1 {
            Geometry::Polygon(polygons.remove(0))
        } else {
            Geometry::MultiPolygon(polygons)
        };
        return Ok(non_empty(geometry));
    }

    match (esri.x, esri.y) {
        (Some(x), Some(y)) => Ok(Geometry::Point(Coord {
            x,
            y,
            z: esri.z,
            m: esri.m,
        })),
        _ if value.get("x").is_some() => Ok(Geometry::Empty),
        _ => Err(GpkgError::InvalidGeometryEncoding(
            "EsriJSON geometry has none of x, points, paths or rings".to_string(),
        )),
    }
}

/// Parse EsriJSON text.
pub fn from_str(text: &str) -> Result<Geometry> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| GpkgError::InvalidGeometryEncoding(format!("invalid EsriJSON: {err}")))?;
    from_value(&value)
}

fn non_empty(geometry: Geometry) -> Geometry {
    if geometry.is_empty() {
        Geometry::Empty
    } else {
        geometry
    }
}

fn to_coord(values: &[f64], (has_z, has_m): (bool, bool)) -> Result<Coord> {
    let [x, y, rest @ ..] = values else {
        return Err(GpkgError::InvalidGeometryEncoding(format!(
            "EsriJSON coordinate needs at least 2 values, got {}",
            values.len()
        )));
    };
    let coord = match (has_z, has_m, rest) {
        (true, true, [z, m, ..]) => Coord::xyzm(*x, *y, *z, *m),
        (false, true, [m, ..]) => Coord::xym(*x, *y, *m),
        (_, false, [z, ..]) => Coord::xyz(*x, *y, *z),
        (true, true, _) | (false, true, []) | (_, false, []) => {
            return Err(GpkgError::InvalidGeometryEncoding(format!(
                "EsriJSON coordinate has {} values but hasZ={has_z} hasM={has_m}",
                values.len()
            )));
        }
    };
    Ok(coord)
}

fn to_parts(parts: &[Vec<Vec<f64>>], flags: (bool, bool)) -> Result<Vec<Vec<Coord>>> {
    parts
        .iter()
        .map(|part| part.iter().map(|c| to_coord(c, flags)).collect())
        .collect()
}

/// Twice the signed area of a ring; negative for clockwise rings.
fn signed_area(ring: &[Coord]) -> f64 {
    ring.windows(2)
        .map(|pair| pair[0].x * pair[1].y - pair[1].x * pair[0].y)
        .sum()
}

fn group_rings(rings: Vec<Vec<Coord>>) -> Vec<Vec<Vec<Coord>>> {
    let mut polygons: Vec<Vec<Vec<Coord>>> = Vec::new();
    for ring in rings {
        match polygons.last_mut() {
            Some(polygon) if signed_area(&ring) > 0.0 => polygon.push(ring),
            _ => polygons.push(vec![ring]),
        }
    }
    polygons
}

/// Serialize a geometry as EsriJSON. Exterior rings are written clockwise
/// and holes counter-clockwise.
pub fn to_value(geometry: &Geometry, srs_id: Option<i32>) -> Value {
    let dimension = geometry.dimension();
    let mut object = match geometry {
        Geometry::Empty => json!({ "x": null }),
        Geometry::Point(coord) => {
            let mut point = json!({ "x": coord.x, "y": coord.y });
            if let Some(z) = coord.z {
                point["z"] = json!(z);
            }
            if let Some(m) = coord.m {
                point["m"] = json!(m);
            }
            point
        }
        Geometry::MultiPoint(coords) => json!({ "points": coords_value(coords) }),
        Geometry::LineString(coords) => json!({ "paths": [coords_value(coords)] }),
        Geometry::MultiLineString(lines) => {
            json!({ "paths": lines.iter().map(|l| coords_value(l)).collect::<Vec<_>>() })
        }
        Geometry::Polygon(rings) => json!({ "rings": rings_value(rings) }),
        Geometry::MultiPolygon(polygons) => json!({
            "rings": polygons.iter().flat_map(|p| rings_value(p)).collect::<Vec<_>>()
        }),
    };

    if let Value::Object(map) = &mut object {
        if !matches!(geometry, Geometry::Empty | Geometry::Point(_)) {
            insert_flags(map, dimension);
        }
        if let Some(wkid) = srs_id.filter(|id| *id > 0) {
            map.insert("spatialReference".to_string(), json!({ "wkid": wkid }));
        }
    }
    object
}

fn insert_flags(map: &mut Map<String, Value>, dimension: Dimension) {
    if dimension.has_z() {
        map.insert("hasZ".to_string(), Value::Bool(true));
    }
    if dimension.has_m() {
        map.insert("hasM".to_string(), Value::Bool(true));
    }
}

fn coord_value(coord: &Coord) -> Value {
    let mut values = vec![coord.x, coord.y];
    values.extend(coord.z);
    values.extend(coord.m);
    json!(values)
}

fn coords_value(coords: &[Coord]) -> Value {
    Value::Array(coords.iter().map(coord_value).collect())
}

fn rings_value(rings: &[Vec<Coord>]) -> Vec<Value> {
    rings
        .iter()
        .enumerate()
        .map(|(i, ring)| {
            let clockwise = signed_area(ring) < 0.0;
            let want_clockwise = i == 0;
            if clockwise == want_clockwise {
                coords_value(ring)
            } else {
                let reversed: Vec<Coord> = ring.iter().rev().copied().collect();
                coords_value(&reversed)
            }
        })
        .collect()
}
