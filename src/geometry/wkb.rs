//! ISO well-known binary encoding of [`Geometry`].
//!
//! Type codes follow ISO 13249-3: the base code (1..=6) plus 1000 for Z, 2000
//! for M and 3000 for ZM. Every geometry, nested parts included, starts with
//! its own byte order marker.

use std::io::{Cursor, ErrorKind};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};

use super::{Coord, Dimension, Endianness, Geometry, GeometryType};
use crate::error::{GpkgError, Result};

const WKB_BIG_ENDIAN: u8 = 0;
const WKB_LITTLE_ENDIAN: u8 = 1;

// byte order marker + type code
const GEOMETRY_PREFIX_LEN: usize = 5;

/// ISO type code for a geometry type and dimension.
pub fn type_code(geometry_type: GeometryType, dimension: Dimension) -> u32 {
    let offset = match dimension {
        Dimension::Xy => 0,
        Dimension::Xyz => 1000,
        Dimension::Xym => 2000,
        Dimension::Xyzm => 3000,
    };
    geometry_type.code() + offset
}

/// Split an ISO type code into its geometry type and dimension.
pub fn parse_type_code(code: u32) -> Result<(GeometryType, Dimension)> {
    let dimension = match code / 1000 {
        0 => Dimension::Xy,
        1 => Dimension::Xyz,
        2 => Dimension::Xym,
        3 => Dimension::Xyzm,
        _ => return Err(GpkgError::UnsupportedGeometryType(format!("WKB type {code}"))),
    };
    let geometry_type = GeometryType::from_code(code % 1000)
        .ok_or_else(|| GpkgError::UnsupportedGeometryType(format!("WKB type {code}")))?;
    Ok((geometry_type, dimension))
}

/// Encode a geometry as WKB in the given byte order.
///
/// `Geometry::Empty` is written as the two dimensional point `POINT(NaN NaN)`.
pub fn encode(geometry: &Geometry, endianness: Endianness) -> Result<Vec<u8>> {
    geometry.validate()?;

    let mut buf = Vec::with_capacity(GEOMETRY_PREFIX_LEN + geometry.coords().count() * 32);
    match endianness {
        Endianness::LittleEndian => write_geometry::<LittleEndian>(&mut buf, geometry),
        Endianness::BigEndian => write_geometry::<BigEndian>(&mut buf, geometry),
    }
    Ok(buf)
}

/// Decode a WKB buffer. The whole buffer must be consumed by one geometry.
pub fn decode(bytes: &[u8]) -> Result<Geometry> {
    let mut cursor = Cursor::new(bytes);
    let geometry = read_geometry(&mut cursor, None)?;

    let consumed = cursor.position() as usize;
    if consumed != bytes.len() {
        return Err(GpkgError::InvalidGeometryEncoding(format!(
            "{} trailing bytes after geometry",
            bytes.len() - consumed
        )));
    }

    match geometry {
        Geometry::Point(coord) if is_nan_point(&coord) => Ok(Geometry::Empty),
        geometry => Ok(geometry),
    }
}

fn is_nan_point(coord: &Coord) -> bool {
    coord.x.is_nan()
        && coord.y.is_nan()
        && coord.z.is_none_or(f64::is_nan)
        && coord.m.is_none_or(f64::is_nan)
}

fn write_geometry<B: WkbOrder>(buf: &mut Vec<u8>, geometry: &Geometry) {
    let dimension = geometry.dimension();

    let Some(geometry_type) = geometry.geometry_type() else {
        write_header::<B>(buf, GeometryType::Point, Dimension::Xy);
        write_f64::<B>(buf, f64::NAN);
        write_f64::<B>(buf, f64::NAN);
        return;
    };

    write_header::<B>(buf, geometry_type, dimension);
    match geometry {
        Geometry::Empty => {}
        Geometry::Point(coord) => write_coord::<B>(buf, coord, dimension),
        Geometry::LineString(coords) => write_coords::<B>(buf, coords, dimension),
        Geometry::Polygon(rings) => write_rings::<B>(buf, rings, dimension),
        Geometry::MultiPoint(coords) => {
            write_u32::<B>(buf, coords.len() as u32);
            for coord in coords {
                write_header::<B>(buf, GeometryType::Point, dimension);
                write_coord::<B>(buf, coord, dimension);
            }
        }
        Geometry::MultiLineString(lines) => {
            write_u32::<B>(buf, lines.len() as u32);
            for line in lines {
                write_header::<B>(buf, GeometryType::LineString, dimension);
                write_coords::<B>(buf, line, dimension);
            }
        }
        Geometry::MultiPolygon(polygons) => {
            write_u32::<B>(buf, polygons.len() as u32);
            for rings in polygons {
                write_header::<B>(buf, GeometryType::Polygon, dimension);
                write_rings::<B>(buf, rings, dimension);
            }
        }
    }
}

trait WkbOrder: ByteOrder {
    const MARKER: u8;
}

impl WkbOrder for LittleEndian {
    const MARKER: u8 = WKB_LITTLE_ENDIAN;
}

impl WkbOrder for BigEndian {
    const MARKER: u8 = WKB_BIG_ENDIAN;
}

fn write_header<B: WkbOrder>(buf: &mut Vec<u8>, geometry_type: GeometryType, dimension: Dimension) {
    buf.push(B::MARKER);
    write_u32::<B>(buf, type_code(geometry_type, dimension));
}

fn write_u32<B: ByteOrder>(buf: &mut Vec<u8>, value: u32) {
    let mut bytes = [0u8; 4];
    B::write_u32(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

fn write_f64<B: ByteOrder>(buf: &mut Vec<u8>, value: f64) {
    let mut bytes = [0u8; 8];
    B::write_f64(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

fn write_coord<B: ByteOrder>(buf: &mut Vec<u8>, coord: &Coord, dimension: Dimension) {
    write_f64::<B>(buf, coord.x);
    write_f64::<B>(buf, coord.y);
    if dimension.has_z() {
        write_f64::<B>(buf, coord.z.unwrap_or(f64::NAN));
    }
    if dimension.has_m() {
        write_f64::<B>(buf, coord.m.unwrap_or(f64::NAN));
    }
}

fn write_coords<B: ByteOrder>(buf: &mut Vec<u8>, coords: &[Coord], dimension: Dimension) {
    write_u32::<B>(buf, coords.len() as u32);
    for coord in coords {
        write_coord::<B>(buf, coord, dimension);
    }
}

fn write_rings<B: ByteOrder>(buf: &mut Vec<u8>, rings: &[Vec<Coord>], dimension: Dimension) {
    write_u32::<B>(buf, rings.len() as u32);
    for ring in rings {
        write_coords::<B>(buf, ring, dimension);
    }
}

/// Read one geometry. `expected` constrains the type and dimension of a
/// nested part of a multi geometry.
fn read_geometry(
    cursor: &mut Cursor<&[u8]>,
    expected: Option<(GeometryType, Dimension)>,
) -> Result<Geometry> {
    match cursor.read_u8().map_err(io_error)? {
        WKB_LITTLE_ENDIAN => read_body::<LittleEndian>(cursor, expected),
        WKB_BIG_ENDIAN => read_body::<BigEndian>(cursor, expected),
        other => Err(GpkgError::InvalidGeometryEncoding(format!(
            "invalid WKB byte order marker: {other:#04x}"
        ))),
    }
}

fn read_body<B: ByteOrder>(
    cursor: &mut Cursor<&[u8]>,
    expected: Option<(GeometryType, Dimension)>,
) -> Result<Geometry> {
    let code = cursor.read_u32::<B>().map_err(io_error)?;
    let (geometry_type, dimension) = parse_type_code(code)?;

    if let Some((expected_type, expected_dimension)) = expected {
        if geometry_type != expected_type || dimension != expected_dimension {
            return Err(GpkgError::InvalidGeometryEncoding(format!(
                "nested WKB type {code} does not match the parent geometry"
            )));
        }
    }

    let geometry = match geometry_type {
        GeometryType::Point => Geometry::Point(read_coord::<B>(cursor, dimension)?),
        GeometryType::LineString => Geometry::LineString(read_coords::<B>(cursor, dimension)?),
        GeometryType::Polygon => Geometry::Polygon(read_rings::<B>(cursor, dimension)?),
        GeometryType::MultiPoint => {
            let parts = read_parts::<B>(cursor, (GeometryType::Point, dimension))?;
            Geometry::MultiPoint(
                parts
                    .into_iter()
                    .filter_map(|part| match part {
                        Geometry::Point(coord) => Some(coord),
                        _ => None,
                    })
                    .collect(),
            )
        }
        GeometryType::MultiLineString => {
            let parts = read_parts::<B>(cursor, (GeometryType::LineString, dimension))?;
            Geometry::MultiLineString(
                parts
                    .into_iter()
                    .filter_map(|part| match part {
                        Geometry::LineString(coords) => Some(coords),
                        _ => None,
                    })
                    .collect(),
            )
        }
        GeometryType::MultiPolygon => {
            let parts = read_parts::<B>(cursor, (GeometryType::Polygon, dimension))?;
            Geometry::MultiPolygon(
                parts
                    .into_iter()
                    .filter_map(|part| match part {
                        Geometry::Polygon(rings) => Some(rings),
                        _ => None,
                    })
                    .collect(),
            )
        }
    };
    Ok(geometry)
}

fn read_parts<B: ByteOrder>(
    cursor: &mut Cursor<&[u8]>,
    expected: (GeometryType, Dimension),
) -> Result<Vec<Geometry>> {
    let count = read_count_with::<B>(cursor, GEOMETRY_PREFIX_LEN)?;
    let mut parts = Vec::with_capacity(count);
    for _ in 0..count {
        parts.push(read_geometry(cursor, Some(expected))?);
    }
    Ok(parts)
}

fn read_coord<B: ByteOrder>(cursor: &mut Cursor<&[u8]>, dimension: Dimension) -> Result<Coord> {
    let x = cursor.read_f64::<B>().map_err(io_error)?;
    let y = cursor.read_f64::<B>().map_err(io_error)?;
    let z = if dimension.has_z() {
        Some(cursor.read_f64::<B>().map_err(io_error)?)
    } else {
        None
    };
    let m = if dimension.has_m() {
        Some(cursor.read_f64::<B>().map_err(io_error)?)
    } else {
        None
    };
    Ok(Coord { x, y, z, m })
}

fn read_coords<B: ByteOrder>(
    cursor: &mut Cursor<&[u8]>,
    dimension: Dimension,
) -> Result<Vec<Coord>> {
    let count = read_count_with::<B>(cursor, dimension.size() * 8)?;
    let mut coords = Vec::with_capacity(count);
    for _ in 0..count {
        coords.push(read_coord::<B>(cursor, dimension)?);
    }
    Ok(coords)
}

fn read_rings<B: ByteOrder>(
    cursor: &mut Cursor<&[u8]>,
    dimension: Dimension,
) -> Result<Vec<Vec<Coord>>> {
    let count = read_count_with::<B>(cursor, 4)?;
    let mut rings = Vec::with_capacity(count);
    for _ in 0..count {
        rings.push(read_coords::<B>(cursor, dimension)?);
    }
    Ok(rings)
}

fn read_count_with<B: ByteOrder>(
    cursor: &mut Cursor<&[u8]>,
    min_item_len: usize,
) -> Result<usize> {
    let count = cursor.read_u32::<B>().map_err(io_error)? as usize;
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    match count.checked_mul(min_item_len) {
        Some(needed) if needed <= remaining => Ok(count),
        _ => Err(GpkgError::InvalidGeometryEncoding(format!(
            "element count {count} exceeds the remaining {remaining} bytes"
        ))),
    }
}

fn io_error(err: std::io::Error) -> GpkgError {
    match err.kind() {
        ErrorKind::UnexpectedEof => {
            GpkgError::InvalidGeometryEncoding("unexpected end of WKB input".to_string())
        }
        _ => GpkgError::InvalidGeometryEncoding(err.to_string()),
    }
}
