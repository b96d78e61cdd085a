use crate::error::GpkgError;
use crate::geometry::{Dimension, GeometryType};
use crate::types::ColumnType;

#[inline]
pub(crate) fn geometry_type_to_str(geometry_type: GeometryType) -> &'static str {
    match geometry_type {
        GeometryType::Point => "POINT",
        GeometryType::LineString => "LINESTRING",
        GeometryType::Polygon => "POLYGON",
        GeometryType::MultiPoint => "MULTIPOINT",
        GeometryType::MultiLineString => "MULTILINESTRING",
        GeometryType::MultiPolygon => "MULTIPOLYGON",
    }
}

#[inline]
pub(crate) fn geometry_type_from_str(geometry_type_str: &str) -> Result<GeometryType, GpkgError> {
    let s = geometry_type_str;
    if s.eq_ignore_ascii_case("POINT") {
        Ok(GeometryType::Point)
    } else if s.eq_ignore_ascii_case("LINESTRING") {
        Ok(GeometryType::LineString)
    } else if s.eq_ignore_ascii_case("POLYGON") {
        Ok(GeometryType::Polygon)
    } else if s.eq_ignore_ascii_case("MULTIPOINT") {
        Ok(GeometryType::MultiPoint)
    } else if s.eq_ignore_ascii_case("MULTILINESTRING") {
        Ok(GeometryType::MultiLineString)
    } else if s.eq_ignore_ascii_case("MULTIPOLYGON") {
        Ok(GeometryType::MultiPolygon)
    } else {
        Err(GpkgError::UnsupportedGeometryType(
            geometry_type_str.to_string(),
        ))
    }
}

#[inline]
pub(crate) fn dimension_to_zm(dimension: Dimension) -> (i8, i8) {
    match dimension {
        Dimension::Xy => (0, 0),
        Dimension::Xyz => (1, 0),
        Dimension::Xym => (0, 1),
        Dimension::Xyzm => (1, 1),
    }
}

#[inline]
pub(crate) fn dimension_from_zm(z: i8, m: i8) -> Result<Dimension, GpkgError> {
    match (z, m) {
        (0, 0) => Ok(Dimension::Xy),
        (1, 0) => Ok(Dimension::Xyz),
        (0, 1) => Ok(Dimension::Xym),
        (1, 1) => Ok(Dimension::Xyzm),
        // 2 means "optional", which a single declared dimension cannot express
        _ => Err(GpkgError::InvalidDimension { z, m }),
    }
}

#[inline]
pub(crate) fn column_type_to_str(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Text => "TEXT",
        ColumnType::Short => "SMALLINT",
        ColumnType::Long | ColumnType::Integer => "MEDIUMINT",
        ColumnType::Float | ColumnType::Double => "DOUBLE",
        ColumnType::Date => "DATETIME",
        ColumnType::Blob => "BLOB",
        ColumnType::Guid => "TEXT(38)",
    }
}

/// CHECK constraint guarding the storage class and range of a column.
pub(crate) fn column_type_check(column_type: ColumnType, field: &str) -> Option<String> {
    let f = format!(r#""{field}""#);
    let check = match column_type {
        ColumnType::Text => return None,
        ColumnType::Float | ColumnType::Double => {
            format!("typeof({f}) = 'real' or typeof({f}) = 'null'")
        }
        ColumnType::Short => format!(
            "(typeof({f}) = 'integer' or typeof({f}) = 'null') and {f} >= -32768 and {f} <= 32767"
        ),
        ColumnType::Long | ColumnType::Integer => format!(
            "(typeof({f}) = 'integer' or typeof({f}) = 'null') and {f} >= -2147483648 and {f} <= 2147483647"
        ),
        ColumnType::Boolean => {
            format!("(typeof({f}) = 'integer' or typeof({f}) = 'null') and {f} in (0, 1)")
        }
        ColumnType::Date => format!(
            "(typeof({f}) = 'text' or typeof({f}) = 'null') and strftime('%Y-%m-%dT%H:%M:%fZ', {f})"
        ),
        ColumnType::Blob => format!("typeof({f}) = 'blob' or typeof({f}) = 'null'"),
        ColumnType::Guid => format!(
            "(typeof({f}) = 'text' or typeof({f}) = 'null') and not length({f}) > 38"
        ),
    };
    Some(format!("CHECK ({check})"))
}

#[inline]
pub(crate) fn column_type_from_str(column_type_str: &str) -> Option<ColumnType> {
    let s = column_type_str.trim();
    if s.eq_ignore_ascii_case("BOOLEAN") {
        Some(ColumnType::Boolean)
    } else if s.eq_ignore_ascii_case("TINYINT") || s.eq_ignore_ascii_case("SMALLINT") {
        Some(ColumnType::Short)
    } else if s.eq_ignore_ascii_case("MEDIUMINT") {
        Some(ColumnType::Long)
    } else if s.eq_ignore_ascii_case("INT") || s.eq_ignore_ascii_case("INTEGER") {
        Some(ColumnType::Integer)
    } else if s.eq_ignore_ascii_case("DOUBLE") || s.eq_ignore_ascii_case("REAL") {
        Some(ColumnType::Double)
    } else if s.eq_ignore_ascii_case("FLOAT") {
        Some(ColumnType::Float)
    } else if s.eq_ignore_ascii_case("DATETIME") || s.eq_ignore_ascii_case("DATE") {
        Some(ColumnType::Date)
    } else if s.eq_ignore_ascii_case("BLOB") {
        Some(ColumnType::Blob)
    } else if s.eq_ignore_ascii_case("TEXT(38)") {
        Some(ColumnType::Guid)
    } else if s.eq_ignore_ascii_case("TEXT") || starts_with_ignore_case(s, "TEXT(") {
        Some(ColumnType::Text)
    } else {
        None
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}
