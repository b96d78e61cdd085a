use serde_json::Value;

use super::{Geometry, esri_json, gpb, wkb};
use crate::error::{GpkgError, Result};

/// Encodings a geometry can be supplied in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometryFormat {
    EsriJson,
    GeoJson,
    Wkt,
    Wkb,
    GeoPackageBinary,
}

impl GeometryFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::EsriJson => "EsriJSON",
            Self::GeoJson => "GeoJSON",
            Self::Wkt => "WKT",
            Self::Wkb => "WKB",
            Self::GeoPackageBinary => "GeoPackageBinary",
        }
    }

    /// Case-insensitive lookup by name, e.g. `"esrijson"` or `"WKT"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "esrijson" | "esri" => Some(Self::EsriJson),
            "geojson" => Some(Self::GeoJson),
            "wkt" => Some(Self::Wkt),
            "wkb" => Some(Self::Wkb),
            "gpkg" | "gpb" | "geopackagebinary" => Some(Self::GeoPackageBinary),
            _ => None,
        }
    }

    /// Whether this build can read the format.
    pub fn is_available(self) -> bool {
        match self {
            Self::GeoJson | Self::Wkt => cfg!(feature = "interop"),
            _ => true,
        }
    }
}

/// A geometry value handed to a row, tagged with its encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum GeometryInput {
    EsriJson(Value),
    GeoJson(Value),
    Wkt(String),
    Wkb(Vec<u8>),
    GeoPackageBinary(Vec<u8>),
    Geometry(Geometry),
}

impl GeometryInput {
    /// Tag raw bytes: `GP`/`GB` prefixed blobs are GeoPackage binary, anything
    /// else is WKB.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        if is_gpkg_encoded(&bytes) {
            Self::GeoPackageBinary(bytes)
        } else {
            Self::Wkb(bytes)
        }
    }

    /// The encoding of this input; `None` for structured geometries.
    pub fn format(&self) -> Option<GeometryFormat> {
        match self {
            Self::EsriJson(_) => Some(GeometryFormat::EsriJson),
            Self::GeoJson(_) => Some(GeometryFormat::GeoJson),
            Self::Wkt(_) => Some(GeometryFormat::Wkt),
            Self::Wkb(_) => Some(GeometryFormat::Wkb),
            Self::GeoPackageBinary(_) => Some(GeometryFormat::GeoPackageBinary),
            Self::Geometry(_) => None,
        }
    }

    /// Decode the input into a [`Geometry`].
    pub fn into_geometry(self) -> Result<Geometry> {
        match self.resolve()? {
            ResolvedInput::Geometry(geometry) | ResolvedInput::Wkb(geometry, _) => Ok(geometry),
            ResolvedInput::Encoded(bytes) if bytes.starts_with(&gpb::MAGIC) => {
                Ok(gpb::decode(&bytes)?.1)
            }
            ResolvedInput::Encoded(bytes) => wkb::decode(gpb::strip_header(&bytes)?),
        }
    }

    /// Parse the input once. Byte inputs keep their original encoding so they
    /// can be stored without re-encoding.
    pub(crate) fn resolve(self) -> Result<ResolvedInput> {
        let resolved = match self {
            Self::Geometry(geometry) => ResolvedInput::Geometry(geometry),
            Self::EsriJson(value) => ResolvedInput::Geometry(esri_json::from_value(&value)?),
            Self::GeoJson(value) => ResolvedInput::Geometry(from_geojson(&value)?),
            Self::Wkt(text) => ResolvedInput::Geometry(from_wkt(&text)?),
            Self::Wkb(bytes) if is_gpkg_encoded(&bytes) => encoded(bytes)?,
            Self::Wkb(bytes) => ResolvedInput::Wkb(wkb::decode(&bytes)?, bytes),
            Self::GeoPackageBinary(bytes) if is_gpkg_encoded(&bytes) => encoded(bytes)?,
            Self::GeoPackageBinary(bytes) => {
                return Err(GpkgError::InvalidGeometryEncoding(format!(
                    "GeoPackage binary must start with GP or GB, found {:02x?}",
                    &bytes[..bytes.len().min(2)]
                )));
            }
        };
        Ok(resolved)
    }
}

impl From<Geometry> for GeometryInput {
    fn from(geometry: Geometry) -> Self {
        Self::Geometry(geometry)
    }
}

/// Outcome of [`GeometryInput::resolve`].
#[derive(Debug)]
pub(crate) enum ResolvedInput {
    /// Bytes that already carry a `GP` or `GB` marker.
    Encoded(Vec<u8>),
    /// Decoded WKB along with the caller's bytes.
    Wkb(Geometry, Vec<u8>),
    Geometry(Geometry),
}

fn is_gpkg_encoded(bytes: &[u8]) -> bool {
    bytes.starts_with(&gpb::MAGIC) || bytes.starts_with(&gpb::LEGACY_MAGIC)
}

fn encoded(bytes: Vec<u8>) -> Result<ResolvedInput> {
    if bytes.starts_with(&gpb::MAGIC) {
        gpb::GeometryHeader::parse(&bytes)?;
    }
    Ok(ResolvedInput::Encoded(bytes))
}

#[cfg(feature = "interop")]
fn from_wkt(text: &str) -> Result<Geometry> {
    super::interop::from_wkt(text)
}

#[cfg(not(feature = "interop"))]
fn from_wkt(_text: &str) -> Result<Geometry> {
    Err(GpkgError::MissingOptionalDependency {
        format: GeometryFormat::Wkt.name(),
        feature: "interop",
    })
}

#[cfg(feature = "interop")]
fn from_geojson(value: &Value) -> Result<Geometry> {
    super::interop::from_geojson(value)
}

#[cfg(not(feature = "interop"))]
fn from_geojson(_value: &Value) -> Result<Geometry> {
    Err(GpkgError::MissingOptionalDependency {
        format: GeometryFormat::GeoJson.name(),
        feature: "interop",
    })
}
