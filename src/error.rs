use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Crate error type for GeoPackage operations.
#[derive(Debug)]
pub enum GpkgError {
    /// Wraps errors returned by `rusqlite`.
    Sql(rusqlite::Error),
    /// Wraps errors returned by the `wkb` crate.
    Wkb(wkb::error::WkbError),
    /// Wraps errors returned by `serde_json`.
    Json(serde_json::Error),
    /// Filesystem errors while replacing an existing GeoPackage file.
    Io(std::io::Error),
    /// The blob does not start with the `GP` magic bytes.
    InvalidMagic {
        found: [u8; 2],
    },
    /// The GeoPackage binary version byte is not 0.
    UnsupportedVersion(u8),
    /// A geometry type name or WKB type code is not one of the supported geometry types.
    UnsupportedGeometryType(String),
    /// Geometry bytes or a geometry value could not be interpreted.
    InvalidGeometryEncoding(String),
    /// Invalid GeoPackage geometry flags byte.
    InvalidGpkgGeometryFlags(u8),
    /// GeoPackage geometry blob is too short for the fixed header.
    InvalidGpkgGeometryLength {
        len: usize,
        minimum: usize,
    },
    /// GeoPackage geometry blob is too short for the declared envelope payload.
    InvalidGpkgGeometryEnvelope {
        len: usize,
        required: usize,
    },
    /// The SRS id is neither registered nor known to the built-in coordinate system table.
    UnknownSrs {
        srs_id: i32,
    },
    /// An SRS with the same id but a different definition is already registered.
    SrsConflict {
        srs_id: i32,
    },
    /// The table already has a geometry column.
    DuplicateGeometryColumn {
        table_name: String,
        column_name: String,
    },
    /// The identity column of a row cannot be assigned.
    ImmutableColumn {
        column: String,
    },
    /// The geometry format needs the optional interop feature.
    MissingOptionalDependency {
        format: &'static str,
        feature: &'static str,
    },
    /// Invalid or mixed `z` / `m` dimension flags in GeoPackage metadata.
    InvalidDimension {
        z: i8,
        m: i8,
    },
    /// A column type declared in SQLite metadata is not supported by this crate.
    UnsupportedColumnType {
        column: String,
        declared_type: String,
    },
    /// The geometry does not match the geometry type of the column.
    GeometryTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// Dynamic `Value` type did not match the expected conversion target.
    ValueTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// Numeric conversion failed because the value is out of range.
    ValueOutOfRange {
        target: &'static str,
    },
    /// Requested row property does not exist in the table.
    MissingProperty {
        property: String,
    },
    /// A table with the same name already exists.
    TableAlreadyExists {
        table_name: String,
    },
    /// Table schema has multiple primary key columns, which is unsupported.
    CompositePrimaryKeyUnsupported {
        table_name: String,
    },
    /// Table schema has no primary key column.
    MissingPrimaryKeyColumn {
        table_name: String,
    },
    /// Table has no geometry column registered in `gpkg_geometry_columns`.
    MissingGeometryColumn {
        table_name: String,
    },
    /// A row has a `NULL` geometry value.
    NullGeometryValue,
    /// An update addressed a row id that is not in the table.
    RowNotFound {
        table_name: String,
        id: i64,
    },
    /// A row was handed to a table it was not read from.
    RowTableMismatch {
        expected: String,
        actual: String,
    },
    /// The GeoPackage file to create already exists.
    FileExists(PathBuf),
    /// The GeoPackage file to open does not exist.
    FileNotFound(PathBuf),
    ReadOnly,
}

impl fmt::Display for GpkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(err) => write!(f, "{err}"),
            Self::Wkb(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::InvalidMagic { found } => {
                write!(f, "invalid gpkg geometry magic: {found:02x?}")
            }
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported gpkg geometry version: {version}")
            }
            Self::UnsupportedGeometryType(ty) => write!(f, "unsupported geometry type: {ty}"),
            Self::InvalidGeometryEncoding(reason) => {
                write!(f, "invalid geometry encoding: {reason}")
            }
            Self::InvalidGpkgGeometryFlags(flags) => {
                write!(f, "invalid gpkg geometry flags: {flags:#04x}")
            }
            Self::InvalidGpkgGeometryLength { len, minimum } => {
                write!(
                    f,
                    "invalid gpkg geometry length: got {len} bytes, expected at least {minimum}"
                )
            }
            Self::InvalidGpkgGeometryEnvelope { len, required } => {
                write!(
                    f,
                    "invalid gpkg geometry envelope length: got {len} bytes, required {required}"
                )
            }
            Self::UnknownSrs { srs_id } => write!(f, "unknown srs_id: {srs_id}"),
            Self::SrsConflict { srs_id } => write!(
                f,
                "srs_id {srs_id} is already registered with a different definition"
            ),
            Self::DuplicateGeometryColumn {
                table_name,
                column_name,
            } => write!(
                f,
                "table '{table_name}' already has a geometry column ('{column_name}')"
            ),
            Self::ImmutableColumn { column } => {
                write!(f, "column '{column}' cannot be updated")
            }
            Self::MissingOptionalDependency { format, feature } => write!(
                f,
                "{format} geometries require the '{feature}' feature to be enabled"
            ),
            Self::InvalidDimension { z, m } => {
                write!(f, "invalid or mixed geometry dimension (z={z}, m={m})")
            }
            Self::UnsupportedColumnType {
                column,
                declared_type,
            } => write!(
                f,
                "unsupported column type for column '{column}': {declared_type}"
            ),
            Self::GeometryTypeMismatch { expected, actual } => {
                write!(f, "geometry type mismatch: expected {expected}, got {actual}")
            }
            Self::ValueTypeMismatch { expected, actual } => {
                write!(f, "expected {expected}, got {actual}")
            }
            Self::ValueOutOfRange { target } => {
                write!(f, "value out of range for {target}")
            }
            Self::MissingProperty { property } => write!(f, "missing property: {property}"),
            Self::TableAlreadyExists { table_name } => {
                write!(f, "table already exists: {table_name}")
            }
            Self::CompositePrimaryKeyUnsupported { table_name } => write!(
                f,
                "composite primary keys are not supported for table: {table_name}"
            ),
            Self::MissingPrimaryKeyColumn { table_name } => {
                write!(f, "no primary key column found for table: {table_name}")
            }
            Self::MissingGeometryColumn { table_name } => {
                write!(f, "no geometry column found for table: {table_name}")
            }
            Self::NullGeometryValue => write!(f, "row has null geometry value"),
            Self::RowNotFound { table_name, id } => {
                write!(f, "no row with id {id} in table: {table_name}")
            }
            Self::RowTableMismatch { expected, actual } => write!(
                f,
                "row belongs to table '{actual}', not '{expected}'"
            ),
            Self::FileExists(path) => {
                write!(f, "GeoPackage file already exists: {}", path.display())
            }
            Self::FileNotFound(path) => {
                write!(f, "GeoPackage file does not exist: {}", path.display())
            }
            Self::ReadOnly => write!(f, "operation not allowed on read-only connection"),
        }
    }
}

impl Error for GpkgError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sql(err) => Some(err),
            Self::Wkb(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for GpkgError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sql(err)
    }
}

impl From<wkb::error::WkbError> for GpkgError {
    fn from(err: wkb::error::WkbError) -> Self {
        Self::Wkb(err)
    }
}

impl From<serde_json::Error> for GpkgError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<std::io::Error> for GpkgError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, GpkgError>;
