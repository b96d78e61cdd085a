//! GeoPackage geometry codec and spatial tables built on top of rusqlite.
//!
//! ## Overview
//!
//! - `Gpkg` represents a whole GeoPackage file (or an in-memory database).
//! - `GpkgTable` represents a single spatial table in the data.
//! - `SpatialRow` represents a single row of a table: one geometry, an id
//!   assigned by storage, and attribute values.
//! - `Value` represents a single attribute value of a row.
//! - `geometry` holds the in-memory `Geometry` model and the codecs: ISO WKB,
//!   the GeoPackage binary header, EsriJSON, and (with the `interop` feature)
//!   WKT and GeoJSON.
//!
//! `Gpkg` is the entry point and supports several open modes:
//!
//! - `Gpkg::open_read_only(path)`: open an existing file without write access.
//! - `Gpkg::open(path)`: open an existing file for read/write.
//! - `Gpkg::new(path)` / `Gpkg::create(path, overwrite)`: create a new file.
//! - `Gpkg::new_in_memory()`: create a transient in-memory GeoPackage.
//!
//! ## Reader
//!
//! ```no_run
//! use gpkg_spatial::{Gpkg, Value};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gpkg = Gpkg::open_read_only("data.gpkg")?;
//!     for table_name in gpkg.list_tables()? {
//!         let table = gpkg.table(&table_name)?;
//!         for row in table.rows()? {
//!             let esri = row.to_esri_json()?;
//!             println!("{table_name} {:?}: {esri}", row.id());
//!
//!             for column in table.columns() {
//!                 let value = row.property(&column.name).unwrap_or(Value::Null);
//!                 println!("  {} = {:?}", column.name, value);
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! `Value` mirrors SQLite's dynamic typing (null, integer, real, text, blob).
//! Convert using `try_into()`; convert to `Option<T>` to accept `NULL`:
//!
//! ```no_run
//! use gpkg_spatial::Value;
//!
//! let value = Value::Null;
//! let maybe_i64: Option<i64> = value.try_into()?;
//! assert_eq!(maybe_i64, None);
//! # Ok::<(), gpkg_spatial::GpkgError>(())
//! ```
//!
//! ## Writer
//!
//! Geometries are handed to a row as a `GeometryInput`, which names the
//! encoding of the value. Changes are written with `GpkgTable::save` or, for
//! several rows in one transaction, `GpkgTable::save_all`.
//!
//! ```no_run
//! use gpkg_spatial::geometry::{Dimension, GeometryInput, GeometryType};
//! use gpkg_spatial::{ColumnSpec, ColumnType, Gpkg};
//! use serde_json::json;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gpkg = Gpkg::new("sites.gpkg")?;
//!     let table = gpkg.create_table(
//!         "sites",
//!         "Shape",
//!         GeometryType::Point,
//!         Dimension::Xy,
//!         4326,
//!         &[ColumnSpec::new("name", ColumnType::Text)],
//!     )?;
//!
//!     let mut row = table.new_row();
//!     row.set_geometry(Some(GeometryInput::EsriJson(json!({"x": -118.15, "y": 33.80}))))?;
//!     row.set_property("name", "Long Beach")?;
//!     table.save(&mut row)?;
//!
//!     table.update_contents_extent()?;
//!     Ok(())
//! }
//! ```
mod conversions;
mod error;
mod gpkg;
mod ogc_sql;
mod sql_functions;
mod types;

pub mod geometry;
pub mod srs;

pub use error::{GpkgError, Result};
pub use gpkg::{Gpkg, GpkgOptions, GpkgTable, SpatialColumnDescriptor, SpatialRow};
pub use sql_functions::register_spatial_functions;
pub use types::{ColumnSpec, ColumnType, Value};
