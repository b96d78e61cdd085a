//! GeoPackage storage surface backed by rusqlite.
//!
//! A [`Gpkg`] owns the connection, [`GpkgTable`] describes one spatial table
//! and [`SpatialRow`] is an owned row whose changes are staged until saved.

mod gpkg;
mod row;
mod schema;
mod table;

pub use gpkg::{Gpkg, GpkgOptions};
pub use row::SpatialRow;
pub use schema::SpatialColumnDescriptor;
pub use table::GpkgTable;
