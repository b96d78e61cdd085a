use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::conversions::{dimension_from_zm, dimension_to_zm};
use crate::error::{GpkgError, Result};
use crate::geometry::{Dimension, GeometryType};
use crate::ogc_sql::{
    SQL_INSERT_GPKG_GEOMETRY_COLUMNS, SQL_INSERT_SRS, SQL_SELECT_GEOMETRY_COLUMN_META,
    SQL_SELECT_SRS_DEFINITION,
};
use crate::srs::{CoordinateSystem, CoordinateSystems};

/// Geometry column of a spatial table as registered in
/// `gpkg_geometry_columns`.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialColumnDescriptor {
    pub table_name: String,
    pub column_name: String,
    pub geometry_type: GeometryType,
    pub srs_id: i32,
    pub dimension: Dimension,
}

impl SpatialColumnDescriptor {
    pub fn new(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        geometry_type: GeometryType,
        dimension: Dimension,
        srs_id: i32,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            column_name: column_name.into(),
            geometry_type,
            srs_id,
            dimension,
        }
    }

    pub fn has_z(&self) -> bool {
        self.dimension.has_z()
    }

    pub fn has_m(&self) -> bool {
        self.dimension.has_m()
    }
}

/// Insert the descriptor into `gpkg_geometry_columns`. A table can only have
/// one geometry column; table names are compared case-insensitively.
pub(crate) fn register_geometry_column(
    conn: &Connection,
    descriptor: &SpatialColumnDescriptor,
) -> Result<()> {
    if let Some(existing) = find_geometry_column(conn, &descriptor.table_name)? {
        return Err(GpkgError::DuplicateGeometryColumn {
            table_name: existing.table_name,
            column_name: existing.column_name,
        });
    }

    if srs_definition(conn, descriptor.srs_id)?.is_none() {
        return Err(GpkgError::UnknownSrs {
            srs_id: descriptor.srs_id,
        });
    }

    let (z, m) = dimension_to_zm(descriptor.dimension);
    conn.execute(
        SQL_INSERT_GPKG_GEOMETRY_COLUMNS,
        rusqlite::params![
            descriptor.table_name,
            descriptor.column_name,
            descriptor.geometry_type.name(),
            descriptor.srs_id,
            z,
            m
        ],
    )?;
    Ok(())
}

pub(crate) fn geometry_column(conn: &Connection, table_name: &str) -> Result<SpatialColumnDescriptor> {
    find_geometry_column(conn, table_name)?.ok_or_else(|| GpkgError::MissingGeometryColumn {
        table_name: table_name.to_string(),
    })
}

/// Name of the geometry column of `table_name`, read without interpreting the
/// declared geometry type.
pub(crate) fn geometry_column_name(conn: &Connection, table_name: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_GEOMETRY_COLUMN_META)?;
    let column_name = stmt
        .query_row([table_name], |row| row.get::<_, String>(1))
        .optional()?;
    Ok(column_name)
}

fn find_geometry_column(
    conn: &Connection,
    table_name: &str,
) -> Result<Option<SpatialColumnDescriptor>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_GEOMETRY_COLUMN_META)?;
    let row = stmt
        .query_row([table_name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i8>(3)?,
                row.get::<_, i8>(4)?,
                row.get::<_, i32>(5)?,
            ))
        })
        .optional()?;

    let Some((table_name, column_name, geometry_type_str, z, m, srs_id)) = row else {
        return Ok(None);
    };

    Ok(Some(SpatialColumnDescriptor {
        table_name,
        column_name,
        geometry_type: GeometryType::from_name(&geometry_type_str)?,
        srs_id,
        dimension: dimension_from_zm(z, m)?,
    }))
}

fn srs_definition(conn: &Connection, srs_id: i32) -> Result<Option<String>> {
    let definition = conn
        .query_row(SQL_SELECT_SRS_DEFINITION, [srs_id], |row| row.get(0))
        .optional()?;
    Ok(definition)
}

/// Make sure `srs_id` can be referenced by a table, inserting the definition
/// from the built-in catalog when needed. Returns the id to store, which
/// differs from the argument only for catalog aliases.
pub(crate) fn ensure_srs_registered(conn: &Connection, srs_id: i32) -> Result<i32> {
    if srs_definition(conn, srs_id)?.is_some() {
        return Ok(srs_id);
    }

    let cs = CoordinateSystems::global()?.lookup(srs_id)?;
    if cs.wkid != srs_id && srs_definition(conn, cs.wkid)?.is_some() {
        return Ok(cs.wkid);
    }
    insert_srs(conn, cs)?;
    Ok(cs.wkid)
}

/// Register a coordinate system. Re-registering an identical definition is a
/// no-op; a different definition under the same id is a conflict.
pub(crate) fn register_srs(conn: &Connection, cs: &CoordinateSystem) -> Result<()> {
    match srs_definition(conn, cs.wkid)? {
        Some(definition) if definition == cs.wkt => Ok(()),
        Some(_) => Err(GpkgError::SrsConflict { srs_id: cs.wkid }),
        None => insert_srs(conn, cs),
    }
}

fn insert_srs(conn: &Connection, cs: &CoordinateSystem) -> Result<()> {
    conn.execute(
        SQL_INSERT_SRS,
        rusqlite::params![
            cs.name,
            cs.wkid,
            cs.organization,
            cs.wkid,
            cs.wkt,
            cs.description
        ],
    )?;
    info!(srs_id = cs.wkid, name = %cs.name, "registered spatial reference system");
    Ok(())
}
