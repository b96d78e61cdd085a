use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::types::{ToSql, Type};
use rusqlite::{Connection, Params};
use tracing::debug;

use super::schema::{SpatialColumnDescriptor, geometry_column};
use super::{Gpkg, SpatialRow};
use crate::conversions::column_type_from_str;
use crate::error::{GpkgError, Result};
use crate::geometry::{Envelope, GeometryOptions, gpb};
use crate::ogc_sql::{
    SQL_UPDATE_GPKG_CONTENTS_EXTENT, sql_count, sql_delete_all, sql_delete_row, sql_insert_row,
    sql_select_geometries, sql_select_rows, sql_table_columns, sql_update_row,
};
use crate::types::{ColumnSpec, Value};

/// Identity column of tables created by this crate.
pub(crate) const ID_COLUMN: &str = "OBJECTID";

// Rows are always selected as `id, geometry, attributes...`.
const ID_INDEX: usize = 0;
const GEOMETRY_INDEX: usize = 1;

/// Column layout shared by all rows of a table.
#[derive(Debug)]
pub(crate) struct TableSchema {
    pub(crate) descriptor: SpatialColumnDescriptor,
    pub(crate) id_column: String,
    /// Attribute columns, without the identity and the geometry column.
    pub(crate) columns: Vec<ColumnSpec>,
    pub(crate) geometry_options: GeometryOptions,
    index_by_name: HashMap<String, usize>,
}

impl TableSchema {
    pub(crate) fn new(
        descriptor: SpatialColumnDescriptor,
        id_column: String,
        columns: Vec<ColumnSpec>,
        geometry_options: GeometryOptions,
    ) -> Self {
        let index_by_name = columns
            .iter()
            .enumerate()
            .map(|(idx, spec)| (spec.name.to_lowercase(), idx))
            .collect();
        Self {
            descriptor,
            id_column,
            columns,
            geometry_options,
            index_by_name,
        }
    }

    /// Layout of a row that does not belong to a table.
    pub(crate) fn detached(descriptor: SpatialColumnDescriptor) -> Self {
        Self::new(
            descriptor,
            ID_COLUMN.to_string(),
            Vec::new(),
            GeometryOptions::default(),
        )
    }

    /// Read the layout of `table_name` from the database.
    pub(crate) fn load(
        conn: &Connection,
        table_name: &str,
        geometry_options: GeometryOptions,
    ) -> Result<Self> {
        let descriptor = geometry_column(conn, table_name)?;
        let table_name = descriptor.table_name.as_str();

        let mut stmt = conn.prepare(&sql_table_columns(table_name))?;
        let table_columns = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)? != 0,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut id_column: Option<String> = None;
        let mut columns = Vec::new();
        for (name, declared_type, is_primary_key) in table_columns {
            if is_primary_key {
                if id_column.is_some() {
                    return Err(GpkgError::CompositePrimaryKeyUnsupported {
                        table_name: table_name.to_string(),
                    });
                }
                id_column = Some(name);
                continue;
            }
            if name.eq_ignore_ascii_case(&descriptor.column_name) {
                continue;
            }

            // cf. https://www.geopackage.org/spec140/index.html#_sqlite_container
            let column_type = column_type_from_str(&declared_type).ok_or_else(|| {
                GpkgError::UnsupportedColumnType {
                    column: name.clone(),
                    declared_type: declared_type.clone(),
                }
            })?;
            columns.push(ColumnSpec { name, column_type });
        }

        let id_column = id_column.ok_or_else(|| GpkgError::MissingPrimaryKeyColumn {
            table_name: table_name.to_string(),
        })?;

        Ok(Self::new(descriptor, id_column, columns, geometry_options))
    }

    pub(crate) fn column_index(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(&name.to_lowercase()).copied()
    }
}

/// A spatial table of a GeoPackage.
#[derive(Debug)]
pub struct GpkgTable<'a> {
    pub(super) gpkg: &'a Gpkg,
    pub(super) schema: Arc<TableSchema>,
}

impl GpkgTable<'_> {
    pub fn name(&self) -> &str {
        &self.schema.descriptor.table_name
    }

    pub fn descriptor(&self) -> &SpatialColumnDescriptor {
        &self.schema.descriptor
    }

    /// Attribute columns, without the identity and the geometry column.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.schema.columns
    }

    pub fn id_column(&self) -> &str {
        &self.schema.id_column
    }

    /// A new, unsaved row with an empty geometry and `NULL` attributes.
    pub fn new_row(&self) -> SpatialRow {
        SpatialRow::new(Arc::clone(&self.schema))
    }

    /// All rows in identity order.
    ///
    /// Example:
    /// ```no_run
    /// use gpkg_spatial::Gpkg;
    ///
    /// let gpkg = Gpkg::open_read_only("data/example.gpkg")?;
    /// let table = gpkg.table("parcels")?;
    /// for row in table.rows()? {
    ///     let _id = row.id();
    ///     let _geom = row.geometry()?;
    /// }
    /// # Ok::<(), gpkg_spatial::GpkgError>(())
    /// ```
    pub fn rows(&self) -> Result<Vec<SpatialRow>> {
        self.query_rows(&self.schema, None, [])
    }

    /// Rows matching an SQL `WHERE` clause, e.g. `rows_where("name = ?1", ["a"])`.
    pub fn rows_where<P: Params>(&self, clause: &str, params: P) -> Result<Vec<SpatialRow>> {
        self.query_rows(&self.schema, Some(clause), params)
    }

    /// Like [`rows_where`](Self::rows_where), but only the attribute columns
    /// named in `fields` are read. The identity and the geometry are always
    /// read; `None` as clause selects every row.
    ///
    /// Saving a projected row writes only the columns it carries.
    pub fn rows_with_fields<P: Params>(
        &self,
        clause: Option<&str>,
        fields: &[&str],
        params: P,
    ) -> Result<Vec<SpatialRow>> {
        let columns = fields
            .iter()
            .map(|field| {
                self.schema
                    .column_index(field)
                    .map(|idx| self.schema.columns[idx].clone())
                    .ok_or_else(|| GpkgError::MissingProperty {
                        property: field.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let projected = Arc::new(TableSchema::new(
            self.schema.descriptor.clone(),
            self.schema.id_column.clone(),
            columns,
            self.schema.geometry_options,
        ));
        self.query_rows(&projected, clause, params)
    }

    pub fn row(&self, id: i64) -> Result<Option<SpatialRow>> {
        let clause = format!(r#""{}" = ?1"#, self.schema.id_column);
        Ok(self.query_rows(&self.schema, Some(&clause), [id])?.pop())
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .gpkg
            .connection()
            .query_row(&sql_count(self.name()), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn query_rows<P: Params>(
        &self,
        schema: &Arc<TableSchema>,
        clause: Option<&str>,
        params: P,
    ) -> Result<Vec<SpatialRow>> {
        let sql = sql_select_rows(
            &schema.descriptor.table_name,
            &schema.id_column,
            &schema.descriptor.column_name,
            schema.columns.iter().map(|spec| spec.name.as_str()),
            clause,
        );

        let mut stmt = self.gpkg.connection().prepare(&sql)?;
        let rows = stmt
            .query_map(params, |row| {
                let id_ref = row.get_ref(ID_INDEX)?;
                let id = match id_ref {
                    rusqlite::types::ValueRef::Integer(id) => id,
                    other => {
                        return Err(rusqlite::Error::InvalidColumnType(
                            ID_INDEX,
                            schema.id_column.clone(),
                            other.data_type(),
                        ));
                    }
                };

                let geometry = match Value::from(row.get_ref(GEOMETRY_INDEX)?) {
                    Value::Blob(bytes) => Some(bytes),
                    Value::Null => None,
                    _ => {
                        return Err(rusqlite::Error::InvalidColumnType(
                            GEOMETRY_INDEX,
                            schema.descriptor.column_name.clone(),
                            Type::Blob,
                        ));
                    }
                };

                let values = (0..schema.columns.len())
                    .map(|idx| row.get_ref(idx + 2).map(Value::from))
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                Ok(SpatialRow::from_storage(
                    Arc::clone(schema),
                    id,
                    geometry,
                    values,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Write the staged changes of a row. A row without an id is inserted and
    /// receives the id assigned by storage; otherwise only changed columns
    /// are updated.
    pub fn save(&self, row: &mut SpatialRow) -> Result<()> {
        self.check_row(row)?;
        let id = persist(self.gpkg.connection(), row)?;
        row.mark_saved(id);
        Ok(())
    }

    /// Save several rows in one transaction. Ids and change flags are only
    /// applied to the rows after the commit succeeds.
    pub fn save_all(&self, rows: &mut [SpatialRow]) -> Result<()> {
        for row in rows.iter() {
            self.check_row(row)?;
        }

        let tx = self.gpkg.connection().unchecked_transaction()?;
        let ids = rows
            .iter()
            .map(|row| persist(&tx, row))
            .collect::<Result<Vec<_>>>()?;
        tx.commit()?;

        for (row, id) in rows.iter_mut().zip(ids) {
            row.mark_saved(id);
        }
        Ok(())
    }

    /// Delete a saved row. Returns `false` when nothing was deleted.
    pub fn delete(&self, row: &SpatialRow) -> Result<bool> {
        self.check_row(row)?;
        let Some(id) = row.id() else {
            return Ok(false);
        };
        let sql = sql_delete_row(self.name(), &self.schema.id_column);
        let deleted = self.gpkg.connection().execute(&sql, [id])?;
        debug!(table = self.name(), id, "deleted row");
        Ok(deleted > 0)
    }

    /// Remove all rows from the table.
    pub fn truncate(&self) -> Result<usize> {
        self.gpkg.ensure_writable()?;
        let sql = sql_delete_all(self.name());
        Ok(self.gpkg.connection().execute(&sql, [])?)
    }

    /// Envelope of all non-empty geometries of the table.
    pub fn extent(&self) -> Result<Option<Envelope>> {
        let sql = sql_select_geometries(self.name(), &self.schema.descriptor.column_name);
        let mut stmt = self.gpkg.connection().prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut extent: Option<Envelope> = None;
        while let Some(row) = rows.next()? {
            let bytes = match row.get_ref(0)? {
                rusqlite::types::ValueRef::Blob(bytes) => bytes,
                _ => continue,
            };
            if bytes.starts_with(&gpb::LEGACY_MAGIC) {
                continue;
            }
            if let Some(envelope) = gpb::envelope_of(bytes)? {
                extent = Some(match extent {
                    Some(current) => current.merge(&envelope),
                    None => envelope,
                });
            }
        }
        Ok(extent)
    }

    /// Store the current extent in `gpkg_contents`.
    pub fn update_contents_extent(&self) -> Result<Option<Envelope>> {
        self.gpkg.ensure_writable()?;
        let extent = self.extent()?;
        self.gpkg.connection().execute(
            SQL_UPDATE_GPKG_CONTENTS_EXTENT,
            rusqlite::params![
                self.name(),
                extent.map(|e| e.min_x),
                extent.map(|e| e.min_y),
                extent.map(|e| e.max_x),
                extent.map(|e| e.max_y),
            ],
        )?;
        Ok(extent)
    }

    fn check_row(&self, row: &SpatialRow) -> Result<()> {
        self.gpkg.ensure_writable()?;
        if !Arc::ptr_eq(&row.schema, &self.schema) && row.table_name() != self.name() {
            return Err(GpkgError::RowTableMismatch {
                expected: self.name().to_string(),
                actual: row.table_name().to_string(),
            });
        }
        Ok(())
    }
}

/// Write a row and return the id assigned to it, if it was inserted.
fn persist(conn: &Connection, row: &SpatialRow) -> Result<Option<i64>> {
    match row.id {
        None => insert_row(conn, row).map(Some),
        Some(id) => update_row(conn, row, id).map(|_| None),
    }
}

fn insert_row(conn: &Connection, row: &SpatialRow) -> Result<i64> {
    let schema = &row.schema;
    let table_name = schema.descriptor.table_name.as_str();

    let mut names: Vec<&str> = vec![&schema.descriptor.column_name];
    let mut params: Vec<&dyn ToSql> = vec![&row.geometry];
    for (spec, value) in schema.columns.iter().zip(&row.values) {
        names.push(&spec.name);
        params.push(value);
    }

    let sql = sql_insert_row(table_name, names);
    conn.prepare_cached(&sql)?.execute(&params[..])?;
    let id = conn.last_insert_rowid();
    debug!(table = table_name, id, "inserted row");
    Ok(id)
}

fn update_row(conn: &Connection, row: &SpatialRow, id: i64) -> Result<()> {
    let schema = &row.schema;
    let table_name = schema.descriptor.table_name.as_str();

    let mut names: Vec<&str> = Vec::new();
    let mut params: Vec<&dyn ToSql> = Vec::new();
    if row.geometry_dirty {
        names.push(&schema.descriptor.column_name);
        params.push(&row.geometry);
    }
    for ((spec, value), dirty) in schema.columns.iter().zip(&row.values).zip(&row.dirty) {
        if *dirty {
            names.push(&spec.name);
            params.push(value);
        }
    }
    if names.is_empty() {
        return Ok(());
    }

    params.push(&id);
    let sql = sql_update_row(table_name, &schema.id_column, names);
    let updated = conn.prepare_cached(&sql)?.execute(&params[..])?;
    if updated == 0 {
        return Err(GpkgError::RowNotFound {
            table_name: table_name.to_string(),
            id,
        });
    }
    debug!(table = table_name, id, "updated row");
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::GpkgError;
    use crate::geometry::{Coord, Dimension, Geometry, GeometryInput, GeometryType};
    use crate::gpkg::Gpkg;
    use crate::types::{ColumnSpec, ColumnType, Value};

    fn stations(gpkg: &Gpkg) -> crate::Result<()> {
        gpkg.create_table(
            "stations",
            "Shape",
            GeometryType::MultiPoint,
            Dimension::Xy,
            4326,
            &[
                ColumnSpec::new("name", ColumnType::Text),
                ColumnSpec::new("elevation", ColumnType::Double),
            ],
        )?;
        Ok(())
    }

    fn point(x: f64, y: f64) -> Option<GeometryInput> {
        Some(Geometry::Point(Coord::xy(x, y)).into())
    }

    #[test]
    fn insert_and_read_back() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        stations(&gpkg)?;
        let table = gpkg.table("stations")?;

        let mut row = table.new_row();
        row.set_geometry(point(-97.06138, 32.837))?;
        row.set_property("name", "north")?;
        assert!(row.is_dirty());
        table.save(&mut row)?;
        assert!(!row.is_dirty());

        let id = row.id().ok_or(GpkgError::NullGeometryValue)?;
        let read = table.row(id)?.ok_or(GpkgError::RowNotFound {
            table_name: "stations".to_string(),
            id,
        })?;
        assert_eq!(read.property("name"), Some(Value::from("north")));
        assert_eq!(read.property("elevation"), Some(Value::Null));
        assert_eq!(read.to_storage_bytes(), row.to_storage_bytes());
        assert_eq!(
            read.geometry()?,
            Geometry::MultiPoint(vec![Coord::xy(-97.06138, 32.837)])
        );
        assert_eq!(table.count()?, 1);
        assert!(table.row(id + 1)?.is_none());
        Ok(())
    }

    #[test]
    fn updates_only_touch_changed_columns() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        stations(&gpkg)?;
        let table = gpkg.table("stations")?;

        let mut row = table.new_row();
        row.set_property("name", "a")?;
        row.set_property("elevation", 10.0)?;
        table.save(&mut row)?;

        let mut copy = table.rows()?.remove(0);
        copy.set_property("elevation", 12.5)?;
        row.set_property("name", "b")?;
        table.save(&mut copy)?;
        table.save(&mut row)?;

        let stored = table.rows()?.remove(0);
        assert_eq!(stored.property("name"), Some(Value::from("b")));
        assert_eq!(stored.property("elevation"), Some(Value::from(12.5)));

        let matching = table.rows_where("elevation > ?1", [12.0])?;
        assert_eq!(matching.len(), 1);
        Ok(())
    }

    #[test]
    fn projected_rows() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        stations(&gpkg)?;
        let table = gpkg.table("stations")?;

        let mut row = table.new_row();
        row.set_property("name", "a")?;
        row.set_property("elevation", 10.0)?;
        table.save(&mut row)?;

        let mut rows = table.rows_with_fields(None, &["Elevation"], [])?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].property("elevation"), Some(Value::from(10.0)));
        assert_eq!(rows[0].property("name"), None);
        assert!(rows[0].property("OBJECTID").is_some());

        rows[0].set_property("elevation", 11.0)?;
        table.save(&mut rows[0])?;
        let stored = table.rows()?.remove(0);
        assert_eq!(stored.property("name"), Some(Value::from("a")));
        assert_eq!(stored.property("elevation"), Some(Value::from(11.0)));

        assert!(
            table
                .rows_with_fields(Some("elevation > ?1"), &["name"], [20.0])?
                .is_empty()
        );
        assert!(matches!(
            table.rows_with_fields(None, &["depth"], []),
            Err(GpkgError::MissingProperty { .. })
        ));
        Ok(())
    }

    #[test]
    fn update_of_deleted_row_fails() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        stations(&gpkg)?;
        let table = gpkg.table("stations")?;

        let mut row = table.new_row();
        table.save(&mut row)?;
        assert!(table.delete(&row)?);
        assert!(!table.delete(&row)?);

        row.set_property("name", "gone")?;
        assert!(matches!(
            table.save(&mut row),
            Err(GpkgError::RowNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn save_all_is_atomic() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        stations(&gpkg)?;
        let table = gpkg.table("stations")?;

        let mut rows = vec![table.new_row(), table.new_row()];
        rows[0].set_geometry(point(1.0, 1.0))?;
        rows[1].set_geometry(point(2.0, 2.0))?;
        table.save_all(&mut rows)?;
        assert!(rows.iter().all(|row| row.id().is_some()));

        // the second update fails on the CHECK constraint
        let mut batch = vec![table.new_row(), table.new_row()];
        batch[1].set_property("elevation", "high")?;
        assert!(matches!(
            table.save_all(&mut batch),
            Err(GpkgError::Sql(_))
        ));
        assert!(batch.iter().all(|row| row.id().is_none()));
        assert_eq!(table.count()?, 2);
        Ok(())
    }

    #[test]
    fn extent_over_rows() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        stations(&gpkg)?;
        let table = gpkg.table("stations")?;
        assert_eq!(table.extent()?, None);

        let mut rows = vec![table.new_row(), table.new_row(), table.new_row()];
        rows[0].set_geometry(point(-97.06138, 32.837))?;
        rows[1].set_geometry(point(-97.06124, 32.834))?;
        table.save_all(&mut rows)?;

        let extent = table
            .update_contents_extent()?
            .ok_or(GpkgError::NullGeometryValue)?;
        assert_eq!(
            (extent.min_x, extent.max_x, extent.min_y, extent.max_y),
            (-97.06138, -97.06124, 32.834, 32.837)
        );

        let stored: (f64, f64) = gpkg.connection().query_row(
            "SELECT min_x, max_y FROM gpkg_contents WHERE table_name = 'stations'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        assert_eq!(stored, (-97.06138, 32.837));

        assert_eq!(table.truncate()?, 3);
        assert_eq!(table.count()?, 0);
        Ok(())
    }

    #[test]
    fn spatial_index_follows_rows() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        stations(&gpkg)?;
        let table = gpkg.table("stations")?;

        let mut rows = vec![table.new_row(), table.new_row()];
        rows[0].set_geometry(point(5.0, 6.0))?;
        table.save_all(&mut rows)?;

        let indexed: (i64, f64) = gpkg.connection().query_row(
            r#"SELECT COUNT(*), MAX(maxx) FROM "rtree_stations_Shape""#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        // the empty row is not indexed
        assert_eq!(indexed.0, 1);
        assert!((indexed.1 - 5.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn rows_of_other_tables_are_rejected() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        stations(&gpkg)?;
        gpkg.create_table(
            "lines",
            "Shape",
            GeometryType::LineString,
            Dimension::Xy,
            4326,
            &[],
        )?;
        let stations = gpkg.table("stations")?;
        let lines = gpkg.table("lines")?;

        let mut row = lines.new_row();
        assert!(matches!(
            stations.save(&mut row),
            Err(GpkgError::RowTableMismatch { .. })
        ));
        Ok(())
    }
}
