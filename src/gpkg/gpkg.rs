use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::info;

use super::schema::{self, SpatialColumnDescriptor};
use super::table::{GpkgTable, ID_COLUMN, TableSchema};
use crate::conversions::{column_type_check, column_type_to_str};
use crate::error::{GpkgError, Result};
use crate::geometry::{Dimension, GeometryOptions, GeometryType};
use crate::ogc_sql::{
    SQL_DELETE_GPKG_CONTENTS, SQL_DELETE_GPKG_EXTENSIONS, SQL_DELETE_GPKG_GEOMETRY_COLUMNS,
    SQL_INSERT_GPKG_CONTENTS, SQL_LIST_TABLES, SQL_TABLE_NAME_CI, execute_rtree_sqls,
    gpkg_rtree_drop_sql, initialize_gpkg, sql_add_column, sql_create_table, sql_drop_column,
    sql_drop_table,
};
use crate::sql_functions::register_spatial_functions;
use crate::srs::CoordinateSystem;
use crate::types::ColumnSpec;

/// Write behaviour of a [`Gpkg`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpkgOptions {
    /// How geometries are encoded when rows are written.
    pub geometry: GeometryOptions,
    /// Create an R-tree spatial index for new tables.
    pub spatial_index: bool,
}

impl Default for GpkgOptions {
    fn default() -> Self {
        Self {
            geometry: GeometryOptions::default(),
            spatial_index: true,
        }
    }
}

#[derive(Debug)]
/// GeoPackage connection wrapper for spatial tables.
pub struct Gpkg {
    conn: Connection,
    read_only: bool,
    options: GpkgOptions,
}

impl Gpkg {
    fn from_connection(conn: Connection, read_only: bool) -> Result<Self> {
        register_spatial_functions(&conn)?;
        Ok(Self {
            conn,
            read_only,
            options: GpkgOptions::default(),
        })
    }

    /// Open a GeoPackage in read-only mode.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Self::from_connection(conn, true)
    }

    /// Open an existing GeoPackage in read-write mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GpkgError::FileNotFound(path.to_path_buf()));
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn, false)
    }

    /// Create a new GeoPackage. Fails if the file already exists.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(GpkgError::FileExists(path.to_path_buf()));
        }

        let conn = Connection::open(path)?;
        initialize_gpkg(&conn)?;
        info!(path = %path.display(), "created GeoPackage");
        Self::from_connection(conn, false)
    }

    /// Create a new GeoPackage, replacing an existing file when `overwrite`
    /// is set.
    pub fn create<P: AsRef<Path>>(path: P, overwrite: bool) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() && overwrite {
            std::fs::remove_file(path)?;
        }
        Self::new(path)
    }

    /// Create a new GeoPackage in memory
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_gpkg(&conn)?;
        Self::from_connection(conn, false)
    }

    pub fn with_options(mut self, options: GpkgOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &GpkgOptions {
        &self.options
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(GpkgError::ReadOnly);
        }
        Ok(())
    }

    /// Register a spatial reference system in `gpkg_spatial_ref_sys`.
    ///
    /// Registering the same definition twice is a no-op. A different
    /// definition under an id that is already registered fails with
    /// [`GpkgError::SrsConflict`].
    ///
    /// Example: register a local engineering system.
    /// ```
    /// # use gpkg_spatial::Gpkg;
    /// use gpkg_spatial::srs::CoordinateSystem;
    ///
    /// let gpkg = Gpkg::new_in_memory()?;
    /// gpkg.register_srs(&CoordinateSystem {
    ///     wkid: 900_001,
    ///     name: "Site grid".to_string(),
    ///     organization: "NONE".to_string(),
    ///     wkt: r#"LOCAL_CS["Site grid",UNIT["metre",1]]"#.to_string(),
    ///     description: Some("plant site coordinates".to_string()),
    /// })?;
    /// # Ok::<(), gpkg_spatial::GpkgError>(())
    /// ```
    pub fn register_srs(&self, cs: &CoordinateSystem) -> Result<()> {
        self.ensure_writable()?;
        schema::register_srs(&self.conn, cs)
    }

    /// Make sure an SRS id can be used by a table, inserting its definition
    /// from the built-in catalog when needed. Returns the id that is stored.
    pub fn ensure_srs_registered(&self, srs_id: i32) -> Result<i32> {
        self.ensure_writable()?;
        schema::ensure_srs_registered(&self.conn, srs_id)
    }

    /// Insert a geometry column definition into `gpkg_geometry_columns`.
    pub fn register_geometry_column(&self, descriptor: &SpatialColumnDescriptor) -> Result<()> {
        self.ensure_writable()?;
        schema::register_geometry_column(&self.conn, descriptor)
    }

    /// Geometry column of a table (table names are case-insensitive).
    pub fn geometry_column(&self, table_name: &str) -> Result<SpatialColumnDescriptor> {
        schema::geometry_column(&self.conn, table_name)
    }

    /// List the names of the spatial tables.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(SQL_LIST_TABLES)?;
        let tables = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(tables)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.list_tables()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether a table is registered, ignoring case.
    pub fn exists(&self, table_name: &str) -> Result<bool> {
        Ok(canonical_table_name(&self.conn, table_name)?.is_some())
    }

    /// Load a table by name.
    pub fn table(&self, table_name: &str) -> Result<GpkgTable<'_>> {
        let schema = TableSchema::load(&self.conn, table_name, self.options.geometry)?;
        Ok(GpkgTable {
            gpkg: self,
            schema: Arc::new(schema),
        })
    }

    /// Like [`Gpkg::table`], but `None` when the table does not exist.
    pub fn get(&self, table_name: &str) -> Result<Option<GpkgTable<'_>>> {
        if !self.exists(table_name)? {
            return Ok(None);
        }
        self.table(table_name).map(Some)
    }

    /// Create a spatial table with an `OBJECTID` identity column, a geometry
    /// column and the given attribute columns.
    ///
    /// The SRS is registered from the built-in catalog when it is not in the
    /// GeoPackage yet. All changes happen in one transaction.
    ///
    /// Example:
    /// ```no_run
    /// use gpkg_spatial::geometry::{Dimension, GeometryType};
    /// use gpkg_spatial::{ColumnSpec, ColumnType, Gpkg};
    ///
    /// let gpkg = Gpkg::new("parcels.gpkg")?;
    /// let table = gpkg.create_table(
    ///     "parcels",
    ///     "Shape",
    ///     GeometryType::MultiPolygon,
    ///     Dimension::Xy,
    ///     4326,
    ///     &[ColumnSpec::new("owner", ColumnType::Text)],
    /// )?;
    /// assert_eq!(table.id_column(), "OBJECTID");
    /// # Ok::<(), gpkg_spatial::GpkgError>(())
    /// ```
    pub fn create_table(
        &self,
        table_name: &str,
        geometry_column: &str,
        geometry_type: GeometryType,
        dimension: Dimension,
        srs_id: i32,
        columns: &[ColumnSpec],
    ) -> Result<GpkgTable<'_>> {
        self.ensure_writable()?;

        let tx = self.conn.unchecked_transaction()?;
        self.create_table_in(
            &tx,
            table_name,
            geometry_column,
            geometry_type,
            dimension,
            srs_id,
            columns,
        )?;
        tx.commit()?;

        self.table(table_name)
    }

    /// Drop `table_name` if it exists and create it again, in one
    /// transaction.
    pub fn replace_table(
        &self,
        table_name: &str,
        geometry_column: &str,
        geometry_type: GeometryType,
        dimension: Dimension,
        srs_id: i32,
        columns: &[ColumnSpec],
    ) -> Result<GpkgTable<'_>> {
        self.ensure_writable()?;

        let tx = self.conn.unchecked_transaction()?;
        if let Some(existing) = canonical_table_name(&tx, table_name)? {
            drop_table_in(&tx, &existing)?;
        }
        self.create_table_in(
            &tx,
            table_name,
            geometry_column,
            geometry_type,
            dimension,
            srs_id,
            columns,
        )?;
        tx.commit()?;

        self.table(table_name)
    }

    #[allow(clippy::too_many_arguments)]
    fn create_table_in(
        &self,
        conn: &Connection,
        table_name: &str,
        geometry_column: &str,
        geometry_type: GeometryType,
        dimension: Dimension,
        srs_id: i32,
        columns: &[ColumnSpec],
    ) -> Result<()> {
        if canonical_table_name(conn, table_name)?.is_some() {
            return Err(GpkgError::TableAlreadyExists {
                table_name: table_name.to_string(),
            });
        }

        let srs_id = schema::ensure_srs_registered(conn, srs_id)?;

        let mut column_defs = Vec::with_capacity(columns.len() + 2);
        column_defs.push(format!(
            r#""{ID_COLUMN}" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL"#
        ));
        column_defs.push(format!(
            r#""{}" {}"#,
            geometry_column,
            geometry_type.name()
        ));
        for spec in columns {
            column_defs.push(column_def(spec));
        }

        conn.execute_batch(&sql_create_table(table_name, &column_defs.join(", ")))?;
        conn.execute(
            SQL_INSERT_GPKG_CONTENTS,
            rusqlite::params![table_name, table_name, srs_id],
        )?;
        schema::register_geometry_column(
            conn,
            &SpatialColumnDescriptor::new(
                table_name,
                geometry_column,
                geometry_type,
                dimension,
                srs_id,
            ),
        )?;

        if self.options.spatial_index {
            execute_rtree_sqls(conn, table_name, geometry_column, ID_COLUMN)?;
        }

        info!(
            table = table_name,
            geometry_type = geometry_type.name(),
            srs_id,
            "created table"
        );
        Ok(())
    }

    /// Drop a table together with its metadata and spatial index.
    pub fn drop_table(&self, table_name: &str) -> Result<()> {
        self.ensure_writable()?;

        let table_name = canonical_table_name(&self.conn, table_name)?.ok_or_else(|| {
            GpkgError::MissingGeometryColumn {
                table_name: table_name.to_string(),
            }
        })?;

        let tx = self.conn.unchecked_transaction()?;
        drop_table_in(&tx, &table_name)?;
        tx.commit()?;
        Ok(())
    }

    /// Add an attribute column to an existing table.
    pub fn add_field(&self, table_name: &str, column: &ColumnSpec) -> Result<()> {
        self.ensure_writable()?;

        let descriptor = self.geometry_column(table_name)?;
        let sql = sql_add_column(&descriptor.table_name, &column_def(column));
        self.conn.execute_batch(&sql)?;
        info!(table = %descriptor.table_name, field = %column.name, "added field");
        Ok(())
    }

    /// Remove an attribute column. The identity and the geometry column
    /// cannot be removed.
    pub fn delete_field(&self, table_name: &str, field_name: &str) -> Result<()> {
        self.ensure_writable()?;

        let table = self.table(table_name)?;
        if field_name.eq_ignore_ascii_case(table.id_column())
            || field_name.eq_ignore_ascii_case(&table.descriptor().column_name)
        {
            return Err(GpkgError::ImmutableColumn {
                column: field_name.to_string(),
            });
        }
        let field = table
            .columns()
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(field_name))
            .ok_or_else(|| GpkgError::MissingProperty {
                property: field_name.to_string(),
            })?;

        self.conn
            .execute_batch(&sql_drop_column(table.name(), &field.name))?;
        info!(table = table.name(), field = %field.name, "deleted field");
        Ok(())
    }
}

fn column_def(spec: &ColumnSpec) -> String {
    let col_type = column_type_to_str(spec.column_type);
    match column_type_check(spec.column_type, &spec.name) {
        Some(check) => format!(r#""{}" {col_type} {check}"#, spec.name),
        None => format!(r#""{}" {col_type}"#, spec.name),
    }
}

fn canonical_table_name(conn: &Connection, table_name: &str) -> Result<Option<String>> {
    let name = conn
        .query_row(SQL_TABLE_NAME_CI, [table_name], |row| row.get(0))
        .optional()?;
    Ok(name)
}

fn drop_table_in(conn: &Connection, table_name: &str) -> Result<()> {
    if let Some(column_name) = schema::geometry_column_name(conn, table_name)? {
        conn.execute_batch(&gpkg_rtree_drop_sql(table_name, &column_name))?;
    }
    conn.execute(SQL_DELETE_GPKG_EXTENSIONS, [table_name])?;
    conn.execute(SQL_DELETE_GPKG_GEOMETRY_COLUMNS, [table_name])?;
    conn.execute(SQL_DELETE_GPKG_CONTENTS, [table_name])?;
    conn.execute_batch(&sql_drop_table(table_name))?;
    info!(table = table_name, "dropped table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Gpkg, GpkgOptions};
    use crate::error::GpkgError;
    use crate::geometry::{Coord, Dimension, Geometry, GeometryOptions, GeometryType};
    use crate::types::{ColumnSpec, ColumnType, Value};

    fn create_parcels(gpkg: &Gpkg, srs_id: i32) -> crate::Result<()> {
        gpkg.create_table(
            "Parcels",
            "Shape",
            GeometryType::Polygon,
            Dimension::Xy,
            srs_id,
            &[ColumnSpec::new("owner", ColumnType::Text)],
        )?;
        Ok(())
    }

    #[test]
    fn new_gpkg_has_core_tables() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let conn = gpkg.connection();

        let application_id: i32 =
            conn.query_row("PRAGMA application_id", [], |row| row.get(0))?;
        let user_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        assert_eq!(application_id, 0x4750_4B47);
        assert_eq!(user_version, 10400);

        let srs_ids: Vec<i32> = conn
            .prepare("SELECT srs_id FROM gpkg_spatial_ref_sys ORDER BY srs_id")?
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        assert_eq!(srs_ids, vec![-1, 0, 4326]);

        assert!(gpkg.is_empty()?);
        Ok(())
    }

    #[test]
    fn create_and_list_tables() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        create_parcels(&gpkg, 4326)?;

        assert_eq!(gpkg.list_tables()?, vec!["Parcels".to_string()]);
        assert_eq!(gpkg.len()?, 1);
        assert!(gpkg.exists("parcels")?);
        assert!(gpkg.get("roads")?.is_none());

        let table = gpkg.get("PARCELS")?.ok_or(GpkgError::MissingGeometryColumn {
            table_name: "PARCELS".to_string(),
        })?;
        assert_eq!(table.name(), "Parcels");
        assert_eq!(table.id_column(), "OBJECTID");
        assert_eq!(table.columns(), &[ColumnSpec::new("owner", ColumnType::Text)]);
        assert_eq!(table.descriptor().geometry_type, GeometryType::Polygon);

        assert!(matches!(
            create_parcels(&gpkg, 4326),
            Err(GpkgError::TableAlreadyExists { .. })
        ));
        Ok(())
    }

    #[test]
    fn unknown_srs_leaves_no_trace() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        assert!(matches!(
            create_parcels(&gpkg, 999_999),
            Err(GpkgError::UnknownSrs { srs_id: 999_999 })
        ));
        assert!(!gpkg.exists("Parcels")?);

        let tables: i64 = gpkg.connection().query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'Parcels'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(tables, 0);
        Ok(())
    }

    #[test]
    fn srs_is_registered_from_catalog() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        create_parcels(&gpkg, 102100)?;
        assert_eq!(gpkg.geometry_column("parcels")?.srs_id, 3857);
        Ok(())
    }

    #[test]
    fn replace_and_drop() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        create_parcels(&gpkg, 4326)?;
        {
            let table = gpkg.table("Parcels")?;
            let mut row = table.new_row();
            table.save(&mut row)?;
        }

        let table = gpkg.replace_table(
            "parcels",
            "geom",
            GeometryType::MultiPolygon,
            Dimension::Xyz,
            4326,
            &[],
        )?;
        assert_eq!(table.count()?, 0);
        assert_eq!(table.descriptor().column_name, "geom");
        assert!(table.descriptor().has_z());

        gpkg.drop_table("PARCELS")?;
        assert!(gpkg.is_empty()?);
        let leftovers: i64 = gpkg.connection().query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name LIKE 'rtree_%'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(leftovers, 0);
        assert!(matches!(
            gpkg.drop_table("parcels"),
            Err(GpkgError::MissingGeometryColumn { .. })
        ));
        Ok(())
    }

    #[test]
    fn drop_table_removes_index_of_unparsed_type() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        create_parcels(&gpkg, 4326)?;
        gpkg.connection().execute(
            "UPDATE gpkg_geometry_columns SET geometry_type_name = 'GEOMETRY'",
            [],
        )?;

        gpkg.drop_table("Parcels")?;
        let leftovers: i64 = gpkg.connection().query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name LIKE 'rtree_Parcels_Shape%'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(leftovers, 0);
        assert!(gpkg.is_empty()?);
        Ok(())
    }

    #[test]
    fn fields_can_be_added_and_removed() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        create_parcels(&gpkg, 4326)?;

        gpkg.add_field("parcels", &ColumnSpec::new("area", ColumnType::Double))?;
        gpkg.add_field("parcels", &ColumnSpec::new("zoned", ColumnType::Boolean))?;
        let table = gpkg.table("parcels")?;
        assert_eq!(table.columns().len(), 3);

        let mut row = table.new_row();
        row.set_property("AREA", 12.5)?;
        row.set_property("zoned", true)?;
        table.save(&mut row)?;

        gpkg.delete_field("parcels", "Area")?;
        let table = gpkg.table("parcels")?;
        assert_eq!(
            table.columns().iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["owner", "zoned"]
        );
        assert_eq!(table.rows()?[0].property("zoned"), Some(Value::Integer(1)));

        assert!(matches!(
            gpkg.delete_field("parcels", "objectid"),
            Err(GpkgError::ImmutableColumn { .. })
        ));
        assert!(matches!(
            gpkg.delete_field("parcels", "shape"),
            Err(GpkgError::ImmutableColumn { .. })
        ));
        assert!(matches!(
            gpkg.delete_field("parcels", "missing"),
            Err(GpkgError::MissingProperty { .. })
        ));
        Ok(())
    }

    #[test]
    fn options_control_encoding_and_index() -> crate::Result<()> {
        let options = GpkgOptions {
            geometry: GeometryOptions {
                endianness: crate::geometry::Endianness::BigEndian,
                write_envelope: false,
            },
            spatial_index: false,
        };
        let gpkg = Gpkg::new_in_memory()?.with_options(options);
        assert_eq!(gpkg.options(), &options);
        create_parcels(&gpkg, 4326)?;

        let rtrees: i64 = gpkg.connection().query_row(
            "SELECT COUNT(*) FROM gpkg_extensions WHERE extension_name = 'gpkg_rtree_index'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(rtrees, 0);

        let table = gpkg.table("parcels")?;
        let mut row = table.new_row();
        let square = vec![
            Coord::xy(0.0, 0.0),
            Coord::xy(1.0, 0.0),
            Coord::xy(1.0, 1.0),
            Coord::xy(0.0, 0.0),
        ];
        row.set_geometry(Some(Geometry::Polygon(vec![square]).into()))?;
        let header = row.header()?;
        assert_eq!(header.envelope, None);
        assert_eq!(header.endianness, crate::geometry::Endianness::BigEndian);
        Ok(())
    }

    #[test]
    fn files_on_disk() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sites.gpkg");

        assert!(matches!(
            Gpkg::open(&path),
            Err(GpkgError::FileNotFound(_))
        ));

        {
            let gpkg = Gpkg::new(&path)?;
            create_parcels(&gpkg, 4326)?;
        }
        assert!(matches!(Gpkg::new(&path), Err(GpkgError::FileExists(_))));

        let gpkg = Gpkg::open_read_only(&path)?;
        assert!(gpkg.is_read_only());
        assert_eq!(gpkg.list_tables()?, vec!["Parcels".to_string()]);
        assert!(matches!(
            gpkg.drop_table("Parcels"),
            Err(GpkgError::ReadOnly)
        ));
        let table = gpkg.table("Parcels")?;
        let mut row = table.new_row();
        assert!(matches!(table.save(&mut row), Err(GpkgError::ReadOnly)));
        drop(gpkg);

        let gpkg = Gpkg::create(&path, true)?;
        assert!(gpkg.is_empty()?);
        Ok(())
    }
}
