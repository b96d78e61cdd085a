// cf. https://www.geopackage.org/spec140/index.html#table_definition_sql

use crate::error::Result;
use crate::srs::CoordinateSystems;

/// "GPKG" as a big endian 32 bit integer.
pub(crate) const GPKG_APPLICATION_ID: i32 = 0x4750_4B47;
/// GeoPackage 1.4.0
pub(crate) const GPKG_USER_VERSION: i32 = 10400;

// gpkg_contents: lists all geospatial contents in the package with identifying
// and descriptive metadata for user display and access.
pub(crate) const SQL_GPKG_CONTENTS: &str = "
CREATE TABLE gpkg_contents (
  table_name TEXT NOT NULL PRIMARY KEY,
  data_type TEXT NOT NULL,
  identifier TEXT UNIQUE,
  description TEXT DEFAULT '',
  last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
  min_x DOUBLE,
  min_y DOUBLE,
  max_x DOUBLE,
  max_y DOUBLE,
  srs_id INTEGER,
  CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
";

// gpkg_extensions: declares which extensions apply to the GeoPackage, a table,
// or a column so clients can detect requirements without scanning user tables.
pub(crate) const SQL_GPKG_EXTENSIONS: &str = "
CREATE TABLE gpkg_extensions (
  table_name TEXT,
  column_name TEXT,
  extension_name TEXT NOT NULL,
  definition TEXT NOT NULL,
  scope TEXT NOT NULL,
  CONSTRAINT ge_tce UNIQUE (table_name, column_name, extension_name)
);
";

// gpkg_geometry_columns: identifies geometry columns and geometry types for
// vector feature user data tables.
pub(crate) const SQL_GPKG_GEOMETRY_COLUMNS: &str = "
CREATE TABLE gpkg_geometry_columns (
  table_name TEXT NOT NULL,
  column_name TEXT NOT NULL,
  geometry_type_name TEXT NOT NULL,
  srs_id INTEGER NOT NULL,
  z TINYINT NOT NULL,
  m TINYINT NOT NULL,
  CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
  CONSTRAINT uk_gc_table_name UNIQUE (table_name),
  CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
  CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
";

// gpkg_spatial_ref_sys: the SRS catalog referenced by gpkg_contents and
// gpkg_geometry_columns to describe spatial reference systems.
pub(crate) const SQL_GPKG_SPATIAL_REF_SYS: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
  srs_name TEXT NOT NULL,
  srs_id INTEGER PRIMARY KEY,
  organization TEXT NOT NULL,
  organization_coordsys_id INTEGER NOT NULL,
  definition  TEXT NOT NULL,
  description TEXT
);
";

pub(crate) const SQL_LIST_TABLES: &str =
    "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY table_name";

pub(crate) const SQL_TABLE_NAME_CI: &str =
    "SELECT table_name FROM gpkg_contents WHERE lower(table_name) = lower(?1)";

pub(crate) const SQL_INSERT_GPKG_CONTENTS: &str = "
INSERT INTO gpkg_contents
  (table_name, data_type, identifier, description, srs_id)
VALUES
  (?1, 'features', ?2, '', ?3)
";

pub(crate) const SQL_UPDATE_GPKG_CONTENTS_EXTENT: &str = "
UPDATE gpkg_contents
SET min_x = ?2, min_y = ?3, max_x = ?4, max_y = ?5,
    last_change = strftime('%Y-%m-%dT%H:%M:%fZ','now')
WHERE table_name = ?1
";

pub(crate) const SQL_DELETE_GPKG_CONTENTS: &str = "DELETE FROM gpkg_contents WHERE table_name = ?1";

pub(crate) const SQL_INSERT_GPKG_GEOMETRY_COLUMNS: &str = "
INSERT INTO gpkg_geometry_columns
  (table_name, column_name, geometry_type_name, srs_id, z, m)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_SELECT_GEOMETRY_COLUMN_META: &str = "
SELECT table_name, column_name, geometry_type_name, z, m, srs_id
FROM gpkg_geometry_columns
WHERE lower(table_name) = lower(?1)
";

pub(crate) const SQL_DELETE_GPKG_GEOMETRY_COLUMNS: &str =
    "DELETE FROM gpkg_geometry_columns WHERE table_name = ?1";

pub(crate) const SQL_INSERT_SRS: &str = "
INSERT INTO gpkg_spatial_ref_sys
  (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_SELECT_SRS_DEFINITION: &str =
    "SELECT definition FROM gpkg_spatial_ref_sys WHERE srs_id = ?1";

pub(crate) const SQL_INSERT_RTREE_EXTENSION: &str = "
INSERT INTO gpkg_extensions
  (table_name, column_name, extension_name, definition, scope)
VALUES
  (?1, ?2, 'gpkg_rtree_index', 'http://www.geopackage.org/spec/#extension_rtree', 'write-only')
";

pub(crate) const SQL_DELETE_GPKG_EXTENSIONS: &str =
    "DELETE FROM gpkg_extensions WHERE table_name = ?1";

pub(crate) fn sql_create_table(table_name: &str, column_defs: &str) -> String {
    format!(r#"CREATE TABLE "{}" ({})"#, table_name, column_defs)
}

pub(crate) fn sql_drop_table(table_name: &str) -> String {
    format!(r#"DROP TABLE "{table_name}""#)
}

pub(crate) fn sql_table_columns(table_name: &str) -> String {
    format!(
        "SELECT name, type, pk FROM pragma_table_info('{}') ORDER BY cid",
        table_name.replace('\'', "''")
    )
}

pub(crate) fn sql_add_column(table_name: &str, column_def: &str) -> String {
    format!(r#"ALTER TABLE "{table_name}" ADD COLUMN {column_def}"#)
}

pub(crate) fn sql_drop_column(table_name: &str, column_name: &str) -> String {
    format!(r#"ALTER TABLE "{table_name}" DROP COLUMN "{column_name}""#)
}

/// `SELECT id, geometry, other... FROM table [WHERE ...] ORDER BY id`.
pub(crate) fn sql_select_rows<'a, I>(
    table_name: &'a str,
    id_column: &'a str,
    geometry_column: &'a str,
    other_columns: I,
    where_clause: Option<&str>,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut columns = vec![format!(r#""{id_column}""#), format!(r#""{geometry_column}""#)];
    columns.extend(other_columns.into_iter().map(|name| format!(r#""{}""#, name)));

    let where_clause = match where_clause {
        Some(clause) => format!("WHERE {clause} "),
        None => "".to_string(),
    };

    format!(
        r#"SELECT {} FROM "{table_name}" {where_clause}ORDER BY "{id_column}""#,
        columns.join(", ")
    )
}

pub(crate) fn sql_select_geometries(table_name: &str, geometry_column: &str) -> String {
    format!(r#"SELECT "{geometry_column}" FROM "{table_name}" WHERE "{geometry_column}" IS NOT NULL"#)
}

pub(crate) fn sql_count(table_name: &str) -> String {
    format!(r#"SELECT COUNT(*) FROM "{table_name}""#)
}

pub(crate) fn sql_delete_all(table_name: &str) -> String {
    format!(r#"DELETE FROM "{}""#, table_name)
}

pub(crate) fn sql_delete_row(table_name: &str, id_column: &str) -> String {
    format!(r#"DELETE FROM "{table_name}" WHERE "{id_column}" = ?1"#)
}

pub(crate) fn sql_insert_row<'a, I>(table_name: &str, columns: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns: Vec<String> = columns
        .into_iter()
        .map(|name| format!(r#""{}""#, name))
        .collect();
    if columns.is_empty() {
        return format!(r#"INSERT INTO "{table_name}" DEFAULT VALUES"#);
    }
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        r#"INSERT INTO "{}" ({}) VALUES ({})"#,
        table_name,
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// `UPDATE table SET a = ?1, b = ?2 WHERE id = ?3`; the id is the last parameter.
pub(crate) fn sql_update_row<'a, I>(table_name: &str, id_column: &str, columns: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let assignments: Vec<String> = columns
        .into_iter()
        .enumerate()
        .map(|(i, name)| format!(r#""{name}" = ?{}"#, i + 1))
        .collect();
    format!(
        r#"UPDATE "{table_name}" SET {} WHERE "{id_column}" = ?{}"#,
        assignments.join(", "),
        assignments.len() + 1
    )
}

pub(crate) fn initialize_gpkg(conn: &rusqlite::Connection) -> Result<()> {
    conn.pragma_update(None, "application_id", GPKG_APPLICATION_ID)?;
    conn.pragma_update(None, "user_version", GPKG_USER_VERSION)?;
    conn.execute_batch(SQL_GPKG_SPATIAL_REF_SYS)?;
    register_default_srs_ids(conn)?;
    conn.execute_batch(SQL_GPKG_CONTENTS)?;
    conn.execute_batch(SQL_GPKG_GEOMETRY_COLUMNS)?;
    conn.execute_batch(SQL_GPKG_EXTENSIONS)?;
    Ok(())
}

// WGS 84 and the two undefined systems every GeoPackage must carry.
fn register_default_srs_ids(conn: &rusqlite::Connection) -> Result<()> {
    let catalog = CoordinateSystems::global()?;
    for cs in catalog.lookup_many(&[4326, -1, 0])? {
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
    }
    Ok(())
}

pub(crate) fn rtree_table_name(table: &str, geom_column: &str) -> String {
    format!("rtree_{table}_{geom_column}")
}

// cf. https://www.geopackage.org/spec140/index.html#extension_rtree
pub(crate) fn gpkg_rtree_create_sql(table: &str, geom_column: &str) -> String {
    format!(
        r#"CREATE VIRTUAL TABLE "{r}" USING rtree(id, minx, maxx, miny, maxy);"#,
        r = rtree_table_name(table, geom_column),
    )
}

// The maintenance triggers live on the user table and are dropped with it.
pub(crate) fn gpkg_rtree_drop_sql(table: &str, geom_column: &str) -> String {
    format!(
        r#"DROP TABLE IF EXISTS "{r}";"#,
        r = rtree_table_name(table, geom_column),
    )
}

pub(crate) fn gpkg_rtree_load_sql(table: &str, geom_column: &str, id_column: &str) -> String {
    format!(
        r#"INSERT OR REPLACE INTO "{r}"
  SELECT "{i}", ST_MinX("{c}"), ST_MaxX("{c}"), ST_MinY("{c}"), ST_MaxY("{c}")
  FROM "{t}" WHERE "{c}" NOT NULL AND NOT ST_IsEmpty("{c}");"#,
        r = rtree_table_name(table, geom_column),
        t = table,
        c = geom_column,
        i = id_column
    )
}

pub(crate) fn gpkg_rtree_triggers_sql(table: &str, geom_column: &str, id_column: &str) -> String {
    format!(
        r#"CREATE TRIGGER "{r}_insert" AFTER INSERT ON "{t}"
  WHEN (NEW."{c}" NOT NULL AND NOT ST_IsEmpty(NEW."{c}"))
BEGIN
  INSERT OR REPLACE INTO "{r}" VALUES (
    NEW."{i}",
    ST_MinX(NEW."{c}"), ST_MaxX(NEW."{c}"),
    ST_MinY(NEW."{c}"), ST_MaxY(NEW."{c}")
  );
END;

CREATE TRIGGER "{r}_update2" AFTER UPDATE OF "{c}" ON "{t}"
  WHEN OLD."{i}" = NEW."{i}" AND
       (NEW."{c}" ISNULL OR ST_IsEmpty(NEW."{c}"))
BEGIN
  DELETE FROM "{r}" WHERE id = OLD."{i}";
END;

CREATE TRIGGER "{r}_update4" AFTER UPDATE ON "{t}"
  WHEN OLD."{i}" != NEW."{i}" AND
       (NEW."{c}" ISNULL OR ST_IsEmpty(NEW."{c}"))
BEGIN
  DELETE FROM "{r}" WHERE id IN (OLD."{i}", NEW."{i}");
END;

CREATE TRIGGER "{r}_update5" AFTER UPDATE ON "{t}"
  WHEN OLD."{i}" != NEW."{i}" AND
       (NEW."{c}" NOTNULL AND NOT ST_IsEmpty(NEW."{c}"))
BEGIN
  DELETE FROM "{r}" WHERE id = OLD."{i}";
  INSERT OR REPLACE INTO "{r}" VALUES (
    NEW."{i}",
    ST_MinX(NEW."{c}"), ST_MaxX(NEW."{c}"),
    ST_MinY(NEW."{c}"), ST_MaxY(NEW."{c}")
  );
END;

CREATE TRIGGER "{r}_update6" AFTER UPDATE OF "{c}" ON "{t}"
  WHEN OLD."{i}" = NEW."{i}" AND
       (NEW."{c}" NOTNULL AND NOT ST_IsEmpty(NEW."{c}")) AND
       (OLD."{c}" NOTNULL AND NOT ST_IsEmpty(OLD."{c}"))
BEGIN
  UPDATE "{r}" SET
    minx = ST_MinX(NEW."{c}"),
    maxx = ST_MaxX(NEW."{c}"),
    miny = ST_MinY(NEW."{c}"),
    maxy = ST_MaxY(NEW."{c}")
  WHERE id = NEW."{i}";
END;

CREATE TRIGGER "{r}_update7" AFTER UPDATE OF "{c}" ON "{t}"
  WHEN OLD."{i}" = NEW."{i}" AND
       (NEW."{c}" NOTNULL AND NOT ST_IsEmpty(NEW."{c}")) AND
       (OLD."{c}" ISNULL OR ST_IsEmpty(OLD."{c}"))
BEGIN
  INSERT INTO "{r}" VALUES (
    NEW."{i}",
    ST_MinX(NEW."{c}"), ST_MaxX(NEW."{c}"),
    ST_MinY(NEW."{c}"), ST_MaxY(NEW."{c}")
  );
END;

CREATE TRIGGER "{r}_delete" AFTER DELETE ON "{t}"
  WHEN OLD."{c}" NOT NULL
BEGIN
  DELETE FROM "{r}" WHERE id = OLD."{i}";
END;"#,
        r = rtree_table_name(table, geom_column),
        t = table,
        c = geom_column,
        i = id_column
    )
}

pub(crate) fn execute_rtree_sqls(
    conn: &rusqlite::Connection,
    table: &str,
    geom_column: &str,
    id_column: &str,
) -> rusqlite::Result<()> {
    conn.execute_batch(&gpkg_rtree_create_sql(table, geom_column))?;
    conn.execute_batch(&gpkg_rtree_load_sql(table, geom_column, id_column))?;
    conn.execute_batch(&gpkg_rtree_triggers_sql(table, geom_column, id_column))?;
    conn.execute(SQL_INSERT_RTREE_EXTENSION, rusqlite::params![table, geom_column])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{sql_insert_row, sql_select_rows, sql_update_row};

    #[test]
    fn row_statements() {
        assert_eq!(
            sql_insert_row("parcels", ["Shape", "name"]),
            r#"INSERT INTO "parcels" ("Shape", "name") VALUES (?1, ?2)"#
        );
        assert_eq!(
            sql_insert_row("parcels", []),
            r#"INSERT INTO "parcels" DEFAULT VALUES"#
        );
        assert_eq!(
            sql_update_row("parcels", "OBJECTID", ["name", "area"]),
            r#"UPDATE "parcels" SET "name" = ?1, "area" = ?2 WHERE "OBJECTID" = ?3"#
        );
        assert_eq!(
            sql_select_rows("parcels", "OBJECTID", "Shape", ["name"], Some("area > ?1")),
            r#"SELECT "OBJECTID", "Shape", "name" FROM "parcels" WHERE area > ?1 ORDER BY "OBJECTID""#
        );
    }
}
