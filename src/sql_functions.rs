use crate::error::Result;
use crate::geometry::{Envelope, gpb};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, Error};

/// Register all spatial SQL helper functions in the provided connection.
///
/// The functions accept GeoPackage binary blobs and return `NULL` for `NULL`
/// input. Blobs carrying the legacy `GB` marker have no readable header and
/// are treated as empty.
///
/// Example:
/// ```no_run
/// use rusqlite::Connection;
/// use gpkg_spatial::register_spatial_functions;
///
/// let conn = Connection::open_in_memory()?;
/// register_spatial_functions(&conn)?;
/// # Ok::<(), gpkg_spatial::GpkgError>(())
/// ```
pub fn register_spatial_functions(conn: &Connection) -> Result<()> {
    register_st_minx(conn)?;
    register_st_miny(conn)?;
    register_st_maxx(conn)?;
    register_st_maxy(conn)?;
    register_st_isempty(conn)?;
    Ok(())
}

pub(crate) fn register_st_minx(conn: &Connection) -> Result<()> {
    register_bounds_component(conn, "ST_MinX", |e| e.min_x)
}

pub(crate) fn register_st_miny(conn: &Connection) -> Result<()> {
    register_bounds_component(conn, "ST_MinY", |e| e.min_y)
}

pub(crate) fn register_st_maxx(conn: &Connection) -> Result<()> {
    register_bounds_component(conn, "ST_MaxX", |e| e.max_x)
}

pub(crate) fn register_st_maxy(conn: &Connection) -> Result<()> {
    register_bounds_component(conn, "ST_MaxY", |e| e.max_y)
}

pub(crate) fn register_st_isempty(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "ST_IsEmpty",
        1,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let blob = match blob_from_ctx(ctx)? {
                Some(blob) => blob,
                None => return Ok(None),
            };
            let is_empty = envelope_from_blob(blob)?.is_none();
            Ok(Some(i64::from(is_empty)))
        },
    )?;
    Ok(())
}

fn register_bounds_component<F>(conn: &Connection, name: &str, f: F) -> Result<()>
where
    F: Fn(&Envelope) -> f64 + Copy + Send + Sync + 'static,
{
    conn.create_scalar_function(name, 1, FunctionFlags::SQLITE_DETERMINISTIC, move |ctx| {
        let blob = match blob_from_ctx(ctx)? {
            Some(blob) => blob,
            None => return Ok(None),
        };
        Ok(envelope_from_blob(blob)?.as_ref().map(f))
    })?;
    Ok(())
}

fn blob_from_ctx<'a>(ctx: &'a Context<'a>) -> std::result::Result<Option<&'a [u8]>, Error> {
    match ctx.get_raw(0) {
        ValueRef::Null => Ok(None),
        ValueRef::Blob(blob) => Ok(Some(blob)),
        _ => Err(Error::InvalidFunctionParameterType(0, Type::Blob)),
    }
}

fn envelope_from_blob(blob: &[u8]) -> std::result::Result<Option<Envelope>, Error> {
    if blob.starts_with(&gpb::LEGACY_MAGIC) {
        return Ok(None);
    }
    gpb::envelope_of(blob).map_err(|err| Error::UserFunctionError(Box::new(err)))
}

#[cfg(test)]
mod tests {
    use super::register_spatial_functions;
    use crate::geometry::{Coord, Endianness, Geometry, GeometryOptions, gpb};
    use rusqlite::{Connection, params};

    fn blob(geometry: &Geometry) -> crate::Result<Vec<u8>> {
        gpb::encode(geometry, 4326, &GeometryOptions::default())
    }

    fn bounds(conn: &Connection, blob: &[u8]) -> rusqlite::Result<(f64, f64, f64, f64)> {
        conn.query_row(
            "SELECT ST_MinX(?1), ST_MaxX(?1), ST_MinY(?1), ST_MaxY(?1)",
            params![blob],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
    }

    #[test]
    fn st_bounds_for_point() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;

        // points carry no envelope, so the payload is decoded
        let blob = blob(&Geometry::Point(Coord::xy(1.5, -2.0)))?;
        assert_eq!(bounds(&conn, &blob)?, (1.5, 1.5, -2.0, -2.0));

        let empty: i64 =
            conn.query_row("SELECT ST_IsEmpty(?1)", params![blob], |row| row.get(0))?;
        assert_eq!(empty, 0);
        Ok(())
    }

    #[test]
    fn st_bounds_for_multilinestring() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;

        let mls = Geometry::MultiLineString(vec![
            vec![Coord::xy(0.0, 0.0), Coord::xy(2.0, 1.0)],
            vec![Coord::xy(-3.0, 4.0), Coord::xy(-1.0, 2.0)],
        ]);
        assert_eq!(bounds(&conn, &blob(&mls)?)?, (-3.0, 2.0, 0.0, 4.0));

        let options = GeometryOptions {
            endianness: Endianness::BigEndian,
            write_envelope: false,
        };
        let without_envelope = gpb::encode(&mls, 4326, &options)?;
        assert_eq!(bounds(&conn, &without_envelope)?, (-3.0, 2.0, 0.0, 4.0));
        Ok(())
    }

    #[test]
    fn st_is_empty_for_empty_geometry() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;

        let blob = gpb::empty_geometry(4326, Endianness::LittleEndian);
        let (minx, empty): (Option<f64>, i64) =
            conn.query_row("SELECT ST_MinX(?1), ST_IsEmpty(?1)", params![blob], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;

        assert!(minx.is_none());
        assert_eq!(empty, 1);
        Ok(())
    }

    #[test]
    fn null_and_invalid_input() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;

        let minx: Option<f64> = conn.query_row("SELECT ST_MinX(NULL)", [], |row| row.get(0))?;
        assert!(minx.is_none());

        let legacy: i64 = conn.query_row(
            "SELECT ST_IsEmpty(?1)",
            params![b"GB\x01\x01".to_vec()],
            |row| row.get(0),
        )?;
        assert_eq!(legacy, 1);

        assert!(
            conn.query_row("SELECT ST_MinX(?1)", params![vec![0u8, 1, 2]], |row| {
                row.get::<_, Option<f64>>(0)
            })
            .is_err()
        );
        assert!(
            conn.query_row("SELECT ST_MinX('text')", [], |row| row.get::<_, Option<f64>>(0))
                .is_err()
        );
        Ok(())
    }
}
