use std::sync::Arc;

use tracing::warn;

use super::schema::SpatialColumnDescriptor;
use super::table::TableSchema;
use crate::error::{GpkgError, Result};
use crate::geometry::{
    Envelope, Geometry, GeometryHeader, GeometryInput, ResolvedInput, esri_json, gpb, wkb,
};
use crate::types::Value;

/// A single row of a spatial table: one geometry, an identity assigned by
/// storage and the attribute values.
///
/// Changes are staged on the row and written with
/// [`GpkgTable::save`](super::GpkgTable::save).
#[derive(Clone, Debug)]
pub struct SpatialRow {
    pub(super) schema: Arc<TableSchema>,
    pub(super) id: Option<i64>,
    pub(super) geometry: Option<Vec<u8>>,
    pub(super) geometry_dirty: bool,
    pub(super) values: Vec<Value>,
    pub(super) dirty: Vec<bool>,
}

impl SpatialRow {
    /// A row that has not been saved yet. Its geometry is the canonical empty
    /// value and every attribute is `NULL`.
    pub(super) fn new(schema: Arc<TableSchema>) -> Self {
        let geometry = gpb::empty_geometry(
            schema.descriptor.srs_id,
            schema.geometry_options.endianness,
        );
        let len = schema.columns.len();
        Self {
            schema,
            id: None,
            geometry: Some(geometry),
            geometry_dirty: true,
            values: vec![Value::Null; len],
            dirty: vec![false; len],
        }
    }

    pub(super) fn from_storage(
        schema: Arc<TableSchema>,
        id: i64,
        geometry: Option<Vec<u8>>,
        values: Vec<Value>,
    ) -> Self {
        let len = values.len();
        Self {
            schema,
            id: Some(id),
            geometry,
            geometry_dirty: false,
            values,
            dirty: vec![false; len],
        }
    }

    /// Wrap stored geometry bytes in a detached row without attributes.
    ///
    /// `GP` blobs are validated by parsing their header; `GB` blobs are kept
    /// as they are.
    pub fn from_storage_bytes(bytes: Vec<u8>, descriptor: &SpatialColumnDescriptor) -> Result<Self> {
        if !bytes.starts_with(&gpb::LEGACY_MAGIC) {
            GeometryHeader::parse(&bytes)?;
        }
        let schema = TableSchema::detached(descriptor.clone());
        Ok(Self {
            schema: Arc::new(schema),
            id: None,
            geometry: Some(bytes),
            geometry_dirty: false,
            values: Vec::new(),
            dirty: Vec::new(),
        })
    }

    /// Storage-assigned identity; `None` until the row is saved.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn table_name(&self) -> &str {
        &self.schema.descriptor.table_name
    }

    pub fn descriptor(&self) -> &SpatialColumnDescriptor {
        &self.schema.descriptor
    }

    /// Whether the row has changes that have not been saved.
    pub fn is_dirty(&self) -> bool {
        self.id.is_none() || self.geometry_dirty || self.dirty.iter().any(|d| *d)
    }

    /// Replace the geometry. `None` stores the canonical empty geometry.
    ///
    /// Single geometries are promoted when the column holds the matching
    /// multi type. Bytes that already carry a GeoPackage header are stored
    /// unchanged.
    pub fn set_geometry(&mut self, geometry: Option<GeometryInput>) -> Result<()> {
        let descriptor = &self.schema.descriptor;
        let options = &self.schema.geometry_options;

        let bytes = match geometry {
            None => gpb::empty_geometry(descriptor.srs_id, options.endianness),
            Some(input) => match input.resolve()? {
                ResolvedInput::Encoded(bytes) => bytes,
                ResolvedInput::Wkb(geometry, payload) => {
                    geometry.validate()?;
                    let checked = check_geometry(descriptor, geometry)?;
                    if checked.promoted {
                        gpb::encode(&checked.geometry, descriptor.srs_id, options)?
                    } else {
                        gpb::wrap_wkb(&checked.geometry, &payload, descriptor.srs_id, options)
                    }
                }
                ResolvedInput::Geometry(geometry) => {
                    let checked = check_geometry(descriptor, geometry)?;
                    gpb::encode(&checked.geometry, descriptor.srs_id, options)?
                }
            },
        };

        self.geometry = Some(bytes);
        self.geometry_dirty = true;
        Ok(())
    }

    /// Set an attribute by column name (case-insensitive).
    ///
    /// The geometry column accepts `Null`, which stores the empty geometry,
    /// and `Blob` values holding WKB or GeoPackage binary.
    pub fn set_property(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if name.eq_ignore_ascii_case(&self.schema.id_column) {
            return Err(GpkgError::ImmutableColumn {
                column: self.schema.id_column.clone(),
            });
        }
        if name.eq_ignore_ascii_case(&self.schema.descriptor.column_name) {
            return match value {
                Value::Null => self.set_geometry(None),
                Value::Blob(bytes) => self.set_geometry(Some(GeometryInput::from_bytes(bytes))),
                other => Err(GpkgError::ValueTypeMismatch {
                    expected: "blob",
                    actual: other.type_name(),
                }),
            };
        }

        let idx = self
            .schema
            .column_index(name)
            .ok_or_else(|| GpkgError::MissingProperty {
                property: name.to_string(),
            })?;
        self.values[idx] = value;
        self.dirty[idx] = true;
        Ok(())
    }

    /// Read a value by column name (case-insensitive). The identity and the
    /// geometry column can be read too.
    pub fn property(&self, name: &str) -> Option<Value> {
        if name.eq_ignore_ascii_case(&self.schema.id_column) {
            return Some(self.id.map_or(Value::Null, Value::Integer));
        }
        if name.eq_ignore_ascii_case(&self.schema.descriptor.column_name) {
            return Some(self.geometry.clone().map_or(Value::Null, Value::Blob));
        }
        let idx = self.schema.column_index(name)?;
        self.values.get(idx).cloned()
    }

    /// The geometry bytes as they are stored; `None` for a `NULL` column.
    pub fn to_storage_bytes(&self) -> Option<&[u8]> {
        self.geometry.as_deref()
    }

    fn stored(&self) -> Result<&[u8]> {
        self.geometry.as_deref().ok_or(GpkgError::NullGeometryValue)
    }

    /// Decode the stored geometry.
    pub fn geometry(&self) -> Result<Geometry> {
        let bytes = self.stored()?;
        if bytes.starts_with(&gpb::LEGACY_MAGIC) {
            return wkb::decode(gpb::strip_header(bytes)?);
        }
        Ok(gpb::decode(bytes)?.1)
    }

    pub fn header(&self) -> Result<GeometryHeader> {
        Ok(GeometryHeader::parse(self.stored()?)?.0)
    }

    pub fn envelope(&self) -> Result<Option<Envelope>> {
        gpb::envelope_of(self.stored()?)
    }

    /// Zero-copy view of the WKB payload.
    pub fn wkb(&self) -> Result<::wkb::reader::Wkb<'_>> {
        let payload = gpb::strip_header(self.stored()?)?;
        Ok(::wkb::reader::Wkb::try_new(payload)?)
    }

    pub fn to_esri_json(&self) -> Result<serde_json::Value> {
        let geometry = self.geometry()?;
        Ok(esri_json::to_value(
            &geometry,
            Some(self.schema.descriptor.srs_id),
        ))
    }

    #[cfg(feature = "interop")]
    pub fn to_wkt(&self) -> Result<String> {
        crate::geometry::interop::to_wkt(&self.geometry()?)
    }

    #[cfg(feature = "interop")]
    pub fn to_geojson(&self) -> Result<serde_json::Value> {
        crate::geometry::interop::to_geojson(&self.geometry()?)
    }

    pub(super) fn mark_saved(&mut self, id: Option<i64>) {
        if id.is_some() {
            self.id = id;
        }
        self.geometry_dirty = false;
        self.dirty.iter_mut().for_each(|d| *d = false);
    }
}

struct CheckedGeometry {
    geometry: Geometry,
    promoted: bool,
}

fn check_geometry(
    descriptor: &SpatialColumnDescriptor,
    geometry: Geometry,
) -> Result<CheckedGeometry> {
    let Some(actual) = geometry.geometry_type() else {
        return Ok(CheckedGeometry {
            geometry,
            promoted: false,
        });
    };

    let expected = descriptor.geometry_type;
    let (geometry, promoted) = if actual == expected {
        (geometry, false)
    } else if expected.is_multi() && actual.to_multi() == expected {
        (geometry.into_multi(), true)
    } else {
        return Err(GpkgError::GeometryTypeMismatch {
            expected: expected.name(),
            actual: actual.name(),
        });
    };

    if !geometry.is_empty() && geometry.dimension() != descriptor.dimension {
        warn!(
            table = %descriptor.table_name,
            column = %descriptor.column_name,
            expected = ?descriptor.dimension,
            actual = ?geometry.dimension(),
            "geometry dimension differs from its column"
        );
    }

    Ok(CheckedGeometry { geometry, promoted })
}

#[cfg(test)]
mod tests {
    use super::SpatialRow;
    use crate::error::GpkgError;
    use crate::geometry::{
        Coord, Dimension, Endianness, Geometry, GeometryInput, GeometryOptions, GeometryType, gpb,
        wkb,
    };
    use crate::gpkg::{Gpkg, SpatialColumnDescriptor};
    use crate::types::{ColumnSpec, ColumnType, Value};
    use serde_json::json;

    fn gpkg_with(geometry_type: GeometryType) -> crate::Result<Gpkg> {
        let gpkg = Gpkg::new_in_memory()?;
        gpkg.create_table(
            "sites",
            "Shape",
            geometry_type,
            Dimension::Xy,
            4326,
            &[ColumnSpec::new("name", ColumnType::Text)],
        )?;
        Ok(gpkg)
    }

    #[test]
    fn esri_point_is_stored_as_gpb() -> crate::Result<()> {
        let gpkg = gpkg_with(GeometryType::Point)?;
        let table = gpkg.table("sites")?;
        let mut row = table.new_row();
        row.set_geometry(Some(GeometryInput::EsriJson(
            json!({"x": -118.15, "y": 33.80}),
        )))?;

        let bytes = row.to_storage_bytes().ok_or(GpkgError::NullGeometryValue)?;
        assert_eq!(&bytes[..2], b"GP");
        assert_eq!(bytes[2], 0);
        let header = row.header()?;
        assert_eq!(header.srs_id, 4326);
        assert_eq!(row.geometry()?, Geometry::Point(Coord::xy(-118.15, 33.80)));
        Ok(())
    }

    #[test]
    fn absent_geometry_is_canonical_empty() -> crate::Result<()> {
        let gpkg = gpkg_with(GeometryType::Polygon)?;
        let table = gpkg.table("sites")?;
        let mut row = table.new_row();
        row.set_geometry(None)?;
        let first = row.to_storage_bytes().map(<[u8]>::to_vec);

        row.set_property("shape", Value::Null)?;
        assert_eq!(row.to_storage_bytes().map(<[u8]>::to_vec), first);
        assert_eq!(
            first,
            Some(gpb::empty_geometry(4326, Endianness::LittleEndian))
        );
        assert_eq!(row.geometry()?, Geometry::Empty);
        assert!(row.header()?.empty);
        assert_eq!(row.envelope()?, None);
        Ok(())
    }

    #[test]
    fn stored_bytes_pass_through() -> crate::Result<()> {
        let gpkg = gpkg_with(GeometryType::LineString)?;
        let table = gpkg.table("sites")?;
        let mut row = table.new_row();
        row.set_geometry(Some(GeometryInput::Geometry(Geometry::LineString(vec![
            Coord::xy(0.0, 0.0),
            Coord::xy(3.0, 4.0),
        ]))))?;
        let stored = row.to_storage_bytes().map(<[u8]>::to_vec).unwrap_or_default();

        let mut other = table.new_row();
        other.set_geometry(Some(GeometryInput::GeoPackageBinary(stored.clone())))?;
        assert_eq!(other.to_storage_bytes(), Some(stored.as_slice()));

        other.set_property("Shape", Value::Blob(stored.clone()))?;
        assert_eq!(other.to_storage_bytes(), Some(stored.as_slice()));

        let legacy = b"GB\x00\x01legacy".to_vec();
        other.set_geometry(Some(GeometryInput::GeoPackageBinary(legacy.clone())))?;
        assert_eq!(other.to_storage_bytes(), Some(legacy.as_slice()));
        Ok(())
    }

    #[test]
    fn wkb_payload_is_kept() -> crate::Result<()> {
        let gpkg = gpkg_with(GeometryType::Point)?;
        let table = gpkg.table("sites")?;
        let mut row = table.new_row();
        let point = Geometry::Point(Coord::xy(7.0, 8.0));
        let payload = wkb::encode(&point, Endianness::BigEndian)?;
        row.set_geometry(Some(GeometryInput::Wkb(payload.clone())))?;

        let bytes = row.to_storage_bytes().unwrap_or_default();
        assert!(bytes.ends_with(&payload));
        assert_eq!(row.wkb()?.buf(), payload.as_slice());
        assert_eq!(row.geometry()?, point);

        assert!(matches!(
            row.set_geometry(Some(GeometryInput::Wkb(vec![1, 1, 0]))),
            Err(GpkgError::InvalidGeometryEncoding(_))
        ));
        Ok(())
    }

    #[test]
    fn open_wkb_ring_is_rejected() -> crate::Result<()> {
        let gpkg = gpkg_with(GeometryType::Polygon)?;
        let table = gpkg.table("sites")?;
        let mut row = table.new_row();

        // POLYGON ((0 0, 1 0, 1 1)), little endian
        let mut payload = vec![1u8];
        payload.extend(3u32.to_le_bytes());
        payload.extend(1u32.to_le_bytes());
        payload.extend(3u32.to_le_bytes());
        for value in [0.0f64, 0.0, 1.0, 0.0, 1.0, 1.0] {
            payload.extend(value.to_le_bytes());
        }

        assert!(matches!(
            row.set_geometry(Some(GeometryInput::Wkb(payload))),
            Err(GpkgError::InvalidGeometryEncoding(_))
        ));
        table.save(&mut row)?;
        assert_eq!(table.rows()?[0].geometry()?, Geometry::Empty);
        Ok(())
    }

    #[test]
    fn singles_are_promoted_to_multi() -> crate::Result<()> {
        let gpkg = gpkg_with(GeometryType::MultiPoint)?;
        let table = gpkg.table("sites")?;
        let mut row = table.new_row();

        let payload = wkb::encode(&Geometry::Point(Coord::xy(1.0, 2.0)), Endianness::LittleEndian)?;
        row.set_geometry(Some(GeometryInput::Wkb(payload)))?;
        assert_eq!(
            row.geometry()?,
            Geometry::MultiPoint(vec![Coord::xy(1.0, 2.0)])
        );

        let line = Geometry::LineString(vec![Coord::xy(0.0, 0.0), Coord::xy(1.0, 1.0)]);
        assert!(matches!(
            row.set_geometry(Some(line.into())),
            Err(GpkgError::GeometryTypeMismatch {
                expected: "MULTIPOINT",
                actual: "LINESTRING"
            })
        ));

        // dimension mismatches are tolerated
        row.set_geometry(Some(Geometry::Point(Coord::xyz(1.0, 2.0, 3.0)).into()))?;
        assert_eq!(row.geometry()?.dimension(), Dimension::Xyz);
        Ok(())
    }

    #[test]
    fn properties() -> crate::Result<()> {
        let gpkg = gpkg_with(GeometryType::Point)?;
        let table = gpkg.table("sites")?;
        let mut row = table.new_row();

        row.set_property("NAME", "Long Beach")?;
        assert_eq!(row.property("name"), Some(Value::from("Long Beach")));
        assert_eq!(row.property("objectid"), Some(Value::Null));
        assert_eq!(row.property("missing"), None);

        assert!(matches!(
            row.set_property("OBJECTID", 5),
            Err(GpkgError::ImmutableColumn { column }) if column == "OBJECTID"
        ));
        assert!(matches!(
            row.set_property("area", 1.0),
            Err(GpkgError::MissingProperty { property }) if property == "area"
        ));
        assert!(matches!(
            row.set_property("Shape", 1.0),
            Err(GpkgError::ValueTypeMismatch { expected: "blob", actual: "real" })
        ));
        Ok(())
    }

    #[test]
    fn detached_rows() -> crate::Result<()> {
        let descriptor = SpatialColumnDescriptor::new(
            "roads",
            "geom",
            GeometryType::LineString,
            Dimension::Xy,
            3857,
        );
        let line = Geometry::LineString(vec![Coord::xy(0.0, 0.0), Coord::xy(10.0, 5.0)]);
        let bytes = gpb::encode(&line, 3857, &GeometryOptions::default())?;

        let row = SpatialRow::from_storage_bytes(bytes.clone(), &descriptor)?;
        assert_eq!(row.id(), None);
        assert_eq!(row.table_name(), "roads");
        assert_eq!(row.geometry()?, line);
        assert_eq!(row.envelope()?.map(|e| (e.max_x, e.max_y)), Some((10.0, 5.0)));

        let esri = row.to_esri_json()?;
        assert_eq!(esri["spatialReference"]["wkid"], 3857);
        assert_eq!(esri["paths"][0][1], json!([10.0, 5.0]));

        assert!(matches!(
            SpatialRow::from_storage_bytes(vec![0, 1, 2, 3, 4, 5, 6, 7], &descriptor),
            Err(GpkgError::InvalidMagic { .. })
        ));
        Ok(())
    }

    #[cfg(feature = "interop")]
    #[test]
    fn text_outputs() -> crate::Result<()> {
        let gpkg = gpkg_with(GeometryType::Point)?;
        let table = gpkg.table("sites")?;
        let mut row = table.new_row();
        row.set_geometry(Some(GeometryInput::Wkt("POINT (1 2)".to_string())))?;
        assert_eq!(row.to_wkt()?, "POINT(1 2)");
        assert_eq!(
            row.to_geojson()?,
            json!({"type": "Point", "coordinates": [1.0, 2.0]})
        );
        Ok(())
    }
}
