//! Built-in coordinate system catalog.
//!
//! Tables can only reference SRS ids that exist in `gpkg_spatial_ref_sys`.
//! The catalog shipped in `data/srs.json` supplies the definitions that are
//! inserted on demand when a table is created with an id that the
//! GeoPackage does not know yet.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Deserialize;
use tracing::debug;

use crate::error::{GpkgError, Result};

const BUILTIN_CATALOG: &str = include_str!("../data/srs.json");

/// Legacy ESRI id of Web Mercator, resolved to 3857.
const WEB_MERCATOR_ALIAS: i32 = 102100;
const WEB_MERCATOR: i32 = 3857;

static CATALOG: OnceLock<CoordinateSystems> = OnceLock::new();

/// One spatial reference system definition.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CoordinateSystem {
    pub wkid: i32,
    pub name: String,
    #[serde(default = "default_organization")]
    pub organization: String,
    /// WKT definition stored in `gpkg_spatial_ref_sys.definition`.
    pub wkt: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_organization() -> String {
    "EPSG".to_string()
}

/// Immutable lookup table of coordinate systems keyed by well-known id.
#[derive(Debug)]
pub struct CoordinateSystems {
    by_wkid: BTreeMap<i32, CoordinateSystem>,
}

impl CoordinateSystems {
    /// Parse a catalog from a JSON array of `{wkid, name, wkt}` objects.
    pub fn from_json(text: &str) -> Result<Self> {
        let entries: Vec<CoordinateSystem> = serde_json::from_str(text)?;
        let by_wkid = entries.into_iter().map(|cs| (cs.wkid, cs)).collect();
        Ok(Self { by_wkid })
    }

    /// Load the built-in catalog into the process-wide table. Calling it
    /// again is a no-op.
    pub fn init() -> Result<&'static Self> {
        if let Some(catalog) = CATALOG.get() {
            return Ok(catalog);
        }
        let catalog = Self::from_json(BUILTIN_CATALOG)?;
        debug!(entries = catalog.len(), "loaded coordinate system catalog");
        Ok(CATALOG.get_or_init(|| catalog))
    }

    /// The process-wide catalog, loading it on first use.
    pub fn global() -> Result<&'static Self> {
        Self::init()
    }

    /// Look up a coordinate system. 102100 resolves to 3857.
    pub fn lookup(&self, wkid: i32) -> Result<&CoordinateSystem> {
        let wkid = if wkid == WEB_MERCATOR_ALIAS {
            WEB_MERCATOR
        } else {
            wkid
        };
        self.by_wkid
            .get(&wkid)
            .ok_or(GpkgError::UnknownSrs { srs_id: wkid })
    }

    /// Look up several ids; the first unknown id fails the whole call.
    pub fn lookup_many(&self, wkids: &[i32]) -> Result<Vec<&CoordinateSystem>> {
        wkids.iter().map(|&wkid| self.lookup(wkid)).collect()
    }

    pub fn contains(&self, wkid: i32) -> bool {
        self.lookup(wkid).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoordinateSystem> {
        self.by_wkid.values()
    }

    pub fn len(&self) -> usize {
        self.by_wkid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_wkid.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::CoordinateSystems;
    use crate::error::GpkgError;

    #[test]
    fn builtin_catalog_loads() -> crate::Result<()> {
        let catalog = CoordinateSystems::global()?;
        assert!(std::ptr::eq(catalog, CoordinateSystems::init()?));
        assert!(catalog.len() >= 3);

        let wgs84 = catalog.lookup(4326)?;
        assert_eq!(wgs84.name, "GCS_WGS_1984");
        assert!(wgs84.wkt.starts_with("GEOGCS["));

        for reserved in [-1, 0] {
            assert_eq!(catalog.lookup(reserved)?.wkt, "undefined");
        }
        Ok(())
    }

    #[test]
    fn catalog_covers_utm_zones() -> crate::Result<()> {
        let catalog = CoordinateSystems::global()?;
        for zone in 1..=60 {
            assert!(catalog.contains(32600 + zone));
            assert!(catalog.contains(32700 + zone));
        }
        let south = catalog.lookup(32733)?;
        assert_eq!(south.name, "WGS_1984_UTM_Zone_33S");
        assert!(south.wkt.contains(r#"PARAMETER["False_Northing",10000000.0]"#));
        assert!(south.wkt.contains(r#"PARAMETER["Central_Meridian",15.0]"#));

        let etrs = catalog.lookup(25832)?;
        assert!(etrs.wkt.contains("GCS_ETRS_1989"));
        assert!(catalog.contains(26910));
        Ok(())
    }

    #[test]
    fn web_mercator_alias() -> crate::Result<()> {
        let catalog = CoordinateSystems::global()?;
        assert_eq!(catalog.lookup(102100)?.wkid, 3857);
        assert!(catalog.contains(102100));
        Ok(())
    }

    #[test]
    fn unknown_ids_fail() -> crate::Result<()> {
        let catalog = CoordinateSystems::global()?;
        assert!(matches!(
            catalog.lookup(999_999),
            Err(GpkgError::UnknownSrs { srs_id: 999_999 })
        ));
        assert!(matches!(
            catalog.lookup_many(&[4326, 42]),
            Err(GpkgError::UnknownSrs { srs_id: 42 })
        ));
        assert_eq!(catalog.lookup_many(&[4326, 3857])?.len(), 2);
        Ok(())
    }

    #[test]
    fn custom_catalog() -> crate::Result<()> {
        let catalog = CoordinateSystems::from_json(
            r#"[{"wkid": 7, "name": "local", "wkt": "LOCAL_CS[\"local\"]"}]"#,
        )?;
        let cs = catalog.lookup(7)?;
        assert_eq!(cs.organization, "EPSG");
        assert_eq!(cs.description, None);
        assert!(matches!(
            CoordinateSystems::from_json("{"),
            Err(GpkgError::Json(_))
        ));
        Ok(())
    }
}
