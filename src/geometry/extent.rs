use super::{Coord, Geometry};

/// Axis aligned bounding box of a geometry.
///
/// `z` and `m` hold `(min, max)` and are present only when the coordinates
/// carry those ordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub z: Option<(f64, f64)>,
    pub m: Option<(f64, f64)>,
}

impl Envelope {
    /// Degenerate envelope around a single coordinate.
    pub fn from_coord(coord: &Coord) -> Self {
        Self {
            min_x: coord.x,
            max_x: coord.x,
            min_y: coord.y,
            max_y: coord.y,
            z: coord.z.map(|z| (z, z)),
            m: coord.m.map(|m| (m, m)),
        }
    }

    pub fn expand(&mut self, coord: &Coord) {
        self.min_x = self.min_x.min(coord.x);
        self.max_x = self.max_x.max(coord.x);
        self.min_y = self.min_y.min(coord.y);
        self.max_y = self.max_y.max(coord.y);
        self.z = merge_range(self.z, coord.z.map(|z| (z, z)));
        self.m = merge_range(self.m, coord.m.map(|m| (m, m)));
    }

    /// Smallest envelope containing both `self` and `other`.
    pub fn merge(&self, other: &Envelope) -> Envelope {
        Envelope {
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
            min_y: self.min_y.min(other.min_y),
            max_y: self.max_y.max(other.max_y),
            z: merge_range(self.z, other.z),
            m: merge_range(self.m, other.m),
        }
    }
}

fn merge_range(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> Option<(f64, f64)> {
    match (a, b) {
        (Some((a_min, a_max)), Some((b_min, b_max))) => Some((a_min.min(b_min), a_max.max(b_max))),
        (range, None) | (None, range) => range,
    }
}

/// Bounding envelope of a geometry; `None` when it has no coordinates.
pub fn envelope(geometry: &Geometry) -> Option<Envelope> {
    geometry.coords().fold(None, |acc, coord| match acc {
        None => Some(Envelope::from_coord(coord)),
        Some(mut env) => {
            env.expand(coord);
            Some(env)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{Envelope, envelope};
    use crate::geometry::{Coord, Geometry};
    use proptest::prelude::*;

    #[test]
    fn multipoint_envelope() {
        let geom = Geometry::MultiPoint(vec![
            Coord::xy(-97.06138, 32.837),
            Coord::xy(-97.06124, 32.834),
        ]);
        let env = envelope(&geom).unwrap();
        assert_eq!(env.min_x, -97.06138);
        assert_eq!(env.max_x, -97.06124);
        assert_eq!(env.min_y, 32.834);
        assert_eq!(env.max_y, 32.837);
        assert_eq!(env.z, None);
        assert_eq!(env.m, None);
    }

    #[test]
    fn single_point_is_degenerate() {
        let env = envelope(&Geometry::Point(Coord::xyzm(1.0, 2.0, 3.0, 4.0))).unwrap();
        assert_eq!(
            env,
            Envelope {
                min_x: 1.0,
                max_x: 1.0,
                min_y: 2.0,
                max_y: 2.0,
                z: Some((3.0, 3.0)),
                m: Some((4.0, 4.0)),
            }
        );
    }

    #[test]
    fn empty_geometries_have_no_envelope() {
        assert_eq!(envelope(&Geometry::Empty), None);
        assert_eq!(envelope(&Geometry::MultiPolygon(vec![])), None);
        assert_eq!(envelope(&Geometry::MultiLineString(vec![vec![]])), None);
    }

    #[test]
    fn merge_keeps_optional_ranges() {
        let a = envelope(&Geometry::Point(Coord::xyz(0.0, 0.0, -5.0))).unwrap();
        let b = envelope(&Geometry::Point(Coord::xy(10.0, -1.0))).unwrap();
        let merged = a.merge(&b);
        assert_eq!(merged.min_x, 0.0);
        assert_eq!(merged.max_x, 10.0);
        assert_eq!(merged.min_y, -1.0);
        assert_eq!(merged.max_y, 0.0);
        assert_eq!(merged.z, Some((-5.0, -5.0)));
    }

    proptest! {
        #[test]
        fn ring_order_does_not_change_envelope(
            points in prop::collection::vec((-180.0..180.0f64, -90.0..90.0f64), 3..20)
        ) {
            let mut ring: Vec<Coord> = points.iter().map(|&p| p.into()).collect();
            ring.push(ring[0]);
            let reversed: Vec<Coord> = ring.iter().rev().copied().collect();

            let forward = envelope(&Geometry::Polygon(vec![ring]));
            let backward = envelope(&Geometry::Polygon(vec![reversed]));
            prop_assert_eq!(forward, backward);
        }
    }
}
