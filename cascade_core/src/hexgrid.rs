//! Hexagonal lattice over a sinusoidal equal-area projection.
//!
//! Cells are pointy-top hexagons in axial `(q, r)` coordinates. The lattice
//! is global: a coordinate always snaps to the same cell at a given
//! resolution, so grids generated around nearby centers share cell ids.

use std::f64::consts::PI;

use cascade_schema::GeoPoint;

use crate::{catalog::normalize_lon, error::EngineError};

pub const EARTH_RADIUS_KM: f64 = 6371.0088;
pub const MAX_RESOLUTION: u8 = 15;

/// Hexagon edge length in kilometres for each resolution.
const EDGE_LENGTH_KM: [f64; 16] = [
    1281.256, 483.057, 182.513, 68.979, 26.072, 9.854, 3.725, 1.406, 0.531, 0.201, 0.0759,
    0.0287, 0.0108, 0.0041, 0.0015, 0.00058,
];

const AXIS_BITS: u32 = 28;
const AXIS_MASK: u64 = (1 << AXIS_BITS) - 1;

pub fn edge_length_km(resolution: u8) -> Result<f64, EngineError> {
    EDGE_LENGTH_KM
        .get(resolution as usize)
        .copied()
        .ok_or_else(|| {
            EngineError::InvalidInput(format!(
                "resolution {resolution} outside 0..={MAX_RESOLUTION}"
            ))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HexCell {
    pub resolution: u8,
    pub q: i32,
    pub r: i32,
}

impl HexCell {
    pub fn containing(point: GeoPoint, resolution: u8) -> Result<Self, EngineError> {
        let size = edge_length_km(resolution)?;
        let (x, y) = project(point);
        let q = (3f64.sqrt() / 3.0 * x - y / 3.0) / size;
        let r = (2.0 / 3.0 * y) / size;
        let (q, r) = axial_round(q, r);
        Ok(Self { resolution, q, r })
    }

    /// Packs resolution and axial coordinates into one integer.
    pub fn index(&self) -> u64 {
        ((self.resolution as u64) << (2 * AXIS_BITS))
            | (((self.q as i64 as u64) & AXIS_MASK) << AXIS_BITS)
            | ((self.r as i64 as u64) & AXIS_MASK)
    }

    pub fn from_index(index: u64) -> Self {
        let resolution = (index >> (2 * AXIS_BITS)) as u8;
        let q = sign_extend((index >> AXIS_BITS) & AXIS_MASK);
        let r = sign_extend(index & AXIS_MASK);
        Self { resolution, q, r }
    }

    pub fn id(&self) -> String {
        format!("{:015x}", self.index())
    }

    fn size(&self) -> f64 {
        EDGE_LENGTH_KM[(self.resolution.min(MAX_RESOLUTION)) as usize]
    }

    fn planar_center(&self) -> (f64, f64) {
        let size = self.size();
        let x = size * 3f64.sqrt() * (self.q as f64 + self.r as f64 / 2.0);
        let y = size * 1.5 * self.r as f64;
        (x, y)
    }

    /// `None` when the cell center falls beyond a pole.
    pub fn center(&self) -> Option<GeoPoint> {
        let (x, y) = self.planar_center();
        unproject(x, y)
    }

    /// Closed ring of `[lon, lat]` corners, first corner repeated last.
    pub fn boundary(&self) -> Vec<Vec<f64>> {
        let (cx, cy) = self.planar_center();
        let size = self.size();
        let mut ring: Vec<Vec<f64>> = (0..6)
            .filter_map(|corner| {
                let angle = PI / 180.0 * (60.0 * corner as f64 - 30.0);
                let x = cx + size * angle.cos();
                let y = cy + size * angle.sin();
                let clamped_y = y.clamp(-EARTH_RADIUS_KM * PI / 2.0, EARTH_RADIUS_KM * PI / 2.0);
                unproject(x, clamped_y).map(|point| vec![point.lon, point.lat])
            })
            .collect();
        if let Some(first) = ring.first().cloned() {
            ring.push(first);
        }
        ring
    }

    /// All cells within `rings` steps, ordered by axial coordinate.
    pub fn disk(&self, rings: u32) -> Vec<HexCell> {
        let k = rings as i32;
        let mut cells = Vec::with_capacity(disk_size(rings));
        for dq in -k..=k {
            let low = (-k).max(-dq - k);
            let high = k.min(-dq + k);
            for dr in low..=high {
                cells.push(HexCell {
                    resolution: self.resolution,
                    q: self.q + dq,
                    r: self.r + dr,
                });
            }
        }
        cells
    }
}

pub fn disk_size(rings: u32) -> usize {
    let k = rings as usize;
    3 * k * (k + 1) + 1
}

/// Rings needed to cover `radius_km`, and whether `max_rings` cut it short.
pub fn rings_for_radius(
    radius_km: f64,
    resolution: u8,
    max_rings: u32,
) -> Result<(u32, bool), EngineError> {
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "radius {radius_km} km must be a non-negative number"
        )));
    }
    let spacing = 3f64.sqrt() * edge_length_km(resolution)?;
    let needed = (radius_km / spacing).ceil();
    if needed > max_rings as f64 {
        Ok((max_rings, true))
    } else {
        Ok((needed as u32, false))
    }
}

fn sign_extend(value: u64) -> i32 {
    let shift = 64 - AXIS_BITS;
    (((value << shift) as i64) >> shift) as i32
}

fn project(point: GeoPoint) -> (f64, f64) {
    let phi = point.lat.to_radians();
    let lambda = normalize_lon(point.lon).to_radians();
    (EARTH_RADIUS_KM * lambda * phi.cos(), EARTH_RADIUS_KM * phi)
}

fn unproject(x: f64, y: f64) -> Option<GeoPoint> {
    let phi = y / EARTH_RADIUS_KM;
    if phi.abs() > PI / 2.0 {
        return None;
    }
    let cos_phi = phi.cos().max(1e-9);
    let lambda = x / (EARTH_RADIUS_KM * cos_phi);
    Some(GeoPoint::new(
        phi.to_degrees(),
        normalize_lon(lambda.to_degrees()),
    ))
}

fn axial_round(q: f64, r: f64) -> (i32, i32) {
    let s = -q - r;
    let mut rq = q.round();
    let mut rr = r.round();
    let rs = s.round();
    let dq = (rq - q).abs();
    let dr = (rr - r).abs();
    let ds = (rs - s).abs();
    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }
    (rq as i32, rr as i32)
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYDNEY: GeoPoint = GeoPoint {
        lat: -33.87,
        lon: 151.21,
    };

    #[test]
    fn point_snaps_to_cell_whose_center_is_nearby() {
        let cell = HexCell::containing(SYDNEY, 6).expect("valid resolution");
        let center = cell.center().expect("center on globe");
        assert!(haversine_km(center, SYDNEY) <= edge_length_km(6).expect("edge") * 3.0);
        assert_eq!(HexCell::containing(center, 6).expect("resolution"), cell);
    }

    #[test]
    fn index_round_trips_negative_coordinates() {
        let cell = HexCell {
            resolution: 9,
            q: -12_345,
            r: 67_890,
        };
        assert_eq!(HexCell::from_index(cell.index()), cell);
        assert_eq!(cell.id().len(), 15);
    }

    #[test]
    fn disk_has_hexagonal_number_of_cells() {
        let cell = HexCell::containing(SYDNEY, 5).expect("resolution");
        for rings in 0..5 {
            let disk = cell.disk(rings);
            assert_eq!(disk.len(), disk_size(rings));
            let mut unique = disk.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), disk.len());
        }
    }

    #[test]
    fn ring_count_covers_radius_and_respects_cap() {
        let (rings, capped) = rings_for_radius(50.0, 6, 40).expect("valid");
        let spacing = 3f64.sqrt() * edge_length_km(6).expect("edge");
        assert_eq!(rings, (50.0 / spacing).ceil() as u32);
        assert!(!capped);
        let (rings, capped) = rings_for_radius(5_000.0, 8, 40).expect("valid");
        assert_eq!(rings, 40);
        assert!(capped);
        assert!(rings_for_radius(-1.0, 6, 40).is_err());
        assert!(edge_length_km(16).is_err());
    }

    #[test]
    fn boundary_is_closed_ring() {
        let cell = HexCell::containing(SYDNEY, 4).expect("resolution");
        let ring = cell.boundary();
        assert_eq!(ring.len(), 7);
        assert_eq!(ring.first(), ring.last());
    }
}
