use glam::DVec2;
use serde::Deserialize;
use std::f64::consts::PI;

use crate::geo::{denormalize_lng, normalize_lng, LatLng};

/// Sphere radius shared by every projection family, in metres.
pub const SPHERE_RADIUS: f64 = 6381372.0;

const DEG: f64 = PI / 180.0;

/// Albers equal-area conic standard parallels.
const AEA_PARALLELS: (f64, f64) = (29.5, 45.5);

/// Lambert conformal conic standard parallels.
const LCC_PARALLELS: (f64, f64) = (33.0, 45.0);

/// Projection family, named by the short codes topology files use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ProjectionKind {
    #[serde(rename = "mill")]
    Miller,
    #[serde(rename = "merc")]
    Mercator,
    #[serde(rename = "aea")]
    Albers,
    #[serde(rename = "lcc")]
    Lambert,
}

impl ProjectionKind {
    pub fn code(self) -> &'static str {
        match self {
            ProjectionKind::Miller => "mill",
            ProjectionKind::Mercator => "merc",
            ProjectionKind::Albers => "aea",
            ProjectionKind::Lambert => "lcc",
        }
    }

    /// Project a geographic point to the plane. `y` grows southwards.
    pub fn to_plane(self, lat: f64, lng: f64, central_meridian: f64) -> DVec2 {
        match self {
            ProjectionKind::Miller => DVec2::new(
                SPHERE_RADIUS * (lng - central_meridian) * DEG,
                -SPHERE_RADIUS * ((45.0 + 0.4 * lat) * DEG).tan().ln() / 0.8,
            ),
            ProjectionKind::Mercator => DVec2::new(
                SPHERE_RADIUS * (lng - central_meridian) * DEG,
                -SPHERE_RADIUS * (PI / 4.0 + lat * PI / 360.0).tan().ln(),
            ),
            ProjectionKind::Albers => {
                let c = Albers::new();
                let theta = c.n * (lng - central_meridian) * DEG;
                let ro = (c.c - 2.0 * c.n * (lat * DEG).sin()).sqrt() / c.n;
                DVec2::new(
                    ro * theta.sin() * SPHERE_RADIUS,
                    -(c.ro0 - ro * theta.cos()) * SPHERE_RADIUS,
                )
            }
            ProjectionKind::Lambert => {
                let c = Lambert::new();
                let theta = c.n * (lng - central_meridian) * DEG;
                let ro = c.f * (1.0 / (PI / 4.0 + lat * DEG / 2.0).tan()).powf(c.n);
                DVec2::new(
                    ro * theta.sin() * SPHERE_RADIUS,
                    -(c.ro0 - ro * theta.cos()) * SPHERE_RADIUS,
                )
            }
        }
    }

    /// Exact inverse of [`ProjectionKind::to_plane`].
    pub fn to_geo(self, point: DVec2, central_meridian: f64) -> LatLng {
        // Forward projections flip y so the plane reads top-down.
        let (x, y) = (point.x, -point.y);
        match self {
            ProjectionKind::Miller => LatLng::new(
                (2.5 * (0.8 * y / SPHERE_RADIUS).exp().atan() - 5.0 * PI / 8.0) / DEG,
                central_meridian + x / SPHERE_RADIUS / DEG,
            ),
            ProjectionKind::Mercator => LatLng::new(
                (2.0 * (y / SPHERE_RADIUS).exp().atan() - PI / 2.0) / DEG,
                central_meridian + x / SPHERE_RADIUS / DEG,
            ),
            ProjectionKind::Albers => {
                let c = Albers::new();
                let (x, y) = (x / SPHERE_RADIUS, y / SPHERE_RADIUS);
                let ro = (x * x + (c.ro0 - y) * (c.ro0 - y)).sqrt();
                let theta = x.atan2(c.ro0 - y);
                LatLng::new(
                    ((c.c - ro * ro * c.n * c.n) / (2.0 * c.n)).asin() / DEG,
                    central_meridian + theta / c.n / DEG,
                )
            }
            ProjectionKind::Lambert => {
                let c = Lambert::new();
                let (x, y) = (x / SPHERE_RADIUS, y / SPHERE_RADIUS);
                let ro = c.n.signum() * (x * x + (c.ro0 - y) * (c.ro0 - y)).sqrt();
                let theta = x.atan2(c.ro0 - y);
                LatLng::new(
                    (2.0 * (c.f / ro).powf(1.0 / c.n).atan() - PI / 2.0) / DEG,
                    central_meridian + theta / c.n / DEG,
                )
            }
        }
    }
}

/// Constants of the Albers cone (reference latitude 0).
struct Albers {
    n: f64,
    c: f64,
    ro0: f64,
}

impl Albers {
    fn new() -> Self {
        let (fi1, fi2) = (AEA_PARALLELS.0 * DEG, AEA_PARALLELS.1 * DEG);
        let n = (fi1.sin() + fi2.sin()) / 2.0;
        let c = fi1.cos() * fi1.cos() + 2.0 * n * fi1.sin();
        Self { n, c, ro0: c.sqrt() / n }
    }
}

/// Constants of the Lambert cone (reference latitude 0).
struct Lambert {
    n: f64,
    f: f64,
    ro0: f64,
}

impl Lambert {
    fn new() -> Self {
        let (fi1, fi2) = (LCC_PARALLELS.0 * DEG, LCC_PARALLELS.1 * DEG);
        let n = (fi1.cos() / fi2.cos()).ln()
            / ((PI / 4.0 + fi2 / 2.0).tan() / (PI / 4.0 + fi1 / 2.0).tan()).ln();
        let f = fi1.cos() * (PI / 4.0 + fi1 / 2.0).tan().powf(n) / n;
        Self { n, f, ro0: f }
    }
}

/// Projection descriptor carried by a topology.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Projection {
    #[serde(rename = "type")]
    pub kind: ProjectionKind,
    #[serde(rename = "centralMeridian", default)]
    pub central_meridian: f64,
}

impl Projection {
    pub fn new(kind: ProjectionKind, central_meridian: f64) -> Self {
        Self { kind, central_meridian }
    }

    /// Project with antimeridian normalisation applied.
    pub fn to_plane(&self, at: LatLng) -> DVec2 {
        let lng = normalize_lng(at.lng, self.central_meridian);
        self.kind.to_plane(at.lat, lng, self.central_meridian)
    }

    pub fn to_geo(&self, point: DVec2) -> LatLng {
        let at = self.kind.to_geo(point, self.central_meridian);
        LatLng::new(at.lat, denormalize_lng(at.lng))
    }
}
