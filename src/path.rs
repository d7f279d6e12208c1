//! Path-data mini-language support: flattening for bounds and hit-testing,
//! building region paths, and translating SVG path data into the legacy
//! VML path syntax.

use glam::DVec2;
use log::warn;
use std::fmt::Write;
use svgtypes::{PathParser, PathSegment, SimplePathSegment, SimplifyingPathParser};

/// Curves are flattened into this many line segments.
const CURVE_STEPS: usize = 8;

/// Guard against degenerate extents.
pub const EPSILON: f64 = 1e-9;

/// Axis-aligned bounding box in planar (canvas) units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a DVec2>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self::new(min.x, min.y, max.x - min.x, max.y - min.y))
    }

    pub fn union(&self, other: &BBox) -> BBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        BBox::new(
            x,
            y,
            (self.x + self.width).max(other.x + other.width) - x,
            (self.y + self.height).max(other.y + other.height) - y,
        )
    }

    pub fn center(&self) -> DVec2 {
        DVec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }
}

/// Flatten path data into closed or open polylines, one per subpath.
///
/// Parsing stops at the first malformed segment, keeping what was read so far.
pub fn flatten(d: &str) -> Vec<Vec<DVec2>> {
    let mut rings: Vec<Vec<DVec2>> = Vec::new();
    let mut ring: Vec<DVec2> = Vec::new();
    let mut start = DVec2::ZERO;
    let mut cur = DVec2::ZERO;

    for segment in SimplifyingPathParser::from(d) {
        let segment = match segment {
            Ok(segment) => segment,
            Err(e) => {
                warn!("stopping at malformed path data: {e}");
                break;
            }
        };
        match segment {
            SimplePathSegment::MoveTo { x, y } => {
                if ring.len() > 1 {
                    rings.push(std::mem::take(&mut ring));
                }
                ring.clear();
                cur = DVec2::new(x, y);
                start = cur;
                ring.push(cur);
            }
            SimplePathSegment::LineTo { x, y } => {
                if ring.is_empty() {
                    ring.push(cur);
                }
                cur = DVec2::new(x, y);
                ring.push(cur);
            }
            SimplePathSegment::CurveTo { x1, y1, x2, y2, x, y } => {
                if ring.is_empty() {
                    ring.push(cur);
                }
                let (c1, c2, end) = (DVec2::new(x1, y1), DVec2::new(x2, y2), DVec2::new(x, y));
                for step in 1..=CURVE_STEPS {
                    ring.push(cubic_point(cur, c1, c2, end, step as f64 / CURVE_STEPS as f64));
                }
                cur = end;
            }
            SimplePathSegment::Quadratic { x1, y1, x, y } => {
                if ring.is_empty() {
                    ring.push(cur);
                }
                let (c, end) = (DVec2::new(x1, y1), DVec2::new(x, y));
                for step in 1..=CURVE_STEPS {
                    let t = step as f64 / CURVE_STEPS as f64;
                    ring.push(cur.lerp(c, t).lerp(c.lerp(end, t), t));
                }
                cur = end;
            }
            SimplePathSegment::ClosePath => {
                if !ring.is_empty() {
                    ring.push(start);
                    rings.push(std::mem::take(&mut ring));
                }
                cur = start;
            }
        }
    }
    if ring.len() > 1 {
        rings.push(ring);
    }
    rings
}

fn cubic_point(p0: DVec2, p1: DVec2, p2: DVec2, p3: DVec2, t: f64) -> DVec2 {
    let u = 1.0 - t;
    p0 * (u * u * u) + p1 * (3.0 * u * u * t) + p2 * (3.0 * u * t * t) + p3 * (t * t * t)
}

/// Bounding box of flattened rings.
pub fn bbox(rings: &[Vec<DVec2>]) -> Option<BBox> {
    BBox::from_points(rings.iter().flatten())
}

/// Even-odd point-in-polygon over all rings.
pub fn contains(rings: &[Vec<DVec2>], p: DVec2) -> bool {
    let mut inside = false;
    for ring in rings {
        let n = ring.len();
        if n < 3 {
            continue;
        }
        let mut j = n - 1;
        for i in 0..n {
            let (a, b) = (ring[i], ring[j]);
            if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
                inside = !inside;
            }
            j = i;
        }
    }
    inside
}

/// Build `M x,y L x,y … Z` path data from closed rings.
pub fn polygon(rings: &[Vec<DVec2>]) -> String {
    let mut d = String::new();
    for ring in rings.iter().filter(|r| r.len() > 2) {
        for (i, p) in ring.iter().enumerate() {
            let cmd = if i == 0 { 'M' } else { 'L' };
            let _ = write!(d, "{cmd}{},{}", trim(p.x), trim(p.y));
        }
        d.push('Z');
    }
    d
}

fn trim(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Translate SVG path data into VML path syntax.
///
/// VML shapes use a 100x coordinate space with integer coordinates, and has
/// no horizontal/vertical or smooth-curve commands, so the running current
/// point and last control point are tracked to expand them.
pub fn to_vml(d: &str) -> String {
    let mut out = String::with_capacity(d.len());
    let mut cur = DVec2::ZERO;
    let mut start = DVec2::ZERO;
    // Absolute second control point of the previous cubic, if any.
    let mut ctrl: Option<DVec2> = None;

    for segment in PathParser::from(d) {
        let segment = match segment {
            Ok(segment) => segment,
            Err(e) => {
                warn!("stopping vml conversion at malformed path data: {e}");
                break;
            }
        };
        let mut last_ctrl = None;
        match segment {
            PathSegment::MoveTo { abs, x, y } => {
                let p = DVec2::new(x, y);
                if abs {
                    push_cmd(&mut out, 'm', &[p]);
                    cur = p;
                } else {
                    push_cmd(&mut out, 't', &[p]);
                    cur += p;
                }
                start = cur;
            }
            PathSegment::LineTo { abs, x, y } => {
                let p = DVec2::new(x, y);
                if abs {
                    push_cmd(&mut out, 'l', &[p]);
                    cur = p;
                } else {
                    push_cmd(&mut out, 'r', &[p]);
                    cur += p;
                }
            }
            PathSegment::HorizontalLineTo { abs, x } => {
                if abs {
                    cur.x = x;
                    push_cmd(&mut out, 'l', &[cur]);
                } else {
                    cur.x += x;
                    push_cmd(&mut out, 'r', &[DVec2::new(x, 0.0)]);
                }
            }
            PathSegment::VerticalLineTo { abs, y } => {
                if abs {
                    cur.y = y;
                    push_cmd(&mut out, 'l', &[cur]);
                } else {
                    cur.y += y;
                    push_cmd(&mut out, 'r', &[DVec2::new(0.0, y)]);
                }
            }
            PathSegment::CurveTo { abs, x1, y1, x2, y2, x, y } => {
                let pts = [DVec2::new(x1, y1), DVec2::new(x2, y2), DVec2::new(x, y)];
                if abs {
                    push_cmd(&mut out, 'c', &pts);
                    last_ctrl = Some(pts[1]);
                    cur = pts[2];
                } else {
                    push_cmd(&mut out, 'v', &pts);
                    last_ctrl = Some(cur + pts[1]);
                    cur += pts[2];
                }
            }
            PathSegment::SmoothCurveTo { abs, x2, y2, x, y } => {
                let reflected = ctrl.map_or(cur, |c| cur * 2.0 - c);
                let (c2, end) = (DVec2::new(x2, y2), DVec2::new(x, y));
                if abs {
                    push_cmd(&mut out, 'c', &[reflected, c2, end]);
                    last_ctrl = Some(c2);
                    cur = end;
                } else {
                    push_cmd(&mut out, 'v', &[reflected - cur, c2, end]);
                    last_ctrl = Some(cur + c2);
                    cur += end;
                }
            }
            PathSegment::Quadratic { abs, x1, y1, x, y } => {
                let offset = if abs { DVec2::ZERO } else { cur };
                let (q, end) = (offset + DVec2::new(x1, y1), offset + DVec2::new(x, y));
                let c1 = cur + (q - cur) * (2.0 / 3.0);
                let c2 = end + (q - end) * (2.0 / 3.0);
                push_cmd(&mut out, 'c', &[c1, c2, end]);
                cur = end;
            }
            PathSegment::SmoothQuadratic { abs, x, y } | PathSegment::EllipticalArc { abs, x, y, .. } => {
                // No VML counterpart; degrade to a straight edge.
                let end = if abs { DVec2::new(x, y) } else { cur + DVec2::new(x, y) };
                push_cmd(&mut out, 'l', &[end]);
                cur = end;
            }
            PathSegment::ClosePath { .. } => {
                out.push('x');
                cur = start;
            }
        }
        ctrl = last_ctrl;
    }
    out.push('e');
    out
}

fn push_cmd(out: &mut String, cmd: char, points: &[DVec2]) {
    out.push(cmd);
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{},{}", (p.x * 100.0).round() as i64, (p.y * 100.0).round() as i64);
    }
}
