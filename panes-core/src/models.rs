use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Basic two dimensional point used for geometry operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl From<(f64, f64)> for Point {
    fn from(v: (f64, f64)) -> Self {
        Point { x: v.0, y: v.1 }
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, o: Point) -> Point {
        Point {
            x: self.x + o.x,
            y: self.y + o.y,
        }
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, o: Point) -> Point {
        Point {
            x: self.x - o.x,
            y: self.y - o.y,
        }
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, k: f64) -> Point {
        Point {
            x: self.x * k,
            y: self.y * k,
        }
    }
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Unit vector in the same direction; the zero vector stays zero.
    pub fn normalize(self) -> Point {
        let len = self.length();
        if len == 0.0 || !len.is_finite() {
            Point::default()
        } else {
            self * (1.0 / len)
        }
    }

    /// Normal of an edge vector pointing away from a ring with canonical
    /// (positive shoelace area) winding.
    pub fn outward_normal(self) -> Point {
        Point {
            x: self.y,
            y: -self.x,
        }
    }

    pub fn rotate(self, ang: f64) -> Point {
        let (s, c) = ang.sin_cos();
        Point {
            x: self.x * c - self.y * s,
            y: self.x * s + self.y * c,
        }
    }

    pub fn approx_eq(self, o: Point, eps: f64) -> bool {
        (self.x - o.x).abs() <= eps && (self.y - o.y).abs() <= eps
    }
}

/// Window viewport in shared absolute (screen) coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// Zero-area or non-finite rectangles take no part in outline building.
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
            || !(self.x.is_finite()
                && self.y.is_finite()
                && self.width.is_finite()
                && self.height.is_finite())
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            min: Point::new(self.x, self.y),
            max: Point::new(self.x + self.width, self.y + self.height),
        }
    }

    /// Corners clockwise on screen, starting top left.
    pub fn corners(&self) -> [Point; 4] {
        self.bounds().corners()
    }

    pub fn intersects(&self, bounds: &Bounds) -> bool {
        self.bounds().overlaps(bounds)
    }
}

/// Axis-aligned min/max corner pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn of_points(pts: &[Point]) -> Option<Bounds> {
        let first = pts.first()?;
        let mut b = Bounds {
            min: *first,
            max: *first,
        };
        for p in &pts[1..] {
            b.min.x = b.min.x.min(p.x);
            b.min.y = b.min.y.min(p.y);
            b.max.x = b.max.x.max(p.x);
            b.max.y = b.max.y.max(p.y);
        }
        Some(b)
    }

    /// Inclusive: bounds that only touch still overlap.
    pub fn overlaps(&self, o: &Bounds) -> bool {
        self.min.x <= o.max.x
            && self.max.x >= o.min.x
            && self.min.y <= o.max.y
            && self.max.y >= o.min.y
    }

    pub fn union(&self, o: &Bounds) -> Bounds {
        Bounds {
            min: Point::new(self.min.x.min(o.min.x), self.min.y.min(o.min.y)),
            max: Point::new(self.max.x.max(o.max.x), self.max.y.max(o.max.y)),
        }
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min.x, self.min.y),
            Point::new(self.max.x, self.min.y),
            Point::new(self.max.x, self.max.y),
            Point::new(self.min.x, self.max.y),
        ]
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
}

/// Identity of one window process, stable for its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(Uuid);

impl ProcessId {
    pub fn new() -> Self {
        ProcessId(Uuid::new_v4())
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ProcessId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ProcessId)
    }
}

/// Snapshot of one window's state, produced on demand by its owner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub id: ProcessId,
    pub rect: Rect,
    #[serde(rename = "isVisible")]
    pub visible: bool,
    pub background: (String, String),
}

/// Payload of a `window-open` announcement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowOpen {
    pub id: ProcessId,
    pub rect: Rect,
}

/// User settings persisted under the `settings` key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub enable_border: bool,
    pub enable_debug: bool,
    pub show_minimap: bool,
    pub gravity: Point,
    pub gravity_scale: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enable_border: true,
            enable_debug: false,
            show_minimap: true,
            gravity: Point::new(0.0, 1.0),
            gravity_scale: 0.001,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_bounds_overlap() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0).bounds();
        let b = Rect::new(100.0, 0.0, 50.0, 50.0).bounds();
        let c = Rect::new(100.5, 0.0, 50.0, 50.0).bounds();
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn degenerate_rects() {
        assert!(Rect::new(0.0, 0.0, 0.0, 10.0).is_degenerate());
        assert!(Rect::new(0.0, 0.0, 10.0, -1.0).is_degenerate());
        assert!(Rect::new(f64::NAN, 0.0, 10.0, 10.0).is_degenerate());
        assert!(!Rect::new(-5.0, -5.0, 1.0, 1.0).is_degenerate());
    }

    #[test]
    fn normalize_zero_is_zero() {
        assert_eq!(Point::default().normalize(), Point::default());
        let n = Point::new(3.0, 4.0).normalize();
        assert!((n.length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn settings_fill_missing_fields() {
        let s: Settings = serde_json::from_str(r#"{"enableBorder":false}"#).unwrap();
        assert!(!s.enable_border);
        assert_eq!(s.gravity, Point::new(0.0, 1.0));
        assert_eq!(s.gravity_scale, 0.001);
    }

    #[test]
    fn process_id_round_trips_as_plain_string() {
        let id = ProcessId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        assert_eq!(id.to_string().parse::<ProcessId>().unwrap(), id);
    }
}
