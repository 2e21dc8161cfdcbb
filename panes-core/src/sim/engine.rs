use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{SPAWN_RADIUS, SPAWN_RESTITUTION};
use crate::error::EngineError;
use crate::models::{Bounds, Point, Settings};
use crate::outline::Frame;

/// Body identity. Random, so followers can mint ids without asking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyId(Uuid);

impl BodyId {
    pub fn new() -> Self {
        BodyId(Uuid::new_v4())
    }

    pub fn as_u128(self) -> u128 {
        self.0.as_u128()
    }
}

impl Default for BodyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyLabel {
    Circle,
    Polygon,
    /// Static wall built from the window outline; not rendered by default.
    Border,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Circle { radius: f64 },
    /// Convex outline relative to the body position.
    Polygon { vertices: Vec<Point> },
    /// Closed wall contour in absolute coordinates.
    Frame { points: Vec<Point> },
}

/// Command-side description of a body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodySpec {
    pub id: BodyId,
    pub label: BodyLabel,
    pub shape: Shape,
    pub position: Point,
    #[serde(default)]
    pub angle: f64,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub restitution: f64,
}

impl BodySpec {
    pub fn circle(at: Point, radius: f64) -> Self {
        BodySpec {
            id: BodyId::new(),
            label: BodyLabel::Circle,
            shape: Shape::Circle { radius },
            position: at,
            angle: 0.0,
            is_static: false,
            restitution: SPAWN_RESTITUTION,
        }
    }

    pub fn rectangle(at: Point, w: f64, h: f64) -> Self {
        let (hw, hh) = (w / 2.0, h / 2.0);
        Self::polygon(
            at,
            &[
                Point::new(at.x - hw, at.y - hh),
                Point::new(at.x + hw, at.y - hh),
                Point::new(at.x + hw, at.y + hh),
                Point::new(at.x - hw, at.y + hh),
            ],
        )
    }

    /// Polygon around absolute `vertices`, recentred on their centroid and
    /// sorted clockwise (on screen) around it; the body starts at `at`.
    pub fn polygon(at: Point, vertices: &[Point]) -> Self {
        let n = vertices.len().max(1) as f64;
        let ctr = vertices
            .iter()
            .fold(Point::default(), |acc, q| acc + *q)
            * (1.0 / n);
        let mut local: Vec<Point> = vertices.iter().map(|v| *v - ctr).collect();
        local.sort_by(|a, b| a.y.atan2(a.x).total_cmp(&b.y.atan2(b.x)));
        BodySpec {
            id: BodyId::new(),
            label: BodyLabel::Polygon,
            shape: Shape::Polygon { vertices: local },
            position: at,
            angle: 0.0,
            is_static: false,
            restitution: SPAWN_RESTITUTION,
        }
    }

    pub fn default_circle(at: Point) -> Self {
        Self::circle(at, SPAWN_RADIUS)
    }

    pub fn default_square(at: Point) -> Self {
        Self::rectangle(at, SPAWN_RADIUS, SPAWN_RADIUS)
    }

    pub fn border(frame: &Frame) -> Self {
        BodySpec {
            id: BodyId::new(),
            label: BodyLabel::Border,
            shape: Shape::Frame {
                points: frame.polygon(),
            },
            position: Point::default(),
            angle: 0.0,
            is_static: true,
            restitution: 0.0,
        }
    }

    /// Rebuilds the command that recreates a snapshotted body in place.
    pub fn from_state(s: &BodyState) -> Self {
        let shape = match (s.label, s.radius) {
            (_, Some(radius)) => Shape::Circle { radius },
            (BodyLabel::Border, None) => Shape::Frame {
                points: s.vertices.clone(),
            },
            (_, None) => Shape::Polygon {
                vertices: s
                    .vertices
                    .iter()
                    .map(|v| (*v - s.position).rotate(-s.angle))
                    .collect(),
            },
        };
        BodySpec {
            id: s.id,
            label: s.label,
            shape,
            position: s.position,
            angle: s.angle,
            is_static: s.label == BodyLabel::Border,
            restitution: if s.label == BodyLabel::Border {
                0.0
            } else {
                SPAWN_RESTITUTION
            },
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let ok = match &self.shape {
            Shape::Circle { radius } => *radius > 0.0 && radius.is_finite(),
            Shape::Polygon { vertices } => vertices.len() >= 3,
            Shape::Frame { points } => points.len() >= 3,
        };
        if ok {
            Ok(())
        } else {
            Err(EngineError::DegenerateShape(self.id))
        }
    }
}

/// Snapshot-side description of a body, in world coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyState {
    pub id: BodyId,
    pub label: BodyLabel,
    pub position: Point,
    pub angle: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default)]
    pub vertices: Vec<Point>,
}

impl BodyState {
    pub fn bounds(&self) -> Bounds {
        match self.radius {
            Some(r) => Bounds {
                min: Point::new(self.position.x - r, self.position.y - r),
                max: Point::new(self.position.x + r, self.position.y + r),
            },
            None => Bounds::of_points(&self.vertices).unwrap_or(Bounds {
                min: self.position,
                max: self.position,
            }),
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        if let Some(r) = self.radius {
            return (p - self.position).length() <= r;
        }
        poly_contains_point(&self.vertices, p)
    }
}

fn poly_contains_point(poly: &[Point], p: Point) -> bool {
    if poly.len() < 3 {
        return false;
    }
    let (x, y) = (p.x, p.y);
    let mut inside = false;
    let n = poly.len();
    let mut j = n - 1;
    for i in 0..n {
        let xi = poly[i].x;
        let yi = poly[i].y;
        let xj = poly[j].x;
        let yj = poly[j].y;
        let intersect =
            ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi + 1e-12) + xi);
        if intersect {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Engine configuration carried by `engine-configure`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gravity: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gravity_scale: Option<f64>,
}

impl From<&Settings> for EngineParams {
    fn from(s: &Settings) -> Self {
        EngineParams {
            gravity: Some(s.gravity),
            gravity_scale: Some(s.gravity_scale),
        }
    }
}

/// The opaque physics engine owned by the authority.
pub trait SimulationEngine {
    fn add(&mut self, body: BodySpec) -> Result<(), EngineError>;
    fn remove(&mut self, id: BodyId) -> Result<(), EngineError>;
    fn configure(&mut self, params: &EngineParams);
    fn step(&mut self, dt_ms: f64);
    fn snapshot(&self) -> Vec<BodyState>;
    /// Steers a dynamic body toward `target` (pointer dragging).
    fn pull(&mut self, id: BodyId, target: Point) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_is_centred_on_its_centroid() {
        let spec = BodySpec::rectangle(Point::new(500.0, 300.0), 80.0, 40.0);
        let Shape::Polygon { vertices } = &spec.shape else {
            panic!("expected polygon");
        };
        let sum = vertices.iter().fold(Point::default(), |a, v| a + *v);
        assert!(sum.approx_eq(Point::default(), 1e-9));
        assert_eq!(vertices.len(), 4);
        assert_eq!(spec.position, Point::new(500.0, 300.0));
    }

    #[test]
    fn state_round_trips_to_spec() {
        let state = BodyState {
            id: BodyId::new(),
            label: BodyLabel::Polygon,
            position: Point::new(10.0, 10.0),
            angle: std::f64::consts::FRAC_PI_2,
            radius: None,
            vertices: vec![
                Point::new(10.0, 5.0),
                Point::new(15.0, 10.0),
                Point::new(10.0, 15.0),
            ],
        };
        let spec = BodySpec::from_state(&state);
        assert_eq!(spec.id, state.id);
        let Shape::Polygon { vertices } = &spec.shape else {
            panic!("expected polygon");
        };
        // Rotating back by the angle recovers the world vertices.
        for (local, world) in vertices.iter().zip(&state.vertices) {
            let w = local.rotate(state.angle) + state.position;
            assert!(w.approx_eq(*world, 1e-9));
        }
    }

    #[test]
    fn hit_testing() {
        let circle = BodyState {
            id: BodyId::new(),
            label: BodyLabel::Circle,
            position: Point::new(0.0, 0.0),
            angle: 0.0,
            radius: Some(10.0),
            vertices: Vec::new(),
        };
        assert!(circle.contains(Point::new(6.0, 6.0)));
        assert!(!circle.contains(Point::new(8.0, 8.0)));
        let bounds = circle.bounds();
        assert_eq!(bounds.min, Point::new(-10.0, -10.0));
    }

    #[test]
    fn degenerate_specs_are_rejected() {
        assert!(BodySpec::circle(Point::default(), 0.0).validate().is_err());
        assert!(BodySpec::polygon(Point::default(), &[Point::default()]).validate().is_err());
        assert!(BodySpec::default_circle(Point::default()).validate().is_ok());
    }
}
