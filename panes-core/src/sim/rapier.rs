use std::collections::HashMap;

use log::debug;
use rapier2d::math::{Point as RPoint, Real, Vector};
use rapier2d::prelude::{
    CCDSolver, ColliderBuilder, ColliderSet, DefaultBroadPhase, ImpulseJointSet,
    IntegrationParameters, IslandManager, MultibodyJointSet, NarrowPhase, PhysicsPipeline,
    RigidBodyBuilder, RigidBodyHandle, RigidBodySet,
};

use super::engine::{BodyId, BodyLabel, BodySpec, BodyState, EngineParams, Shape, SimulationEngine};
use crate::constants::{DRAG_GAIN, GRAVITY_UNITS};
use crate::error::EngineError;
use crate::models::{Point, Settings};

fn to_rapier(p: Point) -> RPoint<Real> {
    RPoint::new(p.x as Real, p.y as Real)
}

/// Default engine: a rapier2d world in screen pixels, y pointing down.
pub struct RapierEngine {
    pipeline: PhysicsPipeline,
    params: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    direction: Point,
    scale: f64,
    handles: HashMap<BodyId, (RigidBodyHandle, BodyLabel)>,
    // Insertion order, so snapshots are stable.
    order: Vec<BodyId>,
}

impl Default for RapierEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RapierEngine {
    pub fn new() -> Self {
        let defaults = Settings::default();
        RapierEngine {
            pipeline: PhysicsPipeline::new(),
            params: IntegrationParameters::default(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            direction: defaults.gravity,
            scale: defaults.gravity_scale,
            handles: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn gravity(&self) -> Vector<Real> {
        let g = self.direction * (self.scale * GRAVITY_UNITS);
        Vector::new(g.x as Real, g.y as Real)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl SimulationEngine for RapierEngine {
    fn add(&mut self, body: BodySpec) -> Result<(), EngineError> {
        body.validate()?;
        if self.handles.contains_key(&body.id) {
            return Err(EngineError::DuplicateBody(body.id));
        }
        let rb = if body.is_static {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic()
        }
        .translation(Vector::new(body.position.x as Real, body.position.y as Real))
        .rotation(body.angle as Real)
        .user_data(body.id.as_u128())
        .build();

        let collider = match &body.shape {
            Shape::Circle { radius } => ColliderBuilder::ball(*radius as Real),
            Shape::Polygon { vertices } => {
                let pts: Vec<_> = vertices.iter().copied().map(to_rapier).collect();
                ColliderBuilder::convex_hull(&pts).ok_or(EngineError::DegenerateShape(body.id))?
            }
            Shape::Frame { points } => {
                let mut pts: Vec<_> = points.iter().copied().map(to_rapier).collect();
                // Close the contour.
                if let Some(&first) = pts.first() {
                    pts.push(first);
                }
                ColliderBuilder::polyline(pts, None)
            }
        }
        .restitution(body.restitution as Real)
        .build();

        let handle = self.bodies.insert(rb);
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        self.handles.insert(body.id, (handle, body.label));
        self.order.push(body.id);
        debug!("engine: added {:?} {}", body.label, body.id);
        Ok(())
    }

    fn remove(&mut self, id: BodyId) -> Result<(), EngineError> {
        let (handle, _) = self
            .handles
            .remove(&id)
            .ok_or(EngineError::UnknownBody(id))?;
        self.order.retain(|b| *b != id);
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        Ok(())
    }

    fn configure(&mut self, params: &EngineParams) {
        if let Some(g) = params.gravity {
            self.direction = g;
        }
        if let Some(s) = params.gravity_scale {
            self.scale = s;
        }
    }

    fn step(&mut self, dt_ms: f64) {
        self.params.dt = (dt_ms / 1000.0) as Real;
        let gravity = self.gravity();
        self.pipeline.step(
            &gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            &(),
            &(),
        );
    }

    fn snapshot(&self) -> Vec<BodyState> {
        let mut out = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let Some(&(handle, label)) = self.handles.get(id) else {
                continue;
            };
            let Some(rb) = self.bodies.get(handle) else {
                continue;
            };
            let t = rb.translation();
            let mut state = BodyState {
                id: *id,
                label,
                position: Point::new(t.x as f64, t.y as f64),
                angle: rb.rotation().angle() as f64,
                radius: None,
                vertices: Vec::new(),
            };
            if let Some(collider) = rb.colliders().first().and_then(|c| self.colliders.get(*c)) {
                let iso = collider.position();
                let shape = collider.shape();
                let world = |p: &RPoint<Real>| {
                    let w = iso * p;
                    Point::new(w.x as f64, w.y as f64)
                };
                if let Some(ball) = shape.as_ball() {
                    state.radius = Some(ball.radius as f64);
                } else if let Some(poly) = shape.as_convex_polygon() {
                    state.vertices = poly.points().iter().map(world).collect();
                } else if let Some(line) = shape.as_polyline() {
                    let vs = line.vertices();
                    // Drop the closing copy again.
                    let n = vs.len().saturating_sub(1);
                    state.vertices = vs[..n].iter().map(world).collect();
                }
            }
            out.push(state);
        }
        out
    }

    fn pull(&mut self, id: BodyId, target: Point) -> Result<(), EngineError> {
        let &(handle, _) = self.handles.get(&id).ok_or(EngineError::UnknownBody(id))?;
        let rb = self
            .bodies
            .get_mut(handle)
            .ok_or(EngineError::UnknownBody(id))?;
        if !rb.is_dynamic() {
            return Ok(());
        }
        let t = rb.translation();
        let pos = Point::new(t.x as f64, t.y as f64);
        let v = (target - pos) * DRAG_GAIN;
        rb.set_linvel(Vector::new(v.x as Real, v.y as Real), true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline;
    use crate::models::Rect;

    #[test]
    fn dropped_ball_falls_down_the_screen() {
        let mut engine = RapierEngine::new();
        let ball = BodySpec::circle(Point::new(100.0, 100.0), 10.0);
        let id = ball.id;
        engine.add(ball).unwrap();
        for _ in 0..30 {
            engine.step(1000.0 / 60.0);
        }
        let snap = engine.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].id, id);
        assert_eq!(snap[0].radius, Some(10.0));
        assert!(snap[0].position.y > 100.0);
    }

    #[test]
    fn rejects_duplicates_and_unknown_ids() {
        let mut engine = RapierEngine::new();
        let ball = BodySpec::default_circle(Point::new(0.0, 0.0));
        engine.add(ball.clone()).unwrap();
        assert_eq!(engine.add(ball.clone()), Err(EngineError::DuplicateBody(ball.id)));
        engine.remove(ball.id).unwrap();
        assert_eq!(engine.remove(ball.id), Err(EngineError::UnknownBody(ball.id)));
        assert!(engine.is_empty());
    }

    #[test]
    fn zero_gravity_keeps_bodies_still() {
        let mut engine = RapierEngine::new();
        engine.configure(&EngineParams {
            gravity: Some(Point::new(0.0, 0.0)),
            gravity_scale: None,
        });
        let square = BodySpec::default_square(Point::new(50.0, 50.0));
        engine.add(square).unwrap();
        engine.step(16.0);
        let snap = engine.snapshot();
        assert!(snap[0].position.approx_eq(Point::new(50.0, 50.0), 1e-3));
        assert_eq!(snap[0].vertices.len(), 4);
    }

    #[test]
    fn border_snapshot_keeps_the_frame_contour() {
        let mut engine = RapierEngine::new();
        let frames = outline::borders(&[Rect::new(0.0, 0.0, 400.0, 300.0)], 50.0);
        let wall = BodySpec::border(&frames[0]);
        let expected = frames[0].polygon();
        engine.add(wall).unwrap();
        engine.step(16.0);
        let snap = engine.snapshot();
        assert_eq!(snap[0].label, BodyLabel::Border);
        assert_eq!(snap[0].vertices.len(), expected.len());
        for (a, b) in snap[0].vertices.iter().zip(&expected) {
            assert!(a.approx_eq(*b, 1e-3));
        }
    }

    #[test]
    fn pull_moves_a_body_toward_the_pointer() {
        let mut engine = RapierEngine::new();
        engine.configure(&EngineParams {
            gravity: Some(Point::new(0.0, 0.0)),
            gravity_scale: None,
        });
        let ball = BodySpec::circle(Point::new(0.0, 0.0), 5.0);
        let id = ball.id;
        engine.add(ball).unwrap();
        engine.pull(id, Point::new(100.0, 0.0)).unwrap();
        engine.step(16.0);
        assert!(engine.snapshot()[0].position.x > 0.0);
    }
}
