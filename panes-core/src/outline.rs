//! Merged outline of all window rectangles and the inward border frame
//! built from it.
//!
//! Rectangles are grouped into clusters of overlapping (or touching) bounds;
//! each cluster is unioned into one outer ring. Holes left between windows
//! are dropped: the play area of a cluster is always simply connected.

use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};

use crate::models::{Bounds, Point, Rect};

/// Output coordinates are snapped to this grid to absorb clipping noise.
const SNAP: f64 = 1e6;
const EPS: f64 = 1e-9;

/// Outline ring paired point-for-point with its inward extrusion.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Outline ring with the notch point (a copy of the first vertex) appended.
    pub outline: Vec<Point>,
    pub inner: Vec<Point>,
}

impl Frame {
    /// Single contour: the outline followed by the reversed inner ring.
    pub fn polygon(&self) -> Vec<Point> {
        self.outline
            .iter()
            .chain(self.inner.iter().rev())
            .copied()
            .collect()
    }
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        DisjointSet {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn join(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Lower index stays root so cluster order follows input order.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// Connected components of the inclusive-overlap graph, as index lists.
/// Clusters are ordered by their first member; members keep input order.
pub fn clusters(bounds: &[Bounds]) -> Vec<Vec<usize>> {
    let n = bounds.len();
    let mut set = DisjointSet::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            if bounds[i].overlaps(&bounds[j]) {
                set.join(i, j);
            }
        }
    }
    let mut slot: Vec<Option<usize>> = vec![None; n];
    let mut out: Vec<Vec<usize>> = Vec::new();
    for i in 0..n {
        let root = set.find(i);
        match slot[root] {
            Some(k) => out[k].push(i),
            None => {
                slot[root] = Some(out.len());
                out.push(vec![i]);
            }
        }
    }
    out
}

/// Outer rings of the union of `rects`, one per connected piece.
pub fn outlines(rects: &[Rect]) -> Vec<Vec<Point>> {
    let bounds: Vec<Bounds> = rects
        .iter()
        .filter(|r| !r.is_degenerate())
        .map(Rect::bounds)
        .collect();
    let mut out = Vec::new();
    for cluster in clusters(&bounds) {
        let members: Vec<Bounds> = cluster.iter().map(|&i| bounds[i]).collect();
        out.extend(merge(&members));
    }
    out
}

/// Unions one cluster. A lone rectangle is returned as its own corners.
pub fn merge(members: &[Bounds]) -> Vec<Vec<Point>> {
    match members {
        [] => Vec::new(),
        [one] => vec![one.corners().to_vec()],
        [first, rest @ ..] => {
            let mut acc = MultiPolygon::new(vec![to_polygon(first)]);
            for b in rest {
                acc = acc.union(&MultiPolygon::new(vec![to_polygon(b)]));
            }
            let mut rings: Vec<Vec<Point>> = acc
                .0
                .iter()
                .filter_map(|p| clean_ring(ring_points(p.exterior())))
                .collect();
            rings.sort_by(|a, b| a[0].y.total_cmp(&b[0].y).then(a[0].x.total_cmp(&b[0].x)));
            rings
        }
    }
}

fn to_polygon(b: &Bounds) -> Polygon<f64> {
    geo::Rect::new(
        Coord {
            x: b.min.x,
            y: b.min.y,
        },
        Coord {
            x: b.max.x,
            y: b.max.y,
        },
    )
    .to_polygon()
}

fn ring_points(ls: &LineString<f64>) -> Vec<Point> {
    ls.coords().map(|c| Point::new(c.x, c.y)).collect()
}

fn snap(v: f64) -> f64 {
    (v * SNAP).round() / SNAP
}

fn cross(a: Point, b: Point) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Shoelace area; positive for the canonical (clockwise on screen) winding.
pub fn signed_area(ring: &[Point]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        sum += cross(ring[i], ring[(i + 1) % n]);
    }
    sum / 2.0
}

/// Snaps, drops the closing point, duplicates and collinear vertices, fixes
/// the winding and starts the ring at its top-left vertex.
fn clean_ring(raw: Vec<Point>) -> Option<Vec<Point>> {
    let mut pts: Vec<Point> = raw
        .into_iter()
        .map(|p| Point::new(snap(p.x), snap(p.y)))
        .collect();
    pts.dedup_by(|a, b| a.approx_eq(*b, EPS));
    while pts.len() > 1 && pts[0].approx_eq(pts[pts.len() - 1], EPS) {
        pts.pop();
    }
    loop {
        let n = pts.len();
        if n < 3 {
            return None;
        }
        let collinear = (0..n).find(|&i| {
            let a = pts[(i + n - 1) % n];
            let b = pts[i];
            let c = pts[(i + 1) % n];
            let (ab, bc) = (b - a, c - b);
            cross(ab, bc).abs() <= EPS * (ab.length() * bc.length()).max(1.0)
        });
        match collinear {
            Some(i) => {
                pts.remove(i);
            }
            None => break,
        }
    }
    if signed_area(&pts) < 0.0 {
        pts.reverse();
    }
    let start = (0..pts.len())
        .min_by(|&i, &j| {
            pts[i]
                .y
                .total_cmp(&pts[j].y)
                .then(pts[i].x.total_cmp(&pts[j].x))
        })
        .unwrap_or(0);
    pts.rotate_left(start);
    Some(pts)
}

/// Offsets every vertex of `outline` inward by `thickness` along its
/// averaged edge normal. A notch copy of the first vertex is appended first
/// so the seam of the resulting frame isn't a zero-area wall.
pub fn extrude(outline: &[Point], thickness: f64) -> Frame {
    let mut ring = outline.to_vec();
    if let Some(&first) = ring.first() {
        ring.push(first);
    }
    let n = ring.len();
    let inner = (0..n)
        .map(|i| {
            let v = ring[i];
            let prev = ring[(i + n - 1) % n];
            let next = ring[(i + 1) % n];
            let n1 = (v - prev).outward_normal().normalize();
            let n2 = (next - v).outward_normal().normalize();
            let normal = (n1 + n2).normalize();
            v - normal * thickness
        })
        .collect();
    Frame {
        outline: ring,
        inner,
    }
}

/// Border frames for the union of `rects`.
pub fn borders(rects: &[Rect], thickness: f64) -> Vec<Frame> {
    outlines(rects)
        .iter()
        .map(|o| extrude(o, thickness))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Line {
    pub from: Point,
    pub to: Point,
}

impl Line {
    pub const fn new(from: Point, to: Point) -> Self {
        Line { from, to }
    }
}

/// Crossing point of two segments. Parallel or collinear segments give
/// `None`, as do segments whose lines cross outside either span.
pub fn line_intersection(a: &Line, b: &Line) -> Option<Point> {
    let r = a.to - a.from;
    let s = b.to - b.from;
    let denom = cross(r, s);
    if denom.abs() <= EPS {
        return None;
    }
    let qp = b.from - a.from;
    let t = cross(qp, s) / denom;
    let u = cross(qp, r) / denom;
    let span = -EPS..=1.0 + EPS;
    if span.contains(&t) && span.contains(&u) {
        Some(a.from + r * t)
    } else {
        None
    }
}

fn edges(b: &Bounds) -> [Line; 4] {
    let [tl, tr, br, bl] = b.corners();
    [
        Line::new(tl, tr),
        Line::new(tr, br),
        Line::new(br, bl),
        Line::new(bl, tl),
    ]
}

/// Points where the edges of two bounds cross, without duplicates.
pub fn rect_intersection_points(a: &Bounds, b: &Bounds) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::new();
    for ea in &edges(a) {
        for eb in &edges(b) {
            if let Some(p) = line_intersection(ea, eb)
                && !out.iter().any(|q| q.approx_eq(p, 1e-6))
            {
                out.push(p);
            }
        }
    }
    out
}
