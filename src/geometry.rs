//! Plain 2-D geometry shared by the normalization pipeline and the matcher.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Angles are carried around in radians unless a name says otherwise.
pub type Radian = f64;

/// A point in IR camera pixel space, or in the normalized gesture square
/// once it has been through [`crate::normalize`].
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Straight-line distance, regardless of the configured metric.
    pub fn abs_dist(&self, other: &Self) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// How the distance between two points is measured, both for the arc
/// length walked by `resample` and for matching against templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum DistanceMetric {
    /// `sqrt(dx² + dy²)`
    #[default]
    Euclidean,
    /// `sqrt(|dx² - dy²|)`, the formula used by the gesture assignment this
    /// recognizer was first written for. Only useful to reproduce its
    /// scores; it is not a metric (diagonal moves measure zero).
    Legacy,
}

impl DistanceMetric {
    pub fn between(self, a: &Point, b: &Point) -> f64 {
        let dx = a.x - b.x;
        let dy = a.y - b.y;
        match self {
            DistanceMetric::Euclidean => (dx * dx + dy * dy).sqrt(),
            DistanceMetric::Legacy => (dx * dx - dy * dy).abs().sqrt(),
        }
    }
}

/// Axis-aligned bounds of a point set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
}

/// Sum of the segment lengths along `points`.
pub fn path_length(points: &[Point], metric: DistanceMetric) -> f64 {
    points
        .windows(2)
        .map(|pair| metric.between(&pair[0], &pair[1]))
        .sum()
}

/// Mean of all points. The origin for an empty slice.
pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::default();
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point { x: sx / n, y: sy / n }
}

/// `None` for an empty slice.
pub fn bounding_box(points: &[Point]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for p in points.iter().skip(1) {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    Some(BoundingBox {
        min_x,
        min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    })
}

/// Rotates every point by `theta` around the centroid of the set.
pub fn rotate_by(points: &[Point], theta: Radian) -> Vec<Point> {
    let c = centroid(points);
    let (sin, cos) = theta.sin_cos();
    points
        .iter()
        .map(|p| Point {
            x: (p.x - c.x) * cos - (p.y - c.y) * sin + c.x,
            y: (p.x - c.x) * sin + (p.y - c.y) * cos + c.y,
        })
        .collect()
}
