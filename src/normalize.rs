//! Turns a raw, variable-length stroke into the fixed representation the
//! matcher compares: `n` evenly spaced points, rotated so the first point
//! lies on the negative x axis relative to the centroid, stretched into a
//! square and centered on the origin.

use crate::geometry::{
    bounding_box, centroid, path_length, rotate_by, DistanceMetric, Point,
};

use std::{borrow::Cow, fmt};

/// Number of points every template and candidate is resampled to.
pub const DEFAULT_SAMPLES: usize = 64;

/// Side of the square that normalized strokes are stretched into.
pub const DEFAULT_SQUARE_SIZE: f64 = 250.0;

/// A side shorter than this fraction of the other counts as zero.
const FLAT_TOLERANCE: f64 = 1e-9;

/// Returned when a stroke cannot be normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum PathError {
    /// Fewer points than the step needs.
    TooFewPoints { found: usize, required: usize },
    /// All points coincide (under the active metric), so there is no arc
    /// length to walk.
    ZeroLength,
    /// The stroke is a horizontal or vertical line and cannot be stretched
    /// into a square.
    DegenerateBounds { width: f64, height: f64 },
    /// A resample target below two points.
    InvalidSampleCount(usize),
    /// The square size is zero, negative or not finite.
    InvalidSquareSize(f64),
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            PathError::TooFewPoints { found, required } => Cow::from(format!(
                "path has {} points, at least {} are needed",
                found, required
            )),
            PathError::ZeroLength => Cow::from("path has zero length"),
            PathError::DegenerateBounds { width, height } => Cow::from(format!(
                "path bounds {:.3} x {:.3} cannot be scaled to a square",
                width, height
            )),
            PathError::InvalidSampleCount(n) => {
                Cow::from(format!("cannot resample to {} points", n))
            }
            PathError::InvalidSquareSize(size) => {
                Cow::from(format!("invalid square size {}", size))
            }
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for PathError {}

/// The knobs of the pipeline, usually taken from
/// [`RecognizerConfig`](crate::config::RecognizerConfig).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub num_points: usize,
    pub square_size: f64,
    pub metric: DistanceMetric,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            num_points: DEFAULT_SAMPLES,
            square_size: DEFAULT_SQUARE_SIZE,
            metric: DistanceMetric::Euclidean,
        }
    }
}

/// Walks the cumulative arc length of `path` and emits exactly `n` points,
/// spaced `length / (n - 1)` apart, by interpolating between the original
/// points. The first point is kept; the tail is padded with the last
/// original point when rounding leaves the walk one short.
pub fn resample(path: &[Point], n: usize, metric: DistanceMetric) -> Result<Vec<Point>, PathError> {
    if n < 2 {
        return Err(PathError::InvalidSampleCount(n));
    }
    if path.len() < 2 {
        return Err(PathError::TooFewPoints {
            found: path.len(),
            required: 2,
        });
    }
    let length = path_length(path, metric);
    if !(length > 0.0) || !length.is_finite() {
        return Err(PathError::ZeroLength);
    }

    let interval = length / (n - 1) as f64;
    let mut walked = 0.0;
    let mut out = Vec::with_capacity(n);
    out.push(path[0]);

    let mut prev = path[0];
    let mut rest = path[1..].iter().peekable();
    while let Some(&&cur) = rest.peek() {
        if out.len() == n {
            break;
        }
        let d = metric.between(&prev, &cur);
        if d > 0.0 && walked + d >= interval {
            let t = (interval - walked) / d;
            let q = Point {
                x: prev.x + t * (cur.x - prev.x),
                y: prev.y + t * (cur.y - prev.y),
            };
            out.push(q);
            // q becomes the start of the remaining segment up to `cur`
            prev = q;
            walked = 0.0;
        } else {
            walked += d;
            prev = cur;
            rest.next();
        }
    }

    let last = path[path.len() - 1];
    out.resize(n, last);
    Ok(out)
}

/// Rotates the set about its centroid so that the vector from the first
/// point to the centroid has angle zero.
pub fn rotate_to_zero(points: &[Point]) -> Result<Vec<Point>, PathError> {
    let first = points.first().ok_or(PathError::TooFewPoints {
        found: 0,
        required: 1,
    })?;
    let c = centroid(points);
    let theta = (c.y - first.y).atan2(c.x - first.x);
    Ok(rotate_by(points, -theta))
}

/// Scales x and y independently so the bounding box becomes
/// `size` × `size`. The scaling is about the origin, not the box corner.
pub fn scale_to_square(points: &[Point], size: f64) -> Result<Vec<Point>, PathError> {
    if !(size > 0.0) || !size.is_finite() {
        return Err(PathError::InvalidSquareSize(size));
    }
    let bounds = bounding_box(points).ok_or(PathError::TooFewPoints {
        found: 0,
        required: 1,
    })?;
    // rotation leaves rounding noise in place of a zero extent
    let extent = bounds.width.max(bounds.height);
    if bounds.width.min(bounds.height) <= FLAT_TOLERANCE * extent {
        return Err(PathError::DegenerateBounds {
            width: bounds.width,
            height: bounds.height,
        });
    }
    let sx = size / bounds.width;
    let sy = size / bounds.height;
    Ok(points
        .iter()
        .map(|p| Point {
            x: p.x * sx,
            y: p.y * sy,
        })
        .collect())
}

/// Moves the centroid onto the origin.
pub fn translate_to_origin(points: &[Point]) -> Vec<Point> {
    let c = centroid(points);
    points
        .iter()
        .map(|p| Point {
            x: p.x - c.x,
            y: p.y - c.y,
        })
        .collect()
}

/// resample → rotate → scale → translate
pub fn normalize(path: &[Point], params: &Normalization) -> Result<Vec<Point>, PathError> {
    let points = resample(path, params.num_points, params.metric)?;
    let points = rotate_to_zero(&points)?;
    let points = scale_to_square(&points, params.square_size)?;
    Ok(translate_to_origin(&points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn circle(n: usize, radius: f64) -> Vec<Point> {
        (0..=n)
            .map(|i| i as f64 / n as f64 * 2.0 * PI)
            .map(|a| Point::new(300.0 + radius * a.cos(), 200.0 + radius * a.sin()))
            .collect()
    }

    fn zigzag() -> Vec<Point> {
        vec![
            Point::new(10.0, 10.0),
            Point::new(50.0, 80.0),
            Point::new(55.0, 80.0),
            Point::new(90.0, 15.0),
            Point::new(140.0, 70.0),
        ]
    }

    #[test]
    fn resample_hits_exact_count() {
        for n in [2, 3, 16, 64, 100, 257] {
            let out = resample(&zigzag(), n, DistanceMetric::Euclidean).unwrap();
            assert_eq!(out.len(), n);
            assert_eq!(out[0], zigzag()[0]);
        }
        let two = [Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        assert_eq!(resample(&two, 64, DistanceMetric::Euclidean).unwrap().len(), 64);
        assert_eq!(resample(&circle(7, 50.0), 64, DistanceMetric::Legacy).unwrap().len(), 64);
    }

    #[test]
    fn resample_spaces_points_evenly() {
        let line = [Point::new(0.0, 0.0), Point::new(63.0, 0.0)];
        let out = resample(&line, 64, DistanceMetric::Euclidean).unwrap();
        for (i, p) in out.iter().enumerate() {
            assert!((p.x - i as f64).abs() < 1e-9, "{} at {}", p, i);
        }
    }

    #[test]
    fn resample_rejects_bad_input() {
        assert_eq!(
            resample(&[Point::new(1.0, 1.0)], 64, DistanceMetric::Euclidean),
            Err(PathError::TooFewPoints { found: 1, required: 2 })
        );
        let still = [Point::new(1.0, 1.0); 5];
        assert_eq!(
            resample(&still, 64, DistanceMetric::Euclidean),
            Err(PathError::ZeroLength)
        );
        assert_eq!(
            resample(&zigzag(), 1, DistanceMetric::Euclidean),
            Err(PathError::InvalidSampleCount(1))
        );
    }

    #[test]
    fn rotate_puts_first_point_left_of_centroid() {
        let rotated = rotate_to_zero(&zigzag()).unwrap();
        let c = centroid(&rotated);
        let first = rotated[0];
        assert!((c.y - first.y).abs() < 1e-9);
        assert!(c.x > first.x);
        assert!(rotate_to_zero(&[]).is_err());
    }

    #[test]
    fn scaled_box_is_square() {
        let scaled = scale_to_square(&zigzag(), 250.0).unwrap();
        let bb = bounding_box(&scaled).unwrap();
        assert!((bb.width - 250.0).abs() < 1e-9);
        assert!((bb.height - 250.0).abs() < 1e-9);
    }

    #[test]
    fn scale_rejects_flat_lines() {
        let flat = [Point::new(0.0, 5.0), Point::new(10.0, 5.0)];
        assert!(matches!(
            scale_to_square(&flat, 250.0),
            Err(PathError::DegenerateBounds { height, .. }) if height == 0.0
        ));
        assert_eq!(
            scale_to_square(&zigzag(), 0.0),
            Err(PathError::InvalidSquareSize(0.0))
        );
    }

    #[test]
    fn scale_rejects_rotated_diagonal_lines() {
        let diagonal = [Point::new(0.0, 0.0), Point::new(100.0, 100.0)];
        let resampled = resample(&diagonal, DEFAULT_SAMPLES, DistanceMetric::Euclidean).unwrap();
        let rotated = rotate_to_zero(&resampled).unwrap();
        assert!(matches!(
            scale_to_square(&rotated, DEFAULT_SQUARE_SIZE),
            Err(PathError::DegenerateBounds { .. })
        ));

        let collinear = [
            Point::new(10.0, 20.0),
            Point::new(60.0, 70.0),
            Point::new(110.0, 120.0),
        ];
        assert!(matches!(
            normalize(&collinear, &Normalization::default()),
            Err(PathError::DegenerateBounds { .. })
        ));
        // a thin but real stroke still goes through
        let sliver = [
            Point::new(0.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(100.0, 103.0),
        ];
        assert!(normalize(&sliver, &Normalization::default()).is_ok());
    }

    #[test]
    fn translate_centers_on_origin() {
        let moved = translate_to_origin(&zigzag());
        let c = centroid(&moved);
        assert!(c.x.abs() < 1e-9 && c.y.abs() < 1e-9);
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        let params = Normalization::default();
        let once = normalize(&circle(200, 120.0), &params).unwrap();
        let twice = normalize(&once, &params).unwrap();
        assert_eq!(once.len(), DEFAULT_SAMPLES);
        assert_eq!(twice.len(), DEFAULT_SAMPLES);
        for (a, b) in once.iter().zip(twice.iter()) {
            assert!(a.abs_dist(b) < 1.0, "{} drifted to {}", a, b);
        }
    }

    #[test]
    fn normalized_stroke_fills_the_square() {
        let params = Normalization::default();
        let out = normalize(&zigzag(), &params).unwrap();
        let bb = bounding_box(&out).unwrap();
        assert!((bb.width - params.square_size).abs() < 1e-6);
        assert!((bb.height - params.square_size).abs() < 1e-6);
        let c = centroid(&out);
        assert!(c.x.abs() < 1e-9 && c.y.abs() < 1e-9);
    }
}
