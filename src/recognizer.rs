//! A $1-style single stroke recognizer. Candidates are normalized the same
//! way as the templates, then compared point by point against each
//! template at the rotation that fits best.

use crate::config::RecognizerConfig;
use crate::geometry::{rotate_by, DistanceMetric, Point, Radian};
use crate::normalize::{normalize, Normalization, PathError};
use crate::templates;

use log::debug;
use std::{borrow::Cow, fmt};

/// 0.5 * (-1 + sqrt(5))
const PHI: f64 = 0.618_033_988_749_894_9;

/// A named reference stroke. The points always come out of
/// [`normalize`], so every template in a [`Recognizer`] has the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: String,
    points: Vec<Point>,
}

impl Template {
    /// Normalizes `path` and wraps it up under `name`.
    pub fn from_path(
        name: impl Into<String>,
        path: &[Point],
        params: &Normalization,
    ) -> Result<Self, PathError> {
        Ok(Self {
            name: name.into(),
            points: normalize(path, params)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }
}

/// The best match for one stroke.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub name: String,
    /// `1 - distance / half_diagonal`, clamped to [0, 1].
    pub score: f64,
    pub distance: f64,
}

impl fmt::Display for RecognitionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {:.2}", self.name, self.score)
    }
}

#[derive(Debug)]
pub enum RecognizerError {
    /// The stroke could not be normalized.
    Path(PathError),
    /// `classify` was called with an empty template library.
    NoTemplates,
    /// The bundled template data failed to parse.
    TemplateData(ron::de::SpannedError),
}

impl fmt::Display for RecognizerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            RecognizerError::Path(error) => Cow::from(format!("invalid path: {}", error)),
            RecognizerError::NoTemplates => Cow::from("no templates to match against"),
            RecognizerError::TemplateData(error) => {
                Cow::from(format!("bad template data: {}", error))
            }
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for RecognizerError {}

impl From<PathError> for RecognizerError {
    fn from(value: PathError) -> Self {
        Self::Path(value)
    }
}

/// Mean distance between index-aligned points. Extra points on the longer
/// side are ignored.
pub fn path_distance(a: &[Point], b: &[Point], metric: DistanceMetric) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return f64::INFINITY;
    }
    let total: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(p, q)| metric.between(p, q))
        .sum();
    total / n as f64
}

/// Distance to `template` after rotating `points` by `theta`.
pub fn distance_at_angle(
    points: &[Point],
    template: &Template,
    theta: Radian,
    metric: DistanceMetric,
) -> f64 {
    let rotated = rotate_by(points, theta);
    path_distance(&rotated, template.points(), metric)
}

/// Golden section search for the rotation in `[a, b]` that brings `points`
/// closest to `template`. Stops once the bracket is narrower than
/// `threshold` and returns the smaller of the two probe distances.
pub fn distance_at_best_angle(
    points: &[Point],
    template: &Template,
    mut a: Radian,
    mut b: Radian,
    threshold: Radian,
    metric: DistanceMetric,
) -> f64 {
    let mut x1 = PHI * a + (1.0 - PHI) * b;
    let mut f1 = distance_at_angle(points, template, x1, metric);
    let mut x2 = (1.0 - PHI) * a + PHI * b;
    let mut f2 = distance_at_angle(points, template, x2, metric);

    while (b - a).abs() > threshold {
        if f1 < f2 {
            b = x2;
            x2 = x1;
            f2 = f1;
            x1 = PHI * a + (1.0 - PHI) * b;
            f1 = distance_at_angle(points, template, x1, metric);
        } else {
            a = x1;
            x1 = x2;
            f1 = f2;
            x2 = (1.0 - PHI) * a + PHI * b;
            f2 = distance_at_angle(points, template, x2, metric);
        }
    }
    f1.min(f2)
}

/// Holds the template library and the parameters shared by every
/// comparison.
#[derive(Debug, Clone)]
pub struct Recognizer {
    config: RecognizerConfig,
    templates: Vec<Template>,
}

impl Recognizer {
    /// A recognizer with an empty library.
    pub fn new(config: RecognizerConfig) -> Self {
        Self {
            config,
            templates: Vec::new(),
        }
    }

    /// A recognizer preloaded with Rectangle, Circle and Triangle.
    pub fn with_builtin_templates(config: RecognizerConfig) -> Result<Self, RecognizerError> {
        let mut recognizer = Self::new(config);
        for (name, points) in templates::builtin_strokes()? {
            recognizer.add_template(name, &points)?;
        }
        Ok(recognizer)
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Radius of the normalization square's circumcircle; a distance this
    /// large scores zero.
    pub fn half_diagonal(&self) -> f64 {
        0.5 * (2.0 * self.config.square_size * self.config.square_size).sqrt()
    }

    pub fn normalize(&self, path: &[Point]) -> Result<Vec<Point>, PathError> {
        normalize(path, &self.config.normalization())
    }

    /// Normalizes `path` and appends it to the library. Names are not
    /// required to be unique; both entries take part in matching.
    pub fn add_template(
        &mut self,
        name: impl Into<String>,
        path: &[Point],
    ) -> Result<&Template, RecognizerError> {
        let template = Template::from_path(name, path, &self.config.normalization())?;
        debug!("Adding template {:?}", template.name());
        self.templates.push(template);
        Ok(&self.templates[self.templates.len() - 1])
    }

    /// Finds the template closest to `path`. On equal distances the earlier
    /// template wins.
    pub fn classify(&self, path: &[Point]) -> Result<RecognitionResult, RecognizerError> {
        if self.templates.is_empty() {
            return Err(RecognizerError::NoTemplates);
        }
        let candidate = self.normalize(path)?;
        let range = self.config.angle_range_deg.to_radians();
        let precision = self.config.angle_precision_deg.to_radians();

        let mut best: Option<(&Template, f64)> = None;
        for template in &self.templates {
            let distance = distance_at_best_angle(
                &candidate,
                template,
                -range,
                range,
                precision,
                self.config.metric,
            );
            debug!("{} at distance {:.3}", template.name(), distance);
            match best {
                Some((_, best_distance)) if best_distance <= distance => {}
                _ => best = Some((template, distance)),
            }
        }

        // the library is non-empty, so there is always a best entry
        let (template, distance) = best.ok_or(RecognizerError::NoTemplates)?;
        let score = (1.0 - distance / self.half_diagonal()).clamp(0.0, 1.0);
        Ok(RecognitionResult {
            name: template.name().to_owned(),
            score,
            distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn builtin() -> Recognizer {
        Recognizer::with_builtin_templates(RecognizerConfig::default()).unwrap()
    }

    fn circle(n: usize, radius: f64, start: f64) -> Vec<Point> {
        (0..=n)
            .map(|i| start + i as f64 / n as f64 * 2.0 * PI)
            .map(|a| Point::new(500.0 + radius * a.cos(), 400.0 + radius * a.sin()))
            .collect()
    }

    #[test]
    fn builtin_library_is_normalized() {
        let recognizer = builtin();
        let names: Vec<_> = recognizer.templates().iter().map(|t| t.name()).collect();
        assert_eq!(names, ["Rectangle", "Circle", "Triangle"]);
        for t in recognizer.templates() {
            assert_eq!(t.points().len(), 64);
        }
        assert!((recognizer.half_diagonal() - 176.776_695_296_636_9).abs() < 1e-9);
    }

    #[test]
    fn template_points_match_themselves() {
        let recognizer = builtin();
        for (name, points) in templates::builtin_strokes().unwrap() {
            let result = recognizer.classify(&points).unwrap();
            assert_eq!(result.name, name);
            assert!(result.score > 0.95, "{} scored {}", name, result.score);
        }
    }

    #[test]
    fn classify_is_deterministic() {
        let recognizer = builtin();
        let path = circle(90, 80.0, 0.3);
        let first = recognizer.classify(&path).unwrap();
        for _ in 0..5 {
            assert_eq!(recognizer.classify(&path).unwrap(), first);
        }
    }

    #[test]
    fn custom_template_is_found_again() {
        let mut recognizer = builtin();
        let zigzag: Vec<Point> = (0..=40)
            .map(|i| {
                let height = if i % 10 < 5 { i % 5 } else { 5 - i % 5 };
                Point::new(i as f64 * 5.0, height as f64 * 30.0)
            })
            .collect();
        recognizer.add_template("Zigzag", &zigzag).unwrap();
        assert_eq!(recognizer.templates().len(), 4);

        let shifted: Vec<Point> = zigzag
            .iter()
            .map(|p| Point::new(p.x * 1.5 + 40.0, p.y * 1.5 + 10.0))
            .collect();
        let result = recognizer.classify(&shifted).unwrap();
        assert_eq!(result.name, "Zigzag");
        assert!(result.score > 0.9);
    }

    #[test]
    fn duplicate_names_are_kept() {
        let mut recognizer = Recognizer::new(RecognizerConfig::default());
        recognizer.add_template("Loop", &circle(40, 50.0, 0.0)).unwrap();
        recognizer.add_template("Loop", &circle(40, 60.0, 0.0)).unwrap();
        assert_eq!(recognizer.templates().len(), 2);
    }

    #[test]
    fn empty_library_and_bad_paths() {
        let recognizer = Recognizer::new(RecognizerConfig::default());
        assert!(matches!(
            recognizer.classify(&circle(10, 5.0, 0.0)),
            Err(RecognizerError::NoTemplates)
        ));

        let recognizer = builtin();
        assert!(matches!(
            recognizer.classify(&[Point::new(3.0, 3.0)]),
            Err(RecognizerError::Path(PathError::TooFewPoints { .. }))
        ));
        let flat = [Point::new(0.0, 0.0), Point::new(100.0, 0.0)];
        assert!(matches!(
            recognizer.classify(&flat),
            Err(RecognizerError::Path(PathError::DegenerateBounds { .. }))
        ));
        let diagonal = [Point::new(0.0, 0.0), Point::new(100.0, 100.0)];
        assert!(matches!(
            recognizer.classify(&diagonal),
            Err(RecognizerError::Path(PathError::DegenerateBounds { .. }))
        ));
        let collinear = [
            Point::new(10.0, 20.0),
            Point::new(60.0, 70.0),
            Point::new(110.0, 120.0),
        ];
        assert!(matches!(
            recognizer.classify(&collinear),
            Err(RecognizerError::Path(PathError::DegenerateBounds { .. }))
        ));
    }

    #[test]
    fn best_angle_recovers_small_rotations() {
        let recognizer = Recognizer::new(RecognizerConfig::default());
        let params = recognizer.config().normalization();
        let template = Template::from_path("t", &circle(64, 100.0, 0.0), &params).unwrap();
        let tilted = rotate_by(template.points(), 20f64.to_radians());

        let straight = distance_at_angle(&tilted, &template, 0.0, DistanceMetric::Euclidean);
        let best = distance_at_best_angle(
            &tilted,
            &template,
            -45f64.to_radians(),
            45f64.to_radians(),
            2f64.to_radians(),
            DistanceMetric::Euclidean,
        );
        assert!(best < straight);
        assert!(best < 5.0, "best distance {}", best);
    }

    #[test]
    fn legacy_metric_still_classifies() {
        let config = RecognizerConfig {
            metric: DistanceMetric::Legacy,
            ..RecognizerConfig::default()
        };
        let recognizer = Recognizer::with_builtin_templates(config).unwrap();
        let (name, points) = templates::builtin_strokes().unwrap().remove(1);
        let result = recognizer.classify(&points).unwrap();
        assert_eq!(result.name, name);
    }

    #[test]
    fn path_distance_is_mean() {
        let a = [Point::new(0.0, 0.0), Point::new(0.0, 0.0)];
        let b = [Point::new(3.0, 4.0), Point::new(0.0, 0.0)];
        assert!((path_distance(&a, &b, DistanceMetric::Euclidean) - 2.5).abs() < 1e-12);
        assert_eq!(path_distance(&[], &b, DistanceMetric::Euclidean), f64::INFINITY);
    }
}
