//! The bundled gesture library. The strokes live in
//! `data/builtin_templates.ron` and are compiled into the binary.

use crate::geometry::Point;
use crate::recognizer::RecognizerError;

use serde::Deserialize;

const BUILTIN_TEMPLATES: &str = include_str!("../data/builtin_templates.ron");

#[derive(Debug, Deserialize)]
struct RawTemplate {
    name: String,
    points: Vec<(f64, f64)>,
}

/// The raw (not yet normalized) built-in strokes, in library order.
pub fn builtin_strokes() -> Result<Vec<(String, Vec<Point>)>, RecognizerError> {
    let raw: Vec<RawTemplate> =
        ron::from_str(BUILTIN_TEMPLATES).map_err(RecognizerError::TemplateData)?;
    Ok(raw
        .into_iter()
        .map(|t| (t.name, t.points.into_iter().map(Point::from).collect()))
        .collect())
}
