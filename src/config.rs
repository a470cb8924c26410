//! Runtime configuration, read from a RON file. Every section and field
//! falls back to its default, so a config file only needs the values it
//! changes:
//!
//! ```text
//! (
//!     recognizer: (metric: Legacy),
//!     capture: (record_button: Two),
//! )
//! ```

use crate::geometry::DistanceMetric;
use crate::normalize::{Normalization, DEFAULT_SAMPLES, DEFAULT_SQUARE_SIZE};
use crate::report_decoder::{report_id, Button};

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, fs, path::Path};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub recognizer: RecognizerConfig,
    pub device: DeviceConfig,
    pub capture: CaptureConfig,
    pub simulation: SimulationConfig,
}

/// Parameters of the normalization pipeline and the rotation search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub num_points: usize,
    pub square_size: f64,
    /// Rotation search runs over `[-angle_range_deg, angle_range_deg]`.
    pub angle_range_deg: f64,
    pub angle_precision_deg: f64,
    pub metric: DistanceMetric,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            num_points: DEFAULT_SAMPLES,
            square_size: DEFAULT_SQUARE_SIZE,
            angle_range_deg: 45.0,
            angle_precision_deg: 2.0,
            metric: DistanceMetric::Euclidean,
        }
    }
}

impl RecognizerConfig {
    pub fn normalization(&self) -> Normalization {
        Normalization {
            num_points: self.num_points,
            square_size: self.square_size,
            metric: self.metric,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Turn the IR camera on and switch to the buttons + accelerometer +
    /// extended IR report mode. Without it the device only reports buttons
    /// and acceleration, and no pointer is available.
    pub enable_ir: bool,
    /// How long a single read on the data channel may block.
    pub recv_timeout_ms: u64,
    pub leds: [bool; 4],
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            enable_ir: true,
            recv_timeout_ms: 1000,
            leds: [true, false, false, false],
        }
    }
}

impl DeviceConfig {
    pub fn report_mode(&self) -> u8 {
        if self.enable_ir {
            report_id::BUTTONS_ACCEL_IR12
        } else {
            report_id::BUTTONS_ACCEL
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Held while drawing a gesture to classify.
    pub recognize_button: Button,
    /// Held while drawing a gesture to store as a new template.
    pub record_button: Button,
    pub template_prefix: String,
    /// Number of IR frames the pointer is averaged over.
    pub pointer_window: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            recognize_button: Button::A,
            record_button: Button::B,
            template_prefix: "My Custom Template ".to_owned(),
            pointer_window: 4,
        }
    }
}

/// Slowest simulated report rate, in reports per second.
pub const MIN_REPORT_RATE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Reports per second; zero emits them as fast as they are read.
    pub report_rate: f64,
    /// Peak pointer jitter in camera pixels.
    pub noise: f64,
    /// Camera pixels per template unit.
    pub scale: f64,
    /// Reports spent on each template segment.
    pub steps_per_segment: usize,
    /// Idle reports between two gestures.
    pub pause_reports: usize,
    /// Stop (with a disconnect) after this many gestures.
    pub gestures: Option<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            report_rate: 100.0,
            noise: 1.5,
            scale: 1.6,
            steps_per_segment: 2,
            pause_reports: 50,
            gestures: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    RonSpannedError(ron::de::SpannedError),
    Invalid(Cow<'static, str>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::IoError(error) => write!(f, "io error: {}", error),
            ConfigError::RonSpannedError(error) => write!(f, "ron error: {}", error),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<ron::de::SpannedError> for ConfigError {
    fn from(value: ron::de::SpannedError) -> Self {
        Self::RonSpannedError(value)
    }
}

impl AppConfig {
    /// Reads and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.recognizer;
        if r.num_points < 2 {
            return Err(ConfigError::Invalid("num_points must be at least 2".into()));
        }
        if !positive(r.square_size) {
            return Err(ConfigError::Invalid("square_size must be positive".into()));
        }
        if !positive(r.angle_range_deg) || !positive(r.angle_precision_deg) {
            return Err(ConfigError::Invalid(
                "angle range and precision must be positive".into(),
            ));
        }
        let c = &self.capture;
        if c.recognize_button == c.record_button {
            return Err(ConfigError::Invalid(
                format!("{} cannot both recognize and record", c.record_button).into(),
            ));
        }
        if !(1..=crate::pointer::MAX_WINDOW).contains(&c.pointer_window) {
            return Err(ConfigError::Invalid(
                format!("pointer_window must be in 1..={}", crate::pointer::MAX_WINDOW).into(),
            ));
        }
        let sim = &self.simulation;
        if sim.steps_per_segment == 0 {
            return Err(ConfigError::Invalid("steps_per_segment must be positive".into()));
        }
        let rate = sim.report_rate;
        if rate != 0.0 && !(rate >= MIN_REPORT_RATE && rate.is_finite()) {
            return Err(ConfigError::Invalid(
                format!("report_rate must be 0 or at least {}", MIN_REPORT_RATE).into(),
            ));
        }
        if !(sim.noise >= 0.0 && sim.noise.is_finite()) {
            return Err(ConfigError::Invalid("noise must be zero or positive".into()));
        }
        if !positive(sim.scale) {
            return Err(ConfigError::Invalid("scale must be positive".into()));
        }
        Ok(())
    }
}

/// Finite and above zero; false for NaN.
fn positive(value: f64) -> bool {
    value > 0.0 && value.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = AppConfig::from_ron_str(
            "(recognizer: (metric: Legacy), capture: (record_button: Two))",
        )
        .unwrap();
        assert_eq!(config.recognizer.metric, DistanceMetric::Legacy);
        assert_eq!(config.recognizer.num_points, 64);
        assert_eq!(config.capture.record_button, Button::Two);
        assert_eq!(config.capture.recognize_button, Button::A);
        assert_eq!(config.device, DeviceConfig::default());
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(AppConfig::from_ron_str("()").unwrap(), AppConfig::default());
    }

    #[test]
    fn rejects_nonsense() {
        assert!(matches!(
            AppConfig::from_ron_str("(recognizer: (num_points: 1))"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_ron_str("(capture: (recognize_button: B))"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_ron_str("(capture: (pointer_window: 0))"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_ron_str("(recognizer: (square_size: \"big\"))"),
            Err(ConfigError::RonSpannedError(_))
        ));
    }

    #[test]
    fn rejects_unusable_numbers() {
        let invalid = |edit: fn(&mut AppConfig)| {
            let mut config = AppConfig::default();
            edit(&mut config);
            matches!(config.validate(), Err(ConfigError::Invalid(_)))
        };
        assert!(invalid(|c| c.simulation.noise = f64::NAN));
        assert!(invalid(|c| c.simulation.noise = -1.0));
        assert!(invalid(|c| c.simulation.noise = f64::INFINITY));
        assert!(invalid(|c| c.simulation.report_rate = 1e-300));
        assert!(invalid(|c| c.simulation.report_rate = f64::NAN));
        assert!(invalid(|c| c.simulation.report_rate = f64::INFINITY));
        assert!(invalid(|c| c.simulation.report_rate = -5.0));
        assert!(invalid(|c| c.simulation.scale = f64::NAN));
        assert!(invalid(|c| c.simulation.scale = 0.0));
        assert!(invalid(|c| c.recognizer.square_size = f64::INFINITY));
        assert!(invalid(|c| c.recognizer.angle_range_deg = f64::NAN));

        assert!(!invalid(|c| c.simulation.report_rate = 0.0));
        assert!(!invalid(|c| c.simulation.noise = 0.0));
        assert!(!invalid(|c| c.simulation.report_rate = MIN_REPORT_RATE));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(device: (enable_ir: false, leds: (false, true, false, true)))").unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert!(!config.device.enable_ir);
        assert_eq!(config.device.report_mode(), 0x31);
        assert_eq!(config.device.leds, [false, true, false, true]);

        let missing = file.path().with_extension("missing");
        assert!(matches!(AppConfig::load(missing), Err(ConfigError::IoError(_))));
    }

    #[test]
    fn defaults_survive_a_round_trip() {
        let text = ron::ser::to_string(&AppConfig::default()).unwrap();
        assert_eq!(AppConfig::from_ron_str(&text).unwrap(), AppConfig::default());
    }
}
