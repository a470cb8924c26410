//! A pretend Wiimote for running the whole pipeline without hardware.
//!
//! [`SimulatedWiimote`] produces the datagrams a real device would send
//! while someone draws the built-in shapes with the recognize button held,
//! one after the other. [`RecordingSink`] takes the device's commands,
//! remembers them, and switches the simulated report mode when asked to.

use crate::commands::RPT_REPORT_MODE;
use crate::config::SimulationConfig;
use crate::geometry::Point;
use crate::recognizer::RecognizerError;
use crate::report_decoder::{report_id, Button, INPUT_HEADER};
use crate::templates::builtin_strokes;
use crate::transport::{CommandSink, ReportSource, TransportError};

use log::{debug, info};
use rand::prelude::*;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

/// Camera resolution of the IR sensor.
const CAMERA_WIDTH: f64 = 1024.0;
const CAMERA_HEIGHT: f64 = 768.0;
/// Reports at the start position before the button goes down, so the
/// pointer has settled when the stroke begins.
const LEAD_IN_REPORTS: usize = 8;
/// Resting accelerometer reading, face up.
const ACCEL_REST: (u8, u8, u8) = (0x80, 0x80, 0x9A);
const IR_SIZE: u8 = 3;

/// Records every command sent to the simulated device.
#[derive(Debug, Clone)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    mode: Arc<AtomicU8>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandSink for RecordingSink {
    fn send(&mut self, report: &[u8]) -> Result<(), TransportError> {
        if let [_, RPT_REPORT_MODE, _, mode, ..] = report {
            debug!("Simulation switches to report mode {:#04x}", mode);
            self.mode.store(*mode, Ordering::Release);
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.to_vec());
        Ok(())
    }
}

/// One pointer sample of the simulated stroke.
#[derive(Debug, Clone, Copy)]
struct Sample {
    pointer: Option<Point>,
    pressed: bool,
}

pub struct SimulatedWiimote {
    strokes: Vec<(String, Vec<Point>)>,
    config: SimulationConfig,
    button: Button,
    mode: Arc<AtomicU8>,
    pending: VecDeque<Sample>,
    gestures_started: usize,
    next_due: Option<Instant>,
}

impl SimulatedWiimote {
    /// A simulated device drawing the built-in shapes while holding
    /// `button`, and the sink its commands go to.
    pub fn new(
        config: SimulationConfig,
        button: Button,
    ) -> Result<(Self, RecordingSink), RecognizerError> {
        let mode = Arc::new(AtomicU8::new(report_id::BUTTONS));
        let sink = RecordingSink {
            sent: Arc::new(Mutex::new(Vec::new())),
            mode: Arc::clone(&mode),
        };
        let device = Self {
            strokes: builtin_strokes()?,
            config,
            button,
            mode,
            pending: VecDeque::new(),
            gestures_started: 0,
            next_due: None,
        };
        Ok((device, sink))
    }

    /// The names of the shapes in the order they get drawn, for as many
    /// gestures as will be drawn (or one round when unlimited).
    pub fn schedule(&self) -> Vec<String> {
        let n = self.config.gestures.unwrap_or(self.strokes.len());
        self.strokes
            .iter()
            .cycle()
            .take(n)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn to_camera(&self, p: &Point) -> Point {
        Point::new(
            (CAMERA_WIDTH / 2.0 + p.x * self.config.scale).clamp(0.0, CAMERA_WIDTH - 1.0),
            (CAMERA_HEIGHT / 2.0 + p.y * self.config.scale).clamp(0.0, CAMERA_HEIGHT - 1.0),
        )
    }

    /// Queues the samples for the next gesture. Returns false once every
    /// requested gesture has been drawn.
    fn queue_gesture(&mut self) -> bool {
        if self.strokes.is_empty()
            || self
                .config
                .gestures
                .is_some_and(|limit| self.gestures_started >= limit)
        {
            return false;
        }
        let (name, stroke) = &self.strokes[self.gestures_started % self.strokes.len()];
        info!("Simulating gesture {}: {}", self.gestures_started, name);

        let camera: Vec<Point> = stroke.iter().map(|p| self.to_camera(p)).collect();
        let (Some(&first), Some(&last)) = (camera.first(), camera.last()) else {
            return false;
        };
        let steps = self.config.steps_per_segment.max(1);

        let mut samples = VecDeque::new();
        for _ in 0..LEAD_IN_REPORTS {
            samples.push_back(Sample {
                pointer: Some(first),
                pressed: false,
            });
        }
        samples.push_back(Sample {
            pointer: Some(first),
            pressed: true,
        });
        for pair in camera.windows(2) {
            for step in 1..=steps {
                let t = step as f64 / steps as f64;
                samples.push_back(Sample {
                    pointer: Some(Point::new(
                        pair[0].x + (pair[1].x - pair[0].x) * t,
                        pair[0].y + (pair[1].y - pair[0].y) * t,
                    )),
                    pressed: true,
                });
            }
        }
        samples.push_back(Sample {
            pointer: Some(last),
            pressed: false,
        });
        for _ in 0..self.config.pause_reports {
            samples.push_back(Sample {
                pointer: None,
                pressed: false,
            });
        }

        self.pending = samples;
        self.gestures_started += 1;
        true
    }

    fn jitter(&self, p: Point) -> Point {
        let noise = self.config.noise;
        if !(noise > 0.0 && noise.is_finite()) {
            return p;
        }
        let mut rng = thread_rng();
        Point::new(
            (p.x + rng.gen_range(-noise..noise)).clamp(0.0, CAMERA_WIDTH - 1.0),
            (p.y + rng.gen_range(-noise..noise)).clamp(0.0, CAMERA_HEIGHT - 1.0),
        )
    }

    /// Builds the datagram for one sample in the current report mode.
    fn frame(&self, sample: Sample) -> Vec<u8> {
        let mode = match self.mode.load(Ordering::Acquire) {
            report_id::BUTTONS_ACCEL_IR12 => report_id::BUTTONS_ACCEL_IR12,
            report_id::BUTTONS_ACCEL => report_id::BUTTONS_ACCEL,
            _ => report_id::BUTTONS,
        };
        let mask = if sample.pressed { self.button.mask() } else { 0 };
        let [b1, b2] = mask.to_be_bytes();

        let mut frame = vec![INPUT_HEADER, mode, b1, b2];
        if mode == report_id::BUTTONS {
            return frame;
        }
        frame.extend_from_slice(&[ACCEL_REST.0, ACCEL_REST.1, ACCEL_REST.2]);
        if mode == report_id::BUTTONS_ACCEL {
            return frame;
        }

        let mut ir = [0xFF; 12];
        if let Some(p) = sample.pointer.map(|p| self.jitter(p)) {
            let (x, y) = (p.x.round() as u16, p.y.round() as u16);
            ir[0] = (x & 0xFF) as u8;
            ir[1] = (y & 0xFF) as u8;
            ir[2] = (((y >> 8) & 0x03) as u8) << 6 | (((x >> 8) & 0x03) as u8) << 4 | IR_SIZE;
        }
        frame.extend_from_slice(&ir);
        frame
    }

    fn pace(&mut self) {
        let Ok(period) = Duration::try_from_secs_f64(1.0 / self.config.report_rate) else {
            return;
        };
        if period.is_zero() {
            return;
        }
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            spin_sleep::sleep(due - now);
        }
        self.next_due = Some(due.max(now) + period);
    }
}

impl ReportSource for SimulatedWiimote {
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.pending.is_empty() && !self.queue_gesture() {
            info!("Simulation finished after {} gestures", self.gestures_started);
            return Ok(0);
        }
        let Some(sample) = self.pending.pop_front() else {
            return Ok(0);
        };
        self.pace();
        let frame = self.frame(sample);
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok(len)
    }
}
