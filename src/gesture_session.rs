//! Gesture capture. Holding the recognize button draws a stroke that is
//! classified on release; holding the record button draws a stroke that is
//! stored as a new template on release.
//!
//! ```text
//! Idle --(capture button down)--> Recording(mode) --(same button up)--> Idle
//! ```
//!
//! There is no way to cancel a recording other than releasing the button.

use crate::component::{Component, ComponentError};
use crate::config::CaptureConfig;
use crate::geometry::Point;
use crate::pointer::PointerEstimator;
use crate::recognizer::{RecognitionResult, Recognizer, RecognizerError};
use crate::report_decoder::{Acceleration, Button};
use crate::wiimote::WiimoteEvent;

use log::{debug, info, warn};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Recognize,
    Record,
}

/// What a finished stroke turned into.
#[derive(Debug)]
pub enum GestureOutcome {
    Recognized(RecognitionResult),
    TemplateAdded(String),
    Rejected {
        mode: CaptureMode,
        error: RecognizerError,
    },
}

impl fmt::Display for GestureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GestureOutcome::Recognized(result) => write!(f, "Recognized gesture: {}", result),
            GestureOutcome::TemplateAdded(name) => write!(f, "Added Template: {}", name),
            GestureOutcome::Rejected { mode, error } => {
                write!(f, "{:?} failed: {}", mode, error)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SessionState {
    Idle,
    Recording { mode: CaptureMode, path: Vec<Point> },
}

/// The capture state machine wrapped around a [`Recognizer`].
#[derive(Debug, Clone)]
pub struct GestureSession {
    recognizer: Recognizer,
    recognize_button: Button,
    record_button: Button,
    template_prefix: String,
    template_counter: usize,
    state: SessionState,
    last_pointer: Option<Point>,
}

impl GestureSession {
    pub fn new(recognizer: Recognizer, capture: &CaptureConfig) -> Self {
        Self {
            recognizer,
            recognize_button: capture.recognize_button,
            record_button: capture.record_button,
            template_prefix: capture.template_prefix.clone(),
            template_counter: 0,
            state: SessionState::Idle,
            last_pointer: None,
        }
    }

    pub fn recognizer(&self) -> &Recognizer {
        &self.recognizer
    }

    pub fn recording(&self) -> Option<CaptureMode> {
        match self.state {
            SessionState::Idle => None,
            SessionState::Recording { mode, .. } => Some(mode),
        }
    }

    /// The stroke drawn so far; empty while idle.
    pub fn path(&self) -> &[Point] {
        match &self.state {
            SessionState::Idle => &[],
            SessionState::Recording { path, .. } => path,
        }
    }

    fn mode_for(&self, button: Button) -> Option<CaptureMode> {
        if button == self.recognize_button {
            Some(CaptureMode::Recognize)
        } else if button == self.record_button {
            Some(CaptureMode::Record)
        } else {
            None
        }
    }

    /// Feeds one pointer sample. Extends the stroke while recording.
    pub fn on_pointer(&mut self, pointer: Option<Point>) {
        let Some(p) = pointer else {
            return;
        };
        self.last_pointer = Some(p);
        if let SessionState::Recording { path, .. } = &mut self.state {
            path.push(p);
        }
    }

    /// Feeds one button change. Returns an outcome when it ends a stroke.
    pub fn on_button(&mut self, button: Button, pressed: bool) -> Option<GestureOutcome> {
        let mode = self.mode_for(button)?;
        match (self.recording(), pressed) {
            (None, true) => {
                debug!("Start recording ({:?})", mode);
                self.state = SessionState::Recording {
                    mode,
                    path: self.last_pointer.into_iter().collect(),
                };
                None
            }
            (Some(active), false) if active == mode => {
                let state = std::mem::replace(&mut self.state, SessionState::Idle);
                let SessionState::Recording { path, .. } = state else {
                    return None;
                };
                Some(self.finish(mode, path))
            }
            _ => None,
        }
    }

    fn finish(&mut self, mode: CaptureMode, path: Vec<Point>) -> GestureOutcome {
        debug!("Stop recording ({:?}) after {} points", mode, path.len());
        let outcome = match mode {
            CaptureMode::Recognize => match self.recognizer.classify(&path) {
                Ok(result) => GestureOutcome::Recognized(result),
                Err(error) => GestureOutcome::Rejected { mode, error },
            },
            CaptureMode::Record => {
                let name = format!("{}{}", self.template_prefix, self.template_counter);
                match self.recognizer.add_template(name.clone(), &path) {
                    Ok(_) => {
                        self.template_counter += 1;
                        GestureOutcome::TemplateAdded(name)
                    }
                    Err(error) => GestureOutcome::Rejected { mode, error },
                }
            }
        };
        info!("{}", outcome);
        outcome
    }
}

/// What the gesture stage reports after every event.
#[derive(Debug)]
pub struct SessionUpdate {
    pub connected: bool,
    pub pointer: Option<Point>,
    pub pointer_window: usize,
    pub acceleration: Option<Acceleration>,
    pub recording: Option<CaptureMode>,
    pub path_len: usize,
    /// Only set on the update that finished a stroke.
    pub outcome: Option<GestureOutcome>,
}

/// Ties pointer estimation and the capture state machine to the Wiimote's
/// event stream. Plus and Minus resize the pointer smoothing window.
pub struct GestureTracker {
    session: GestureSession,
    pointer: PointerEstimator,
    connected: bool,
    acceleration: Option<Acceleration>,
}

impl GestureTracker {
    pub fn new(session: GestureSession, pointer: PointerEstimator) -> Self {
        Self {
            session,
            pointer,
            connected: true,
            acceleration: None,
        }
    }

    pub fn session(&self) -> &GestureSession {
        &self.session
    }
}

impl Component for GestureTracker {
    type InData = WiimoteEvent;
    type OutData = SessionUpdate;

    fn convert(&mut self, input: WiimoteEvent) -> SessionUpdate {
        let mut outcome = None;
        match input {
            WiimoteEvent::Buttons(diff) => {
                for (button, pressed) in diff {
                    match (button, pressed) {
                        (Button::Plus, true) => self.pointer.grow(),
                        (Button::Minus, true) => self.pointer.shrink(),
                        _ => {}
                    }
                    if let Some(o) = self.session.on_button(button, pressed) {
                        outcome = Some(o);
                    }
                }
            }
            WiimoteEvent::Acceleration(acceleration) => self.acceleration = Some(acceleration),
            WiimoteEvent::Ir(objects) => {
                let estimate = self.pointer.push(&objects);
                self.session.on_pointer(estimate);
            }
            WiimoteEvent::Disconnected => {
                warn!("Wiimote disconnected");
                self.connected = false;
            }
        }

        SessionUpdate {
            connected: self.connected,
            pointer: self.pointer.estimate(),
            pointer_window: self.pointer.window(),
            acceleration: self.acceleration,
            recording: self.session.recording(),
            path_len: self.session.path().len(),
            outcome,
        }
    }

    fn finalize(&mut self) -> Result<(), ComponentError> {
        match self.session.recording() {
            Some(_) => Err(ComponentError::UnfinishedGesture(self.session.path().len())),
            None => Ok(()),
        }
    }
}

impl fmt::Display for GestureTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GestureTracker")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecognizerConfig;
    use crate::report_decoder::IrObject;
    use crate::templates::builtin_strokes;

    fn session() -> GestureSession {
        let recognizer = Recognizer::with_builtin_templates(RecognizerConfig::default()).unwrap();
        GestureSession::new(recognizer, &CaptureConfig::default())
    }

    fn draw(session: &mut GestureSession, button: Button, points: &[Point]) -> Option<GestureOutcome> {
        session.on_pointer(points.first().copied());
        assert!(session.on_button(button, true).is_none());
        for p in &points[1..] {
            session.on_pointer(Some(*p));
        }
        session.on_button(button, false)
    }

    #[test]
    fn recognize_a_builtin_shape() {
        let mut session = session();
        let (_, triangle) = builtin_strokes().unwrap().remove(2);
        match draw(&mut session, Button::A, &triangle) {
            Some(GestureOutcome::Recognized(result)) => {
                assert_eq!(result.name, "Triangle");
                assert!(result.score > 0.95);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(session.recording(), None);
        assert!(session.path().is_empty());
    }

    #[test]
    fn record_then_recognize_custom_templates() {
        let mut session = session();
        let hook: Vec<Point> = (0..30)
            .map(|i| i as f64)
            .map(|t| Point::new(t * 10.0, (t / 5.0).sin() * 80.0 + t * 3.0))
            .collect();
        match draw(&mut session, Button::B, &hook) {
            Some(GestureOutcome::TemplateAdded(name)) => assert_eq!(name, "My Custom Template 0"),
            other => panic!("unexpected {:?}", other),
        }
        match draw(&mut session, Button::B, &hook) {
            Some(GestureOutcome::TemplateAdded(name)) => assert_eq!(name, "My Custom Template 1"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(session.recognizer().templates().len(), 5);

        match draw(&mut session, Button::A, &hook) {
            Some(GestureOutcome::Recognized(result)) => {
                assert!(result.name.starts_with("My Custom Template "))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn only_the_active_button_ends_a_stroke() {
        let mut session = session();
        session.on_pointer(Some(Point::new(1.0, 1.0)));
        session.on_button(Button::A, true);
        assert_eq!(session.recording(), Some(CaptureMode::Recognize));
        // pressing or releasing the record button mid-stroke does nothing
        assert!(session.on_button(Button::B, true).is_none());
        assert!(session.on_button(Button::B, false).is_none());
        // unrelated buttons are ignored
        assert!(session.on_button(Button::Home, true).is_none());
        session.on_pointer(Some(Point::new(2.0, 3.0)));
        session.on_pointer(None);
        assert_eq!(session.path(), &[Point::new(1.0, 1.0), Point::new(2.0, 3.0)]);
        assert_eq!(session.recording(), Some(CaptureMode::Recognize));
    }

    #[test]
    fn too_short_strokes_are_rejected() {
        let mut session = session();
        session.on_button(Button::A, true);
        match session.on_button(Button::A, false) {
            Some(GestureOutcome::Rejected { mode, .. }) => assert_eq!(mode, CaptureMode::Recognize),
            other => panic!("unexpected {:?}", other),
        }
        session.on_button(Button::B, true);
        assert!(matches!(
            session.on_button(Button::B, false),
            Some(GestureOutcome::Rejected { mode: CaptureMode::Record, .. })
        ));
        // a failed recording does not use up a template number
        assert_eq!(session.recognizer().templates().len(), 3);
    }

    #[test]
    fn tracker_follows_the_event_stream() {
        let mut tracker = GestureTracker::new(session(), PointerEstimator::new(1));
        let (_, circle) = builtin_strokes().unwrap().remove(1);
        let frame = |p: &Point| {
            vec![IrObject {
                id: 0,
                x: (512.0 + p.x) as u16,
                y: (384.0 + p.y) as u16,
                size: 2,
            }]
        };

        tracker.convert(WiimoteEvent::Ir(frame(&circle[0])));
        let update = tracker.convert(WiimoteEvent::Buttons(vec![(Button::A, true)]));
        assert_eq!(update.recording, Some(CaptureMode::Recognize));
        assert_eq!(update.path_len, 1);
        for p in &circle[1..] {
            tracker.convert(WiimoteEvent::Ir(frame(p)));
        }
        assert!(tracker.finalize().is_err());

        let update = tracker.convert(WiimoteEvent::Buttons(vec![(Button::A, false)]));
        match update.outcome {
            Some(GestureOutcome::Recognized(result)) => assert_eq!(result.name, "Circle"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(tracker.finalize().is_ok());

        let update = tracker.convert(WiimoteEvent::Buttons(vec![(Button::Plus, true)]));
        assert_eq!(update.pointer_window, 2);
        let update = tracker.convert(WiimoteEvent::Disconnected);
        assert!(!update.connected);
    }
}
