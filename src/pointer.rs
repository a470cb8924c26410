//! Turns IR camera frames into a single pointer position.

use crate::component::{Component, ComponentError};
use crate::geometry::Point;
use crate::report_decoder::IrObject;

use std::collections::VecDeque;
use std::fmt;

pub const MAX_WINDOW: usize = 128;

/// Keeps the last few IR frames, picks the biggest light source among them
/// and averages the positions that share its tracking slot.
#[derive(Debug, Clone)]
pub struct PointerEstimator {
    frames: VecDeque<Vec<IrObject>>,
    window: usize,
    estimate: Option<Point>,
}

impl PointerEstimator {
    pub fn new(window: usize) -> Self {
        let window = window.clamp(1, MAX_WINDOW);
        Self {
            frames: VecDeque::with_capacity(window),
            window,
            estimate: None,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn estimate(&self) -> Option<Point> {
        self.estimate
    }

    pub fn set_window(&mut self, window: usize) {
        self.window = window.clamp(1, MAX_WINDOW);
        while self.frames.len() > self.window {
            self.frames.pop_front();
        }
    }

    pub fn grow(&mut self) {
        self.set_window(self.window + 1);
    }

    pub fn shrink(&mut self) {
        self.set_window(self.window.saturating_sub(1));
    }

    /// Adds a frame and returns the current estimate. When nothing is
    /// visible in the window the previous estimate is kept.
    pub fn push(&mut self, frame: &[IrObject]) -> Option<Point> {
        self.frames.push_back(frame.to_vec());
        while self.frames.len() > self.window {
            self.frames.pop_front();
        }

        let brightest = self
            .frames
            .iter()
            .flatten()
            .fold(None::<&IrObject>, |best, o| match best {
                Some(b) if b.size >= o.size => Some(b),
                _ => Some(o),
            });

        if let Some(brightest) = brightest {
            let (n, sx, sy) = self
                .frames
                .iter()
                .flatten()
                .filter(|o| o.id == brightest.id)
                .fold((0usize, 0.0, 0.0), |(n, sx, sy), o| {
                    (n + 1, sx + o.x as f64, sy + o.y as f64)
                });
            self.estimate = Some(Point::new(sx / n as f64, sy / n as f64));
        }
        self.estimate
    }
}

impl Component for PointerEstimator {
    type InData = Vec<IrObject>;
    type OutData = Option<Point>;

    fn convert(&mut self, input: Vec<IrObject>) -> Option<Point> {
        self.push(&input)
    }

    fn finalize(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }
}

impl fmt::Display for PointerEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointerEstimator")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(id: u8, x: u16, y: u16, size: u8) -> IrObject {
        IrObject { id, x, y, size }
    }

    #[test]
    fn averages_the_brightest_slot() {
        let mut pointer = PointerEstimator::new(4);
        assert_eq!(pointer.push(&[]), None);
        pointer.push(&[obj(0, 100, 100, 2), obj(1, 500, 500, 1)]);
        let p = pointer.push(&[obj(0, 110, 120, 3), obj(1, 520, 520, 1)]).unwrap();
        assert_eq!(p, Point::new(105.0, 110.0));
    }

    #[test]
    fn keeps_last_estimate_when_blind() {
        let mut pointer = PointerEstimator::new(1);
        pointer.push(&[obj(2, 10, 20, 1)]);
        assert_eq!(pointer.push(&[]), Some(Point::new(10.0, 20.0)));
        assert_eq!(pointer.estimate(), Some(Point::new(10.0, 20.0)));
    }

    #[test]
    fn old_frames_fall_out_of_the_window() {
        let mut pointer = PointerEstimator::new(2);
        pointer.push(&[obj(0, 0, 0, 1)]);
        pointer.push(&[obj(0, 10, 0, 1)]);
        let p = pointer.push(&[obj(0, 20, 0, 1)]).unwrap();
        assert_eq!(p, Point::new(15.0, 0.0));
    }

    #[test]
    fn window_bounds() {
        let mut pointer = PointerEstimator::new(1);
        pointer.shrink();
        assert_eq!(pointer.window(), 1);
        pointer.grow();
        assert_eq!(pointer.window(), 2);
        pointer.set_window(1000);
        assert_eq!(pointer.window(), MAX_WINDOW);
        assert_eq!(PointerEstimator::new(0).window(), 1);
    }
}
