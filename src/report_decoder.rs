//! Decoding of Wiimote input reports.
//!
//! Every datagram read from the data channel starts with the HID transaction
//! header `0xA1`, followed by the report id and its payload. Most reports
//! start with the two "core button" bytes; the accelerometer reports follow
//! them with the eight most significant bits of each axis, while the two
//! least significant bits are tucked away in otherwise unused bits of the
//! button bytes.

use nom::{
    bytes::complete::take,
    combinator::map,
    multi::count,
    number::complete::u8 as byte,
    sequence::tuple,
    IResult,
};
use serde::{Deserialize, Serialize};

use std::{borrow::Cow, fmt, str::FromStr};

/// HID header of input reports (DATA | Input).
pub const INPUT_HEADER: u8 = 0xA1;

/// Report ids the decoder knows how to read.
pub mod report_id {
    pub const STATUS: u8 = 0x20;
    pub const READ_DATA: u8 = 0x21;
    pub const ACK: u8 = 0x22;
    pub const BUTTONS: u8 = 0x30;
    pub const BUTTONS_ACCEL: u8 = 0x31;
    pub const BUTTONS_ACCEL_IR12: u8 = 0x33;
    pub const BUTTONS_ACCEL_EXT16: u8 = 0x35;
    pub const BUTTONS_ACCEL_IR10_EXT6: u8 = 0x37;
    pub const EXT21: u8 = 0x3D;
    pub const INTERLEAVED_A: u8 = 0x3E;
    pub const INTERLEAVED_B: u8 = 0x3F;
}

/// A physical button on the Wiimote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Button {
    A,
    B,
    Down,
    Home,
    Left,
    Minus,
    One,
    Plus,
    Right,
    Two,
    Up,
}

impl Button {
    /// Every button, in the order diffs are reported.
    pub const ALL: [Button; 11] = [
        Button::A,
        Button::B,
        Button::Down,
        Button::Home,
        Button::Left,
        Button::Minus,
        Button::One,
        Button::Plus,
        Button::Right,
        Button::Two,
        Button::Up,
    ];

    /// Bit of this button in `(first_byte << 8) + second_byte`.
    pub const fn mask(self) -> u16 {
        match self {
            Button::A => 0x0008,
            Button::B => 0x0004,
            Button::Down => 0x0400,
            Button::Home => 0x0080,
            Button::Left => 0x0100,
            Button::Minus => 0x0010,
            Button::One => 0x0002,
            Button::Plus => 0x1000,
            Button::Right => 0x0200,
            Button::Two => 0x0001,
            Button::Up => 0x0800,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
            Button::Down => "Down",
            Button::Home => "Home",
            Button::Left => "Left",
            Button::Minus => "Minus",
            Button::One => "One",
            Button::Plus => "Plus",
            Button::Right => "Right",
            Button::Two => "Two",
            Button::Up => "Up",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Button {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Button::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown button {:?}", s))
    }
}

/// The 16 core button bits of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonMask(pub u16);

impl ButtonMask {
    pub fn from_bytes(first: u8, second: u8) -> Self {
        Self(((first as u16) << 8) + second as u16)
    }

    pub fn is_pressed(self, button: Button) -> bool {
        self.0 & button.mask() != 0
    }

    pub fn pressed(self) -> impl Iterator<Item = Button> {
        Button::ALL.into_iter().filter(move |b| self.is_pressed(*b))
    }
}

/// Remembers the last button state so that only changes are reported.
#[derive(Debug, Clone, Default)]
pub struct ButtonTracker {
    state: ButtonMask,
}

impl ButtonTracker {
    pub fn state(&self) -> ButtonMask {
        self.state
    }

    /// Stores `new_state` and returns every `(button, is_pressed)` pair that
    /// differs from the previous state.
    pub fn update(&mut self, new_state: ButtonMask) -> Vec<(Button, bool)> {
        let diff = Button::ALL
            .into_iter()
            .filter(|b| self.state.is_pressed(*b) != new_state.is_pressed(*b))
            .map(|b| (b, new_state.is_pressed(b)))
            .collect();
        self.state = new_state;
        diff
    }
}

/// Raw 10-bit accelerometer readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Acceleration {
    pub x: u16,
    pub y: u16,
    pub z: u16,
}

impl Acceleration {
    /// Rebuilds the three axes from their high bytes and the low bits hidden
    /// in the button bytes. The bit positions match the hardware and must not
    /// be changed.
    pub fn from_parts(buttons: (u8, u8), msb: (u8, u8, u8)) -> Self {
        let (b1, b2) = buttons;
        let (x_msb, y_msb, z_msb) = msb;
        Self {
            x: ((x_msb as u16) << 2) + ((b1 & 0b0110_0000) >> 5) as u16,
            y: ((y_msb as u16) << 2) + ((b2 & 0b0010_0000) >> 4) as u16,
            z: ((z_msb as u16) << 2) + ((b2 & 0b0100_0000) >> 5) as u16,
        }
    }
}

/// One light source seen by the IR camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrObject {
    /// Tracking slot (0..4) the camera assigned to this object.
    pub id: u8,
    pub x: u16,
    pub y: u16,
    /// Rough blob size, only reported in extended mode.
    pub size: u8,
}

/// A fully decoded input report.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub id: u8,
    pub buttons: ButtonMask,
    pub acceleration: Option<Acceleration>,
    pub ir: Option<Vec<IrObject>>,
}

/// Things that can go wrong while reading a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The read returned fewer than two bytes; the device is gone.
    Disconnected,
    /// The datagram does not start with [`INPUT_HEADER`].
    UnexpectedHeader(u8),
    /// The report mode has no decoder (the interleaved 0x3e/0x3f modes and
    /// the extension-only 0x3d mode).
    Unsupported(u8),
    /// The report is shorter than its layout requires.
    Truncated { id: u8, len: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            DecodeError::Disconnected => Cow::from("short read, device disconnected"),
            DecodeError::UnexpectedHeader(h) => {
                Cow::from(format!("unexpected transaction header {:#04x}", h))
            }
            DecodeError::Unsupported(id) => {
                Cow::from(format!("data reporting mode {:#04x} not supported", id))
            }
            DecodeError::Truncated { id, len } => {
                Cow::from(format!("report {:#04x} truncated at {} bytes", id, len))
            }
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for DecodeError {}

fn parse_button_bytes(s: &[u8]) -> IResult<&[u8], (u8, u8)> {
    tuple((byte, byte))(s)
}

fn parse_acceleration(buttons: (u8, u8), s: &[u8]) -> IResult<&[u8], Acceleration> {
    map(tuple((byte, byte, byte)), |msb| {
        Acceleration::from_parts(buttons, msb)
    })(s)
}

/// Extended mode: 3 bytes per object, `x[7:0] y[7:0] y[9:8]x[9:8]size[3:0]`.
fn parse_ir_extended(s: &[u8]) -> IResult<&[u8], Vec<IrObject>> {
    map(count(tuple((byte, byte, byte)), 4), |slots| {
        slots
            .into_iter()
            .enumerate()
            .filter(|(_, slot)| *slot != (0xFF, 0xFF, 0xFF))
            .map(|(id, (x_lo, y_lo, hi))| IrObject {
                id: id as u8,
                x: x_lo as u16 | (((hi >> 4) & 0x03) as u16) << 8,
                y: y_lo as u16 | (((hi >> 6) & 0x03) as u16) << 8,
                size: hi & 0x0F,
            })
            .collect()
    })(s)
}

/// Basic mode: 5 bytes per pair of objects,
/// `x1 y1 y1[9:8]x1[9:8]y2[9:8]x2[9:8] x2 y2`.
fn parse_ir_basic(s: &[u8]) -> IResult<&[u8], Vec<IrObject>> {
    map(count(tuple((byte, byte, byte, byte, byte)), 2), |pairs| {
        let mut objects = Vec::new();
        for (pair, (x1, y1, hi, x2, y2)) in pairs.into_iter().enumerate() {
            let first = (
                x1 as u16 | (((hi >> 4) & 0x03) as u16) << 8,
                y1 as u16 | (((hi >> 6) & 0x03) as u16) << 8,
            );
            let second = (
                x2 as u16 | ((hi & 0x03) as u16) << 8,
                y2 as u16 | (((hi >> 2) & 0x03) as u16) << 8,
            );
            for (offset, (x, y)) in [first, second].into_iter().enumerate() {
                // an empty slot reads back as all ones
                if x == 0x3FF && y == 0x3FF {
                    continue;
                }
                objects.push(IrObject {
                    id: (pair * 2 + offset) as u8,
                    x,
                    y,
                    size: 0,
                });
            }
        }
        objects
    })(s)
}

fn parse_report(id: u8, s: &[u8]) -> IResult<&[u8], Report> {
    use report_id::*;

    let (s, buttons) = parse_button_bytes(s)?;
    let mut report = Report {
        id,
        buttons: ButtonMask::from_bytes(buttons.0, buttons.1),
        acceleration: None,
        ir: None,
    };
    let s = match id {
        BUTTONS_ACCEL | BUTTONS_ACCEL_EXT16 => {
            let (s, accel) = parse_acceleration(buttons, s)?;
            report.acceleration = Some(accel);
            s
        }
        BUTTONS_ACCEL_IR12 => {
            let (s, accel) = parse_acceleration(buttons, s)?;
            let (s, ir) = parse_ir_extended(s)?;
            report.acceleration = Some(accel);
            report.ir = Some(ir);
            s
        }
        BUTTONS_ACCEL_IR10_EXT6 => {
            let (s, accel) = parse_acceleration(buttons, s)?;
            let (s, ir) = parse_ir_basic(s)?;
            let (s, _ext) = take(6usize)(s)?;
            report.acceleration = Some(accel);
            report.ir = Some(ir);
            s
        }
        _ => s,
    };
    Ok((s, report))
}

/// Decodes one report, starting at its id byte.
pub fn decode_report(report: &[u8]) -> Result<Report, DecodeError> {
    use report_id::*;

    let (&id, payload) = report.split_first().ok_or(DecodeError::Disconnected)?;
    match id {
        EXT21 | INTERLEAVED_A | INTERLEAVED_B => return Err(DecodeError::Unsupported(id)),
        STATUS | READ_DATA | ACK | 0x30..=0x37 => {}
        _ => return Err(DecodeError::Unsupported(id)),
    }
    match parse_report(id, payload) {
        Ok((_rest, decoded)) => Ok(decoded),
        Err(_) => Err(DecodeError::Truncated {
            id,
            len: report.len(),
        }),
    }
}

/// Decodes a raw datagram as read from the data channel.
pub fn decode_frame(frame: &[u8]) -> Result<Report, DecodeError> {
    if frame.len() < 2 {
        return Err(DecodeError::Disconnected);
    }
    if frame[0] != INPUT_HEADER {
        return Err(DecodeError::UnexpectedHeader(frame[0]));
    }
    decode_report(&frame[1..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buttons_only() {
        let report = decode_frame(&[0xA1, 0x30, 0x00, 0x08]).unwrap();
        assert_eq!(report.id, 0x30);
        assert!(report.buttons.is_pressed(Button::A));
        assert!(!report.buttons.is_pressed(Button::B));
        assert_eq!(report.acceleration, None);
        assert_eq!(report.ir, None);

        let report = decode_frame(&[0xA1, 0x30, 0x18, 0x84]).unwrap();
        let pressed: Vec<_> = report.buttons.pressed().collect();
        assert_eq!(pressed, [Button::B, Button::Home, Button::Plus, Button::Up]);
    }

    #[test]
    fn accelerometer_low_bits_come_from_button_bytes() {
        // b1 = 0b0110_0000 -> x lsb 3, b2 = 0b0110_0000 -> y lsb 2, z lsb 2
        let report = decode_frame(&[0xA1, 0x31, 0x60, 0x60, 0x80, 0x81, 0x9A]).unwrap();
        assert_eq!(
            report.acceleration,
            Some(Acceleration {
                x: (0x80 << 2) + 3,
                y: (0x81 << 2) + 2,
                z: (0x9A << 2) + 2,
            })
        );
        // accelerometer bits are not buttons
        assert_eq!(report.buttons.pressed().count(), 0);

        let report = decode_frame(&[0xA1, 0x31, 0x00, 0x00, 0x01, 0x02, 0x03]).unwrap();
        assert_eq!(
            report.acceleration,
            Some(Acceleration { x: 4, y: 8, z: 12 })
        );
    }

    #[test]
    fn extended_ir() {
        let frame = [
            0xA1, 0x33, 0x00, 0x00, 0x80, 0x80, 0x80, // core + accel
            0x10, 0x20, 0b1001_0101, // x = 0x110, y = 0x220, size 5
            0xFF, 0xFF, 0xFF, // empty
            0xFF, 0xFF, 0xFF, // empty
            0x05, 0x06, 0b0000_0001, // x = 5, y = 6, size 1
        ];
        let report = decode_frame(&frame).unwrap();
        assert_eq!(
            report.ir,
            Some(vec![
                IrObject { id: 0, x: 0x110, y: 0x220, size: 5 },
                IrObject { id: 3, x: 5, y: 6, size: 1 },
            ])
        );
    }

    #[test]
    fn basic_ir() {
        let frame = [
            0xA1, 0x37, 0x00, 0x00, 0x80, 0x80, 0x80, // core + accel
            0x10, 0x20, 0b0101_0011, 0x30, 0x40, // (0x110, 0x120) and (0x330, 0x040)
            0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // two empty slots
            0, 0, 0, 0, 0, 0, // extension
        ];
        let report = decode_frame(&frame).unwrap();
        assert_eq!(
            report.ir,
            Some(vec![
                IrObject { id: 0, x: 0x110, y: 0x120, size: 0 },
                IrObject { id: 1, x: 0x330, y: 0x040, size: 0 },
            ])
        );
    }

    #[test]
    fn interleaved_modes_are_rejected() {
        for id in [0x3D, 0x3E, 0x3F] {
            let mut frame = vec![0xA1, id];
            frame.extend([0u8; 21]);
            assert_eq!(decode_frame(&frame), Err(DecodeError::Unsupported(id)));
        }
    }

    #[test]
    fn short_reads() {
        assert_eq!(decode_frame(&[]), Err(DecodeError::Disconnected));
        assert_eq!(decode_frame(&[0xA1]), Err(DecodeError::Disconnected));
        assert_eq!(
            decode_frame(&[0xA1, 0x31, 0x00, 0x00, 0x80]),
            Err(DecodeError::Truncated { id: 0x31, len: 4 })
        );
        assert_eq!(
            decode_frame(&[0xA2, 0x30, 0x00, 0x00]),
            Err(DecodeError::UnexpectedHeader(0xA2))
        );
    }

    #[test]
    fn tracker_reports_changes_only() {
        let mut tracker = ButtonTracker::default();
        assert_eq!(
            tracker.update(ButtonMask(Button::A.mask())),
            vec![(Button::A, true)]
        );
        assert_eq!(tracker.update(ButtonMask(Button::A.mask())), vec![]);
        assert_eq!(
            tracker.update(ButtonMask(Button::B.mask() | Button::Up.mask())),
            vec![(Button::A, false), (Button::B, true), (Button::Up, true)]
        );
        assert_eq!(tracker.state(), ButtonMask(0x0804));
    }

    #[test]
    fn button_names_round_trip() {
        for b in Button::ALL {
            assert_eq!(b.name().parse::<Button>(), Ok(b));
        }
        assert_eq!("minus".parse::<Button>(), Ok(Button::Minus));
        assert!("C".parse::<Button>().is_err());
    }
}
