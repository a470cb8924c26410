//! Output reports sent to the Wiimote.
//!
//! Every output report is prefixed with a SET_REPORT byte that depends on the
//! device model, and the lowest bit of its first payload byte doubles as the
//! rumble motor switch, so the current rumble state has to be OR-ed into
//! every report that goes out.

use std::{borrow::Cow, fmt, str::FromStr};

pub const RPT_LED: u8 = 0x11;
pub const RPT_REPORT_MODE: u8 = 0x12;
pub const RPT_IR_ENABLE: u8 = 0x13;
pub const RPT_STATUS_REQ: u8 = 0x15;
pub const RPT_WRITE_MEMORY: u8 = 0x16;
pub const RPT_IR_ENABLE_2: u8 = 0x1A;

const LED_BITS: [u8; 4] = [0x10, 0x20, 0x40, 0x80];

/// IR camera registers (control register address space).
const IR_REG_CONTROL: u32 = 0xB0_0030;
const IR_REG_SENSITIVITY_1: u32 = 0xB0_0000;
const IR_REG_SENSITIVITY_2: u32 = 0xB0_001A;
const IR_REG_MODE: u32 = 0xB0_0033;
const IR_MODE_EXTENDED: u8 = 0x03;
const IR_SENSITIVITY_1: [u8; 9] = [0x02, 0x00, 0x00, 0x71, 0x01, 0x00, 0xAA, 0x00, 0x64];
const IR_SENSITIVITY_2: [u8; 2] = [0x63, 0x03];

/// Which L2CAP channel output reports travel on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// PSM 17
    Control,
    /// PSM 19
    Data,
}

/// The two Wiimote revisions, told apart by their Bluetooth device name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceModel {
    /// The original Wiimote
    Classic,
    /// The Wiimote Plus, with built-in MotionPlus
    Plus,
}

pub const KNOWN_DEVICES: [&str; 2] = ["Nintendo RVL-CNT-01", "Nintendo RVL-CNT-01-TR"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModel(pub String);

impl fmt::Display for UnknownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wiimote model '{}' unknown", self.0)
    }
}

impl std::error::Error for UnknownModel {}

impl DeviceModel {
    pub fn name(self) -> &'static str {
        match self {
            DeviceModel::Classic => KNOWN_DEVICES[0],
            DeviceModel::Plus => KNOWN_DEVICES[1],
        }
    }

    pub fn set_report_command(self) -> u8 {
        match self {
            DeviceModel::Classic => 0x52,
            DeviceModel::Plus => 0xA2,
        }
    }

    pub fn send_channel(self) -> Channel {
        match self {
            DeviceModel::Classic => Channel::Control,
            DeviceModel::Plus => Channel::Data,
        }
    }
}

impl FromStr for DeviceModel {
    type Err = UnknownModel;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            name if name == KNOWN_DEVICES[0] => Ok(DeviceModel::Classic),
            name if name == KNOWN_DEVICES[1] => Ok(DeviceModel::Plus),
            other => Err(UnknownModel(other.to_owned())),
        }
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Misuse of the command builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    EmptyReport,
    /// Memory writes carry at most 16 bytes.
    WriteTooLong(usize),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            CommandError::EmptyReport => Cow::from("output report without payload"),
            CommandError::WriteTooLong(n) => {
                Cow::from(format!("memory write of {} bytes exceeds 16", n))
            }
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for CommandError {}

/// Builds output reports for one device, tracking the rumble bit.
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    model: DeviceModel,
    rumble: bool,
}

impl CommandEncoder {
    pub fn new(model: DeviceModel) -> Self {
        Self {
            model,
            rumble: false,
        }
    }

    pub fn model(&self) -> DeviceModel {
        self.model
    }

    pub fn rumble(&self) -> bool {
        self.rumble
    }

    /// `[SET_REPORT, report_id, payload...]` with the rumble bit set on the
    /// first payload byte.
    pub fn encode(&self, report_id: u8, payload: &[u8]) -> Result<Vec<u8>, CommandError> {
        let (first, rest) = payload.split_first().ok_or(CommandError::EmptyReport)?;
        Ok(self.fixed(report_id, *first, rest))
    }

    /// Non-continuous reporting in `mode`.
    pub fn set_report_mode(&self, mode: u8) -> Vec<u8> {
        self.fixed(RPT_REPORT_MODE, 0x00, &[mode])
    }

    pub fn set_leds(&self, leds: [bool; 4]) -> Vec<u8> {
        let led_byte = leds
            .iter()
            .zip(LED_BITS)
            .filter(|(on, _)| **on)
            .fold(0u8, |acc, (_, bit)| acc | bit);
        self.fixed(RPT_LED, led_byte, &[])
    }

    /// Any report carries the rumble bit, so a status request is used to
    /// flip it.
    pub fn set_rumble(&mut self, on: bool) -> Vec<u8> {
        self.rumble = on;
        self.fixed(RPT_STATUS_REQ, on as u8, &[])
    }

    pub fn request_status(&self) -> Vec<u8> {
        self.fixed(RPT_STATUS_REQ, 0x00, &[])
    }

    /// Writes up to 16 bytes into the control register space.
    pub fn write_register(&self, address: u32, data: &[u8]) -> Result<Vec<u8>, CommandError> {
        if data.len() > 16 {
            return Err(CommandError::WriteTooLong(data.len()));
        }
        let addr = address.to_be_bytes();
        let mut rest = vec![addr[1], addr[2], addr[3], data.len() as u8];
        rest.extend_from_slice(data);
        rest.resize(4 + 16, 0x00);
        Ok(self.fixed(RPT_WRITE_MEMORY, 0x04, &rest))
    }

    /// The documented start-up sequence for the IR camera, leaving it in
    /// extended mode (position and size per object).
    pub fn enable_ir(&self) -> Result<Vec<Vec<u8>>, CommandError> {
        let writes: [(u32, &[u8]); 5] = [
            (IR_REG_CONTROL, &[0x08]),
            (IR_REG_SENSITIVITY_1, &IR_SENSITIVITY_1),
            (IR_REG_SENSITIVITY_2, &IR_SENSITIVITY_2),
            (IR_REG_MODE, &[IR_MODE_EXTENDED]),
            (IR_REG_CONTROL, &[0x08]),
        ];
        let mut reports = vec![
            self.fixed(RPT_IR_ENABLE, 0x04, &[]),
            self.fixed(RPT_IR_ENABLE_2, 0x04, &[]),
        ];
        for (addr, data) in writes {
            reports.push(self.write_register(addr, data)?);
        }
        Ok(reports)
    }

    /// The first payload byte is separate so a report can never go out
    /// without one.
    fn fixed(&self, report_id: u8, first: u8, rest: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(rest.len() + 3);
        out.push(self.model.set_report_command());
        out.push(report_id);
        out.push(first | self.rumble as u8);
        out.extend_from_slice(rest);
        out
    }
}
