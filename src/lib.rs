//! wiigesture turns a Wiimote into a gesture input device. The IR camera is
//! used as a pointer; holding a button draws a stroke, and releasing it
//! either classifies the stroke against a library of templates with a $1
//! recognizer, or stores it as a new template.
//!
//! The pieces, from the wire up:
//!
//! - [`transport`] moves datagrams over the Wiimote's two L2CAP channels.
//! - [`report_decoder`] and [`commands`] speak the HID report protocol.
//! - [`wiimote`] owns the reader thread and fans out [`wiimote::WiimoteEvent`]s.
//! - [`pointer`] turns IR frames into a pointer position.
//! - [`geometry`], [`normalize`] and [`recognizer`] implement the matcher.
//! - [`gesture_session`] is the capture state machine on top of all that.
//! - [`simulation`] stands in for the hardware.

pub mod args;
pub mod commands;
pub mod component;
pub mod config;
pub mod geometry;
pub mod gesture_session;
pub mod gui;
pub mod normalize;
pub mod pointer;
pub mod recognizer;
pub mod report_decoder;
pub mod simulation;
pub mod templates;
pub mod transport;
pub mod wiimote;
