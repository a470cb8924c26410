//! Defines the Component trait, used by the stages that sit between the
//! Wiimote's event stream and whatever displays the results. Each stage
//! consumes data from a channel, processes it, and passes new data on to the
//! next stage.

use log::{info, warn};
use std::fmt;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

#[derive(Debug)]
pub enum ComponentError {
    /// The input ended while a gesture was still being drawn; the stroke
    /// with this many points was thrown away.
    UnfinishedGesture(usize),
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentError::UnfinishedGesture(n) => {
                write!(f, "input ended mid-gesture, dropped {} points", n)
            }
        }
    }
}

impl std::error::Error for ComponentError {}

///
/// A processing stage. Anything that turns one kind of stream item into
/// another implements Component, so that it can be run on its own thread
/// with [`run_component`].
///
pub trait Component: fmt::Display {
    type InData;
    type OutData;

    /// Converts an input of type A into an output of type B
    fn convert(&mut self, input: Self::InData) -> Self::OutData;

    /// Cleans up once the input channel has closed
    fn finalize(&mut self) -> Result<(), ComponentError>;
}

/// Runs the given Component on its own thread. On receiving data of type
/// InData on the input channel, the Component converts them to data of type
/// OutData and sends it to the output channel. The thread ends when the
/// input channel closes.
pub fn run_component<C: Component + Send + 'static>(
    mut component: Box<C>,
    input: Receiver<<C as Component>::InData>,
    output: Sender<<C as Component>::OutData>,
) -> JoinHandle<()>
where
    <C as Component>::InData: Send + 'static,
    <C as Component>::OutData: Send + 'static,
{
    thread::spawn(move || {
        while let Ok(data) = input.recv() {
            let out_data = component.convert(data);
            if let Err(error) = output.send(out_data) {
                warn!("{} : received error {}.", component, error);
            }
        }

        if let Err(component_error) = component.finalize() {
            warn!("{} : error during terminating : {}.", component, component_error);
        }
        info!("{} : terminated.", component);
    })
}
