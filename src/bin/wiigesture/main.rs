//! Recognizes gestures drawn with a Wiimote's IR pointer.

use clap::Parser;
use log::{error, info, warn};
use std::{error::Error, sync::mpsc::channel, time::Duration};
use wiigesture::{
    args::{CommandTask, GestureArgs},
    commands::DeviceModel,
    component::run_component,
    config::AppConfig,
    gesture_session::{GestureOutcome, GestureSession, GestureTracker},
    gui::run_session_view,
    pointer::PointerEstimator,
    recognizer::Recognizer,
    simulation::SimulatedWiimote,
    transport::BdAddr,
    wiimote::Wiimote,
};

// Example:
// RUST_LOG=info cargo run -- --headless simulate --rate 200 --gestures 6
// cargo run -- --config gestures.ron connect 00:1F:32:AB:CD:EF

const FEEDBACK_RUMBLE: Duration = Duration::from_millis(100);

fn main() {
    env_logger::init();
    let args = GestureArgs::parse();

    if let Err(e) = run(args) {
        error!("{}", e);
        eprintln!("wiigesture: {}", e);
        std::process::exit(1);
    }
}

fn run(args: GestureArgs) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    let mut wiimote = match args.command {
        CommandTask::Connect(connect) => {
            let addr: BdAddr = connect.btaddr.parse()?;
            Wiimote::connect(addr, &connect.model, &config.device)?
        }
        CommandTask::Simulate(simulate) => {
            let sim = &mut config.simulation;
            sim.report_rate = simulate.rate.unwrap_or(sim.report_rate);
            sim.noise = simulate.noise.unwrap_or(sim.noise);
            sim.gestures = simulate.gestures.or(sim.gestures);
            config.validate()?;

            let (device, sink) =
                SimulatedWiimote::new(config.simulation.clone(), config.capture.recognize_button)?;
            info!("Simulating {}", device.schedule().join(", "));
            Wiimote::open(device, sink, DeviceModel::Plus, &config.device)?
        }
    };

    let recognizer = Recognizer::with_builtin_templates(config.recognizer.clone())?;
    let templates: Vec<String> = recognizer
        .templates()
        .iter()
        .map(|t| t.name().to_owned())
        .collect();
    let tracker = GestureTracker::new(
        GestureSession::new(recognizer, &config.capture),
        PointerEstimator::new(config.capture.pointer_window),
    );

    let events = wiimote.subscribe();
    let (update_tx, update_rx) = channel();
    let tracker_handle = run_component(Box::new(tracker), events, update_tx);
    wiimote.start()?;
    info!(
        "Hold {} to recognize a gesture, {} to record a new template",
        config.capture.recognize_button, config.capture.record_button
    );

    if args.headless {
        for update in update_rx.iter() {
            if let Some(outcome) = &update.outcome {
                println!("{}", outcome);
                if let GestureOutcome::Recognized(_) = outcome {
                    if let Err(e) = wiimote.rumble_for(FEEDBACK_RUMBLE) {
                        warn!("No rumble feedback: {}", e);
                    }
                }
            }
        }
    } else {
        let state = run_session_view(update_rx, || wiimote.snapshot(), templates)?;
        for line in state.history.iter().rev() {
            println!("{}", line);
        }
    }

    wiimote.disconnect()?;
    tracker_handle
        .join()
        .map_err(|_| "gesture tracker thread panicked")?;
    Ok(())
}
