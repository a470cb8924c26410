// Commandline argument parser using clap for wiigesture

use crate::commands::KNOWN_DEVICES;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct GestureArgs {
    #[command(subcommand)]
    /// Where the reports come from, a real Wiimote or a simulated one
    pub command: CommandTask,

    /// RON config file; built-in defaults are used when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log results instead of showing the terminal status view
    #[arg(long)]
    pub headless: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Connect to a Wiimote over Bluetooth
    #[command(about)]
    Connect(ConnectCommand),

    /// Draw the built-in shapes with a simulated Wiimote
    #[command(about)]
    Simulate(SimulateCommand),
}

#[derive(Debug, Args, Clone)]
pub struct ConnectCommand {
    /// Bluetooth address of the Wiimote, like 00:1F:32:AB:CD:EF
    pub btaddr: String,

    /// Bluetooth name of the device, which selects the protocol variant
    #[arg(short, long, default_value = KNOWN_DEVICES[0])]
    pub model: String,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateCommand {
    /// Reports per second, 0 for as fast as possible
    #[arg(short, long)]
    pub rate: Option<f64>,

    /// Pointer jitter in camera pixels
    #[arg(short, long)]
    pub noise: Option<f64>,

    /// Stop after this many gestures
    #[arg(short, long)]
    pub gestures: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_defaults_to_the_classic_model() {
        let args = GestureArgs::parse_from(["wiigesture", "connect", "00:1F:32:AB:CD:EF"]);
        assert!(!args.headless);
        assert_eq!(args.config, None);
        match args.command {
            CommandTask::Connect(c) => {
                assert_eq!(c.btaddr, "00:1F:32:AB:CD:EF");
                assert_eq!(c.model, "Nintendo RVL-CNT-01");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn simulate_overrides() {
        let args = GestureArgs::parse_from([
            "wiigesture",
            "--headless",
            "--config",
            "gestures.ron",
            "simulate",
            "--rate",
            "0",
            "-g",
            "3",
        ]);
        assert!(args.headless);
        assert_eq!(args.config, Some(PathBuf::from("gestures.ron")));
        match args.command {
            CommandTask::Simulate(s) => {
                assert_eq!(s.rate, Some(0.0));
                assert_eq!(s.noise, None);
                assert_eq!(s.gestures, Some(3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn connect_needs_an_address() {
        assert!(GestureArgs::try_parse_from(["wiigesture", "connect"]).is_err());
    }
}
