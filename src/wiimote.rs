//! The device handle. A [`Wiimote`] owns a reader thread that decodes input
//! reports, keeps the latest sensor state in a [`SensorSnapshot`] and fans
//! out [`WiimoteEvent`]s to every subscriber. Output commands (LEDs, rumble,
//! report mode) are serialized through a shared commander and can be issued
//! from any thread.

use crate::commands::{CommandEncoder, CommandError, DeviceModel, UnknownModel};
use crate::config::DeviceConfig;
use crate::report_decoder::{
    decode_frame, Acceleration, Button, ButtonMask, ButtonTracker, DecodeError, IrObject, Report,
};
use crate::transport::{connect_l2cap, BdAddr, CommandSink, ReportSource, TransportError, MAX_DATAGRAM};

use log::{debug, info, warn};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, Sender},
        Arc, Mutex, PoisonError, RwLock,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// How long [`Wiimote::rumble`] shakes by default.
pub const DEFAULT_RUMBLE: Duration = Duration::from_millis(500);

/// Something that changed on the device.
#[derive(Debug, Clone, PartialEq)]
pub enum WiimoteEvent {
    /// Buttons whose state changed, with their new state.
    Buttons(Vec<(Button, bool)>),
    Acceleration(Acceleration),
    /// The objects seen by the IR camera in one report.
    Ir(Vec<IrObject>),
    /// The last event a subscriber will see.
    Disconnected,
}

/// The most recent state of every sensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSnapshot {
    pub connected: bool,
    pub buttons: ButtonMask,
    pub acceleration: Option<Acceleration>,
    pub ir: Vec<IrObject>,
    /// Id of the last decoded report.
    pub report_id: Option<u8>,
    pub reports: u64,
}

#[derive(Debug)]
pub enum WiimoteError {
    UnknownModel(UnknownModel),
    Transport(TransportError),
    Decode(DecodeError),
    Command(CommandError),
    /// LEDs are numbered 0 to 3.
    LedIndex(usize),
    AlreadyStarted,
}

impl fmt::Display for WiimoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WiimoteError::UnknownModel(e) => write!(f, "{}", e),
            WiimoteError::Transport(e) => write!(f, "transport error: {}", e),
            WiimoteError::Decode(e) => write!(f, "decode error: {}", e),
            WiimoteError::Command(e) => write!(f, "command error: {}", e),
            WiimoteError::LedIndex(i) => write!(f, "there is no LED {}, only 0 to 3", i),
            WiimoteError::AlreadyStarted => write!(f, "reader thread already started"),
        }
    }
}

impl std::error::Error for WiimoteError {}

impl From<UnknownModel> for WiimoteError {
    fn from(value: UnknownModel) -> Self {
        Self::UnknownModel(value)
    }
}

impl From<TransportError> for WiimoteError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl From<DecodeError> for WiimoteError {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<CommandError> for WiimoteError {
    fn from(value: CommandError) -> Self {
        Self::Command(value)
    }
}

/// The sending half of the device, shared by every thread that issues
/// commands.
struct Commander {
    encoder: CommandEncoder,
    sink: Box<dyn CommandSink>,
    leds: [bool; 4],
    report_mode: u8,
}

impl Commander {
    fn send(&mut self, report: &[u8]) -> Result<(), WiimoteError> {
        debug!("Sending {:02x?}", report);
        self.sink.send(report)?;
        Ok(())
    }

    fn set_leds(&mut self, leds: [bool; 4]) -> Result<(), WiimoteError> {
        let report = self.encoder.set_leds(leds);
        self.send(&report)?;
        self.leds = leds;
        Ok(())
    }

    fn set_rumble(&mut self, on: bool) -> Result<(), WiimoteError> {
        let report = self.encoder.set_rumble(on);
        self.send(&report)
    }

    fn set_report_mode(&mut self, mode: u8) -> Result<(), WiimoteError> {
        let report = self.encoder.set_report_mode(mode);
        self.send(&report)?;
        self.report_mode = mode;
        Ok(())
    }

    fn enable_ir(&mut self) -> Result<(), WiimoteError> {
        for report in self.encoder.enable_ir()? {
            self.send(&report)?;
        }
        Ok(())
    }
}

/// State the reader thread publishes into.
struct Shared {
    snapshot: RwLock<Arc<SensorSnapshot>>,
    subscribers: Mutex<Vec<Sender<WiimoteEvent>>>,
    running: AtomicBool,
}

impl Shared {
    fn snapshot(&self) -> Arc<SensorSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn swap(&self, next: SensorSnapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    /// Sends `event` to every subscriber, forgetting the ones that hung up.
    fn broadcast(&self, event: WiimoteEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn publish(&self, report: Report, tracker: &mut ButtonTracker) {
        let mut next = SensorSnapshot::clone(&self.snapshot());
        next.connected = true;
        next.buttons = report.buttons;
        next.report_id = Some(report.id);
        next.reports += 1;
        if let Some(acceleration) = report.acceleration {
            next.acceleration = Some(acceleration);
        }
        if let Some(ir) = &report.ir {
            next.ir = ir.clone();
        }
        self.swap(next);

        let diff = tracker.update(report.buttons);
        if !diff.is_empty() {
            debug!("Buttons changed: {:?}", diff);
            self.broadcast(WiimoteEvent::Buttons(diff));
        }
        if let Some(acceleration) = report.acceleration {
            self.broadcast(WiimoteEvent::Acceleration(acceleration));
        }
        if let Some(ir) = report.ir {
            self.broadcast(WiimoteEvent::Ir(ir));
        }
    }

    /// Marks the device gone, tells every subscriber and closes their
    /// channels.
    fn disconnected(&self) {
        let mut next = SensorSnapshot::clone(&self.snapshot());
        next.connected = false;
        self.swap(next);
        self.broadcast(WiimoteEvent::Disconnected);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Reads and decodes reports until the device goes away, the handle stops
/// the thread, or a report arrives that cannot be handled.
fn read_loop(mut source: Box<dyn ReportSource>, shared: Arc<Shared>) -> Result<(), WiimoteError> {
    let mut buf = [0u8; MAX_DATAGRAM];
    let mut tracker = ButtonTracker::default();

    let result = loop {
        if !shared.running.load(Ordering::Acquire) {
            info!("Reader stopped");
            break Ok(());
        }
        let len = match source.recv(&mut buf) {
            Ok(len) => len,
            Err(error) if error.is_transient() => continue,
            Err(error) => {
                warn!("Lost the Wiimote: {}", error);
                break Err(error.into());
            }
        };
        match decode_frame(&buf[..len]) {
            Ok(report) => {
                debug!("Report {:#04x}: {:?}", report.id, report);
                shared.publish(report, &mut tracker);
            }
            Err(DecodeError::Disconnected) => {
                info!("Wiimote disconnected");
                break Ok(());
            }
            Err(error @ DecodeError::Unsupported(_)) => {
                warn!("Giving up: {}", error);
                break Err(error.into());
            }
            Err(error) => warn!("Dropping report: {}", error),
        }
    };

    shared.running.store(false, Ordering::Release);
    shared.disconnected();
    result
}

/// A connected Wiimote.
///
/// Creating the handle configures the device but does not start reading;
/// subscribe first, then call [`Wiimote::start`], so that no event is
/// missed.
pub struct Wiimote {
    model: DeviceModel,
    commander: Arc<Mutex<Commander>>,
    shared: Arc<Shared>,
    source: Option<Box<dyn ReportSource>>,
    reader: Option<JoinHandle<Result<(), WiimoteError>>>,
}

impl Wiimote {
    /// Opens the L2CAP channels to the device at `addr`. `model` is the
    /// Bluetooth name of the device.
    pub fn connect(addr: BdAddr, model: &str, config: &DeviceConfig) -> Result<Self, WiimoteError> {
        let model: DeviceModel = model.parse()?;
        info!("Connecting to {} ({})", addr, model);
        let (source, sink) =
            connect_l2cap(addr, model, Duration::from_millis(config.recv_timeout_ms))?;
        Self::open(source, sink, model, config)
    }

    /// Wraps an already connected transport and sends the initial LED,
    /// IR camera and report mode commands from `config`.
    pub fn open(
        source: impl ReportSource + 'static,
        sink: impl CommandSink + 'static,
        model: DeviceModel,
        config: &DeviceConfig,
    ) -> Result<Self, WiimoteError> {
        let mut commander = Commander {
            encoder: CommandEncoder::new(model),
            sink: Box::new(sink),
            leds: [false; 4],
            report_mode: 0,
        };
        commander.set_leds(config.leds)?;
        if config.enable_ir {
            commander.enable_ir()?;
        }
        commander.set_report_mode(config.report_mode())?;

        Ok(Self {
            model,
            commander: Arc::new(Mutex::new(commander)),
            shared: Arc::new(Shared {
                snapshot: RwLock::new(Arc::new(SensorSnapshot {
                    connected: true,
                    ..Default::default()
                })),
                subscribers: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
            }),
            source: Some(Box::new(source)),
            reader: None,
        })
    }

    pub fn model(&self) -> DeviceModel {
        self.model
    }

    /// Spawns the reader thread.
    pub fn start(&mut self) -> Result<(), WiimoteError> {
        let source = self.source.take().ok_or(WiimoteError::AlreadyStarted)?;
        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        self.reader = Some(thread::spawn(move || read_loop(source, shared)));
        info!("Reading reports from {}", self.model);
        Ok(())
    }

    /// A receiver for every event from now on. The channel closes after the
    /// [`WiimoteEvent::Disconnected`] event.
    pub fn subscribe(&self) -> Receiver<WiimoteEvent> {
        let (tx, rx) = channel();
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn snapshot(&self) -> Arc<SensorSnapshot> {
        self.shared.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn with_commander<T>(
        &self,
        f: impl FnOnce(&mut Commander) -> Result<T, WiimoteError>,
    ) -> Result<T, WiimoteError> {
        let mut commander = self.commander.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut commander)
    }

    pub fn set_report_mode(&self, mode: u8) -> Result<(), WiimoteError> {
        self.with_commander(|c| c.set_report_mode(mode))
    }

    pub fn report_mode(&self) -> u8 {
        self.commander
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .report_mode
    }

    pub fn enable_ir(&self) -> Result<(), WiimoteError> {
        self.with_commander(|c| c.enable_ir())
    }

    pub fn leds(&self) -> [bool; 4] {
        self.commander
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .leds
    }

    pub fn set_leds(&self, leds: [bool; 4]) -> Result<(), WiimoteError> {
        self.with_commander(|c| c.set_leds(leds))
    }

    /// Switches a single LED, leaving the others as they are.
    pub fn set_led(&self, index: usize, on: bool) -> Result<(), WiimoteError> {
        if index >= 4 {
            return Err(WiimoteError::LedIndex(index));
        }
        self.with_commander(|c| {
            let mut leds = c.leds;
            leds[index] = on;
            c.set_leds(leds)
        })
    }

    pub fn rumble_state(&self) -> bool {
        self.commander
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .encoder
            .rumble()
    }

    pub fn set_rumble(&self, on: bool) -> Result<(), WiimoteError> {
        self.with_commander(|c| c.set_rumble(on))
    }

    /// Turns the rumble motor on and switches it off again after `length`
    /// from a short-lived thread.
    pub fn rumble_for(&self, length: Duration) -> Result<JoinHandle<()>, WiimoteError> {
        self.set_rumble(true)?;
        let commander = Arc::clone(&self.commander);
        Ok(thread::spawn(move || {
            thread::sleep(length);
            let mut commander = commander.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(error) = commander.set_rumble(false) {
                warn!("Could not stop rumbling: {}", error);
            }
        }))
    }

    pub fn rumble(&self) -> Result<JoinHandle<()>, WiimoteError> {
        self.rumble_for(DEFAULT_RUMBLE)
    }

    /// Stops the reader thread and waits for it. Returns whatever ended the
    /// thread. Subscribers see [`WiimoteEvent::Disconnected`].
    pub fn disconnect(&mut self) -> Result<(), WiimoteError> {
        self.shared.running.store(false, Ordering::Release);
        match self.reader.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => {
                    warn!("Reader thread panicked");
                    self.shared.disconnected();
                    Ok(())
                }
            },
            None => {
                // never started; the source is simply dropped
                self.source = None;
                self.shared.disconnected();
                Ok(())
            }
        }
    }
}

impl Drop for Wiimote {
    fn drop(&mut self) {
        if self.reader.is_some() {
            if let Err(error) = self.disconnect() {
                warn!("Wiimote closed with error: {}", error);
            }
        }
    }
}

impl fmt::Display for Wiimote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wiimote ({})", self.model)
    }
}
