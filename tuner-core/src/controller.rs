//! # Capture Lifecycle
//!
//! Owns the capture worker thread and the capture state machine:
//!
//! ```text
//! Closed → Opening → Streaming → Closed
//!             ↓          ↓
//!           Failed ←─────┘   (read fault: retried after a backoff)
//! ```
//!
//! ## Threading
//! - **Worker thread**: opens the session, reads frames, runs the tuning
//!   pipeline and emits [`TunerEvent`]s.
//! - **Caller**: sends commands through [`CaptureController`]. Device,
//!   offset and stop requests travel over one channel that only the worker
//!   reads, so the worker never shares mutable configuration.
//! - **Shutdown**: bounded. The worker gets a grace period to exit, then the
//!   frame source is force-released whether or not it did.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::TunerUpdate;
use crate::audio::{AudioFrame, CaptureStream, DeviceIndex, FrameSource, StreamFormat};
use crate::config::TunerConfig;
use crate::error::TunerError;
use crate::pipeline::TuningPipeline;
use crate::tuning::TuningOffset;

/// How long an idle worker waits for a command before re-checking the run flag.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Capture session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Closed,
    Opening,
    Streaming,
    Failed,
}

/// Everything the worker reports to the renderer, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TunerEvent {
    StateChanged(CaptureState),
    Update(TunerUpdate),
    Error(TunerError),
}

#[derive(Debug)]
enum Command {
    SelectDevice(DeviceIndex),
    SetOffset(TuningOffset),
    Stop,
}

/// State visible to both sides of the thread boundary.
struct Shared {
    running: AtomicBool,
    state: Mutex<CaptureState>,
}

/// Handle to a running capture worker.
///
/// Dropping the controller shuts the worker down.
pub struct CaptureController {
    commands: Sender<Command>,
    shared: Arc<Shared>,
    source: Arc<dyn FrameSource>,
    worker: Option<JoinHandle<()>>,
    exited: Receiver<()>,
    shutdown_timeout: Duration,
}

impl CaptureController {
    /// Spawns the capture worker.
    ///
    /// With an `initial_device` the worker starts opening it right away;
    /// otherwise it stays `Closed` until [`select_device`](Self::select_device).
    ///
    /// # Arguments
    /// * `source` - Backend providing capture streams
    /// * `config` - Validated tuner configuration
    /// * `initial_device` - Device to open on start, if any
    /// * `events` - Channel the renderer reads updates from
    pub fn spawn(
        source: Arc<dyn FrameSource>,
        config: &TunerConfig,
        initial_device: Option<DeviceIndex>,
        events: Sender<TunerEvent>,
    ) -> Result<Self, TunerError> {
        config.validate()?;
        let pipeline = TuningPipeline::from_config(config)?;

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (exit_tx, exit_rx) = crossbeam_channel::bounded::<()>(1);
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            state: Mutex::new(CaptureState::Closed),
        });

        let worker_source = Arc::clone(&source);
        let worker_shared = Arc::clone(&shared);
        let format = config.stream_format();
        let offset = config.tuning.offset;
        let backoff = config.retry_backoff();

        let handle = thread::Builder::new()
            .name("capture-worker".into())
            .spawn(move || {
                // Dropped when the worker returns or unwinds.
                let _exit_signal = exit_tx;
                // Streams are not `Send`; the worker and its sessions live
                // on this thread only.
                CaptureWorker {
                    source: worker_source,
                    format,
                    pipeline,
                    offset,
                    device: initial_device,
                    session: None,
                    pending_open: initial_device.is_some(),
                    retry_at: None,
                    last_frequency: None,
                    backoff,
                    shared: worker_shared,
                    commands: command_rx,
                    events,
                }
                .run();
            })
            .map_err(|e| TunerError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            commands: command_tx,
            shared,
            source,
            worker: Some(handle),
            exited: exit_rx,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Switches capture to `device`. Re-selecting the active device is a no-op.
    pub fn select_device(&self, device: DeviceIndex) -> Result<(), TunerError> {
        self.send(Command::SelectDevice(device))
    }

    /// Changes the transposition offset.
    ///
    /// Out-of-range values are rejected here and never reach the worker.
    pub fn set_offset(&self, semitones: i32) -> Result<(), TunerError> {
        let offset = TuningOffset::new(semitones)?;
        self.send(Command::SetOffset(offset))
    }

    /// Parses raw user input and changes the offset.
    pub fn set_offset_str(&self, input: &str) -> Result<(), TunerError> {
        let offset: TuningOffset = input.parse()?;
        self.send(Command::SetOffset(offset))
    }

    pub fn state(&self) -> CaptureState {
        *self.shared.state.lock()
    }

    /// Stops the worker and releases the frame source.
    ///
    /// Returns `true` if the worker exited within the shutdown timeout.
    pub fn stop(mut self) -> bool {
        self.shutdown()
    }

    fn send(&self, command: Command) -> Result<(), TunerError> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(TunerError::WorkerStopped);
        }
        self.commands
            .send(command)
            .map_err(|_| TunerError::WorkerStopped)
    }

    fn shutdown(&mut self) -> bool {
        let Some(handle) = self.worker.take() else {
            return true;
        };

        log::info!("Stopping capture worker...");
        self.shared.running.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Stop);

        let exited = match self.exited.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    log::error!("Capture worker panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Capture worker did not exit within {:?}; abandoning it",
                    self.shutdown_timeout
                );
                false
            }
        };

        // Always force-release, even after a clean exit.
        self.source.terminate();
        exited
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One open stream. Closing happens on drop, on every exit path.
struct Session {
    device: DeviceIndex,
    stream: Box<dyn CaptureStream>,
}

impl Drop for Session {
    fn drop(&mut self) {
        match self.stream.close() {
            Ok(()) => log::info!("Closed input device {}", self.device),
            Err(e) => log::warn!("Error closing input device {}: {}", self.device, e),
        }
    }
}

struct CaptureWorker {
    source: Arc<dyn FrameSource>,
    format: StreamFormat,
    pipeline: TuningPipeline,
    offset: TuningOffset,
    device: Option<DeviceIndex>,
    session: Option<Session>,
    /// A user asked for `device` and it has not been opened yet.
    pending_open: bool,
    /// Automatic reopen after a fault, due at this instant.
    retry_at: Option<Instant>,
    /// Last frequency that cleared the noise gate.
    last_frequency: Option<f64>,
    backoff: Duration,
    shared: Arc<Shared>,
    commands: Receiver<Command>,
    events: Sender<TunerEvent>,
}

impl CaptureWorker {
    fn run(mut self) {
        log::info!("Capture worker started");

        while self.is_running() {
            if !self.drain_commands() {
                break;
            }
            if !self.is_running() {
                break;
            }
            if self.session.is_some() {
                self.read_step();
            } else if !self.idle_step() {
                break;
            }
        }

        self.close_session();
        self.shared.running.store(false, Ordering::SeqCst);
        log::info!("Capture worker finished");
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Handles queued commands. Returns `false` once the worker must stop.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if !self.handle(command) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle(&mut self, command: Command) -> bool {
        log::debug!("Capture command: {:?}", command);
        match command {
            Command::Stop => return false,
            Command::SelectDevice(device) => self.select_device(device),
            Command::SetOffset(offset) => {
                log::info!("Tuning offset set to {} semitones", offset);
                self.offset = offset;
                if let Some(frequency) = self.last_frequency {
                    let update = self.pipeline.remap(frequency, offset);
                    self.emit(TunerEvent::Update(update));
                }
            }
        }
        true
    }

    fn select_device(&mut self, device: DeviceIndex) {
        if self.device == Some(device) && (self.session.is_some() || self.pending_open) {
            log::debug!("Input device {} already selected", device);
            return;
        }
        self.close_session();
        self.device = Some(device);
        self.pending_open = true;
        self.retry_at = None;
        self.last_frequency = None;
        self.pipeline.reset();
    }

    /// No session: open one if due, otherwise wait for a command.
    fn idle_step(&mut self) -> bool {
        if self.pending_open {
            self.pending_open = false;
            self.open_session(false);
            return true;
        }

        let wait = match self.retry_at {
            Some(at) => {
                let now = Instant::now();
                if now >= at {
                    self.retry_at = None;
                    self.open_session(true);
                    return true;
                }
                at - now
            }
            None => IDLE_POLL,
        };

        match self.commands.recv_timeout(wait) {
            Ok(command) => self.handle(command),
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    fn open_session(&mut self, retrying: bool) {
        let Some(device) = self.device else {
            return;
        };
        // At most one session: the previous one is gone before opening.
        self.session = None;
        self.set_state(CaptureState::Opening);

        match self.source.open(device, &self.format) {
            Ok(stream) => {
                self.session = Some(Session { device, stream });
                self.set_state(CaptureState::Streaming);
            }
            Err(e) => {
                log::warn!("Failed to open input device {}: {}", device, e);
                self.set_state(CaptureState::Failed);
                self.emit(TunerEvent::Error(e));
                if retrying {
                    self.retry_at = Some(Instant::now() + self.backoff);
                }
            }
        }
    }

    fn read_step(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.stream.read_frame() {
            Ok(frame) => self.process(frame),
            Err(e) => {
                log::warn!(
                    "Read failed on input device {}: {}; retrying in {:?}",
                    session.device,
                    e,
                    self.backoff
                );
                self.session = None;
                self.set_state(CaptureState::Failed);
                self.emit(TunerEvent::Update(TunerUpdate::device_error()));
                self.emit(TunerEvent::Error(e));
                self.retry_at = Some(Instant::now() + self.backoff);
            }
        }
    }

    fn process(&mut self, frame: AudioFrame) {
        let update = self.pipeline.process(frame, self.offset);
        if update.reading.valid {
            self.last_frequency = Some(update.reading.frequency_hz);
        }
        self.emit(TunerEvent::Update(update));
    }

    fn close_session(&mut self) {
        if self.session.take().is_some() {
            self.set_state(CaptureState::Closed);
        } else if self.state() == CaptureState::Failed {
            self.set_state(CaptureState::Closed);
        }
    }

    fn state(&self) -> CaptureState {
        *self.shared.state.lock()
    }

    fn set_state(&mut self, state: CaptureState) {
        {
            let mut current = self.shared.state.lock();
            if *current == state {
                return;
            }
            log::debug!("Capture state {:?} -> {:?}", *current, state);
            *current = state;
        }
        self.emit(TunerEvent::StateChanged(state));
    }

    fn emit(&mut self, event: TunerEvent) {
        if self.events.send(event).is_err() {
            log::warn!("Event receiver dropped; stopping capture worker");
            self.shared.running.store(false, Ordering::SeqCst);
        }
    }
}
