use crate::config::SessionConfig;
use crate::device;
use crate::engine;
use crate::hid::Transport;
use crate::protocol::{self, *};
use crate::types::{ControllerEvent, ControllerState, EventKind, FirmwareVersions};
use crate::{Result, XrealError};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// -- Virtual keys reported by MCU_MSG_P_BUTTON_PRESSED --
const KEY_DISPLAY_TOGGLE: u8 = 0x1;
const KEY_BRIGHTNESS_UP: u8 = 0x6;
const KEY_BRIGHTNESS_DOWN: u8 = 0x7;
const KEY_VOLUME_UP: u8 = 0x8;
const KEY_VOLUME_DOWN: u8 = 0x9;
const KEY_DISPLAY_MODE_2D: u8 = 0xA;
const KEY_DISPLAY_MODE_3D: u8 = 0xB;
const KEY_BLEND_CYCLE: u8 = 0xC;
const KEY_CONTROL_TOGGLE: u8 = 0xF;

/// Decode an MCU push and apply it to `state`.
///
/// The checksum is not verified on this path. Returns `None` for short or
/// foreign reports and for heartbeats.
pub fn decode_push(state: &mut ControllerState, packet: &[u8]) -> Option<ControllerEvent> {
    if packet.len() < MCU_PACKET_SIZE || packet[0] != MCU_HEAD {
        return None;
    }
    let msg_id = protocol::peek_msg_id(Subsystem::Controller, packet)?;
    let timestamp = protocol::push_timestamp(packet);
    let data = &packet[Subsystem::Controller.header_len()..];

    let kind = match msg_id {
        MCU_MSG_P_START_HEARTBEAT | MCU_MSG_P_END_HEARTBEAT => {
            log::trace!("MCU heartbeat 0x{:04x}", msg_id);
            return None;
        }
        MCU_MSG_P_DISPLAY_TOGGLED => {
            state.active = data[0] != 0;
            screen_event(state.active)
        }
        MCU_MSG_P_BUTTON_PRESSED => {
            let key = data[4];
            let value = data[8];
            match key {
                KEY_DISPLAY_TOGGLE => {
                    state.active = value != 0;
                    screen_event(state.active)
                }
                KEY_BRIGHTNESS_UP => {
                    state.brightness = value;
                    EventKind::BrightnessUp
                }
                KEY_BRIGHTNESS_DOWN => {
                    state.brightness = value;
                    EventKind::BrightnessDown
                }
                KEY_VOLUME_UP => EventKind::VolumeUp,
                KEY_VOLUME_DOWN => EventKind::VolumeDown,
                KEY_DISPLAY_MODE_2D => EventKind::DisplayMode2d,
                KEY_DISPLAY_MODE_3D => EventKind::DisplayMode3d,
                KEY_BLEND_CYCLE => EventKind::BlendCycle,
                KEY_CONTROL_TOGGLE => EventKind::ControlToggle,
                other => {
                    log::debug!("Unknown MCU key 0x{:02x} (value {})", other, value);
                    EventKind::Unknown(msg_id)
                }
            }
        }
        MCU_MSG_P_ASYNC_TEXT_LOG => EventKind::Message(protocol::extract_string(data)),
        other => {
            log::debug!("Unknown MCU push 0x{:04x}", other);
            EventKind::Unknown(other)
        }
    };

    Some(ControllerEvent {
        timestamp,
        brightness: state.brightness,
        kind,
    })
}

fn screen_event(active: bool) -> EventKind {
    if active {
        EventKind::ScreenOn
    } else {
        EventKind::ScreenOff
    }
}

/// State update performed by the worker when a reply succeeds.
#[derive(Debug, Clone, Copy)]
enum Apply {
    Nothing,
    Brightness,
    DisplayMode,
    DisplayModeWritten(u8),
}

struct Request {
    msg_id: u16,
    payload: Vec<u8>,
    expected_len: usize,
    apply: Apply,
    reply: Sender<Result<Vec<u8>>>,
}

enum Command {
    Request(Request),
    State(Sender<ControllerState>),
}

struct Pending {
    request: Request,
    deadline: Instant,
}

/// Owns the transport and every mutable controller field.
///
/// Replies go to the single pending request, pushes to the event channel.
struct Worker<T: Transport> {
    transport: T,
    state: ControllerState,
    commands: Receiver<Command>,
    events: Sender<ControllerEvent>,
    stop_flag: Arc<AtomicBool>,
    queue: VecDeque<Request>,
    pending: Option<Pending>,
    config: SessionConfig,
}

impl<T: Transport> Worker<T> {
    fn run(mut self) {
        if let Ok(Some(stale)) = self.transport.read_timeout(self.config.flush_timeout) {
            log::debug!("Flushed stale {} byte MCU report", stale.len());
        }
        log::info!("MCU worker started");

        loop {
            if self.stop_flag.load(Ordering::Relaxed) {
                log::info!("MCU worker stopping (stop flag set)");
                break;
            }
            if !self.drain_commands() {
                log::info!("MCU session dropped, stopping worker");
                break;
            }
            self.start_next();

            let wait = match &self.pending {
                Some(p) => p
                    .deadline
                    .saturating_duration_since(Instant::now())
                    .min(self.config.poll_interval),
                None => self.config.poll_interval,
            };

            match self.transport.read_timeout(wait) {
                Ok(Some(packet)) => self.route(&packet),
                Ok(None) => {}
                Err(XrealError::Closed) => {
                    log::info!("MCU transport closed, stopping worker");
                    break;
                }
                Err(e) => {
                    log::warn!("MCU read error: {}", e);
                    if let Some(pending) = self.pending.take() {
                        let _ = pending.request.reply.send(Err(e));
                    }
                    std::thread::sleep(self.config.poll_interval);
                }
            }

            self.expire();
        }

        self.shutdown();
    }

    /// Returns false once the session handle is gone.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(Command::Request(request)) => self.queue.push_back(request),
                Ok(Command::State(reply)) => {
                    let _ = reply.send(self.state);
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn start_next(&mut self) {
        while self.pending.is_none() {
            let Some(request) = self.queue.pop_front() else {
                return;
            };
            let packet =
                protocol::build_envelope(Subsystem::Controller, request.msg_id, &request.payload);
            match self.transport.write(&packet) {
                Ok(_) => {
                    log::debug!("MCU request 0x{:04x}", request.msg_id);
                    self.pending = Some(Pending {
                        request,
                        deadline: Instant::now() + self.config.request_timeout,
                    });
                }
                Err(e) => {
                    let _ = request.reply.send(Err(e));
                }
            }
        }
    }

    fn route(&mut self, packet: &[u8]) {
        let is_push = protocol::peek_msg_id(Subsystem::Controller, packet)
            .map_or(false, protocol::is_push_message);

        if !is_push {
            if let Some(pending) = self.pending.take() {
                let request = pending.request;
                let result = engine::accept_reply(
                    Subsystem::Controller,
                    packet,
                    request.msg_id,
                    request.expected_len,
                );
                self.complete(request, result);
                return;
            }
        }

        if let Some(event) = decode_push(&mut self.state, packet) {
            if self.events.send(event).is_err() {
                log::trace!("MCU event receiver gone, dropping event");
            }
        }
    }

    fn complete(&mut self, request: Request, result: Result<Vec<u8>>) {
        if let Ok(data) = &result {
            match request.apply {
                Apply::Nothing => {}
                Apply::Brightness => self.state.brightness = data[0],
                Apply::DisplayMode => self.state.display_mode = data[0],
                Apply::DisplayModeWritten(mode) => self.state.display_mode = mode,
            }
        }
        let _ = request.reply.send(result);
    }

    fn expire(&mut self) {
        let expired = self
            .pending
            .as_ref()
            .map_or(false, |p| Instant::now() >= p.deadline);
        if expired {
            if let Some(pending) = self.pending.take() {
                let msg_id = pending.request.msg_id;
                log::debug!("MCU request 0x{:04x} timed out", msg_id);
                let _ = pending.request.reply.send(Err(XrealError::Timeout(msg_id)));
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(pending) = self.pending.take() {
            let _ = pending.request.reply.send(Err(XrealError::Closed));
        }
        for request in self.queue.drain(..) {
            let _ = request.reply.send(Err(XrealError::Closed));
        }
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Request(request) = command {
                let _ = request.reply.send(Err(XrealError::Closed));
            }
        }
        self.transport.close();
    }
}

/// An opened MCU interface.
///
/// A worker thread owns the transport. Queries block the caller until the
/// worker has the reply; pushes that arrive in the meantime are still decoded
/// and queued as [`ControllerEvent`]s.
pub struct ControllerSession {
    commands: Sender<Command>,
    events: Receiver<ControllerEvent>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
    versions: FirmwareVersions,
}

impl ControllerSession {
    /// Open the MCU interface of the first connected glasses.
    pub fn open_first() -> Result<Self> {
        let (transport, _) = device::open_subsystem(Subsystem::Controller)?;
        Self::open(transport, SessionConfig::default())
    }

    /// Start the worker on `transport` and run the open sequence.
    ///
    /// Any failure during open is fatal and closes the transport.
    pub fn open<T: Transport + 'static>(transport: T, config: SessionConfig) -> Result<Self> {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let stop_flag = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            transport,
            state: ControllerState::default(),
            commands: command_rx,
            events: event_tx,
            stop_flag: stop_flag.clone(),
            queue: VecDeque::new(),
            pending: None,
            config,
        };
        let thread = std::thread::Builder::new()
            .name("xreal-mcu".into())
            .spawn(move || worker.run())
            .map_err(|e| XrealError::Transport(format!("Failed to spawn MCU thread: {}", e)))?;

        let mut session = ControllerSession {
            commands: command_tx,
            events: event_rx,
            stop_flag,
            thread: Some(thread),
            versions: FirmwareVersions::default(),
        };
        session.initialize()?;

        log::info!(
            "Opened MCU: fw={} dp={} dsp={}",
            session.versions.mcu,
            session.versions.dp,
            session.versions.dsp
        );
        Ok(session)
    }

    fn initialize(&mut self) -> Result<()> {
        self.request(MCU_MSG_R_ACTIVATION_TIME, &[], 1)?;

        self.versions = FirmwareVersions {
            mcu: self.read_version(MCU_MSG_R_MCU_APP_FW_VERSION)?,
            dp: self.read_version(MCU_MSG_R_DP7911_FW_VERSION)?,
            dsp: self.read_version(MCU_MSG_R_DSP_APP_FW_VERSION)?,
        };

        self.read_brightness()?;
        self.poll_display_mode()?;
        Ok(())
    }

    fn read_version(&self, msg_id: u16) -> Result<String> {
        let data = self.request(msg_id, &[], MCU_VERSION_LEN)?;
        Ok(protocol::extract_string(&data))
    }

    fn submit(&self, msg_id: u16, payload: &[u8], expected_len: usize, apply: Apply) -> Result<Vec<u8>> {
        protocol::check_payload(Subsystem::Controller, msg_id, payload, MCU_PACKET_SIZE)?;
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(Command::Request(Request {
                msg_id,
                payload: payload.to_vec(),
                expected_len,
                apply,
                reply: reply_tx,
            }))
            .map_err(|_| XrealError::Closed)?;
        reply_rx.recv().map_err(|_| XrealError::Closed)?
    }

    /// Send a raw MCU request and return `expected_len` bytes of reply data.
    pub fn request(&self, msg_id: u16, payload: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        self.submit(msg_id, payload, expected_len, Apply::Nothing)
    }

    /// Read brightness from the device and cache it.
    pub fn read_brightness(&self) -> Result<u8> {
        let data = self.submit(MCU_MSG_R_BRIGHTNESS, &[], 1, Apply::Brightness)?;
        Ok(data[0])
    }

    /// Read the display mode from the device and cache it.
    pub fn poll_display_mode(&self) -> Result<u8> {
        let data = self.submit(MCU_MSG_R_DISP_MODE, &[], 1, Apply::DisplayMode)?;
        Ok(data[0])
    }

    /// Write the display mode. The cached mode follows once the MCU acknowledges.
    pub fn update_display_mode(&self, mode: u8) -> Result<()> {
        self.submit(MCU_MSG_W_DISP_MODE, &[mode], 0, Apply::DisplayModeWritten(mode))?;
        Ok(())
    }

    /// Snapshot of the cached brightness, display mode and active flag.
    pub fn state(&self) -> Result<ControllerState> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(Command::State(reply_tx))
            .map_err(|_| XrealError::Closed)?;
        reply_rx.recv().map_err(|_| XrealError::Closed)
    }

    pub fn versions(&self) -> &FirmwareVersions {
        &self.versions
    }

    /// The push event channel, for use with `crossbeam_channel::select!`.
    pub fn events(&self) -> &Receiver<ControllerEvent> {
        &self.events
    }

    /// Receive the next event (blocks until available).
    pub fn recv_event(&self) -> Result<ControllerEvent> {
        self.events.recv().map_err(|_| XrealError::Closed)
    }

    pub fn try_recv_event(&self) -> Option<ControllerEvent> {
        self.events.try_recv().ok()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Result<ControllerEvent> {
        self.events.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => XrealError::RecvTimeout(timeout),
            crossbeam_channel::RecvTimeoutError::Disconnected => XrealError::Closed,
        })
    }

    /// Stop the worker and release the transport.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ControllerSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
