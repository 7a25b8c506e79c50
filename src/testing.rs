//! In-memory transport for unit tests.

use crate::hid::Transport;
use crate::protocol::{self, Subsystem, MCU_PACKET_SIZE};
use crate::{Result, XrealError};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

#[derive(Default)]
struct Inner {
    inbound: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    closed: bool,
    responder: Option<Responder>,
}

/// Clones share the same queues, so a test can keep a handle after moving
/// the transport into a session.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    shared: Arc<(Mutex<Inner>, Condvar)>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every write with the packets `responder` returns.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        let transport = Self::new();
        transport.shared.0.lock().unwrap().responder = Some(Box::new(responder));
        transport
    }

    /// Make `packet` available to the next read.
    pub fn queue(&self, packet: Vec<u8>) {
        let (lock, cvar) = &*self.shared;
        lock.lock().unwrap().inbound.push_back(packet);
        cvar.notify_all();
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.0.lock().unwrap().writes.clone()
    }

    /// Message ids of every packet written so far.
    pub fn written_ids(&self, subsystem: Subsystem) -> Vec<u16> {
        self.writes()
            .iter()
            .filter_map(|w| protocol::peek_msg_id(subsystem, w))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.0.lock().unwrap().closed
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, packet: &[u8]) -> Result<usize> {
        let (lock, cvar) = &*self.shared;
        let mut guard = lock.lock().unwrap();
        let inner = &mut *guard;
        if inner.closed {
            return Err(XrealError::Closed);
        }
        inner.writes.push(packet.to_vec());
        if let Some(responder) = inner.responder.as_mut() {
            let replies = responder(packet);
            inner.inbound.extend(replies);
        }
        cvar.notify_all();
        Ok(packet.len())
    }

    fn read_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let (lock, cvar) = &*self.shared;
        let deadline = Instant::now() + timeout;
        let mut inner = lock.lock().unwrap();
        loop {
            if inner.closed {
                return Err(XrealError::Closed);
            }
            if let Some(packet) = inner.inbound.pop_front() {
                return Ok(Some(packet));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            inner = cvar.wait_timeout(inner, deadline - now).unwrap().0;
        }
    }

    fn close(&mut self) {
        let (lock, cvar) = &*self.shared;
        lock.lock().unwrap().closed = true;
        cvar.notify_all();
    }
}

/// IMU reply carrying `data`.
pub fn imu_reply(msg_id: u16, data: &[u8]) -> Vec<u8> {
    protocol::build_envelope(Subsystem::Imu, msg_id, data)
}

/// Successful MCU reply: status 0 followed by `data`, padded to a full report.
pub fn mcu_reply(msg_id: u16, data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(data.len() + 1);
    payload.push(0);
    payload.extend_from_slice(data);
    let mut packet = protocol::build_envelope(Subsystem::Controller, msg_id, &payload);
    packet.resize(MCU_PACKET_SIZE, 0);
    packet
}

/// MCU push with `data` at the start of the payload area.
pub fn mcu_push(msg_id: u16, timestamp: u64, data: &[u8]) -> Vec<u8> {
    let mut packet = protocol::encode(Subsystem::Controller, msg_id, timestamp, data);
    packet.resize(MCU_PACKET_SIZE, 0);
    packet
}

/// Message id of an outbound request.
pub fn request_id(subsystem: Subsystem, packet: &[u8]) -> u16 {
    protocol::peek_msg_id(subsystem, packet).unwrap_or(0)
}
