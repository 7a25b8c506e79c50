use crate::config::SessionConfig;
use crate::hid::Transport;
use crate::imu;
use crate::types::ImuSample;
use crate::{Result, XrealError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Handle to a running IMU sample stream.
///
/// A background thread owns the transport and decodes every sensor report
/// into the channel. When the channel is full new samples are dropped.
pub struct ImuStream {
    receiver: Receiver<ImuSample>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ImuStream {
    pub(crate) fn start<T: Transport + 'static>(transport: T, config: SessionConfig) -> Result<ImuStream> {
        let (sender, receiver) = crossbeam_channel::bounded(config.sample_capacity);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let thread = std::thread::Builder::new()
            .name("xreal-imu".into())
            .spawn(move || {
                imu_reader_loop(transport, sender, stop_clone, config.poll_interval);
            })
            .map_err(|e| XrealError::Transport(format!("Failed to spawn IMU thread: {}", e)))?;

        Ok(ImuStream {
            receiver,
            stop_flag,
            thread: Some(thread),
        })
    }

    /// Block until the reader delivers a sample.
    ///
    /// Fails with `Closed` once the reader has exited and the queue is empty.
    pub fn recv(&self) -> Result<ImuSample> {
        self.receiver.recv().map_err(|_| XrealError::Closed)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<ImuSample> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => XrealError::RecvTimeout(timeout),
            RecvTimeoutError::Disconnected => XrealError::Closed,
        })
    }

    pub fn try_recv(&self) -> Option<ImuSample> {
        self.receiver.try_recv().ok()
    }

    /// Samples already queued, oldest first. Does not block.
    pub fn try_iter(&self) -> impl Iterator<Item = ImuSample> + '_ {
        self.receiver.try_iter()
    }

    /// Discard the backlog and return the newest queued sample.
    ///
    /// For consumers that run slower than the ~1 kHz report rate and only
    /// care about the current orientation.
    pub fn latest(&self) -> Option<ImuSample> {
        self.receiver.try_iter().last()
    }

    /// Samples waiting in the queue.
    pub fn backlog(&self) -> usize {
        self.receiver.len()
    }

    /// True while the reader thread is running. Turns false after `stop`,
    /// and also when the transport closed underneath the stream.
    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
            && self.thread.as_ref().map_or(false, |t| !t.is_finished())
    }

    /// Stop the reader. The transport is closed on the reader thread before
    /// this returns.
    pub fn stop(mut self) {
        self.join_reader();
    }

    fn join_reader(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("IMU reader thread panicked");
            }
        }
    }
}

impl Drop for ImuStream {
    fn drop(&mut self) {
        self.join_reader();
    }
}

fn imu_reader_loop<T: Transport>(
    mut transport: T,
    sender: Sender<ImuSample>,
    stop_flag: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    log::info!("IMU reader started");

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            log::info!("IMU reader stopping (stop flag set)");
            break;
        }

        let report = match transport.read_timeout(poll_interval) {
            Ok(Some(report)) => report,
            Ok(None) => continue,
            Err(XrealError::Closed) => {
                log::info!("IMU transport closed, stopping reader");
                break;
            }
            Err(e) => {
                log::warn!("IMU read error: {}", e);
                continue;
            }
        };

        // Command replies and other non-sample reports are skipped.
        let Some(sample) = imu::parse_sample(&report) else {
            continue;
        };

        if let Err(e) = sender.try_send(sample) {
            match e {
                crossbeam_channel::TrySendError::Full(_) => {
                    log::trace!("IMU channel full, dropping sample");
                }
                crossbeam_channel::TrySendError::Disconnected(_) => {
                    log::info!("IMU channel disconnected, stopping reader");
                    break;
                }
            }
        }
    }

    transport.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn sample_report(timestamp_ns: u64) -> Vec<u8> {
        let mut p = vec![0u8; 64];
        p[0] = 0xAA;
        p[1] = 0x53;
        p[4..12].copy_from_slice(&timestamp_ns.to_le_bytes());
        p[14] = 1;
        p[29] = 1;
        p[47] = 1;
        p
    }

    #[test]
    fn test_stream_delivers_samples_in_order() {
        let transport = ScriptedTransport::new();
        transport.queue(sample_report(1));
        transport.queue(vec![0xAA, 0x19, 0x00]);
        transport.queue(sample_report(2));
        let handle = transport.clone();

        let stream = ImuStream::start(transport, SessionConfig::default()).unwrap();
        let first = stream.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = stream.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.timestamp_ns, 1);
        assert_eq!(second.timestamp_ns, 2);
        assert!(stream.is_active());

        stream.stop();
        assert!(handle.is_closed());
    }

    #[test]
    fn test_stream_times_out_without_data() {
        let stream = ImuStream::start(ScriptedTransport::new(), SessionConfig::default()).unwrap();
        let wait = Duration::from_millis(30);
        assert!(matches!(
            stream.recv_timeout(wait),
            Err(XrealError::RecvTimeout(d)) if d == wait
        ));
        assert!(stream.try_recv().is_none());
        assert!(stream.latest().is_none());
    }

    #[test]
    fn test_latest_skips_backlog() {
        let transport = ScriptedTransport::new();
        for ts in 1..=5 {
            transport.queue(sample_report(ts));
        }
        let stream = ImuStream::start(transport, SessionConfig::default()).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while stream.backlog() < 5 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(stream.latest().unwrap().timestamp_ns, 5);
        assert_eq!(stream.backlog(), 0);
        assert_eq!(stream.try_iter().count(), 0);
    }

    #[test]
    fn test_stream_ends_when_transport_closes() {
        let transport = ScriptedTransport::new();
        transport.queue(sample_report(9));
        let mut handle = transport.clone();
        let stream = ImuStream::start(transport, SessionConfig::default()).unwrap();

        assert_eq!(stream.recv().unwrap().timestamp_ns, 9);
        handle.close();

        assert!(matches!(stream.recv(), Err(XrealError::Closed)));
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while stream.is_active() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!stream.is_active());
    }
}
