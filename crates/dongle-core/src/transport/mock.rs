//! Mock USB transport for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::traits::{EndpointPlan, TransportError, UsbBackend, UsbTransport};
use crate::protocol::constants::{XINPUT_PRODUCT_ID, XINPUT_VENDOR_ID};

/// Produces device reports in reaction to a host write.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock transport for exercising the session without hardware.
///
/// Clones share state, so a test can keep a handle after giving one to a
/// session.
#[derive(Clone)]
pub struct MockTransport {
    /// Reports waiting to be read.
    report_tx: Sender<Vec<u8>>,
    report_rx: Arc<Mutex<Receiver<Vec<u8>>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Scripted device behaviour.
    responder: Arc<Mutex<Option<Responder>>>,
    /// Whether device is "connected".
    connected: Arc<AtomicBool>,
    /// Number of times resources were actually released.
    releases: Arc<AtomicUsize>,
    vid: u16,
    pid: u16,
}

impl MockTransport {
    pub fn new() -> Self {
        let (report_tx, report_rx) = mpsc::channel();
        Self {
            report_tx,
            report_rx: Arc::new(Mutex::new(report_rx)),
            write_log: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(true)),
            releases: Arc::new(AtomicUsize::new(0)),
            vid: XINPUT_VENDOR_ID,
            pid: XINPUT_PRODUCT_ID,
        }
    }

    /// Queue a report to be returned on a later read.
    pub fn queue_report(&self, report: &[u8]) {
        // The receiver lives as long as self.
        let _ = self.report_tx.send(report.to_vec());
    }

    /// React to every write with the reports `responder` returns.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        *lock(&self.responder) = Some(Box::new(responder));
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        lock(&self.write_log).clone()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        lock(&self.write_log).clear();
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// How many times `close` released resources.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::Acquire)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        lock(&self.write_log).push(data.to_vec());

        let replies = match lock(&self.responder).as_mut() {
            Some(responder) => responder(data),
            None => Vec::new(),
        };
        for reply in replies {
            self.queue_report(&reply);
        }
        Ok(data.len())
    }

    fn read(&self, _max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        // Wake up periodically so a disconnect is noticed mid-wait.
        let step = Duration::from_millis(10).min(timeout);
        let mut waited = Duration::ZERO;
        let rx = lock(&self.report_rx);
        loop {
            match rx.recv_timeout(step) {
                Ok(report) => return Ok(report),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Disconnected),
                Err(RecvTimeoutError::Timeout) => {
                    if !self.is_connected() {
                        return Err(TransportError::Disconnected);
                    }
                    waited += step;
                    if waited >= timeout {
                        return Err(TransportError::Timeout {
                            timeout_ms: timeout.as_millis() as u64,
                        });
                    }
                }
            }
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.releases.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

/// Backend handing out pre-built mock transports.
#[derive(Default)]
pub struct MockBackend {
    devices: Mutex<VecDeque<MockTransport>>,
    /// Pretend neither OUT endpoint exists.
    pub missing_out_endpoint: bool,
    claims: AtomicUsize,
}

impl MockBackend {
    pub fn new(transport: MockTransport) -> Self {
        Self {
            devices: Mutex::new(VecDeque::from([transport])),
            ..Self::default()
        }
    }

    /// A backend that enumerates no devices.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of successful claims.
    pub fn claim_count(&self) -> usize {
        self.claims.load(Ordering::Acquire)
    }
}

impl UsbBackend for MockBackend {
    type Device = MockTransport;
    type Transport = MockTransport;

    fn find(&self, vid: u16, pid: u16) -> Result<MockTransport, TransportError> {
        lock(&self.devices)
            .pop_front()
            .ok_or(TransportError::DeviceNotFound { vid, pid })
    }

    fn claim(
        &self,
        device: MockTransport,
        plan: &EndpointPlan,
    ) -> Result<MockTransport, TransportError> {
        if self.missing_out_endpoint {
            return Err(TransportError::EndpointNotFound {
                address: plan.out_fallback,
                direction: "Out",
            });
        }
        self.claims.fetch_add(1, Ordering::AcqRel);
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_report_queue() {
        let mock = MockTransport::new();
        mock.queue_report(&[1, 2]);
        mock.queue_report(&[3]);

        let timeout = Duration::from_millis(20);
        assert_eq!(mock.read(100, timeout).unwrap(), vec![1, 2]);
        assert_eq!(mock.read(100, timeout).unwrap(), vec![3]);

        // Queue is empty now
        assert!(matches!(
            mock.read(100, timeout),
            Err(TransportError::Timeout { .. })
        ));
    }

    #[test]
    fn test_mock_write_capture() {
        let mock = MockTransport::new();
        mock.write(b"Hello").unwrap();
        mock.write(b"World").unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(writes[1], b"World");
    }

    #[test]
    fn test_mock_responder() {
        let mock = MockTransport::new();
        mock.set_responder(|data| vec![data.iter().rev().copied().collect()]);
        mock.write(&[1, 2, 3]).unwrap();
        assert_eq!(
            mock.read(100, Duration::from_millis(20)).unwrap(),
            vec![3, 2, 1]
        );
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.disconnect();
        assert!(!mock.is_connected());
        assert!(mock.write(b"test").is_err());
        assert!(matches!(
            mock.read(100, Duration::from_millis(5)),
            Err(TransportError::Disconnected)
        ));
    }

    #[test]
    fn test_mock_close_releases_once() {
        let mock = MockTransport::new();
        mock.close().unwrap();
        mock.close().unwrap();
        assert_eq!(mock.release_count(), 1);
    }
}
