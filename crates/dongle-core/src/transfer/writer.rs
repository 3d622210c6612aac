//! Acknowledged parcel transmission for configuration writes.
//!
//! The caller's thread drives [`ConfigWriter::send`]; the dispatch loop feeds
//! acknowledgments through [`ConfigWriter::ack`]. The two meet in a
//! single-slot channel: an acknowledgment is only accepted while a send is
//! waiting for exactly that parcel index, anything else is discarded.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::error::ProtocolError;
use crate::protocol::constants::{PARCEL_MAX_RETRIES, PARCEL_TIMEOUT_MS};
use crate::transport::UsbTransport;

/// Retry budget for one parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Resends after the first attempt.
    pub max_retries: u32,
    /// Acknowledgment wait per attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: PARCEL_MAX_RETRIES,
            timeout: Duration::from_millis(PARCEL_TIMEOUT_MS),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives one acknowledged write at a time.
#[derive(Debug)]
pub struct ConfigWriter {
    /// Index the in-flight send is waiting for.
    awaiting: Mutex<Option<usize>>,
    ack_tx: SyncSender<usize>,
    /// Held for the whole send, which serializes concurrent callers.
    ack_rx: Mutex<Receiver<usize>>,
}

impl Default for ConfigWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigWriter {
    pub fn new() -> Self {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        Self {
            awaiting: Mutex::new(None),
            ack_tx,
            ack_rx: Mutex::new(ack_rx),
        }
    }

    /// Hand an acknowledgment to the waiting send.
    ///
    /// Must only be called from the dispatch loop. Returns whether the
    /// acknowledgment was accepted.
    pub fn ack(&self, index: usize) -> bool {
        let mut awaiting = lock(&self.awaiting);
        match *awaiting {
            Some(expected) if expected == index => match self.ack_tx.try_send(index) {
                Ok(()) => {
                    // Further copies of this ack are strays.
                    *awaiting = None;
                    debug!(index, "Parcel acknowledged");
                    true
                }
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                    debug!(index, "Ack slot occupied, discarding duplicate");
                    false
                }
            },
            Some(expected) => {
                warn!(index, expected, "Discarding unexpected acknowledgment");
                false
            }
            None => {
                debug!(index, "Discarding acknowledgment with no write in flight");
                false
            }
        }
    }

    /// Send `parcels` in order, advancing only on acknowledgment.
    ///
    /// Blocks the calling thread. Must not be called from the dispatch loop,
    /// which is the only source of acknowledgments.
    #[instrument(level = "debug", skip(self, transport, parcels), fields(parcels = parcels.len()))]
    pub fn send<T, P>(
        &self,
        transport: &T,
        parcels: &[P],
        policy: RetryPolicy,
    ) -> Result<(), ProtocolError>
    where
        T: UsbTransport + ?Sized,
        P: AsRef<[u8]>,
    {
        let rx = lock(&self.ack_rx);
        // Drop anything left over from an abandoned send.
        while rx.try_recv().is_ok() {}

        let result = self.send_locked(&rx, transport, parcels, policy);
        *lock(&self.awaiting) = None;
        result
    }

    fn send_locked<T, P>(
        &self,
        rx: &Receiver<usize>,
        transport: &T,
        parcels: &[P],
        policy: RetryPolicy,
    ) -> Result<(), ProtocolError>
    where
        T: UsbTransport + ?Sized,
        P: AsRef<[u8]>,
    {
        for (index, parcel) in parcels.iter().enumerate() {
            let mut retries = 0u32;
            loop {
                // Arm before writing: the ack may race the write's return.
                *lock(&self.awaiting) = Some(index);
                transport.write(parcel.as_ref())?;

                if wait_for(rx, index, policy.timeout) {
                    break;
                }
                if retries >= policy.max_retries {
                    warn!(index, attempts = retries + 1, "Parcel never acknowledged");
                    return Err(ProtocolError::TransferTimeout {
                        index,
                        attempts: retries + 1,
                    });
                }
                retries += 1;
                warn!(index, retry = retries, "Parcel not acknowledged, resending");
            }
        }
        debug!("All parcels acknowledged");
        Ok(())
    }
}

/// Wait up to `timeout` for an acknowledgment of `index`.
fn wait_for(rx: &Receiver<usize>, index: usize, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(acked) if acked == index => return true,
            Ok(acked) => debug!(acked, index, "Ignoring stale acknowledgment"),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return false,
        }
    }
}
