//! Background reader turning inbound reports into messages.
//!
//! The loop is the only writer of both reassemblers and the only source of
//! write acknowledgments. A finished read is held back for the quiescence
//! period so straggler parcels land in the right buffer; the loop keeps
//! reading during that time. Resetting the channel meanwhile starts the next
//! read but still reports the finished one.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::message::{ConfigChannel, ProtocolMessage};
use crate::protocol::constants::REPORT_BUFFER_LEN;
use crate::protocol::{InboundEvent, decode};
use crate::transfer::{ConfigReader, ConfigWriter};
use crate::transport::{TransportError, UsbTransport};

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the dispatch loop and the session handle.
#[derive(Debug)]
pub(crate) struct Shared {
    config_reader: Mutex<ConfigReader>,
    led_config_reader: Mutex<ConfigReader>,
    pub(crate) writer: ConfigWriter,
    pub(crate) closed: AtomicBool,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            config_reader: Mutex::new(ConfigReader::new(ConfigChannel::Standard.buffer_len())),
            led_config_reader: Mutex::new(ConfigReader::new(ConfigChannel::Led.buffer_len())),
            writer: ConfigWriter::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn reader(&self, channel: ConfigChannel) -> MutexGuard<'_, ConfigReader> {
        match channel {
            ConfigChannel::Standard => lock(&self.config_reader),
            ConfigChannel::Led => lock(&self.led_config_reader),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A finished read waiting out its quiet period.
#[derive(Debug)]
struct PendingRead {
    channel: ConfigChannel,
    generation: u64,
    due: Instant,
}

pub(crate) struct Dispatcher {
    pub(crate) transport: Arc<dyn UsbTransport>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) events: SyncSender<ProtocolMessage>,
    pub(crate) quiescence: Duration,
    pub(crate) poll: Duration,
}

impl Dispatcher {
    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("dongle-dispatch".into())
            .spawn(move || self.run())
    }

    fn run(self) {
        debug!("Dispatch loop started");
        let mut pending: Vec<PendingRead> = Vec::new();

        loop {
            if self.shared.is_closed() {
                break;
            }

            let timeout = pending
                .iter()
                .map(|p| p.due.saturating_duration_since(Instant::now()))
                .fold(self.poll, Duration::min)
                .max(Duration::from_millis(1));

            match self.transport.read(REPORT_BUFFER_LEN, timeout) {
                Ok(report) => {
                    trace!(len = report.len(), data = ?report, "Report received");
                    if let Some(message) = self.route(&report, &mut pending)
                        && !self.emit(message)
                    {
                        break;
                    }
                }
                Err(TransportError::Timeout { .. }) => {}
                Err(TransportError::Disconnected) => {
                    debug!("Device gone, stopping dispatch loop");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read data from usb");
                    break;
                }
            }

            if !self.flush_due(&mut pending) {
                break;
            }
        }

        info!("Dispatch loop stopped");
        // Dropping `events` closes the queue.
    }

    /// Apply one report. Returns a message that is ready immediately.
    fn route(&self, report: &[u8], pending: &mut Vec<PendingRead>) -> Option<ProtocolMessage> {
        match decode(report)? {
            InboundEvent::GamePadInfo(info) => Some(ProtocolMessage::GamePadInfo(info)),
            InboundEvent::DongleInfo(info) => Some(ProtocolMessage::DongleInfo(info)),
            InboundEvent::ConfigIdNotice => None,
            InboundEvent::Parcel {
                channel,
                seq,
                payload,
            } => {
                let mut reader = self.shared.reader(channel);
                if reader.got_parcel(seq, payload) {
                    debug!(%channel, "Read complete, waiting for stragglers");
                    pending.push(PendingRead {
                        channel,
                        generation: reader.generation(),
                        due: Instant::now() + self.quiescence,
                    });
                }
                None
            }
            InboundEvent::WriteAck { index } => {
                self.shared.writer.ack(index);
                None
            }
        }
    }

    /// Emit every read whose quiet period has passed. Returns `false` when
    /// the queue can no longer take messages.
    fn flush_due(&self, pending: &mut Vec<PendingRead>) -> bool {
        let now = Instant::now();
        let mut i = 0;
        while i < pending.len() {
            if pending[i].due > now {
                i += 1;
                continue;
            }
            let read = pending.swap_remove(i);
            let data = self
                .shared
                .reader(read.channel)
                .take_completed(read.generation);
            if let Some(data) = data
                && !self.emit(ProtocolMessage::read_complete(read.channel, data))
            {
                return false;
            }
        }
        true
    }

    /// Queue a message, waiting while the consumer is behind.
    fn emit(&self, mut message: ProtocolMessage) -> bool {
        let mut warned = false;
        loop {
            match self.events.try_send(message) {
                Ok(()) => return true,
                Err(TrySendError::Full(m)) => {
                    if self.shared.is_closed() {
                        return false;
                    }
                    if !warned {
                        warn!("Message queue full, waiting for consumer");
                        warned = true;
                    }
                    message = m;
                    thread::sleep(self.poll);
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }
}
