//! Dongle session - public protocol handle.
//!
//! Opening a session locates the dongle, moves the competing kernel driver
//! out of the way, claims the vendor interface and starts the dispatch loop.
//! Commands are written from the caller's thread; messages arrive on a
//! bounded queue that closes when the session ends.

use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;
use crate::dispatch::{Dispatcher, Shared, lock};
use crate::driver::{DriverControl, DriverMitigation, Modprobe};
use crate::error::ProtocolError;
use crate::message::{ConfigChannel, ProtocolCommand, ProtocolMessage};
use crate::protocol::OutboundFrame;
use crate::protocol::constants::*;
use crate::transport::{NusbBackend, TransportError, UsbBackend, UsbTransport};

/// An open connection to the dongle.
pub struct Session {
    config: SessionConfig,
    transport: Arc<dyn UsbTransport>,
    shared: Arc<Shared>,
    messages: Mutex<Option<Receiver<ProtocolMessage>>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    driver_control: Arc<dyn DriverControl>,
    driver: Mutex<DriverMitigation>,
}

impl Session {
    /// Open the first matching dongle over nusb, using modprobe for driver
    /// mitigation.
    pub fn open(config: SessionConfig) -> Result<Self, ProtocolError> {
        Self::open_with(config, &NusbBackend, Arc::new(Modprobe))
    }

    /// Open with explicit USB and driver collaborators.
    #[instrument(level = "info", skip_all, fields(vid = format!("{:04X}", config.vendor_id), pid = format!("{:04X}", config.product_id)))]
    pub fn open_with<B: UsbBackend>(
        config: SessionConfig,
        backend: &B,
        driver_control: Arc<dyn DriverControl>,
    ) -> Result<Self, ProtocolError> {
        let device = backend
            .find(config.vendor_id, config.product_id)
            .map_err(|e| match e {
                TransportError::DeviceNotFound { vid, pid } => {
                    ProtocolError::DeviceNotPresent { vid, pid }
                }
                other => ProtocolError::Acquire {
                    step: "open device",
                    source: other,
                },
            })?;

        let mut driver =
            DriverMitigation::engage(driver_control.as_ref(), config.competing_driver());

        let plan = config.endpoint_plan();
        let transport: Arc<dyn UsbTransport> = match backend.claim(device, &plan) {
            Ok(t) => Arc::new(t),
            Err(e) => {
                driver.restore(driver_control.as_ref());
                return Err(match e {
                    TransportError::EndpointNotFound {
                        direction: "Out", ..
                    } => ProtocolError::EndpointUnavailable {
                        primary: plan.out_primary,
                        fallback: plan.out_fallback,
                    },
                    e @ TransportError::EndpointNotFound { .. } => ProtocolError::Acquire {
                        step: "open in endpoint",
                        source: e,
                    },
                    e => ProtocolError::Acquire {
                        step: "claim interface",
                        source: e,
                    },
                });
            }
        };

        let shared = Arc::new(Shared::new());
        let (events, messages) = mpsc::sync_channel(config.event_queue_capacity.max(1));
        let dispatcher = Dispatcher {
            transport: Arc::clone(&transport),
            shared: Arc::clone(&shared),
            events,
            quiescence: config.quiescence(),
            poll: config.read_poll(),
        };
        let handle = match dispatcher.spawn() {
            Ok(h) => h,
            Err(e) => {
                let _ = transport.close();
                driver.restore(driver_control.as_ref());
                return Err(ProtocolError::Acquire {
                    step: "start dispatch loop",
                    source: e.into(),
                });
            }
        };

        info!("Session open");

        Ok(Self {
            config,
            transport,
            shared,
            messages: Mutex::new(Some(messages)),
            dispatch: Mutex::new(Some(handle)),
            driver_control,
            driver: Mutex::new(driver),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the competing kernel driver is currently unloaded by us.
    pub fn driver_unloaded(&self) -> bool {
        lock(&self.driver).is_unloaded()
    }

    /// Take ownership of the message queue. Only the first call gets it.
    ///
    /// The receiver disconnects once the session has ended.
    pub fn take_messages(&self) -> Option<Receiver<ProtocolMessage>> {
        lock(&self.messages).take()
    }

    /// Wait up to `timeout` for the next message.
    ///
    /// Reports `Disconnected` once the session has ended or after the queue
    /// was taken with [`Session::take_messages`].
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ProtocolMessage, RecvTimeoutError> {
        match lock(&self.messages).as_ref() {
            Some(rx) => rx.recv_timeout(timeout),
            None => Err(RecvTimeoutError::Disconnected),
        }
    }

    /// Issue a command.
    ///
    /// Configuration writes block until every parcel is acknowledged or the
    /// retry budget runs out.
    #[instrument(level = "debug", skip(self))]
    pub fn send(&self, command: ProtocolCommand) -> Result<(), ProtocolError> {
        if self.shared.is_closed() {
            return Err(ProtocolError::SessionClosed);
        }

        match command {
            ProtocolCommand::GetDongleVersion => self.send_command(CMD_GET_DONGLE_VERSION, &[]),
            ProtocolCommand::GetDeviceInfo => self.send_command(CMD_GET_DEVICE_INFO, &[]),
            ProtocolCommand::ReadConfig { config_id } => {
                self.send_command(CMD_READ_CONFIG, &[config_id])
            }
            ProtocolCommand::ReadLedConfig { config_id } => {
                self.send_command(CMD_READ_LED_CONFIG, &[config_id])
            }
            ProtocolCommand::SendConfig { data, config_id } => {
                self.send_config(ConfigChannel::Standard, &data, config_id)
            }
            ProtocolCommand::SendLedConfig { data, config_id } => {
                self.send_config(ConfigChannel::Led, &data, config_id)
            }
            ProtocolCommand::Raw { code, args } => {
                if !KNOWN_COMMANDS.contains(&code) {
                    return Err(ProtocolError::UnknownCommand(code));
                }
                if !OutboundFrame::fits(&args) {
                    return Err(ProtocolError::ArgumentsTooLong { len: args.len() });
                }
                self.send_command(code, &args)
            }
        }
    }

    fn send_command(&self, code: u8, args: &[u8]) -> Result<(), ProtocolError> {
        // A new read must not complete on parcels from the previous one.
        let channel = match code {
            CMD_READ_CONFIG => Some(ConfigChannel::Standard),
            CMD_READ_LED_CONFIG => Some(ConfigChannel::Led),
            _ => None,
        };
        if let Some(channel) = channel
            && self.shared.reader(channel).reset().is_some()
        {
            debug!(%channel, "Re-read while previous result is pending");
        }

        debug!(cmd = code, args = ?args, "Sending command");
        let frame = OutboundFrame::encode(code, args, &self.config.integrity);
        self.transport.write(frame.as_bytes())?;
        Ok(())
    }

    fn send_config(
        &self,
        channel: ConfigChannel,
        data: &[u8],
        config_id: u8,
    ) -> Result<(), ProtocolError> {
        let expected = channel.buffer_len();
        if data.len() != expected {
            return Err(ProtocolError::ConfigLength {
                expected,
                actual: data.len(),
            });
        }

        let layout = match channel {
            ConfigChannel::Standard => self.config.config_layout,
            ConfigChannel::Led => self.config.led_layout,
        };
        let parcels = layout.parcels(data, config_id, &self.config.integrity)?;
        info!(%channel, config_id, parcels = parcels.len(), "Writing configuration");

        self.shared
            .writer
            .send(self.transport.as_ref(), &parcels, self.config.retry_policy())
    }

    /// End the session. Safe to call more than once and from any thread.
    pub fn close(&self) -> Result<(), ProtocolError> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Closing session");

        let result = self.transport.close();

        if let Some(handle) = lock(&self.dispatch).take()
            && handle.thread().id() != thread::current().id()
            && handle.join().is_err()
        {
            warn!("Dispatch loop panicked");
        }

        lock(&self.driver).restore(self.driver_control.as_ref());

        result.map_err(ProtocolError::from)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Error while closing session");
        }
    }
}
