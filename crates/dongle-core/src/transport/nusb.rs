//! nusb-based USB transport implementation.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nusb::io::{EndpointRead, EndpointWrite};
use nusb::transfer::{In, Interrupt, Out};
use nusb::{Device, Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, trace, warn};

use super::traits::{EndpointPlan, TransportError, UsbBackend, UsbTransport};

/// Opens dongles through nusb.
#[derive(Debug, Default, Clone, Copy)]
pub struct NusbBackend;

impl UsbBackend for NusbBackend {
    type Device = Device;
    type Transport = NusbTransport;

    #[instrument(level = "info", skip(self), fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    fn find(&self, vid: u16, pid: u16) -> Result<Device, TransportError> {
        let matching: Vec<_> = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .filter(|d| d.vendor_id() == vid && d.product_id() == pid)
            .collect();

        debug!(count = matching.len(), "Found matching USB devices");

        let device_info = matching
            .into_iter()
            .next()
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        match device.active_configuration() {
            Ok(config) => debug!(
                configuration = config.configuration_value(),
                "Active configuration"
            ),
            Err(e) => warn!(error = %e, "Device reports no active configuration"),
        }

        Ok(device)
    }

    #[instrument(level = "info", skip(self, device))]
    fn claim(&self, device: Device, plan: &EndpointPlan) -> Result<NusbTransport, TransportError> {
        let interface = device
            .detach_and_claim_interface(plan.interface)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: plan.interface,
                message: e.to_string(),
            })?;

        let (out_address, out_ep) = match interface.endpoint::<Interrupt, Out>(plan.out_primary) {
            Ok(ep) => (plan.out_primary, ep),
            Err(e) => {
                debug!(
                    primary = %format!("0x{:02X}", plan.out_primary),
                    error = %e,
                    "Primary OUT endpoint unavailable, trying fallback"
                );
                let ep = interface
                    .endpoint::<Interrupt, Out>(plan.out_fallback)
                    .map_err(|_| TransportError::EndpointNotFound {
                        address: plan.out_fallback,
                        direction: "Out",
                    })?;
                (plan.out_fallback, ep)
            }
        };

        let in_ep = interface
            .endpoint::<Interrupt, In>(plan.in_endpoint)
            .map_err(|_| TransportError::EndpointNotFound {
                address: plan.in_endpoint,
                direction: "In",
            })?;

        let in_packet = in_ep.max_packet_size().max(1);
        let out_packet = out_ep.max_packet_size().max(1);

        info!(
            in_ep = %format!("0x{:02X}", plan.in_endpoint),
            out_ep = %format!("0x{:02X}", out_address),
            "Dongle opened successfully"
        );

        let (vid, pid) = {
            let desc = device.device_descriptor();
            (desc.vendor_id(), desc.product_id())
        };

        Ok(NusbTransport {
            reader: Mutex::new(Some(in_ep.reader(in_packet))),
            writer: Mutex::new(Some(out_ep.writer(out_packet))),
            handles: Mutex::new(Some((interface, device))),
            closed: AtomicBool::new(false),
            vid,
            pid,
        })
    }
}

/// nusb-based interrupt transport.
pub struct NusbTransport {
    reader: Mutex<Option<EndpointRead<Interrupt>>>,
    writer: Mutex<Option<EndpointWrite<Interrupt>>>,
    /// Held only to keep the claim alive until close.
    handles: Mutex<Option<(Interface, Device)>>,
    closed: AtomicBool,
    vid: u16,
    pid: u16,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn map_io(e: io::Error, timeout: Duration) -> TransportError {
    match e.kind() {
        io::ErrorKind::TimedOut => TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        },
        io::ErrorKind::NotConnected
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => TransportError::Disconnected,
        _ => TransportError::Io(e),
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(level = "trace", skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Disconnected);
        }
        let mut guard = lock(&self.writer);
        let writer = guard.as_mut().ok_or(TransportError::Disconnected)?;

        writer
            .write_all(data)
            .and_then(|_| writer.flush())
            .map_err(|e| match map_io(e, Duration::ZERO) {
                TransportError::Io(e) => TransportError::WriteFailed(e.to_string()),
                other => other,
            })?;

        trace!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Disconnected);
        }
        let mut guard = lock(&self.reader);
        let reader = guard.as_mut().ok_or(TransportError::Disconnected)?;
        reader.set_read_timeout(timeout);

        let mut buf = vec![0u8; max_len];
        let n = reader.read(&mut buf).map_err(|e| match map_io(e, timeout) {
            TransportError::Io(e) => TransportError::ReadFailed(e.to_string()),
            other => other,
        })?;

        buf.truncate(n);
        trace!(bytes_read = n, "Read complete");
        Ok(buf)
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Reverse acquisition order: IN, OUT, interface, device.
        lock(&self.reader).take();
        lock(&self.writer).take();
        lock(&self.handles).take();
        debug!("Transport released");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
