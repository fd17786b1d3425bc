//! Concrete [`Transport`] over a physical serial port — the direct
//! analogue of the teacher's BLE connection wrapper, just over a duplex
//! byte stream instead of GATT characteristics.
//!
//! Port discovery and naming are out of scope (spec.md §1); callers name
//! the device path themselves, the way the teacher's BLE scan step is kept
//! separate from the connection it hands off to the protocol layer.

use std::io::{Read, Write};
use std::time::Duration;

use log::{debug, trace};

use crate::error::{DcError, Result};
use crate::transport::Transport;

/// Fixed per-read timeout per spec.md §5.
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

fn io_err(e: serialport::Error) -> DcError {
    DcError::IOError(std::io::Error::new(std::io::ErrorKind::Other, e))
}

pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Opens `path` at `baud`, 8 data bits / no parity / one stop bit / no
    /// flow control — a fixed configuration, since the full catalogue of
    /// per-model serial parameters is out of scope.
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(path, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()
            .map_err(io_err)?;
        debug!("opened serial port {path} at {baud} baud");
        Ok(SerialTransport { port })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        trace!("write {} bytes", buf.len());
        self.port.write_all(buf).map_err(DcError::IOError)
    }

    fn read(&mut self, out: &mut [u8]) -> Result<()> {
        match self.port.read_exact(out) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(DcError::TimeoutError),
            Err(e) => Err(DcError::IOError(e)),
        }
    }

    fn drain(&mut self) -> Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io_err)
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush().map_err(DcError::IOError)
    }

    fn set_timeout(&mut self, ms: u64) {
        if let Err(e) = self.port.set_timeout(Duration::from_millis(ms)) {
            debug!("failed to set serial timeout: {e}");
        }
    }

    fn sleep(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}
