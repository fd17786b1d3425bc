//! The Session API from spec.md §6: the live association between one
//! connected device and its transport, dispatching over [`Family`] instead
//! of a backend dispatch table.

use log::info;

use crate::error::{DcError, Result};
use crate::family_a::{extract_family_a, read_memory_a};
use crate::family_b::{extract_family_b, read_memory_b};
use crate::framing::{AdditiveFraming, XorFraming, ADDITIVE_HANDSHAKE};
use crate::layout::Family;
use crate::transfer::Transfer;
use crate::transport::Transport;

const FAMILY_A_HANDSHAKE: [u8; 3] = [0xA8, 0x99, 0x00];
const FAMILY_B_VERSION: [u8; 4] = [0x0F, 0x00, 0x00, 0x0F];

/// Owns a transport and an immutable layout; holds the fingerprint used for
/// incremental downloads (empty disables incremental mode). Lifecycle:
/// `open` → (`version`, zero or more `dump`/`foreach`) → `close`.
pub struct DeviceSession<T: Transport> {
    transport: T,
    family: Family,
    fingerprint: Vec<u8>,
}

impl<T: Transport> DeviceSession<T> {
    /// Opens a session over an already-configured transport. Family A
    /// devices require the `A8 99 00` handshake to ack with `0xA5` before
    /// anything else will respond; Family B has no handshake in the wire
    /// protocol table, so opening it is just taking ownership.
    pub fn open(mut transport: T, family: Family) -> Result<Self> {
        if let Family::OceanicLike(_) = family {
            let mut transfer = Transfer::new(&mut transport, AdditiveFraming);
            let payload = transfer.transfer_handshake(&FAMILY_A_HANDSHAKE, 3, 1)?;
            if payload.first() != Some(&ADDITIVE_HANDSHAKE) {
                return Err(DcError::ProtocolError(
                    "handshake response byte was not 0xA5".into(),
                ));
            }
        }
        info!("device session opened");
        Ok(DeviceSession {
            transport,
            family,
            fingerprint: Vec::new(),
        })
    }

    /// Empty/all-zero disables incremental mode. An all-zero fingerprint is
    /// normalized to empty here so the extractors' `!fingerprint.is_empty()`
    /// check is the only place that needs to know about "disabled".
    pub fn set_fingerprint(&mut self, bytes: &[u8]) {
        self.fingerprint = if bytes.iter().all(|&b| b == 0) {
            Vec::new()
        } else {
            bytes.to_vec()
        };
    }

    /// Copies whatever the wire's version command reports into `buf`,
    /// zero-padding or truncating to fit. Family A has no dedicated version
    /// command in the wire protocol table — only the handshake — so its
    /// "version" is the handshake's single acknowledgement byte.
    pub fn version(&mut self, buf: &mut [u8]) -> Result<()> {
        let payload = match self.family {
            Family::OceanicLike(_) => {
                let mut transfer = Transfer::new(&mut self.transport, AdditiveFraming);
                transfer.transfer_handshake(&FAMILY_A_HANDSHAKE, 3, 1)?
            }
            Family::SuuntoLike(_) => {
                let mut transfer = Transfer::new(&mut self.transport, XorFraming);
                transfer.transfer(&FAMILY_B_VERSION, 8, 4)?
            }
        };
        let n = buf.len().min(payload.len());
        buf[..n].copy_from_slice(&payload[..n]);
        for b in &mut buf[n..] {
            *b = 0;
        }
        Ok(())
    }

    /// Full linear memory image starting at address zero.
    pub fn dump(&mut self, buffer: &mut [u8]) -> Result<()> {
        let bytes = match self.family {
            Family::OceanicLike(layout) => read_memory_a(&mut self.transport, &layout, 0, buffer.len())?,
            Family::SuuntoLike(layout) => read_memory_b(&mut self.transport, &layout, 0, buffer.len())?,
        };
        buffer.copy_from_slice(&bytes);
        Ok(())
    }

    /// Calls `callback(raw_dive_bytes, fingerprint_bytes)` once per dive,
    /// newest first, stopping early on a fingerprint match or a `false`
    /// return from `callback`.
    pub fn foreach(&mut self, callback: impl FnMut(&[u8], &[u8]) -> bool) -> Result<()> {
        match self.family {
            Family::OceanicLike(layout) => {
                extract_family_a(&mut self.transport, &layout, &self.fingerprint, callback)
            }
            Family::SuuntoLike(layout) => {
                extract_family_b(&mut self.transport, &layout, &self.fingerprint, callback)
            }
        }
    }

    /// Releases the transport. Ownership drop does the actual work; this
    /// gives callers a named lifecycle operation to call, matching the
    /// explicit `close(session)` in spec.md §6.
    pub fn close(self) {
        info!("device session closed");
    }
}
