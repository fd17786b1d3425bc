//! Family B (Suunto-style) ringbuffer dive extractor: one ringbuffer,
//! dives linked by trailer pointers, traversed backward from a head
//! pointer. Bulk reads may straddle dive boundaries, so the extractor
//! fills a scratch buffer from the back while walking the chain.

use log::{debug, trace, warn};

use crate::error::{DcError, Result};
use crate::framing::XorFraming;
use crate::layout::LayoutB;
use crate::memory::{ChunkReader, MemoryReader};
use crate::transfer::Transfer;
use crate::transport::Transport;
use crate::util::ringbuf_distance;

const CMD_READ: u8 = 0x05;
const READ_SUBCODE: u8 = 0x03;

struct FamilyBChunkReader<'a, T: Transport> {
    transfer: Transfer<'a, T, XorFraming>,
}

impl<'a, T: Transport> ChunkReader for FamilyBChunkReader<'a, T> {
    /// Reads `length` bytes (at most 255, the protocol's one-byte count
    /// field) starting at `address`. No alignment or ring-wrap handling —
    /// the caller is responsible for both, as the extractor below is.
    fn read_chunk(&mut self, address: u32, length: usize) -> Result<Vec<u8>> {
        if length == 0 || length > 0xFF {
            return Err(DcError::InvalidArgs(format!(
                "family B chunk read length {length} out of range"
            )));
        }
        let addr_hi = ((address >> 8) & 0xFF) as u8;
        let addr_lo = (address & 0xFF) as u8;
        let cmd = [CMD_READ, 0x00, READ_SUBCODE, addr_hi, addr_lo, length as u8];
        let resp_len = 3 + length + 1;
        self.transfer.transfer(&cmd, resp_len, length)
    }
}

fn read_u16_le(bytes: &[u8], offset: usize) -> u32 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]]) as u32
}

fn validate_pointer(p: u32, begin: u32, end: u32) -> Result<()> {
    if p < begin || p >= end {
        return Err(DcError::DataFormatError(format!(
            "pointer {p:#x} outside [{begin:#x}, {end:#x})"
        )));
    }
    Ok(())
}

/// Reads `length` bytes of raw linear memory starting at `address`, for
/// [`crate::session::DeviceSession::dump`]. Reuses [`MemoryReader`]'s
/// `min_read` padding-and-discard behavior, same as the extractor's own
/// chunked reads.
pub fn read_memory_b<T: Transport>(
    transport: &mut T,
    layout: &LayoutB,
    address: u32,
    length: usize,
) -> Result<Vec<u8>> {
    let transfer = Transfer::new(transport, XorFraming);
    let mut chunk_reader = FamilyBChunkReader { transfer };
    let mut mem = MemoryReader::new(&mut chunk_reader, layout.packet_size.min(0xFF), Some(layout.min_read));
    mem.read(address, length)
}

/// Walks the Family B linked ringbuffer newest-first, invoking
/// `callback(raw_dive_bytes, fingerprint_bytes)` once per dive. A
/// self-linked "incomplete dive" marker latches a [`DcError::DataFormatError`]
/// but traversal continues, per spec; the latched error (if any) is
/// returned only once traversal otherwise completes successfully.
pub fn extract_family_b<T: Transport>(
    transport: &mut T,
    layout: &LayoutB,
    fingerprint: &[u8],
    mut callback: impl FnMut(&[u8], &[u8]) -> bool,
) -> Result<()> {
    let profile_begin = layout.rb_profile_begin;
    let profile_end = layout.rb_profile_end;
    let packet_size = layout.packet_size;
    let min_read = layout.min_read;

    let transfer = Transfer::new(transport, XorFraming);
    let mut chunks = FamilyBChunkReader { transfer };

    let header = chunks.read_chunk(layout.header_offset, 8)?;
    let last = read_u16_le(&header, 0);
    let count = read_u16_le(&header, 2);
    let end = read_u16_le(&header, 4);
    let begin = read_u16_le(&header, 6);

    validate_pointer(last, profile_begin, profile_end)?;
    validate_pointer(end, profile_begin, profile_end)?;
    validate_pointer(begin, profile_begin, profile_end)?;

    let mut remaining = ringbuf_distance(begin, end, profile_begin, profile_end, count != 0);
    debug!("family B: {remaining} bytes to traverse, head at {last:#x}");

    let buffer_len = (profile_end - profile_begin) as usize + min_read;
    let mut buffer = vec![0u8; buffer_len];

    let mut current = last;
    let mut previous = end;
    let mut address = previous;
    let mut offset = remaining as usize + min_read;
    let mut available: usize = 0;
    let mut deferred_error: Option<DcError> = None;

    while remaining > 0 {
        let size = ringbuf_distance(current, previous, profile_begin, profile_end, true) as usize;
        if size < 4 || size as u32 > remaining {
            return Err(DcError::DataFormatError(format!(
                "dive size {size} invalid (remaining {remaining})"
            )));
        }

        let mut nbytes: usize = 0;
        while available < size {
            if address == profile_begin {
                address = profile_end;
            }
            let cap = (remaining as usize).saturating_sub(nbytes);
            let len = packet_size
                .min((address - profile_begin) as usize)
                .min(cap);
            if len == 0 {
                return Err(DcError::DataFormatError(
                    "family B traversal stalled with no further bytes to read".into(),
                ));
            }

            offset = offset.checked_sub(len).ok_or_else(|| {
                DcError::DataFormatError("scratch buffer offset underflowed".into())
            })?;
            address -= len as u32;

            let extra = min_read.saturating_sub(len);
            let read_addr = address
                .checked_sub(extra as u32)
                .ok_or_else(|| DcError::DataFormatError("min_read padding underflowed address".into()))?;
            let chunk = chunks.read_chunk(read_addr, len + extra)?;

            let write_start = offset
                .checked_sub(extra)
                .ok_or_else(|| DcError::DataFormatError("scratch buffer padding underflowed".into()))?;
            buffer[write_start..write_start + len + extra].copy_from_slice(&chunk);

            nbytes += len;
            available += len;
        }

        let dive = &buffer[offset..offset + size];
        let trailer = &dive[size - 4..size];
        let prev_ptr = read_u16_le(trailer, 0);
        let next_ptr = read_u16_le(trailer, 2);
        validate_pointer(prev_ptr, profile_begin, profile_end)?;
        validate_pointer(next_ptr, profile_begin, profile_end)?;

        if next_ptr != previous && next_ptr != current {
            return Err(DcError::DataFormatError(format!(
                "chain broken: next {next_ptr:#x} matches neither previous {previous:#x} nor current {current:#x}"
            )));
        }

        if next_ptr == current {
            warn!("family B: self-linked incomplete dive at {current:#x}, skipping");
            deferred_error.get_or_insert(DcError::DataFormatError(format!(
                "incomplete dive at {current:#x} (self-linked trailer)"
            )));
        } else {
            let fp_offset = (layout.fingerprint_offset as isize + layout.fingerprint_adjustment)
                .max(0) as usize;
            if fp_offset + layout.fingerprint_size > size {
                return Err(DcError::DataFormatError(
                    "fingerprint slice out of bounds of dive buffer".into(),
                ));
            }
            let fp = &dive[fp_offset..fp_offset + layout.fingerprint_size];

            if !fingerprint.is_empty() && fp == fingerprint {
                debug!("family B: fingerprint matched at {current:#x}, stopping");
                return deferred_error.map(Err).unwrap_or(Ok(()));
            }

            trace!("family B: dive at {current:#x}, size {size}");
            if !callback(&dive[4..size], fp) {
                return deferred_error.map(Err).unwrap_or(Ok(()));
            }
        }

        remaining -= size as u32;
        available -= size;
        previous = current;
        current = prev_ptr;
    }

    deferred_error.map(Err).unwrap_or(Ok(()))
}
