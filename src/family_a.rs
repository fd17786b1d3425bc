//! Family A (Oceanic-style) ringbuffer dive extractor: two paired
//! ringbuffers, backward index traversal, packed pointer encoding.

use log::{debug, trace};

use crate::error::{DcError, Result};
use crate::framing::AdditiveFraming;
use crate::layout::LayoutA;
use crate::memory::{ChunkReader, MemoryReader};
use crate::transfer::Transfer;
use crate::transport::Transport;
use crate::util::ringbuf_distance;

const CMD_READ: u8 = 0xB1;

/// Issues the `B1 hi lo 00` packet-index read and unwraps the additive
/// frame, one packet at a time.
struct FamilyAChunkReader<'a, T: Transport> {
    transfer: Transfer<'a, T, AdditiveFraming>,
    packet_size: usize,
}

impl<'a, T: Transport> ChunkReader for FamilyAChunkReader<'a, T> {
    fn read_chunk(&mut self, address: u32, length: usize) -> Result<Vec<u8>> {
        if length != self.packet_size || address as usize % self.packet_size != 0 {
            return Err(DcError::InvalidArgs(format!(
                "family A chunk read must be one full packet: address={address:#x} length={length}"
            )));
        }
        let index = address / self.packet_size as u32;
        let hi = ((index >> 8) & 0xFF) as u8;
        let lo = (index & 0xFF) as u8;
        let cmd = [CMD_READ, hi, lo, 0x00];
        self.transfer
            .transfer(&cmd, 1 + self.packet_size + 1, self.packet_size)
    }
}

/// Reads `length` bytes of raw linear memory starting at `address`, for
/// [`crate::session::DeviceSession::dump`]. Subject to the same packet
/// alignment precondition as [`MemoryReader::read`] — Family A has no
/// `min_read` padding to fall back on.
pub fn read_memory_a<T: Transport>(
    transport: &mut T,
    layout: &LayoutA,
    address: u32,
    length: usize,
) -> Result<Vec<u8>> {
    let transfer = Transfer::new(transport, AdditiveFraming);
    let mut chunk_reader = FamilyAChunkReader {
        transfer,
        packet_size: layout.packet_size,
    };
    let mut mem = MemoryReader::new(&mut chunk_reader, layout.packet_size, None);
    mem.read(address, length)
}

/// Walks the Family A logbook/profile ringbuffers newest-first, invoking
/// `callback(raw_dive_bytes, fingerprint_bytes)` once per dive. Stops early
/// if the callback returns `false` or the fingerprint matches.
pub fn extract_family_a<T: Transport>(
    transport: &mut T,
    layout: &LayoutA,
    fingerprint: &[u8],
    mut callback: impl FnMut(&[u8], &[u8]) -> bool,
) -> Result<()> {
    let packet_size = layout.packet_size;
    let entry_size = packet_size / 2;

    let transfer = Transfer::new(transport, AdditiveFraming);
    let mut chunk_reader = FamilyAChunkReader {
        transfer,
        packet_size,
    };
    let mut mem = MemoryReader::new(&mut chunk_reader, packet_size, None);

    // Step 1: read the fixed pointers block and extract logbook_first/last.
    let pointers_block = mem.read(layout.header_offset, packet_size)?;
    if pointers_block.len() < 4 {
        return Err(DcError::DataFormatError(
            "pointers block shorter than 4 bytes".into(),
        ));
    }
    let first = u16::from_le_bytes([pointers_block[0], pointers_block[1]]) as u32;
    let last = u16::from_le_bytes([pointers_block[2], pointers_block[3]]) as u32;

    // Step 2: empty check.
    if first == layout.rb_logbook_empty && last == layout.rb_logbook_empty {
        debug!("family A logbook empty, no dives");
        return Ok(());
    }
    if first == layout.rb_logbook_empty || last == layout.rb_logbook_empty {
        return Err(DcError::DataFormatError(
            "only one of logbook first/last equals the empty sentinel".into(),
        ));
    }
    validate_pointer(first, layout.rb_logbook_begin, layout.rb_logbook_end)?;
    validate_pointer(last, layout.rb_logbook_begin, layout.rb_logbook_end)?;

    // Step 3: dive count from the ring distance, +1 for the inclusive range.
    let logbook_count = ringbuf_distance(
        first,
        last,
        layout.rb_logbook_begin,
        layout.rb_logbook_end,
        false,
    ) / entry_size as u32
        + 1;

    // Step 4: align first/last down to packet boundaries and linearize.
    let aligned_first = first - (first % packet_size as u32);
    let aligned_last = last - (last % packet_size as u32);
    let read_len = ringbuf_distance(
        aligned_first,
        aligned_last,
        layout.rb_logbook_begin,
        layout.rb_logbook_end,
        false,
    ) as usize
        + packet_size;

    let logbook_buf = mem.read_ringbuffer(
        aligned_first,
        read_len,
        layout.rb_logbook_begin,
        layout.rb_logbook_end,
    )?;

    let mut entry_offset = ringbuf_distance(
        aligned_first,
        last,
        layout.rb_logbook_begin,
        layout.rb_logbook_end,
        false,
    ) as usize;

    // Step 5: traverse newest-first.
    for i in 0..logbook_count {
        if entry_offset + entry_size > logbook_buf.len() {
            return Err(DcError::DataFormatError(format!(
                "logbook entry {i} out of bounds of linearised buffer"
            )));
        }
        let entry = &logbook_buf[entry_offset..entry_offset + entry_size.max(8)];
        trace!("family A logbook entry {i} at offset {entry_offset}");

        let (profile_first, profile_last) = decode_profile_pointers(entry, packet_size as u32);
        validate_pointer(profile_first, layout.rb_profile_begin, layout.rb_profile_end)?;
        validate_pointer(profile_last, layout.rb_profile_begin, layout.rb_profile_end)?;

        let profile_len = ringbuf_distance(
            profile_first,
            profile_last,
            layout.rb_profile_begin,
            layout.rb_profile_end,
            false,
        ) as usize
            + packet_size;

        let profile_bytes = mem.read_ringbuffer(
            profile_first,
            profile_len,
            layout.rb_profile_begin,
            layout.rb_profile_end,
        )?;

        let mut dive = Vec::with_capacity(8 + profile_bytes.len());
        dive.extend_from_slice(&entry[..8]);
        dive.extend_from_slice(&profile_bytes);

        // The 8-byte logbook entry doubles as this family's fingerprint.
        let dive_fingerprint = entry[..8].to_vec();
        if !fingerprint.is_empty() && fingerprint == dive_fingerprint.as_slice() {
            debug!("family A fingerprint hit at dive {i}, stopping");
            return Ok(());
        }

        if !callback(&dive, &dive_fingerprint) {
            return Ok(());
        }

        entry_offset = match entry_offset.checked_sub(entry_size) {
            Some(v) => v,
            None if i + 1 == logbook_count => 0, // last iteration, cursor value is unused
            None => {
                return Err(DcError::DataFormatError(
                    "logbook cursor stepped before start of buffer".into(),
                ))
            }
        };
    }

    Ok(())
}

fn validate_pointer(p: u32, begin: u32, end: u32) -> Result<()> {
    if p < begin || p >= end {
        return Err(DcError::DataFormatError(format!(
            "pointer {p:#x} outside [{begin:#x}, {end:#x})"
        )));
    }
    Ok(())
}

/// Decodes the packed profile pointers from an 8-byte logbook entry:
/// `first = low[5] | ((low[6] & 0x0F) << 8)`,
/// `last = (low[6] >> 4) | (low[7] << 4)`, both scaled by `packet_size`.
fn decode_profile_pointers(entry: &[u8], packet_size: u32) -> (u32, u32) {
    let low5 = entry[5] as u32;
    let low6 = entry[6] as u32;
    let low7 = entry[7] as u32;
    let first = (low5 | ((low6 & 0x0F) << 8)) * packet_size;
    let last = ((low6 >> 4) | (low7 << 4)) * packet_size;
    (first, last)
}
