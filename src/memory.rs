//! Chunked and ringbuffer-aware reads, independent of any one family's wire
//! command shape.

use crate::error::{DcError, Result};

/// Reads exactly one packet-sized (or smaller, for Family B) chunk at a
/// given device address. Each [`crate::layout::Family`] provides its own
/// implementation that knows how to build and send that family's read
/// command.
pub trait ChunkReader {
    fn read_chunk(&mut self, address: u32, length: usize) -> Result<Vec<u8>>;
}

/// Splits arbitrary `(address, length)` reads into packet-sized chunks and,
/// for ringbuffers, handles wrap-around by splitting into two linear reads.
pub struct MemoryReader<'a, C: ChunkReader> {
    chunk_reader: &'a mut C,
    packet_size: usize,
    /// `Some(min_read)` enables the Family B "pad left, keep trailing bytes"
    /// behavior for short chunks; `None` means the Family A alignment
    /// precondition is enforced instead.
    min_read: Option<usize>,
}

impl<'a, C: ChunkReader> MemoryReader<'a, C> {
    pub fn new(chunk_reader: &'a mut C, packet_size: usize, min_read: Option<usize>) -> Self {
        MemoryReader {
            chunk_reader,
            packet_size,
            min_read,
        }
    }

    /// Issues `ceil(length / packet_size)` chunked reads and concatenates
    /// the payloads.
    pub fn read(&mut self, address: u32, length: usize) -> Result<Vec<u8>> {
        if self.min_read.is_none()
            && (address as usize % self.packet_size != 0 || length % self.packet_size != 0)
        {
            return Err(DcError::InvalidArgs(format!(
                "unaligned read: address={address:#x} length={length} packet_size={}",
                self.packet_size
            )));
        }

        let mut result = Vec::with_capacity(length);
        let mut addr = address;
        let mut remaining = length;

        while remaining > 0 {
            let len = remaining.min(self.packet_size);
            let chunk = match self.min_read {
                Some(min_read) if len < min_read => {
                    let pad = min_read - len;
                    let padded_addr = addr.checked_sub(pad as u32).ok_or_else(|| {
                        DcError::DataFormatError("min_read padding underflows address".into())
                    })?;
                    let padded = self.chunk_reader.read_chunk(padded_addr, min_read)?;
                    padded[pad..].to_vec()
                }
                _ => self.chunk_reader.read_chunk(addr, len)?,
            };
            result.extend_from_slice(&chunk);
            addr += len as u32;
            remaining -= len;
        }

        Ok(result)
    }

    /// Reads `length` bytes starting at `address` from a circular
    /// `[begin, end)` region, splitting into two linear reads and
    /// concatenating them if the read straddles `end`.
    pub fn read_ringbuffer(
        &mut self,
        address: u32,
        length: usize,
        begin: u32,
        end: u32,
    ) -> Result<Vec<u8>> {
        if !(begin <= address && address < end) {
            return Err(DcError::InvalidArgs(format!(
                "ringbuffer read: address {address:#x} outside [{begin:#x}, {end:#x})"
            )));
        }
        if length as u32 > end - begin {
            return Err(DcError::InvalidArgs(format!(
                "ringbuffer read: length {length} exceeds ring span {}",
                end - begin
            )));
        }

        if address + length as u32 > end {
            let first_len = (end - address) as usize;
            let second_len = length - first_len;
            let mut buf = self.read(address, first_len)?;
            let rest = self.read(begin, second_len)?;
            buf.extend_from_slice(&rest);
            Ok(buf)
        } else {
            self.read(address, length)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingChunkReader {
        calls: Vec<(u32, usize)>,
        data: Vec<u8>,
    }

    impl RecordingChunkReader {
        fn new(data: Vec<u8>) -> Self {
            RecordingChunkReader {
                calls: Vec::new(),
                data,
            }
        }
    }

    impl ChunkReader for RecordingChunkReader {
        fn read_chunk(&mut self, address: u32, length: usize) -> Result<Vec<u8>> {
            self.calls.push((address, length));
            let start = address as usize;
            Ok(self.data[start..start + length].to_vec())
        }
    }

    #[test]
    fn read_splits_into_packets() {
        let data: Vec<u8> = (0..32).collect();
        let mut reader = RecordingChunkReader::new(data.clone());
        let mut mem = MemoryReader::new(&mut reader, 8, None);
        let out = mem.read(0, 32).unwrap();
        assert_eq!(out, data);
        assert_eq!(reader.calls.len(), 4);
    }

    #[test]
    fn read_rejects_unaligned_without_min_read() {
        let mut reader = RecordingChunkReader::new(vec![0; 32]);
        let mut mem = MemoryReader::new(&mut reader, 8, None);
        assert!(mem.read(1, 8).is_err());
        assert!(mem.read(0, 7).is_err());
    }

    #[test]
    fn read_pads_short_chunk_when_min_read_set() {
        let data: Vec<u8> = (0..32).collect();
        let mut reader = RecordingChunkReader::new(data.clone());
        let mut mem = MemoryReader::new(&mut reader, 8, Some(4));
        // ask for 2 bytes at address 10: shorter than min_read(4), should
        // pad left by 2 and request [8..12), keeping only the trailing 2.
        let out = mem.read(10, 2).unwrap();
        assert_eq!(out, data[10..12]);
        assert_eq!(reader.calls, vec![(8, 4)]);
    }

    #[test]
    fn read_ringbuffer_linear() {
        let data: Vec<u8> = (0..32).collect();
        let mut reader = RecordingChunkReader::new(data.clone());
        let mut mem = MemoryReader::new(&mut reader, 8, None);
        let out = mem.read_ringbuffer(8, 16, 0, 32).unwrap();
        assert_eq!(out, data[8..24]);
    }

    #[test]
    fn read_ringbuffer_wraps() {
        let data: Vec<u8> = (0..32).collect();
        let mut reader = RecordingChunkReader::new(data.clone());
        let mut mem = MemoryReader::new(&mut reader, 8, None);
        // begin=0, end=32, address=24, length=16 -> straddles end at 32
        let out = mem.read_ringbuffer(24, 16, 0, 32).unwrap();
        let mut expected = data[24..32].to_vec();
        expected.extend_from_slice(&data[0..8]);
        assert_eq!(out, expected);
    }

    #[test]
    fn read_ringbuffer_rejects_out_of_range() {
        let mut reader = RecordingChunkReader::new(vec![0; 32]);
        let mut mem = MemoryReader::new(&mut reader, 8, None);
        assert!(mem.read_ringbuffer(32, 8, 0, 32).is_err());
        assert!(mem.read_ringbuffer(0, 40, 0, 32).is_err());
    }
}
