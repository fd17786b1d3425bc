//! Record parser (spec.md §4.6): decodes one raw dive record — already
//! downloaded, family-independent from here on — into header fields and a
//! time-ordered sample stream.
//!
//! Byte layout (offsets into `raw_dive_bytes`, chosen to fill in what
//! spec.md leaves as "well-defined offsets" without naming them):
//!   0..4   dive_timestamp (u32 LE, device ticks at dive start)
//!   4      settings (gas-mix encoding selector, vendor-length flag, divetime flag bit)
//!   5      divetime byte (BCD minutes, plus the flag bit from `settings`)
//!   6..8   max depth (big-endian u16, packed)
//!   9      gasmix_count (low 3 bits)
//!   10..16 up to 6 gas-mix bytes, one per mix
//!   16..   sample stream

use chrono::NaiveDateTime;

use crate::error::{DcError, Result};
use crate::types::{EventKind, FieldKind, FieldValue, GasMix, Sample, EVENT_BITS};
use crate::util::bcd_decode;

const TIMESTAMP_OFFSET: usize = 0;
const SETTINGS_OFFSET: usize = 4;
const DIVETIME_OFFSET: usize = 5;
const MAXDEPTH_OFFSET: usize = 6;
const GASMIX_COUNT_OFFSET: usize = 9;
const GASMIX_BASE_OFFSET: usize = 10;
const MAX_GASMIXES: usize = 6;
const HEADER_LEN: usize = GASMIX_BASE_OFFSET + MAX_GASMIXES;

const DIVETIME_FLAG_BIT: u8 = 0x01;
const GASMIX_ENCODING_MASK: u8 = 0x06;
const VENDOR_LENGTH_FLAG: u8 = 0x08;

/// A parsed dive: the raw bytes plus the two clocks needed to reconstruct an
/// absolute timestamp from the device's tick counter.
pub struct DiveRecord<'a> {
    raw: &'a [u8],
    devtime: u32,
    systime: i64,
}

impl<'a> DiveRecord<'a> {
    pub fn new(raw: &'a [u8], devtime: u32, systime: i64) -> Result<Self> {
        if raw.len() < HEADER_LEN {
            return Err(DcError::DataFormatError(format!(
                "dive record shorter than header: {} < {HEADER_LEN}",
                raw.len()
            )));
        }
        Ok(DiveRecord {
            raw,
            devtime,
            systime,
        })
    }

    fn settings(&self) -> u8 {
        self.raw[SETTINGS_OFFSET]
    }

    /// `ticks = systime − (devtime − dive_timestamp) / 2`; 2 device ticks
    /// per second for this family.
    pub fn datetime(&self) -> Result<NaiveDateTime> {
        let dive_timestamp = u32::from_le_bytes([
            self.raw[TIMESTAMP_OFFSET],
            self.raw[TIMESTAMP_OFFSET + 1],
            self.raw[TIMESTAMP_OFFSET + 2],
            self.raw[TIMESTAMP_OFFSET + 3],
        ]);
        let elapsed_ticks = self.devtime as i64 - dive_timestamp as i64;
        let ticks = self.systime - elapsed_ticks / 2;
        chrono::DateTime::from_timestamp(ticks, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| DcError::DataFormatError(format!("timestamp {ticks} out of range")))
    }

    pub fn field(&self, kind: FieldKind) -> Result<FieldValue> {
        match kind {
            FieldKind::DiveTime => {
                let byte = self.raw[DIVETIME_OFFSET];
                let flagged = self.settings() & DIVETIME_FLAG_BIT != 0;
                let minutes = (if flagged { 100 } else { 0 }) + bcd_decode(byte);
                Ok(FieldValue::Seconds(minutes * 60))
            }
            FieldKind::MaxDepth => {
                let word = u16::from_be_bytes([self.raw[MAXDEPTH_OFFSET], self.raw[MAXDEPTH_OFFSET + 1]]);
                let depth_m = ((word & 0xFFC0) >> 6) as f64 * 10.0 / 64.0;
                Ok(FieldValue::Meters(depth_m))
            }
            FieldKind::GasMixCount => {
                let count = (self.raw[GASMIX_COUNT_OFFSET] & 0x07).max(1) as u32;
                Ok(FieldValue::Count(count))
            }
            FieldKind::GasMix(i) => {
                if i >= MAX_GASMIXES {
                    return Err(DcError::InvalidArgs(format!("gas mix index {i} out of range")));
                }
                let byte = self.raw[GASMIX_BASE_OFFSET + i];
                let oxygen = match self.settings() & GASMIX_ENCODING_MASK {
                    0x00 => 0.21,
                    0x02 => byte as f64 / 100.0,
                    0x04 => (20 + 2 * (byte & 0x0F) as u32) as f64 / 100.0,
                    _ => {
                        return Err(DcError::DataFormatError(format!(
                            "unrecognised gas-mix encoding in settings byte {:#04x}",
                            self.settings()
                        )))
                    }
                };
                Ok(FieldValue::Mix(GasMix::new(oxygen, 0.0, 1.0 - oxygen)))
            }
        }
    }

    /// Walks the sample stream: one `TIME`/`DEPTH` pair per 20-second step,
    /// zero or more `EVENT` samples per step, and a `VENDOR` sample every 60
    /// seconds. Stops cleanly at the end of the buffer; a truncated record
    /// (a partial step, or a 60-second mark with no vendor bytes left) is a
    /// `DataFormatError`, not a silent stop.
    pub fn samples(&self, mut callback: impl FnMut(Sample)) -> Result<()> {
        let body = &self.raw[HEADER_LEN..];
        let vendor_len = if self.settings() & VENDOR_LENGTH_FLAG != 0 { 4 } else { 2 };

        let mut offset = 0usize;
        let mut time_s = 0u32;
        while offset < body.len() {
            if offset + 3 > body.len() {
                return Err(DcError::DataFormatError(
                    "truncated sample step: fewer than 3 bytes remain".into(),
                ));
            }
            callback(Sample::Time(time_s));

            let word = u16::from_be_bytes([body[offset], body[offset + 1]]);
            let depth_m = (word >> 6) as f64 * 10.0 / 64.0;
            callback(Sample::Depth(depth_m));

            let flags = body[offset + 2];
            for (bit, kind) in EVENT_BITS.iter().enumerate() {
                if flags & (1 << bit) != 0 {
                    callback(Sample::Event(*kind));
                }
            }
            offset += 3;

            if time_s % 60 == 0 {
                if offset + vendor_len > body.len() {
                    return Err(DcError::DataFormatError(
                        "missing vendor trailer at 60-second mark".into(),
                    ));
                }
                callback(Sample::Vendor(body[offset..offset + vendor_len].to_vec()));
                offset += vendor_len;
            }

            time_s += 20;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_bytes(settings: u8, divetime_byte: u8, maxdepth_word: u16, gasmix_count: u8) -> Vec<u8> {
        let mut raw = vec![0u8; HEADER_LEN];
        raw[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4].copy_from_slice(&0u32.to_le_bytes());
        raw[SETTINGS_OFFSET] = settings;
        raw[DIVETIME_OFFSET] = divetime_byte;
        raw[MAXDEPTH_OFFSET..MAXDEPTH_OFFSET + 2].copy_from_slice(&maxdepth_word.to_be_bytes());
        raw[GASMIX_COUNT_OFFSET] = gasmix_count;
        raw
    }

    #[test]
    fn divetime_plain_bcd() {
        let raw = record_bytes(0x00, 0x25, 0, 1);
        let rec = DiveRecord::new(&raw, 0, 0).unwrap();
        assert_eq!(rec.field(FieldKind::DiveTime).unwrap(), FieldValue::Seconds(25 * 60));
    }

    #[test]
    fn divetime_flag_adds_100_minutes() {
        let raw = record_bytes(DIVETIME_FLAG_BIT, 0x05, 0, 1);
        let rec = DiveRecord::new(&raw, 0, 0).unwrap();
        assert_eq!(rec.field(FieldKind::DiveTime).unwrap(), FieldValue::Seconds(105 * 60));
    }

    #[test]
    fn maxdepth_decodes_packed_word() {
        // word = 0x1940 -> (0x1940 & 0xFFC0) >> 6 = 0x65 = 101 -> 101*10/64 = 15.78125
        let raw = record_bytes(0x00, 0x00, 0x1940, 1);
        let rec = DiveRecord::new(&raw, 0, 0).unwrap();
        match rec.field(FieldKind::MaxDepth).unwrap() {
            FieldValue::Meters(m) => assert!((m - 15.78125).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn gasmix_fixed_air_encoding() {
        let mut raw = record_bytes(0x00, 0x00, 0, 1);
        raw[GASMIX_BASE_OFFSET] = 0xFF; // ignored under the fixed-air encoding
        let rec = DiveRecord::new(&raw, 0, 0).unwrap();
        match rec.field(FieldKind::GasMix(0)).unwrap() {
            FieldValue::Mix(m) => assert_eq!(m, GasMix::air()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn gasmix_percentage_encoding() {
        let mut raw = record_bytes(0x02, 0x00, 0, 1);
        raw[GASMIX_BASE_OFFSET] = 32;
        let rec = DiveRecord::new(&raw, 0, 0).unwrap();
        match rec.field(FieldKind::GasMix(0)).unwrap() {
            FieldValue::Mix(m) => assert!((m.oxygen - 0.32).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn gasmix_nibble_expanded_encoding() {
        let mut raw = record_bytes(0x04, 0x00, 0, 1);
        raw[GASMIX_BASE_OFFSET] = 0x06; // 20 + 2*6 = 32%
        let rec = DiveRecord::new(&raw, 0, 0).unwrap();
        match rec.field(FieldKind::GasMix(0)).unwrap() {
            FieldValue::Mix(m) => assert!((m.oxygen - 0.32).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn samples_emit_time_depth_and_vendor_at_minute_marks() {
        let mut raw = record_bytes(0x00, 0x00, 0, 1);
        // one 20s step at t=0 (gets a vendor block) then one at t=20 (no vendor)
        raw.extend_from_slice(&[0x19, 0x40, 0x00]); // depth word + no flags
        raw.extend_from_slice(&[0xAA, 0xBB]); // 2-byte vendor (flag off -> short)
        raw.extend_from_slice(&[0x10, 0x00, 0x00]);

        let rec = DiveRecord::new(&raw, 0, 0).unwrap();
        let mut seen = Vec::new();
        rec.samples(|s| seen.push(s)).unwrap();

        assert!(matches!(seen[0], Sample::Time(0)));
        assert!(matches!(seen[1], Sample::Depth(_)));
        assert!(matches!(seen[2], Sample::Vendor(ref v) if v == &[0xAA, 0xBB]));
        assert!(matches!(seen[3], Sample::Time(20)));
        assert!(matches!(seen[4], Sample::Depth(_)));
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn samples_reports_truncated_step() {
        let mut raw = record_bytes(0x00, 0x00, 0, 1);
        raw.extend_from_slice(&[0x00, 0x00]); // only 2 bytes, need 3
        let rec = DiveRecord::new(&raw, 0, 0).unwrap();
        let result = rec.samples(|_| {});
        assert!(matches!(result, Err(DcError::DataFormatError(_))));
    }

    #[test]
    fn samples_reports_missing_vendor_trailer() {
        let mut raw = record_bytes(0x00, 0x00, 0, 1);
        raw.extend_from_slice(&[0x00, 0x00, 0x00]); // complete step at t=0, no vendor bytes follow
        let rec = DiveRecord::new(&raw, 0, 0).unwrap();
        let result = rec.samples(|_| {});
        assert!(matches!(result, Err(DcError::DataFormatError(_))));
    }
}
