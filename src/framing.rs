//! Request framing and response validation for the two wire variants.
//!
//! Variant F1 (additive checksum) is used by Family A devices: responses
//! are `[header, payload…, crc]` with `crc = sum(payload) mod 256`. Variant
//! F2 (XOR, length-prefixed) is used by Family B devices: responses are
//! `[code, 0x00, plen, payload…, xor]`.

use crate::error::{DcError, Result};
use crate::util::{checksum_sum, checksum_xor};

/// Builds request frames and validates response frames for one wire
/// variant. Implementors carry no state; they exist so [`crate::transfer::Transfer`]
/// can be generic over the variant instead of branching on it at runtime.
pub trait FramingCodec: Send + Sync {
    /// Turn raw command fields into the bytes actually written to the wire.
    fn build(&self, fields: &[u8]) -> Vec<u8>;

    /// Validate a full response frame and return just the payload bytes.
    ///
    /// `expected_payload_len` is known ahead of time because every command
    /// has a fixed or negotiated response size; a mismatch is itself a
    /// protocol error, not a panic.
    ///
    /// `allow_handshake_header` is only meaningful to [`AdditiveFraming`]:
    /// the handshake header byte (`0xA5`) is a valid response only to the
    /// handshake command itself, never to an ordinary read — a corrupted
    /// regular response that happens to carry `0xA5` with a matching
    /// checksum must still be rejected.
    fn verify(
        &self,
        response: &[u8],
        expected_payload_len: usize,
        allow_handshake_header: bool,
    ) -> Result<Vec<u8>>;
}

/// Header byte on a normal Family A response.
pub const ADDITIVE_HEADER: u8 = 0x5A;
/// Header byte on a Family A handshake response (and its single payload byte).
pub const ADDITIVE_HANDSHAKE: u8 = 0xA5;

/// F1: additive checksum, single-byte implicit length.
pub struct AdditiveFraming;

impl FramingCodec for AdditiveFraming {
    fn build(&self, fields: &[u8]) -> Vec<u8> {
        fields.to_vec()
    }

    fn verify(
        &self,
        response: &[u8],
        expected_payload_len: usize,
        allow_handshake_header: bool,
    ) -> Result<Vec<u8>> {
        let expected_total = 1 + expected_payload_len + 1;
        if response.len() != expected_total {
            return Err(DcError::ProtocolError(format!(
                "additive frame: expected {expected_total} bytes, got {}",
                response.len()
            )));
        }
        let header = response[0];
        let header_ok = header == ADDITIVE_HEADER
            || (allow_handshake_header && header == ADDITIVE_HANDSHAKE);
        if !header_ok {
            return Err(DcError::ProtocolError(format!(
                "additive frame: unexpected header 0x{header:02X}"
            )));
        }
        let payload = &response[1..1 + expected_payload_len];
        let crc = response[response.len() - 1];
        let calc = checksum_sum(payload, 0);
        if calc != crc {
            return Err(DcError::ProtocolError(format!(
                "additive frame: checksum mismatch (expected 0x{crc:02X}, got 0x{calc:02X})"
            )));
        }
        Ok(payload.to_vec())
    }
}

/// Response codes accepted on a Family B frame (read-ack, write-ack).
pub const XOR_CODE_PRIMARY: u8 = 0x05;
pub const XOR_CODE_SECONDARY: u8 = 0x06;

/// F2: XOR checksum, explicit little-endian length prefix.
pub struct XorFraming;

impl FramingCodec for XorFraming {
    fn build(&self, fields: &[u8]) -> Vec<u8> {
        let mut frame = fields.to_vec();
        frame.push(checksum_xor(fields));
        frame
    }

    fn verify(
        &self,
        response: &[u8],
        expected_payload_len: usize,
        _allow_handshake_header: bool,
    ) -> Result<Vec<u8>> {
        let expected_total = 3 + expected_payload_len + 1;
        if response.len() != expected_total {
            return Err(DcError::ProtocolError(format!(
                "xor frame: expected {expected_total} bytes, got {}",
                response.len()
            )));
        }
        let code = response[0];
        if code != XOR_CODE_PRIMARY && code != XOR_CODE_SECONDARY {
            return Err(DcError::ProtocolError(format!(
                "xor frame: unexpected code 0x{code:02X}"
            )));
        }
        let plen = u16::from_le_bytes([response[1], response[2]]) as usize;
        if plen != expected_payload_len {
            return Err(DcError::ProtocolError(format!(
                "xor frame: length prefix {plen} != expected {expected_payload_len}"
            )));
        }
        let body = &response[..response.len() - 1];
        let trailer = response[response.len() - 1];
        let calc = checksum_xor(body);
        if calc != trailer {
            return Err(DcError::ProtocolError(format!(
                "xor frame: checksum mismatch (expected 0x{trailer:02X}, got 0x{calc:02X})"
            )));
        }
        Ok(response[3..3 + expected_payload_len].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additive_round_trip() {
        let payload = [1u8, 2, 3, 4];
        let crc = checksum_sum(&payload, 0);
        let mut response = vec![ADDITIVE_HEADER];
        response.extend_from_slice(&payload);
        response.push(crc);

        let codec = AdditiveFraming;
        let out = codec.verify(&response, payload.len(), false).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn additive_rejects_bad_checksum() {
        let codec = AdditiveFraming;
        let response = vec![ADDITIVE_HEADER, 1, 2, 3, 0xFF];
        assert!(codec.verify(&response, 3, false).is_err());
    }

    #[test]
    fn additive_accepts_handshake_header_only_when_allowed() {
        let payload = [ADDITIVE_HANDSHAKE];
        let crc = checksum_sum(&payload, 0);
        let response = vec![ADDITIVE_HANDSHAKE, ADDITIVE_HANDSHAKE, crc];
        let codec = AdditiveFraming;
        assert_eq!(codec.verify(&response, 1, true).unwrap(), payload);
    }

    #[test]
    fn additive_rejects_handshake_header_on_ordinary_read() {
        let payload = [ADDITIVE_HANDSHAKE];
        let crc = checksum_sum(&payload, 0);
        let response = vec![ADDITIVE_HANDSHAKE, ADDITIVE_HANDSHAKE, crc];
        let codec = AdditiveFraming;
        assert!(codec.verify(&response, 1, false).is_err());
    }

    #[test]
    fn xor_round_trip() {
        let mut fields = vec![0x05u8, 0x00, 0x03];
        fields.extend_from_slice(&[1, 2, 3]);
        let codec = XorFraming;
        let frame = codec.build(&fields);
        let out = codec.verify(&frame, 3, false).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn xor_rejects_length_mismatch() {
        let codec = XorFraming;
        let mut response = vec![0x05u8, 0x00, 0x02, 1, 2, 3];
        let trailer = checksum_xor(&response);
        response.push(trailer);
        assert!(codec.verify(&response, 3, false).is_err());
    }
}
