//! Single framed request/response exchange with bounded retry.

use log::{debug, warn};

use crate::error::{DcError, Result};
use crate::framing::FramingCodec;
use crate::transport::Transport;

/// Total retry attempts after the first, for a total of `MAX_RETRIES + 1`
/// tries per command.
pub const MAX_RETRIES: u32 = 2;

/// Issues one framed command and returns its validated payload, retrying on
/// [`DcError::TimeoutError`] / [`DcError::ProtocolError`] up to [`MAX_RETRIES`]
/// times. I/O errors are never retried — a dropped port isn't going to come
/// back mid-command.
pub struct Transfer<'a, T: Transport, F: FramingCodec> {
    transport: &'a mut T,
    framing: F,
}

impl<'a, T: Transport, F: FramingCodec> Transfer<'a, T, F> {
    pub fn new(transport: &'a mut T, framing: F) -> Self {
        Transfer { transport, framing }
    }

    /// `cmd` is the raw command fields (before any framing trailer);
    /// `resp_len` is the total response frame length to read.
    pub fn transfer(&mut self, cmd: &[u8], resp_len: usize, payload_len: usize) -> Result<Vec<u8>> {
        self.transfer_inner(cmd, resp_len, payload_len, false)
    }

    /// Like [`Self::transfer`], but accepts the additive framing's handshake
    /// header (`0xA5`) as well as its ordinary one. Only the Family A
    /// handshake exchange itself should call this — every other command
    /// must reject a stray handshake header as a protocol error.
    pub fn transfer_handshake(
        &mut self,
        cmd: &[u8],
        resp_len: usize,
        payload_len: usize,
    ) -> Result<Vec<u8>> {
        self.transfer_inner(cmd, resp_len, payload_len, true)
    }

    fn transfer_inner(
        &mut self,
        cmd: &[u8],
        resp_len: usize,
        payload_len: usize,
        allow_handshake_header: bool,
    ) -> Result<Vec<u8>> {
        let frame = self.framing.build(cmd);

        let mut last_err = DcError::TimeoutError;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                debug!("retrying command (attempt {})", attempt + 1);
            }

            match self.try_once(&frame, resp_len, payload_len, allow_handshake_header) {
                Ok(payload) => return Ok(payload),
                Err(err @ DcError::IOError(_)) => return Err(err),
                Err(err) => {
                    warn!("transfer attempt {} failed: {err}", attempt + 1);
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    fn try_once(
        &mut self,
        frame: &[u8],
        resp_len: usize,
        payload_len: usize,
        allow_handshake_header: bool,
    ) -> Result<Vec<u8>> {
        self.transport.drain()?;
        self.transport.write(frame)?;
        self.transport.flush()?;

        let mut response = vec![0u8; resp_len];
        self.transport.read(&mut response)?;

        self.framing.verify(&response, payload_len, allow_handshake_header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{AdditiveFraming, ADDITIVE_HEADER};
    use crate::transport::mock::MockTransport;
    use crate::util::checksum_sum;

    fn valid_additive_response(payload: &[u8]) -> Vec<u8> {
        let mut r = vec![ADDITIVE_HEADER];
        r.extend_from_slice(payload);
        r.push(checksum_sum(payload, 0));
        r
    }

    #[test]
    fn succeeds_first_try() {
        let mut mock = MockTransport::new();
        mock.push_response(valid_additive_response(&[1, 2, 3]));
        let mut transfer = Transfer::new(&mut mock, AdditiveFraming);
        let payload = transfer.transfer(&[0xB1, 0x00, 0x00], 5, 3).unwrap();
        assert_eq!(payload, vec![1, 2, 3]);
    }

    #[test]
    fn retries_on_timeout_then_succeeds() {
        let mut mock = MockTransport::new();
        mock.push_timeout();
        mock.push_response(valid_additive_response(&[9, 9]));
        let mut transfer = Transfer::new(&mut mock, AdditiveFraming);
        let payload = transfer.transfer(&[0xB1, 0x00, 0x00], 4, 2).unwrap();
        assert_eq!(payload, vec![9, 9]);
    }

    #[test]
    fn exhausts_retries_and_surfaces_last_error() {
        let mut mock = MockTransport::new();
        mock.push_timeout();
        mock.push_timeout();
        mock.push_timeout();
        let mut transfer = Transfer::new(&mut mock, AdditiveFraming);
        let err = transfer.transfer(&[0xB1, 0x00, 0x00], 4, 2).unwrap_err();
        assert!(matches!(err, DcError::TimeoutError));
    }

    #[test]
    fn io_error_is_not_retried() {
        let mut mock = MockTransport::new();
        mock.push_io_error();
        mock.push_response(valid_additive_response(&[1, 2]));
        let mut transfer = Transfer::new(&mut mock, AdditiveFraming);
        let err = transfer.transfer(&[0xB1, 0x00, 0x00], 4, 2).unwrap_err();
        assert!(matches!(err, DcError::IOError(_)));
    }
}
