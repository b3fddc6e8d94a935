// src/wal/frame.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! The on-disk frame envelope: `magic version length sequence timestamp_ns
//! record_type payload crc32c`, exactly as laid out in the kernel's external
//! interface documentation. The CRC covers `sequence..payload`, not the
//! magic/version/length header nor itself.

use crate::error::{KernelError, KernelResult};
use std::io::Read;

pub const MAGIC: [u8; 4] = *b"PKWL";
pub const VERSION: u8 = 1;

/// Header + payload + trailer size in bytes for a frame carrying
/// `payload_len` bytes of payload.
pub fn frame_len(payload_len: usize) -> u64 {
    (4 + 1 + 4 + 8 + 8 + 1 + payload_len + 4) as u64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u64,
    pub timestamp_ns: u64,
    pub record_type: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(8 + 8 + 1 + self.payload.len());
        body.extend_from_slice(&self.sequence.to_le_bytes());
        body.extend_from_slice(&self.timestamp_ns.to_le_bytes());
        body.push(self.record_type);
        body.extend_from_slice(&self.payload);
        let crc = crc32c::crc32c(&body);

        let mut out = Vec::with_capacity(4 + 1 + 4 + body.len() + 4);
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    /// Reads a single frame from `r`, whose next byte is expected to be at
    /// `offset` in the underlying file. Returns `Ok(None)` both on a clean
    /// end-of-file (zero bytes available where a frame would start) *and*
    /// on a torn trailing frame — one cut short partway through by a crash
    /// between the writer's `write_all` and its `sync_all` (§4.5: such a
    /// write "leaves no record", so its bytes, however many landed, are
    /// not a committed frame). Only a frame whose bytes are all present —
    /// bad magic, an unsupported version, or a CRC mismatch — is
    /// `WalCorrupt`; that is genuine corruption of something that was
    /// actually committed, not an in-flight write that never finished.
    pub fn read_from<R: Read>(r: &mut R, offset: u64) -> KernelResult<Option<Frame>> {
        let mut first_byte = [0u8; 1];
        let n = r.read(&mut first_byte)?;
        if n == 0 {
            return Ok(None);
        }

        let mut rest = [0u8; 3];
        if !read_exact_or_eof(r, &mut rest)? {
            return Ok(None);
        }
        let magic = [first_byte[0], rest[0], rest[1], rest[2]];
        if magic != MAGIC {
            return Err(KernelError::WalCorrupt {
                offset,
                reason: "bad magic".into(),
            });
        }

        let mut version_buf = [0u8; 1];
        if !read_exact_or_eof(r, &mut version_buf)? {
            return Ok(None);
        }
        if version_buf[0] != VERSION {
            return Err(KernelError::WalCorrupt {
                offset,
                reason: format!("unsupported schema version {}", version_buf[0]),
            });
        }

        let mut length_buf = [0u8; 4];
        if !read_exact_or_eof(r, &mut length_buf)? {
            return Ok(None);
        }
        let length = u32::from_le_bytes(length_buf) as usize;

        let mut seq_buf = [0u8; 8];
        if !read_exact_or_eof(r, &mut seq_buf)? {
            return Ok(None);
        }
        let sequence = u64::from_le_bytes(seq_buf);

        let mut ts_buf = [0u8; 8];
        if !read_exact_or_eof(r, &mut ts_buf)? {
            return Ok(None);
        }
        let timestamp_ns = u64::from_le_bytes(ts_buf);

        let mut rt_buf = [0u8; 1];
        if !read_exact_or_eof(r, &mut rt_buf)? {
            return Ok(None);
        }
        let record_type = rt_buf[0];

        let mut payload = vec![0u8; length];
        if !read_exact_or_eof(r, &mut payload)? {
            return Ok(None);
        }

        let mut crc_buf = [0u8; 4];
        if !read_exact_or_eof(r, &mut crc_buf)? {
            return Ok(None);
        }
        let stored_crc = u32::from_le_bytes(crc_buf);

        let mut body = Vec::with_capacity(8 + 8 + 1 + payload.len());
        body.extend_from_slice(&seq_buf);
        body.extend_from_slice(&ts_buf);
        body.push(record_type);
        body.extend_from_slice(&payload);
        if crc32c::crc32c(&body) != stored_crc {
            return Err(KernelError::WalCorrupt {
                offset,
                reason: "crc32c mismatch".into(),
            });
        }

        Ok(Some(Frame {
            sequence,
            timestamp_ns,
            record_type,
            payload,
        }))
    }
}

/// Fills `buf` completely, or reports `Ok(false)` if the reader ran dry
/// partway through — the signature of a torn trailing frame, not of
/// corruption. Any other I/O error still propagates as `IoFatal`.
fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> KernelResult<bool> {
    match r.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn encode_then_read_round_trips() {
        let frame = Frame {
            sequence: 7,
            timestamp_ns: 123_456,
            record_type: 3,
            payload: vec![1, 2, 3, 4, 5],
        };
        let bytes = frame.encode();
        let mut cursor = Cursor::new(bytes);
        let read_back = Frame::read_from(&mut cursor, 0).unwrap().unwrap();
        assert_eq!(read_back, frame);
    }

    #[test]
    fn clean_eof_at_frame_boundary_is_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(Frame::read_from(&mut cursor, 0).unwrap().is_none());
    }

    #[test]
    fn corrupted_crc_is_detected() {
        let frame = Frame {
            sequence: 1,
            timestamp_ns: 1,
            record_type: 0,
            payload: vec![9, 9],
        };
        let mut bytes = frame.encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut cursor = Cursor::new(bytes);
        let err = Frame::read_from(&mut cursor, 0).unwrap_err();
        assert!(matches!(err, KernelError::WalCorrupt { .. }));
    }

    #[test]
    fn torn_trailing_frame_is_clean_stop_not_corrupt() {
        // A crash between `write_all` and `sync_all` can leave a partial
        // frame on disk. That is not corruption of anything committed —
        // recovery should stop cleanly, as if the file simply ended here.
        let frame = Frame {
            sequence: 1,
            timestamp_ns: 1,
            record_type: 0,
            payload: vec![9, 9, 9],
        };
        let bytes = frame.encode();
        let mut cursor = Cursor::new(bytes[..bytes.len() - 2].to_vec());
        assert!(Frame::read_from(&mut cursor, 0).unwrap().is_none());
    }

    #[test]
    fn torn_frame_cut_off_mid_header_is_also_a_clean_stop() {
        let frame = Frame {
            sequence: 1,
            timestamp_ns: 1,
            record_type: 0,
            payload: vec![9, 9, 9],
        };
        let bytes = frame.encode();
        let mut cursor = Cursor::new(bytes[..5].to_vec());
        assert!(Frame::read_from(&mut cursor, 0).unwrap().is_none());
    }

    #[test]
    fn committed_prefix_survives_a_torn_trailing_frame() {
        let good = Frame {
            sequence: 1,
            timestamp_ns: 1,
            record_type: 0,
            payload: vec![1, 2, 3],
        };
        let torn = Frame {
            sequence: 2,
            timestamp_ns: 2,
            record_type: 0,
            payload: vec![4, 5, 6],
        };
        let mut bytes = good.encode();
        let torn_bytes = torn.encode();
        bytes.extend_from_slice(&torn_bytes[..torn_bytes.len() - 4]);

        let mut cursor = Cursor::new(bytes);
        let first = Frame::read_from(&mut cursor, 0).unwrap();
        assert_eq!(first, Some(good));
        let second = Frame::read_from(&mut cursor, 0).unwrap();
        assert!(second.is_none());
    }
}
