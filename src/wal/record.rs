// src/wal/record.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! WAL record payloads. Every payload is hand-rolled length-prefixed binary
//! — no serde/JSON on the WAL path, so recovery needs no parser beyond this
//! module. Strings are `u32`-length-prefixed UTF-8; optional fields carry a
//! single presence byte (0/1) ahead of their content.

use crate::error::{KernelError, KernelResult};
use crate::ids::Ulid;

pub const RT_TERMINAL_OPEN: u8 = 0;
pub const RT_SESSION_OPEN: u8 = 1;
pub const RT_SESSION_CLOSE: u8 = 2;
pub const RT_TX_BEGIN: u8 = 3;
pub const RT_LINE_ADD: u8 = 4;
pub const RT_LINE_UPDATE_QTY: u8 = 5;
pub const RT_LINE_UPDATE_PREP_NOTES: u8 = 6;
pub const RT_LINE_VOID: u8 = 7;
pub const RT_TENDER_ADD: u8 = 8;
pub const RT_TX_COMPLETE: u8 = 9;
pub const RT_TX_CANCEL: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    TerminalOpen {
        terminal_id: String,
        schema_version: u32,
    },
    SessionOpen {
        session_id: Ulid,
        operator_id: Option<String>,
    },
    SessionClose {
        session_id: Ulid,
    },
    TxBegin {
        tx_id: Ulid,
        session_id: Ulid,
        currency: String,
        decimal_places: u8,
    },
    LineAdd {
        tx_id: Ulid,
        line_number: u32,
        line_item_id: Ulid,
        parent_line_item_id: Option<Ulid>,
        product_sku: String,
        product_name: Option<String>,
        product_description: Option<String>,
        item_type: u8,
        qty: i32,
        unit_price_minor: i64,
        prep_notes: Option<String>,
    },
    LineUpdateQty {
        tx_id: Ulid,
        line_item_id: Ulid,
        new_qty: i32,
    },
    LineUpdatePrepNotes {
        tx_id: Ulid,
        line_item_id: Ulid,
        notes: String,
    },
    LineVoid {
        tx_id: Ulid,
        line_item_id: Ulid,
        reason: Option<String>,
        cascaded_ids: Vec<Ulid>,
    },
    TenderAdd {
        tx_id: Ulid,
        kind: String,
        amount_minor: i64,
    },
    TxComplete {
        tx_id: Ulid,
    },
    TxCancel {
        tx_id: Ulid,
        reason: Option<String>,
    },
}

impl WalRecord {
    pub fn record_type(&self) -> u8 {
        match self {
            WalRecord::TerminalOpen { .. } => RT_TERMINAL_OPEN,
            WalRecord::SessionOpen { .. } => RT_SESSION_OPEN,
            WalRecord::SessionClose { .. } => RT_SESSION_CLOSE,
            WalRecord::TxBegin { .. } => RT_TX_BEGIN,
            WalRecord::LineAdd { .. } => RT_LINE_ADD,
            WalRecord::LineUpdateQty { .. } => RT_LINE_UPDATE_QTY,
            WalRecord::LineUpdatePrepNotes { .. } => RT_LINE_UPDATE_PREP_NOTES,
            WalRecord::LineVoid { .. } => RT_LINE_VOID,
            WalRecord::TenderAdd { .. } => RT_TENDER_ADD,
            WalRecord::TxComplete { .. } => RT_TX_COMPLETE,
            WalRecord::TxCancel { .. } => RT_TX_CANCEL,
        }
    }

    pub fn encode_payload(&self) -> Vec<u8> {
        let mut w = PayloadWriter::new();
        match self {
            WalRecord::TerminalOpen { terminal_id, schema_version } => {
                w.string(terminal_id);
                w.u32(*schema_version);
            }
            WalRecord::SessionOpen { session_id, operator_id } => {
                w.ulid(session_id);
                w.opt_string(operator_id.as_deref());
            }
            WalRecord::SessionClose { session_id } => {
                w.ulid(session_id);
            }
            WalRecord::TxBegin { tx_id, session_id, currency, decimal_places } => {
                w.ulid(tx_id);
                w.ulid(session_id);
                w.string(currency);
                w.u8(*decimal_places);
            }
            WalRecord::LineAdd {
                tx_id,
                line_number,
                line_item_id,
                parent_line_item_id,
                product_sku,
                product_name,
                product_description,
                item_type,
                qty,
                unit_price_minor,
                prep_notes,
            } => {
                w.ulid(tx_id);
                w.u32(*line_number);
                w.ulid(line_item_id);
                w.opt_ulid(parent_line_item_id.as_ref());
                w.string(product_sku);
                w.opt_string(product_name.as_deref());
                w.opt_string(product_description.as_deref());
                w.u8(*item_type);
                w.i32(*qty);
                w.i64(*unit_price_minor);
                w.opt_string(prep_notes.as_deref());
            }
            WalRecord::LineUpdateQty { tx_id, line_item_id, new_qty } => {
                w.ulid(tx_id);
                w.ulid(line_item_id);
                w.i32(*new_qty);
            }
            WalRecord::LineUpdatePrepNotes { tx_id, line_item_id, notes } => {
                w.ulid(tx_id);
                w.ulid(line_item_id);
                w.string(notes);
            }
            WalRecord::LineVoid { tx_id, line_item_id, reason, cascaded_ids } => {
                w.ulid(tx_id);
                w.ulid(line_item_id);
                w.opt_string(reason.as_deref());
                w.u32(cascaded_ids.len() as u32);
                for id in cascaded_ids {
                    w.ulid(id);
                }
            }
            WalRecord::TenderAdd { tx_id, kind, amount_minor } => {
                w.ulid(tx_id);
                w.string(kind);
                w.i64(*amount_minor);
            }
            WalRecord::TxComplete { tx_id } => {
                w.ulid(tx_id);
            }
            WalRecord::TxCancel { tx_id, reason } => {
                w.ulid(tx_id);
                w.opt_string(reason.as_deref());
            }
        }
        w.into_bytes()
    }

    pub fn decode(record_type: u8, payload: &[u8], offset: u64) -> KernelResult<WalRecord> {
        let mut r = PayloadReader::new(payload, offset);
        let record = match record_type {
            RT_TERMINAL_OPEN => WalRecord::TerminalOpen {
                terminal_id: r.string()?,
                schema_version: r.u32()?,
            },
            RT_SESSION_OPEN => WalRecord::SessionOpen {
                session_id: r.ulid()?,
                operator_id: r.opt_string()?,
            },
            RT_SESSION_CLOSE => WalRecord::SessionClose { session_id: r.ulid()? },
            RT_TX_BEGIN => WalRecord::TxBegin {
                tx_id: r.ulid()?,
                session_id: r.ulid()?,
                currency: r.string()?,
                decimal_places: r.u8()?,
            },
            RT_LINE_ADD => WalRecord::LineAdd {
                tx_id: r.ulid()?,
                line_number: r.u32()?,
                line_item_id: r.ulid()?,
                parent_line_item_id: r.opt_ulid()?,
                product_sku: r.string()?,
                product_name: r.opt_string()?,
                product_description: r.opt_string()?,
                item_type: r.u8()?,
                qty: r.i32()?,
                unit_price_minor: r.i64()?,
                prep_notes: r.opt_string()?,
            },
            RT_LINE_UPDATE_QTY => WalRecord::LineUpdateQty {
                tx_id: r.ulid()?,
                line_item_id: r.ulid()?,
                new_qty: r.i32()?,
            },
            RT_LINE_UPDATE_PREP_NOTES => WalRecord::LineUpdatePrepNotes {
                tx_id: r.ulid()?,
                line_item_id: r.ulid()?,
                notes: r.string()?,
            },
            RT_LINE_VOID => {
                let tx_id = r.ulid()?;
                let line_item_id = r.ulid()?;
                let reason = r.opt_string()?;
                let count = r.u32()?;
                let mut cascaded_ids = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    cascaded_ids.push(r.ulid()?);
                }
                WalRecord::LineVoid { tx_id, line_item_id, reason, cascaded_ids }
            }
            RT_TENDER_ADD => WalRecord::TenderAdd {
                tx_id: r.ulid()?,
                kind: r.string()?,
                amount_minor: r.i64()?,
            },
            RT_TX_COMPLETE => WalRecord::TxComplete { tx_id: r.ulid()? },
            RT_TX_CANCEL => WalRecord::TxCancel {
                tx_id: r.ulid()?,
                reason: r.opt_string()?,
            },
            other => {
                return Err(KernelError::WalCorrupt {
                    offset,
                    reason: format!("unknown record_type {other}"),
                })
            }
        };
        r.expect_exhausted()?;
        Ok(record)
    }
}

struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn string(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn opt_string(&mut self, s: Option<&str>) {
        match s {
            Some(s) => {
                self.u8(1);
                self.string(s);
            }
            None => self.u8(0),
        }
    }

    fn ulid(&mut self, id: &Ulid) {
        self.string(id.as_str());
    }

    fn opt_ulid(&mut self, id: Option<&Ulid>) {
        match id {
            Some(id) => {
                self.u8(1);
                self.ulid(id);
            }
            None => self.u8(0),
        }
    }
}

struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
    offset: u64,
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8], offset: u64) -> Self {
        Self { buf, pos: 0, offset }
    }

    fn corrupt(&self, reason: impl Into<String>) -> KernelError {
        KernelError::WalCorrupt {
            offset: self.offset,
            reason: reason.into(),
        }
    }

    fn take(&mut self, n: usize) -> KernelResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(self.corrupt("payload ended early"));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> KernelResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> KernelResult<u32> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("length checked above");
        Ok(u32::from_le_bytes(bytes))
    }

    fn i32(&mut self) -> KernelResult<i32> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("length checked above");
        Ok(i32::from_le_bytes(bytes))
    }

    fn i64(&mut self) -> KernelResult<i64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("length checked above");
        Ok(i64::from_le_bytes(bytes))
    }

    fn string(&mut self) -> KernelResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.corrupt("invalid UTF-8 in string field"))
    }

    fn opt_string(&mut self) -> KernelResult<Option<String>> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.string()?)),
            other => Err(self.corrupt(format!("invalid presence byte {other}"))),
        }
    }

    fn ulid(&mut self) -> KernelResult<Ulid> {
        Ok(Ulid::from_string(self.string()?))
    }

    fn opt_ulid(&mut self) -> KernelResult<Option<Ulid>> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.ulid()?)),
            other => Err(self.corrupt(format!("invalid presence byte {other}"))),
        }
    }

    fn expect_exhausted(&self) -> KernelResult<()> {
        if self.pos != self.buf.len() {
            return Err(self.corrupt("trailing bytes after decoding known fields"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ulid(s: &str) -> Ulid {
        Ulid::from_string(s.to_string())
    }

    #[test]
    fn line_add_round_trips_with_all_optionals_present() {
        let record = WalRecord::LineAdd {
            tx_id: sample_ulid("01TX"),
            line_number: 1,
            line_item_id: sample_ulid("01LI"),
            parent_line_item_id: Some(sample_ulid("01PARENT")),
            product_sku: "KOPI001".into(),
            product_name: Some("Kopi".into()),
            product_description: Some("Coffee with condensed milk".into()),
            item_type: 1,
            qty: 2,
            unit_price_minor: 140,
            prep_notes: Some("less sugar".into()),
        };
        let payload = record.encode_payload();
        let decoded = WalRecord::decode(record.record_type(), &payload, 0).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn line_add_round_trips_with_all_optionals_absent() {
        let record = WalRecord::LineAdd {
            tx_id: sample_ulid("01TX"),
            line_number: 1,
            line_item_id: sample_ulid("01LI"),
            parent_line_item_id: None,
            product_sku: "KOPI001".into(),
            product_name: None,
            product_description: None,
            item_type: 0,
            qty: 1,
            unit_price_minor: 140,
            prep_notes: None,
        };
        let payload = record.encode_payload();
        let decoded = WalRecord::decode(record.record_type(), &payload, 0).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn line_void_round_trips_with_cascade() {
        let record = WalRecord::LineVoid {
            tx_id: sample_ulid("01TX"),
            line_item_id: sample_ulid("01A"),
            reason: Some("spoiled".into()),
            cascaded_ids: vec![sample_ulid("01A"), sample_ulid("01B"), sample_ulid("01C")],
        };
        let payload = record.encode_payload();
        let decoded = WalRecord::decode(record.record_type(), &payload, 0).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn truncated_payload_is_wal_corrupt() {
        let record = WalRecord::TxComplete { tx_id: sample_ulid("01TX") };
        let mut payload = record.encode_payload();
        payload.truncate(payload.len() - 2);
        let err = WalRecord::decode(record.record_type(), &payload, 42).unwrap_err();
        match err {
            KernelError::WalCorrupt { offset, .. } => assert_eq!(offset, 42),
            other => panic!("expected WalCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn unknown_record_type_is_wal_corrupt() {
        let err = WalRecord::decode(200, &[], 0).unwrap_err();
        assert!(matches!(err, KernelError::WalCorrupt { .. }));
    }
}
