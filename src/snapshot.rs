// src/snapshot.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! Read-only snapshots returned from `get_tx`. A snapshot is a plain data
//! copy — holding one never blocks a concurrent mutation, and mutating the
//! transaction after a snapshot was taken never changes the snapshot.

use crate::ids::Ulid;
use crate::money::Money;
use crate::product::ProductRef;
use crate::tender::{Tender, TenderKind};
use crate::transaction::{Transaction, TxState};

#[derive(Debug, Clone)]
pub struct LineSnapshot {
    pub line_item_id: Ulid,
    pub line_number: u32,
    pub parent_line_item_id: Option<Ulid>,
    pub product: ProductRef,
    pub quantity: i32,
    pub unit_price: Money,
    pub extended_price: Money,
    pub preparation_notes: String,
    pub is_voided: bool,
    pub void_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TenderSnapshot {
    pub tender_sequence: u32,
    pub kind: TenderKind,
    pub amount: Money,
}

/// Includes the full line list (including voided lines, for audit), current
/// state, total, tendered, and change_due, per the request surface's
/// documented snapshot contents.
#[derive(Debug, Clone)]
pub struct TxSnapshot {
    pub transaction_id: Ulid,
    pub session_id: Ulid,
    pub currency: String,
    pub decimal_places: u8,
    pub state: TxState,
    pub lines: Vec<LineSnapshot>,
    pub tenders: Vec<TenderSnapshot>,
    pub total: Money,
    pub tendered: Money,
    pub change_due: Option<Money>,
}

impl TxSnapshot {
    pub fn from_transaction(tx: &Transaction) -> crate::error::KernelResult<Self> {
        let mut lines = Vec::new();
        for line in tx.lines().lines() {
            lines.push(LineSnapshot {
                line_item_id: line.line_item_id.clone(),
                line_number: line.line_number,
                parent_line_item_id: line.parent_line_item_id.clone(),
                product: line.product.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price.clone(),
                extended_price: line.extended_price()?,
                preparation_notes: line.preparation_notes.clone(),
                is_voided: line.is_voided,
                void_reason: line.void_reason.clone(),
            });
        }

        let tenders = tx
            .tenders()
            .iter()
            .map(|t: &Tender| TenderSnapshot {
                tender_sequence: t.tender_sequence,
                kind: t.kind.clone(),
                amount: t.amount.clone(),
            })
            .collect();

        Ok(Self {
            transaction_id: tx.transaction_id.clone(),
            session_id: tx.session_id.clone(),
            currency: tx.currency().to_string(),
            decimal_places: tx.decimal_places(),
            state: tx.state(),
            lines,
            tenders,
            total: tx.total()?,
            tendered: tx.tendered()?,
            change_due: tx.change_due()?,
        })
    }
}
