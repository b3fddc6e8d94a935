// src/recovery.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! Startup recovery: replays a terminal's WAL into a fresh `TerminalStore`
//! using the same mutators the runtime uses, with WAL writes suppressed.
//! Any CRC mismatch, sequence gap, or malformed payload aborts recovery —
//! the terminal is refused service rather than served from a state that
//! might not match what was actually committed. A torn trailing frame
//! (the tail of a write that never reached its `sync_all`) is not such a
//! mismatch: `read_terminal_wal` stops cleanly at it, so recovery still
//! succeeds over the committed prefix.

use crate::error::KernelResult;
use crate::ids::Ulid;
use crate::line_item::ItemType;
use crate::line_item_graph::{AddLinePlan, UpdatePrepNotesPlan, UpdateQuantityPlan, VoidPlan};
use crate::money::Money;
use crate::session::Session;
use crate::tender::TenderKind;
use crate::terminal_store::TerminalStore;
use crate::transaction::{AddTenderPlan, CancelPlan, Transaction, TxState};
use crate::product::ProductRef;
use crate::wal::{next_sequence_after_replay, read_terminal_wal, WalRecord};
use std::path::Path;

/// The result of a successful recovery: the reconstructed in-memory state
/// and the sequence number the resumed `WalWriter` must use next.
pub struct RecoveredTerminal {
    pub store: TerminalStore,
    pub next_sequence: u64,
}

pub fn recover_terminal(terminal_id: &str, dir: &Path) -> KernelResult<RecoveredTerminal> {
    let records = read_terminal_wal(dir)?;
    let next_sequence = next_sequence_after_replay(&records);

    let mut store = TerminalStore::new();
    for (_sequence, record) in records {
        apply_record(terminal_id, &mut store, record)?;
    }

    Ok(RecoveredTerminal { store, next_sequence })
}

fn apply_record(terminal_id: &str, store: &mut TerminalStore, record: WalRecord) -> KernelResult<()> {
    match record {
        WalRecord::TerminalOpen { .. } => {
            // A marker frame only; nothing to apply. Every segment
            // (including rotated continuations) starts with one.
        }
        WalRecord::SessionOpen { session_id, operator_id } => {
            store.insert_session(Session::new(session_id, terminal_id, operator_id, 0));
        }
        WalRecord::SessionClose { session_id } => {
            store.remove_session(&session_id);
        }
        WalRecord::TxBegin { tx_id, session_id, currency, decimal_places } => {
            let tx = Transaction::new(tx_id, session_id, &currency, decimal_places)?;
            store.insert_transaction(tx);
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
            let tx = store.transaction_mut(&tx_id).ok_or(crate::error::KernelError::TxNotFound)?;
            let mut product = ProductRef::new(product_sku)?;
            if let Some(name) = product_name {
                product = product.with_name(name);
            }
            if let Some(description) = product_description {
                product = product.with_description(description);
            }
            let unit_price = Money::new(tx.currency(), tx.decimal_places(), unit_price_minor)?;
            let item_type = ItemType::from_wal_code(item_type)
                .ok_or(crate::error::KernelError::Internal { context: "unknown item_type code in WAL".into() })?;
            let plan = AddLinePlan {
                line_item_id,
                line_number,
                parent_line_item_id,
                product,
                quantity: qty,
                unit_price,
                item_type,
                preparation_notes: prep_notes.unwrap_or_default(),
            };
            tx.apply_add_line(plan);
        }
        WalRecord::LineUpdateQty { tx_id, line_item_id, new_qty } => {
            let tx = store.transaction_mut(&tx_id).ok_or(crate::error::KernelError::TxNotFound)?;
            tx.apply_update_quantity(UpdateQuantityPlan { line_item_id, new_quantity: new_qty });
        }
        WalRecord::LineUpdatePrepNotes { tx_id, line_item_id, notes } => {
            let tx = store.transaction_mut(&tx_id).ok_or(crate::error::KernelError::TxNotFound)?;
            tx.apply_update_preparation_notes(UpdatePrepNotesPlan { line_item_id, notes });
        }
        WalRecord::LineVoid { tx_id, line_item_id: _, reason, cascaded_ids } => {
            let tx = store.transaction_mut(&tx_id).ok_or(crate::error::KernelError::TxNotFound)?;
            tx.apply_void(&VoidPlan { reason, cascaded_ids });
        }
        WalRecord::TenderAdd { tx_id, kind, amount_minor } => {
            let tx = store.transaction_mut(&tx_id).ok_or(crate::error::KernelError::TxNotFound)?;
            replay_tender(tx, TenderKind::from_wal_str(&kind), amount_minor)?;
        }
        WalRecord::TxComplete { tx_id } => {
            let tx = store.transaction_mut(&tx_id).ok_or(crate::error::KernelError::TxNotFound)?;
            debug_assert_eq!(tx.state(), TxState::Completed, "TxComplete frame without a completing tender");
        }
        WalRecord::TxCancel { tx_id, reason } => {
            let tx = store.transaction_mut(&tx_id).ok_or(crate::error::KernelError::TxNotFound)?;
            tx.apply_cancel(CancelPlan { reason });
        }
    }
    Ok(())
}

/// Reconstructs the tender application deterministically from the
/// transaction's current totals, the same arithmetic `Transaction::
/// plan_add_tender` uses, without re-running its state-gating checks — the
/// record being replayed already passed them once, at commit time.
fn replay_tender(tx: &mut Transaction, kind: TenderKind, amount_minor: i64) -> KernelResult<()> {
    let amount = Money::new(tx.currency(), tx.decimal_places(), amount_minor)?;
    let tender_sequence = tx.tenders().len() as u32 + 1;
    let total = tx.total()?;
    let tendered_before = tx.tendered()?;
    let tendered_after = tendered_before.add(&amount)?;
    let resulting_state = if tendered_after.minor_units() >= total.minor_units() {
        TxState::Completed
    } else {
        TxState::ReadyForPayment
    };
    tx.apply_add_tender(AddTenderPlan {
        tender_sequence,
        kind,
        amount,
        resulting_state,
    });
    Ok(())
}
