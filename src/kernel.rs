// src/kernel.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! The request surface: the kernel's only public entry point. Every
//! mutating method here runs the durability contract in order — validate,
//! write+fsync a WAL frame, apply, return — and every operation is keyed by
//! an opaque `(terminal_id, id)` handle, never a raw pointer or index.

use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::ids::{IdAllocator, Ulid};
use crate::line_item::ItemType;
use crate::money::Money;
use crate::product::ProductRef;
use crate::recovery::recover_terminal;
use crate::session::Session;
use crate::snapshot::TxSnapshot;
use crate::tender::TenderKind;
use crate::terminal_lock::TerminalLock;
use crate::terminal_registry::TerminalRegistry;
use crate::terminal_store::TerminalStore;
use crate::transaction::Transaction;
use crate::wal::WalRecord;
use crate::wal::WalWriter;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, instrument};

struct TerminalRuntime {
    store: TerminalStore,
    writer: WalWriter,
    ids: IdAllocator,
}

struct TerminalHandle {
    lock: TerminalLock,
    runtime: RwLock<TerminalRuntime>,
}

/// The owned, in-process kernel instance. One `Kernel` per running service;
/// it is never a process-wide singleton — callers construct it in `main`
/// and hold it for the life of the process, passing references down to
/// request handlers.
pub struct Kernel {
    config: KernelConfig,
    registry: TerminalRegistry,
    terminals: RwLock<HashMap<String, Arc<TerminalHandle>>>,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        let registry = TerminalRegistry::new(config.registry_path());
        Self {
            config,
            registry,
            terminals: RwLock::new(HashMap::new()),
        }
    }

    /// Acquires exclusive ownership of `terminal_id`, replays its WAL, and
    /// registers it as active. Must succeed before any other operation
    /// naming this terminal.
    #[instrument(skip(self))]
    pub fn open_terminal(&self, terminal_id: &str) -> KernelResult<()> {
        if self.terminals.read().contains_key(terminal_id) {
            return Ok(());
        }

        let dir = self.config.terminal_dir(terminal_id);
        let lock = TerminalLock::acquire(&dir)?;

        let recovered = recover_terminal(terminal_id, &dir)?;
        let writer = WalWriter::open(&dir, terminal_id, recovered.next_sequence, self.config.wal_segment_bytes)?;

        self.registry.register(terminal_id, std::process::id(), now_ns())?;

        let handle = Arc::new(TerminalHandle {
            lock,
            runtime: RwLock::new(TerminalRuntime {
                store: recovered.store,
                writer,
                ids: IdAllocator::new(),
            }),
        });
        self.terminals.write().insert(terminal_id.to_string(), handle);
        info!(terminal_id, "terminal opened");
        Ok(())
    }

    /// Releases a terminal's lock and removes it from the registry. Any
    /// in-process handle on this terminal becomes invalid afterward.
    pub fn close_terminal(&self, terminal_id: &str) -> KernelResult<()> {
        let handle = self.terminals.write().remove(terminal_id);
        if let Some(handle) = handle {
            let handle = Arc::try_unwrap(handle).map_err(|_| KernelError::Internal {
                context: "terminal still has outstanding handles".into(),
            })?;
            self.registry.unregister(terminal_id)?;
            handle.lock.release()?;
        }
        Ok(())
    }

    fn handle(&self, terminal_id: &str) -> KernelResult<Arc<TerminalHandle>> {
        self.terminals.read().get(terminal_id).cloned().ok_or(KernelError::TerminalNotOwned)
    }

    /// Releases every terminal this process currently owns. Used by the
    /// service binary's graceful-shutdown path so a `SIGTERM` always leaves
    /// lock files and registry entries clean instead of relying on the next
    /// startup's stale-lock reclamation.
    pub fn close_all_terminals(&self) -> KernelResult<()> {
        let ids: Vec<String> = self.terminals.read().keys().cloned().collect();
        for id in ids {
            self.close_terminal(&id)?;
        }
        Ok(())
    }

    /// Lists terminals currently active on the host, per the shared
    /// advisory registry (§4.9). Advisory only — a crashed process's entry
    /// may linger until the next lock acquisition on that terminal reclaims
    /// it.
    pub fn list_active_terminals(&self) -> KernelResult<Vec<crate::terminal_registry::RegistryEntry>> {
        self.registry.list()
    }

    #[instrument(skip(self))]
    pub fn create_session(&self, terminal_id: &str, operator_id: Option<String>) -> KernelResult<Ulid> {
        let handle = self.handle(terminal_id)?;
        let mut runtime = handle.runtime.write();
        let session_id = runtime.ids.new_ulid();
        let opened_at_ns = now_ns();

        runtime.writer.append(WalRecord::SessionOpen {
            session_id: session_id.clone(),
            operator_id: operator_id.clone(),
        })?;
        runtime
            .store
            .insert_session(Session::new(session_id.clone(), terminal_id, operator_id, opened_at_ns));
        Ok(session_id)
    }

    #[instrument(skip(self))]
    pub fn close_session(&self, terminal_id: &str, session_id: &Ulid) -> KernelResult<()> {
        let handle = self.handle(terminal_id)?;
        let mut runtime = handle.runtime.write();

        if runtime.store.session(session_id).is_none() {
            return Err(KernelError::SessionNotFound);
        }
        if runtime.store.session_has_building_tx(session_id) {
            return Err(KernelError::SessionBusy);
        }

        runtime.writer.append(WalRecord::SessionClose { session_id: session_id.clone() })?;
        runtime.store.remove_session(session_id);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn begin_tx(&self, terminal_id: &str, session_id: &Ulid, currency: &str, decimal_places: u8) -> KernelResult<Ulid> {
        let handle = self.handle(terminal_id)?;
        let mut runtime = handle.runtime.write();

        if runtime.store.session(session_id).is_none() {
            return Err(KernelError::SessionNotFound);
        }

        let tx_id = runtime.ids.new_ulid();
        let tx = Transaction::new(tx_id.clone(), session_id.clone(), currency, decimal_places)?;

        runtime.writer.append(WalRecord::TxBegin {
            tx_id: tx_id.clone(),
            session_id: session_id.clone(),
            currency: tx.currency().to_string(),
            decimal_places: tx.decimal_places(),
        })?;
        runtime.store.insert_transaction(tx);
        Ok(tx_id)
    }

    #[instrument(skip(self, product))]
    pub fn add_line(
        &self,
        terminal_id: &str,
        tx_id: &Ulid,
        product: ProductRef,
        quantity: i32,
        unit_price: Money,
    ) -> KernelResult<TxSnapshot> {
        let handle = self.handle(terminal_id)?;
        let mut runtime = handle.runtime.write();

        // Reborrow once so `rt.store` and `rt.ids` are disjoint-field
        // borrows through a single `&mut` — taking `tx` from
        // `runtime.store` directly and then forming `&mut runtime.ids`
        // would be two overlapping borrows of `*runtime`, one mutable.
        let rt = &mut *runtime;
        let tx = rt.store.transaction(tx_id).ok_or(KernelError::TxNotFound)?;
        let plan = tx.plan_add_sale(&mut rt.ids, product, quantity, unit_price, String::new())?;

        let record = line_add_record(tx_id, &plan);
        runtime.writer.append(record)?;

        let tx = runtime.store.transaction_mut(tx_id).ok_or(KernelError::TxNotFound)?;
        tx.apply_add_line(plan);
        TxSnapshot::from_transaction(tx)
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, product))]
    pub fn add_child_line(
        &self,
        terminal_id: &str,
        tx_id: &Ulid,
        parent_line_item_id: &Ulid,
        product: ProductRef,
        quantity: i32,
        unit_price: Money,
        item_type: ItemType,
    ) -> KernelResult<TxSnapshot> {
        let handle = self.handle(terminal_id)?;
        let mut runtime = handle.runtime.write();

        // Same reborrow-once fix as `add_line`: see comment there.
        let rt = &mut *runtime;
        let tx = rt.store.transaction(tx_id).ok_or(KernelError::TxNotFound)?;
        let plan = tx.plan_add_child(&mut rt.ids, parent_line_item_id, product, quantity, unit_price, item_type, String::new())?;

        let record = line_add_record(tx_id, &plan);
        runtime.writer.append(record)?;

        let tx = runtime.store.transaction_mut(tx_id).ok_or(KernelError::TxNotFound)?;
        tx.apply_add_line(plan);
        TxSnapshot::from_transaction(tx)
    }

    #[instrument(skip(self))]
    pub fn update_line_qty(&self, terminal_id: &str, tx_id: &Ulid, line_item_id: &Ulid, new_quantity: i32) -> KernelResult<TxSnapshot> {
        let handle = self.handle(terminal_id)?;
        let mut runtime = handle.runtime.write();

        let tx = runtime.store.transaction(tx_id).ok_or(KernelError::TxNotFound)?;
        let plan = tx.plan_update_quantity(line_item_id, new_quantity)?;

        runtime.writer.append(WalRecord::LineUpdateQty {
            tx_id: tx_id.clone(),
            line_item_id: plan.line_item_id.clone(),
            new_qty: plan.new_quantity,
        })?;

        let tx = runtime.store.transaction_mut(tx_id).ok_or(KernelError::TxNotFound)?;
        tx.apply_update_quantity(plan);
        TxSnapshot::from_transaction(tx)
    }

    #[instrument(skip(self, notes))]
    pub fn update_line_prep_notes(&self, terminal_id: &str, tx_id: &Ulid, line_item_id: &Ulid, notes: String) -> KernelResult<()> {
        let handle = self.handle(terminal_id)?;
        let mut runtime = handle.runtime.write();

        let tx = runtime.store.transaction(tx_id).ok_or(KernelError::TxNotFound)?;
        let plan = tx.plan_update_preparation_notes(line_item_id, notes)?;

        runtime.writer.append(WalRecord::LineUpdatePrepNotes {
            tx_id: tx_id.clone(),
            line_item_id: plan.line_item_id.clone(),
            notes: plan.notes.clone(),
        })?;

        let tx = runtime.store.transaction_mut(tx_id).ok_or(KernelError::TxNotFound)?;
        tx.apply_update_preparation_notes(plan);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn void_line(&self, terminal_id: &str, tx_id: &Ulid, line_item_id: &Ulid, reason: Option<String>) -> KernelResult<TxSnapshot> {
        let handle = self.handle(terminal_id)?;
        let mut runtime = handle.runtime.write();

        let tx = runtime.store.transaction(tx_id).ok_or(KernelError::TxNotFound)?;
        let plan = tx.plan_void(line_item_id, reason)?;

        if !plan.cascaded_ids.is_empty() {
            runtime.writer.append(WalRecord::LineVoid {
                tx_id: tx_id.clone(),
                line_item_id: line_item_id.clone(),
                reason: plan.reason.clone(),
                cascaded_ids: plan.cascaded_ids.clone(),
            })?;
        }

        let tx = runtime.store.transaction_mut(tx_id).ok_or(KernelError::TxNotFound)?;
        tx.apply_void(&plan);
        TxSnapshot::from_transaction(tx)
    }

    #[instrument(skip(self))]
    pub fn add_tender(&self, terminal_id: &str, tx_id: &Ulid, kind: TenderKind, amount: Money) -> KernelResult<TxSnapshot> {
        let handle = self.handle(terminal_id)?;
        let mut runtime = handle.runtime.write();

        let tx = runtime.store.transaction(tx_id).ok_or(KernelError::TxNotFound)?;
        let plan = tx.plan_add_tender(kind, amount)?;

        runtime.writer.append(WalRecord::TenderAdd {
            tx_id: tx_id.clone(),
            kind: plan.kind.as_wal_str().to_string(),
            amount_minor: plan.amount.minor_units(),
        })?;
        if plan.resulting_state == crate::transaction::TxState::Completed {
            runtime.writer.append(WalRecord::TxComplete { tx_id: tx_id.clone() })?;
        }

        let tx = runtime.store.transaction_mut(tx_id).ok_or(KernelError::TxNotFound)?;
        tx.apply_add_tender(plan);
        TxSnapshot::from_transaction(tx)
    }

    #[instrument(skip(self))]
    pub fn get_tx(&self, terminal_id: &str, tx_id: &Ulid) -> KernelResult<TxSnapshot> {
        let handle = self.handle(terminal_id)?;
        let runtime = handle.runtime.read();
        let tx = runtime.store.transaction(tx_id).ok_or(KernelError::TxNotFound)?;
        TxSnapshot::from_transaction(tx)
    }

    #[instrument(skip(self))]
    pub fn cancel_tx(&self, terminal_id: &str, tx_id: &Ulid, reason: Option<String>) -> KernelResult<()> {
        let handle = self.handle(terminal_id)?;
        let mut runtime = handle.runtime.write();

        let tx = runtime.store.transaction(tx_id).ok_or(KernelError::TxNotFound)?;
        let plan = tx.plan_cancel(reason)?;

        runtime.writer.append(WalRecord::TxCancel {
            tx_id: tx_id.clone(),
            reason: plan.reason.clone(),
        })?;

        let tx = runtime.store.transaction_mut(tx_id).ok_or(KernelError::TxNotFound)?;
        tx.apply_cancel(plan);
        Ok(())
    }
}

fn now_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

fn line_add_record(tx_id: &Ulid, plan: &crate::line_item_graph::AddLinePlan) -> WalRecord {
    WalRecord::LineAdd {
        tx_id: tx_id.clone(),
        line_number: plan.line_number,
        line_item_id: plan.line_item_id.clone(),
        parent_line_item_id: plan.parent_line_item_id.clone(),
        product_sku: plan.product.sku().to_string(),
        product_name: plan.product.name().map(str::to_string),
        product_description: plan.product.description().map(str::to_string),
        item_type: plan.item_type.as_wal_code(),
        qty: plan.quantity,
        unit_price_minor: plan.unit_price.minor_units(),
        prep_notes: if plan.preparation_notes.is_empty() {
            None
        } else {
            Some(plan.preparation_notes.clone())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn kernel_in(dir: &std::path::Path) -> Kernel {
        Kernel::new(KernelConfig {
            data_dir: dir.to_path_buf(),
            wal_segment_bytes: crate::config::DEFAULT_WAL_SEGMENT_BYTES,
        })
    }

    #[test]
    fn simple_sale_end_to_end() {
        let dir = tempdir().unwrap();
        let kernel = kernel_in(dir.path());
        kernel.open_terminal("T1").unwrap();

        let session_id = kernel.create_session("T1", Some("alice".into())).unwrap();
        let tx_id = kernel.begin_tx("T1", &session_id, "SGD", 2).unwrap();

        let snapshot = kernel
            .add_line("T1", &tx_id, ProductRef::new("KOPI001").unwrap(), 1, Money::new("SGD", 2, 140).unwrap())
            .unwrap();
        assert_eq!(snapshot.total.minor_units(), 140);

        let snapshot = kernel.add_tender("T1", &tx_id, TenderKind::Cash, Money::new("SGD", 2, 200).unwrap()).unwrap();
        assert_eq!(snapshot.change_due.unwrap().minor_units(), 60);

        let fetched = kernel.get_tx("T1", &tx_id).unwrap();
        assert_eq!(fetched.state, crate::transaction::TxState::Completed);
    }

    #[test]
    fn recovers_after_reopening_terminal() {
        let dir = tempdir().unwrap();
        let tx_id;
        {
            let kernel = kernel_in(dir.path());
            kernel.open_terminal("T1").unwrap();
            let session_id = kernel.create_session("T1", None).unwrap();
            tx_id = kernel.begin_tx("T1", &session_id, "SGD", 2).unwrap();
            kernel
                .add_line("T1", &tx_id, ProductRef::new("KOPI001").unwrap(), 1, Money::new("SGD", 2, 140).unwrap())
                .unwrap();
            kernel.close_terminal("T1").unwrap();
        }

        let kernel = kernel_in(dir.path());
        kernel.open_terminal("T1").unwrap();
        let snapshot = kernel.get_tx("T1", &tx_id).unwrap();
        assert_eq!(snapshot.total.minor_units(), 140);
    }

    #[test]
    fn operating_on_unopened_terminal_is_rejected() {
        let dir = tempdir().unwrap();
        let kernel = kernel_in(dir.path());
        let err = kernel.create_session("GHOST", None).unwrap_err();
        assert_eq!(err, KernelError::TerminalNotOwned);
    }

    #[test]
    fn closing_session_with_building_tx_is_rejected() {
        let dir = tempdir().unwrap();
        let kernel = kernel_in(dir.path());
        kernel.open_terminal("T1").unwrap();
        let session_id = kernel.create_session("T1", None).unwrap();
        kernel.begin_tx("T1", &session_id, "SGD", 2).unwrap();

        let err = kernel.close_session("T1", &session_id).unwrap_err();
        assert_eq!(err, KernelError::SessionBusy);
    }
}
