// src/terminal_store.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! In-memory state for one terminal: its open sessions and transactions,
//! plus a `by_session` secondary index. A single owner (the `Kernel`'s
//! per-terminal handle, behind a `parking_lot::RwLock`) mutates this —
//! `TerminalStore` itself has no locking of its own.

use crate::ids::Ulid;
use crate::session::Session;
use crate::transaction::{Transaction, TxState};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct TerminalStore {
    sessions: HashMap<Ulid, Session>,
    transactions: HashMap<Ulid, Transaction>,
    by_session: HashMap<Ulid, HashSet<Ulid>>,
}

impl TerminalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&mut self, session: Session) {
        self.by_session.entry(session.session_id.clone()).or_default();
        self.sessions.insert(session.session_id.clone(), session);
    }

    pub fn session(&self, session_id: &Ulid) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Removes a session. Returns `false` (no-op) if it has no owned
    /// transactions still in `Building` — callers must check
    /// `session_has_building_tx` first and reject with `SessionBusy`.
    pub fn remove_session(&mut self, session_id: &Ulid) -> bool {
        if self.sessions.remove(session_id).is_some() {
            self.by_session.remove(session_id);
            true
        } else {
            false
        }
    }

    pub fn session_has_building_tx(&self, session_id: &Ulid) -> bool {
        self.by_session
            .get(session_id)
            .map(|tx_ids| {
                tx_ids
                    .iter()
                    .filter_map(|id| self.transactions.get(id))
                    .any(|tx| tx.state() == TxState::Building)
            })
            .unwrap_or(false)
    }

    pub fn insert_transaction(&mut self, tx: Transaction) {
        let tx_id = tx.transaction_id.clone();
        let session_id = tx.session_id.clone();
        self.by_session.entry(session_id).or_default().insert(tx_id.clone());
        self.transactions.insert(tx_id, tx);
    }

    pub fn transaction(&self, tx_id: &Ulid) -> Option<&Transaction> {
        self.transactions.get(tx_id)
    }

    pub fn transaction_mut(&mut self, tx_id: &Ulid) -> Option<&mut Transaction> {
        self.transactions.get_mut(tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdAllocator;

    fn ulid(s: &str) -> Ulid {
        Ulid::from_string(s.to_string())
    }

    #[test]
    fn session_with_no_transactions_is_not_busy() {
        let mut store = TerminalStore::new();
        let session_id = ulid("01SESSION");
        store.insert_session(Session::new(session_id.clone(), "T1", None, 0));
        assert!(!store.session_has_building_tx(&session_id));
        assert!(store.remove_session(&session_id));
    }

    #[test]
    fn session_with_building_tx_is_busy() {
        let mut store = TerminalStore::new();
        let session_id = ulid("01SESSION");
        store.insert_session(Session::new(session_id.clone(), "T1", None, 0));

        let mut ids = IdAllocator::new();
        let tx = Transaction::new(ids.new_ulid(), session_id.clone(), "SGD", 2).unwrap();
        store.insert_transaction(tx);

        assert!(store.session_has_building_tx(&session_id));
    }
}
