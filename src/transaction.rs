// src/transaction.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! The transaction lifecycle state machine: Building -> ReadyForPayment ->
//! Completed/Cancelled. Owns a `LineItemGraph` and the tender ledger.

use crate::error::{KernelError, KernelResult};
use crate::ids::{IdAllocator, Ulid};
use crate::line_item::ItemType;
use crate::line_item_graph::{AddLinePlan, LineItemGraph, UpdatePrepNotesPlan, UpdateQuantityPlan, VoidPlan};
use crate::money::Money;
use crate::product::ProductRef;
use crate::tender::{Tender, TenderKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Building,
    ReadyForPayment,
    Completed,
    Cancelled,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxState::Completed | TxState::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct AddTenderPlan {
    pub tender_sequence: u32,
    pub kind: TenderKind,
    pub amount: Money,
    pub resulting_state: TxState,
}

#[derive(Debug, Clone)]
pub struct CancelPlan {
    pub reason: Option<String>,
}

pub struct Transaction {
    pub transaction_id: Ulid,
    pub session_id: Ulid,
    currency: String,
    decimal_places: u8,
    state: TxState,
    lines: LineItemGraph,
    tenders: Vec<Tender>,
}

impl Transaction {
    pub fn new(transaction_id: Ulid, session_id: Ulid, currency: &str, decimal_places: u8) -> KernelResult<Self> {
        if currency.is_empty() || !(0..=4).contains(&decimal_places) {
            return Err(KernelError::InvalidCurrency(currency.to_string()));
        }
        Ok(Self {
            transaction_id,
            session_id,
            currency: currency.to_uppercase(),
            decimal_places,
            state: TxState::Building,
            lines: LineItemGraph::new(currency, decimal_places),
            tenders: Vec::new(),
        })
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn decimal_places(&self) -> u8 {
        self.decimal_places
    }

    pub fn lines(&self) -> &LineItemGraph {
        &self.lines
    }

    pub fn tenders(&self) -> &[Tender] {
        &self.tenders
    }

    fn require_building(&self) -> KernelResult<()> {
        if self.state != TxState::Building {
            return Err(KernelError::InvalidState);
        }
        Ok(())
    }

    fn require_accepting_tenders(&self) -> KernelResult<()> {
        match self.state {
            TxState::Building | TxState::ReadyForPayment => Ok(()),
            TxState::Completed | TxState::Cancelled => Err(KernelError::InvalidState),
        }
    }

    pub fn total(&self) -> KernelResult<Money> {
        self.lines.total()
    }

    pub fn tendered(&self) -> KernelResult<Money> {
        let mut sum = Money::zero(&self.currency, self.decimal_places)?;
        for t in &self.tenders {
            sum = sum.add(&t.amount)?;
        }
        Ok(sum)
    }

    /// `None` until `tendered >= total` (spec.md §3: "defined only once
    /// tendered >= total").
    pub fn change_due(&self) -> KernelResult<Option<Money>> {
        let total = self.total()?;
        let tendered = self.tendered()?;
        if tendered.minor_units() >= total.minor_units() {
            Ok(Some(tendered.sub(&total)?))
        } else {
            Ok(None)
        }
    }

    // --- Line operations: Building only, frozen once payment starts ---

    pub fn plan_add_sale(
        &self,
        id_alloc: &mut IdAllocator,
        product: ProductRef,
        quantity: i32,
        unit_price: Money,
        preparation_notes: String,
    ) -> KernelResult<AddLinePlan> {
        self.require_building()?;
        self.lines.plan_add_sale(id_alloc, product, quantity, unit_price, preparation_notes)
    }

    pub fn apply_add_line(&mut self, plan: AddLinePlan) {
        self.lines.apply_add_line(plan);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn plan_add_child(
        &self,
        id_alloc: &mut IdAllocator,
        parent_line_item_id: &Ulid,
        product: ProductRef,
        quantity: i32,
        unit_price: Money,
        item_type: ItemType,
        preparation_notes: String,
    ) -> KernelResult<AddLinePlan> {
        self.require_building()?;
        self.lines
            .plan_add_child(id_alloc, parent_line_item_id, product, quantity, unit_price, item_type, preparation_notes)
    }

    pub fn plan_update_quantity(&self, line_item_id: &Ulid, new_quantity: i32) -> KernelResult<UpdateQuantityPlan> {
        self.require_building()?;
        self.lines.plan_update_quantity(line_item_id, new_quantity)
    }

    pub fn apply_update_quantity(&mut self, plan: UpdateQuantityPlan) {
        self.lines.apply_update_quantity(plan);
    }

    pub fn plan_update_preparation_notes(&self, line_item_id: &Ulid, notes: String) -> KernelResult<UpdatePrepNotesPlan> {
        self.require_building()?;
        self.lines.plan_update_preparation_notes(line_item_id, notes)
    }

    pub fn apply_update_preparation_notes(&mut self, plan: UpdatePrepNotesPlan) {
        self.lines.apply_update_preparation_notes(plan);
    }

    pub fn plan_void(&self, line_item_id: &Ulid, reason: Option<String>) -> KernelResult<VoidPlan> {
        self.require_building()?;
        self.lines.plan_void(line_item_id, reason)
    }

    pub fn apply_void(&mut self, plan: &VoidPlan) {
        self.lines.apply_void(plan);
    }

    // --- Tenders: Building or ReadyForPayment ---

    pub fn plan_add_tender(&self, kind: TenderKind, amount: Money) -> KernelResult<AddTenderPlan> {
        self.require_accepting_tenders()?;
        if amount.currency() != self.currency {
            return Err(KernelError::CurrencyMismatch);
        }
        if amount.decimal_places() != self.decimal_places {
            return Err(KernelError::DecimalPlacesMismatch);
        }

        let total = self.total()?;
        let tendered_so_far = self.tendered()?;
        let tendered_after = tendered_so_far.add(&amount)?;

        let resulting_state = if tendered_after.minor_units() >= total.minor_units() {
            TxState::Completed
        } else {
            TxState::ReadyForPayment
        };

        Ok(AddTenderPlan {
            tender_sequence: self.tenders.len() as u32 + 1,
            kind,
            amount,
            resulting_state,
        })
    }

    pub fn apply_add_tender(&mut self, plan: AddTenderPlan) {
        self.tenders.push(Tender {
            tender_sequence: plan.tender_sequence,
            kind: plan.kind,
            amount: plan.amount,
        });
        self.state = plan.resulting_state;
    }

    // --- Cancellation ---

    pub fn plan_cancel(&self, reason: Option<String>) -> KernelResult<CancelPlan> {
        if self.state == TxState::Completed {
            return Err(KernelError::InvalidState);
        }
        Ok(CancelPlan { reason })
    }

    pub fn apply_cancel(&mut self, _plan: CancelPlan) {
        self.state = TxState::Cancelled;
    }
}
