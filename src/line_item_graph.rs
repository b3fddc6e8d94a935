// src/line_item_graph.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! The hierarchical line-item collection owned by a transaction: an ordered
//! sequence of lines with parent→children relationships, void cascade, and
//! derived totals.
//!
//! Every mutating operation is split into a `plan_*` step (validates
//! preconditions against the current in-memory state, allocates any new IDs,
//! and returns a plan — without mutating anything) and an `apply_*` step
//! (consumes the plan and mutates). The caller (the kernel's request
//! surface) writes a WAL frame for the plan between the two steps, so the
//! durability contract's "validate, log, apply" ordering holds without the
//! graph itself knowing anything about the WAL.

use crate::error::{KernelError, KernelResult};
use crate::ids::{IdAllocator, LineNumberAllocator, Ulid};
use crate::line_item::{ItemType, LineItem};
use crate::money::Money;
use crate::product::ProductRef;

#[derive(Debug, Clone)]
pub struct AddLinePlan {
    pub line_item_id: Ulid,
    pub line_number: u32,
    pub parent_line_item_id: Option<Ulid>,
    pub product: ProductRef,
    pub quantity: i32,
    pub unit_price: Money,
    pub item_type: ItemType,
    pub preparation_notes: String,
}

#[derive(Debug, Clone)]
pub struct UpdateQuantityPlan {
    pub line_item_id: Ulid,
    pub new_quantity: i32,
}

#[derive(Debug, Clone)]
pub struct UpdatePrepNotesPlan {
    pub line_item_id: Ulid,
    pub notes: String,
}

/// Pre-order cascade: `target` first (matching spec.md's void_line target),
/// then descendants in pre-order. Empty when the target is already voided —
/// the caller writes no WAL frame for an empty plan.
#[derive(Debug, Clone)]
pub struct VoidPlan {
    pub reason: Option<String>,
    pub cascaded_ids: Vec<Ulid>,
}

pub struct LineItemGraph {
    currency: String,
    decimal_places: u8,
    lines: Vec<LineItem>,
    line_numbers: LineNumberAllocator,
}

impl LineItemGraph {
    pub fn new(currency: &str, decimal_places: u8) -> Self {
        Self {
            currency: currency.to_uppercase(),
            decimal_places,
            lines: Vec::new(),
            line_numbers: LineNumberAllocator::new(),
        }
    }

    fn check_price_currency(&self, price: &Money) -> KernelResult<()> {
        if price.currency() != self.currency {
            return Err(KernelError::CurrencyMismatch);
        }
        if price.decimal_places() != self.decimal_places {
            return Err(KernelError::DecimalPlacesMismatch);
        }
        Ok(())
    }

    fn find(&self, line_item_id: &Ulid) -> Option<&LineItem> {
        self.lines.iter().find(|l| &l.line_item_id == line_item_id)
    }

    fn find_index(&self, line_item_id: &Ulid) -> Option<usize> {
        self.lines.iter().position(|l| &l.line_item_id == line_item_id)
    }

    /// Validates a top-level sale line without mutating the graph.
    pub fn plan_add_sale(
        &self,
        id_alloc: &mut IdAllocator,
        product: ProductRef,
        quantity: i32,
        unit_price: Money,
        preparation_notes: String,
    ) -> KernelResult<AddLinePlan> {
        if quantity < 1 {
            return Err(KernelError::InvalidQuantity);
        }
        self.check_price_currency(&unit_price)?;
        Ok(AddLinePlan {
            line_item_id: id_alloc.new_ulid(),
            line_number: self.next_line_number_preview(),
            parent_line_item_id: None,
            product,
            quantity,
            unit_price,
            item_type: ItemType::Sale,
            preparation_notes,
        })
    }

    /// Validates a child line (Modification/AutomaticInclusion/Discount/
    /// Tax/Fee) without mutating the graph.
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
        if item_type == ItemType::Sale {
            return Err(KernelError::InvalidItemType);
        }
        if quantity < 1 {
            return Err(KernelError::InvalidQuantity);
        }
        let parent = self.find(parent_line_item_id).ok_or(KernelError::LineNotFound)?;
        if parent.is_voided {
            return Err(KernelError::ParentVoided);
        }
        self.check_price_currency(&unit_price)?;
        Ok(AddLinePlan {
            line_item_id: id_alloc.new_ulid(),
            line_number: self.next_line_number_preview(),
            parent_line_item_id: Some(parent_line_item_id.clone()),
            product,
            quantity,
            unit_price,
            item_type,
            preparation_notes,
        })
    }

    /// Applies a previously validated plan. Never fails — everything that
    /// could go wrong was already checked by `plan_add_sale`/`plan_add_child`.
    pub fn apply_add_line(&mut self, plan: AddLinePlan) -> &LineItem {
        let line_number = self.line_numbers.next();
        debug_assert_eq!(line_number, plan.line_number, "line number allocated out of order");
        self.lines.push(LineItem {
            line_item_id: plan.line_item_id,
            line_number,
            parent_line_item_id: plan.parent_line_item_id,
            product: plan.product,
            quantity: plan.quantity,
            unit_price: plan.unit_price,
            item_type: plan.item_type,
            preparation_notes: plan.preparation_notes,
            is_voided: false,
            void_reason: None,
        });
        self.lines.last().unwrap()
    }

    pub fn plan_update_quantity(&self, line_item_id: &Ulid, new_quantity: i32) -> KernelResult<UpdateQuantityPlan> {
        if new_quantity < 1 {
            return Err(KernelError::InvalidQuantity);
        }
        let line = self.find(line_item_id).ok_or(KernelError::LineNotFound)?;
        if line.is_voided {
            return Err(KernelError::LineNotFound);
        }
        Ok(UpdateQuantityPlan {
            line_item_id: line_item_id.clone(),
            new_quantity,
        })
    }

    pub fn apply_update_quantity(&mut self, plan: UpdateQuantityPlan) {
        let idx = self.find_index(&plan.line_item_id).expect("plan validated against this graph");
        self.lines[idx].quantity = plan.new_quantity;
    }

    pub fn plan_update_preparation_notes(&self, line_item_id: &Ulid, notes: String) -> KernelResult<UpdatePrepNotesPlan> {
        self.find(line_item_id).ok_or(KernelError::LineNotFound)?;
        Ok(UpdatePrepNotesPlan {
            line_item_id: line_item_id.clone(),
            notes,
        })
    }

    pub fn apply_update_preparation_notes(&mut self, plan: UpdatePrepNotesPlan) {
        let idx = self.find_index(&plan.line_item_id).expect("plan validated against this graph");
        self.lines[idx].preparation_notes = plan.notes;
    }

    /// Computes the pre-order void cascade without mutating anything.
    /// Returns an empty plan (idempotent no-op) if the target is already
    /// voided.
    pub fn plan_void(&self, line_item_id: &Ulid, reason: Option<String>) -> KernelResult<VoidPlan> {
        let target = self.find(line_item_id).ok_or(KernelError::LineNotFound)?;
        if target.is_voided {
            return Ok(VoidPlan {
                reason,
                cascaded_ids: Vec::new(),
            });
        }
        let mut cascaded_ids = vec![line_item_id.clone()];
        self.collect_descendants_preorder(line_item_id, &mut cascaded_ids);
        Ok(VoidPlan { reason, cascaded_ids })
    }

    fn collect_descendants_preorder(&self, parent_id: &Ulid, out: &mut Vec<Ulid>) {
        for line in &self.lines {
            if line.parent_line_item_id.as_ref() == Some(parent_id) {
                out.push(line.line_item_id.clone());
                self.collect_descendants_preorder(&line.line_item_id, out);
            }
        }
    }

    pub fn apply_void(&mut self, plan: &VoidPlan) {
        for id in &plan.cascaded_ids {
            if let Some(idx) = self.find_index(id) {
                self.lines[idx].is_voided = true;
                self.lines[idx].void_reason = plan.reason.clone();
            }
        }
    }

    /// Sum of `extended_price` over non-voided lines, in insertion order.
    pub fn total(&self) -> KernelResult<Money> {
        let mut total = Money::zero(&self.currency, self.decimal_places)?;
        for line in &self.lines {
            if line.is_voided {
                continue;
            }
            total = total.add(&line.extended_price()?)?;
        }
        Ok(total)
    }

    /// Pre-order traversal honoring insertion order among siblings, for
    /// receipt rendering. Includes voided lines (visible audit trail).
    pub fn iter_display(&self) -> Vec<(u32, &LineItem)> {
        let roots: Vec<&LineItem> = self.lines.iter().filter(|l| l.parent_line_item_id.is_none()).collect();
        let mut out = Vec::with_capacity(self.lines.len());
        for root in roots {
            self.push_preorder(root, 0, &mut out);
        }
        out
    }

    fn push_preorder<'a>(&'a self, line: &'a LineItem, depth: u32, out: &mut Vec<(u32, &'a LineItem)>) {
        out.push((depth, line));
        for child in self.lines.iter().filter(|l| l.parent_line_item_id.as_ref() == Some(&line.line_item_id)) {
            self.push_preorder(child, depth + 1, out);
        }
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    fn next_line_number_preview(&self) -> u32 {
        self.line_numbers.peek_next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sgd(minor: i64) -> Money {
        Money::new("SGD", 2, minor).unwrap()
    }

    fn graph() -> LineItemGraph {
        LineItemGraph::new("SGD", 2)
    }

    #[test]
    fn add_sale_then_total() {
        let mut g = graph();
        let mut ids = IdAllocator::new();
        let plan = g
            .plan_add_sale(&mut ids, ProductRef::new("KOPI001").unwrap(), 1, sgd(140), String::new())
            .unwrap();
        g.apply_add_line(plan);
        assert_eq!(g.total().unwrap().minor_units(), 140);
    }

    #[test]
    fn add_sale_rejects_currency_mismatch() {
        let g = graph();
        let mut ids = IdAllocator::new();
        let err = g
            .plan_add_sale(&mut ids, ProductRef::new("KOPI001").unwrap(), 1, Money::new("USD", 2, 100).unwrap(), String::new())
            .unwrap_err();
        assert_eq!(err, KernelError::CurrencyMismatch);
    }

    #[test]
    fn add_child_rejects_sale_item_type() {
        let mut g = graph();
        let mut ids = IdAllocator::new();
        let parent_plan = g
            .plan_add_sale(&mut ids, ProductRef::new("TSET001").unwrap(), 1, sgd(740), String::new())
            .unwrap();
        let parent_id = parent_plan.line_item_id.clone();
        g.apply_add_line(parent_plan);

        let err = g
            .plan_add_child(&mut ids, &parent_id, ProductRef::new("X").unwrap(), 1, sgd(0), ItemType::Sale, String::new())
            .unwrap_err();
        assert_eq!(err, KernelError::InvalidItemType);
    }

    #[test]
    fn void_cascades_to_descendants() {
        let mut g = graph();
        let mut ids = IdAllocator::new();
        let a_plan = g
            .plan_add_sale(&mut ids, ProductRef::new("TSET001").unwrap(), 1, sgd(740), String::new())
            .unwrap();
        let a_id = a_plan.line_item_id.clone();
        g.apply_add_line(a_plan);

        let b_plan = g
            .plan_add_child(&mut ids, &a_id, ProductRef::new("TEH002").unwrap(), 1, sgd(0), ItemType::Modification, String::new())
            .unwrap();
        let b_id = b_plan.line_item_id.clone();
        g.apply_add_line(b_plan);

        let c_plan = g
            .plan_add_child(&mut ids, &b_id, ProductRef::new("NOSUGAR").unwrap(), 1, sgd(0), ItemType::Modification, String::new())
            .unwrap();
        g.apply_add_line(c_plan);

        assert_eq!(g.total().unwrap().minor_units(), 740);

        let void_plan = g.plan_void(&a_id, Some("customer changed mind".into())).unwrap();
        assert_eq!(void_plan.cascaded_ids.len(), 3);
        g.apply_void(&void_plan);

        assert_eq!(g.total().unwrap().minor_units(), 0);
        assert!(g.lines().iter().all(|l| l.is_voided));
    }

    #[test]
    fn void_is_idempotent_on_already_voided() {
        let mut g = graph();
        let mut ids = IdAllocator::new();
        let plan = g
            .plan_add_sale(&mut ids, ProductRef::new("KOPI001").unwrap(), 1, sgd(140), String::new())
            .unwrap();
        let id = plan.line_item_id.clone();
        g.apply_add_line(plan);

        let void1 = g.plan_void(&id, None).unwrap();
        g.apply_void(&void1);

        let void2 = g.plan_void(&id, None).unwrap();
        assert!(void2.cascaded_ids.is_empty());
    }

    #[test]
    fn add_child_rejects_voided_parent() {
        let mut g = graph();
        let mut ids = IdAllocator::new();
        let plan = g
            .plan_add_sale(&mut ids, ProductRef::new("KOPI001").unwrap(), 1, sgd(140), String::new())
            .unwrap();
        let id = plan.line_item_id.clone();
        g.apply_add_line(plan);
        let void_plan = g.plan_void(&id, None).unwrap();
        g.apply_void(&void_plan);

        let err = g
            .plan_add_child(&mut ids, &id, ProductRef::new("X").unwrap(), 1, sgd(0), ItemType::Modification, String::new())
            .unwrap_err();
        assert_eq!(err, KernelError::ParentVoided);
    }

    #[test]
    fn line_numbers_never_reused_after_void() {
        let mut g = graph();
        let mut ids = IdAllocator::new();
        let p1 = g
            .plan_add_sale(&mut ids, ProductRef::new("A").unwrap(), 1, sgd(100), String::new())
            .unwrap();
        let id1 = p1.line_item_id.clone();
        g.apply_add_line(p1);
        let void_plan = g.plan_void(&id1, None).unwrap();
        g.apply_void(&void_plan);

        let p2 = g
            .plan_add_sale(&mut ids, ProductRef::new("B").unwrap(), 1, sgd(100), String::new())
            .unwrap();
        g.apply_add_line(p2);

        assert_eq!(g.lines()[0].line_number, 1);
        assert_eq!(g.lines()[1].line_number, 2);
    }
}
