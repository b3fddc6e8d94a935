// src/line_item.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! NRF-style line items: a top-level Sale line or a child (Modification,
//! AutomaticInclusion, Discount, Tax, Fee) of another line in the same
//! transaction.

use crate::ids::Ulid;
use crate::money::Money;
use crate::product::ProductRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Sale,
    Modification,
    AutomaticInclusion,
    Discount,
    Tax,
    Fee,
}

impl ItemType {
    pub fn as_wal_code(self) -> u8 {
        match self {
            ItemType::Sale => 0,
            ItemType::Modification => 1,
            ItemType::AutomaticInclusion => 2,
            ItemType::Discount => 3,
            ItemType::Tax => 4,
            ItemType::Fee => 5,
        }
    }

    pub fn from_wal_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ItemType::Sale),
            1 => Some(ItemType::Modification),
            2 => Some(ItemType::AutomaticInclusion),
            3 => Some(ItemType::Discount),
            4 => Some(ItemType::Tax),
            5 => Some(ItemType::Fee),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineItem {
    pub line_item_id: Ulid,
    pub line_number: u32,
    pub parent_line_item_id: Option<Ulid>,
    pub product: ProductRef,
    pub quantity: i32,
    pub unit_price: Money,
    pub item_type: ItemType,
    pub preparation_notes: String,
    pub is_voided: bool,
    pub void_reason: Option<String>,
}

impl LineItem {
    /// `extended_price` is always derived, never stored independently — the
    /// wire/WAL representation never carries it.
    pub fn extended_price(&self) -> crate::error::KernelResult<Money> {
        self.unit_price.mul_by_quantity(self.quantity)
    }
}
