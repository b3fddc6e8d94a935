// src/money.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! Integer minor-units money. No formatting, no rounding, no locale
//! handling — those are collaborator concerns (see crate-level docs).

use crate::error::{KernelError, KernelResult};

/// An exact monetary amount: a currency code, the number of decimal places
/// the caller has chosen for that currency, and a signed count of minor
/// units (e.g. cents). The kernel never infers `decimal_places` — it is
/// supplied by the caller on every `Money` constructed at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Money {
    currency: String,
    decimal_places: u8,
    minor_units: i64,
}

impl Money {
    /// Builds a `Money`. `currency` is upper-cased; `decimal_places` must be
    /// in `0..=4` or `InvalidCurrency` is returned.
    pub fn new(currency: &str, decimal_places: u8, minor_units: i64) -> KernelResult<Self> {
        if currency.is_empty() || !(0..=4).contains(&decimal_places) {
            return Err(KernelError::InvalidCurrency(currency.to_string()));
        }
        Ok(Self {
            currency: currency.to_uppercase(),
            decimal_places,
            minor_units,
        })
    }

    /// Zero-valued `Money` in the given currency/decimal_places.
    pub fn zero(currency: &str, decimal_places: u8) -> KernelResult<Self> {
        Self::new(currency, decimal_places, 0)
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn decimal_places(&self) -> u8 {
        self.decimal_places
    }

    pub fn minor_units(&self) -> i64 {
        self.minor_units
    }

    fn check_compatible(&self, other: &Money) -> KernelResult<()> {
        if self.currency != other.currency {
            return Err(KernelError::CurrencyMismatch);
        }
        if self.decimal_places != other.decimal_places {
            return Err(KernelError::DecimalPlacesMismatch);
        }
        Ok(())
    }

    pub fn add(&self, other: &Money) -> KernelResult<Money> {
        self.check_compatible(other)?;
        let minor_units = self
            .minor_units
            .checked_add(other.minor_units)
            .ok_or(KernelError::Arithmetic)?;
        Ok(Money {
            currency: self.currency.clone(),
            decimal_places: self.decimal_places,
            minor_units,
        })
    }

    pub fn sub(&self, other: &Money) -> KernelResult<Money> {
        self.check_compatible(other)?;
        let minor_units = self
            .minor_units
            .checked_sub(other.minor_units)
            .ok_or(KernelError::Arithmetic)?;
        Ok(Money {
            currency: self.currency.clone(),
            decimal_places: self.decimal_places,
            minor_units,
        })
    }

    /// Multiplies by a (positive) quantity, e.g. unit price * line quantity.
    pub fn mul_by_quantity(&self, quantity: i32) -> KernelResult<Money> {
        let minor_units = self
            .minor_units
            .checked_mul(quantity as i64)
            .ok_or(KernelError::Arithmetic)?;
        Ok(Money {
            currency: self.currency.clone(),
            decimal_places: self.decimal_places,
            minor_units,
        })
    }

    pub fn checked_neg(&self) -> KernelResult<Money> {
        let minor_units = self.minor_units.checked_neg().ok_or(KernelError::Arithmetic)?;
        Ok(Money {
            currency: self.currency.clone(),
            decimal_places: self.decimal_places,
            minor_units,
        })
    }

    pub fn is_negative(&self) -> bool {
        self.minor_units < 0
    }

    pub fn is_zero(&self) -> bool {
        self.minor_units == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_requires_matching_currency() {
        let sgd = Money::new("SGD", 2, 100).unwrap();
        let usd = Money::new("USD", 2, 100).unwrap();
        assert_eq!(sgd.add(&usd), Err(KernelError::CurrencyMismatch));
    }

    #[test]
    fn add_requires_matching_decimal_places() {
        let a = Money::new("JPY", 0, 100).unwrap();
        let b = Money::new("JPY", 2, 100).unwrap();
        assert_eq!(a.add(&b), Err(KernelError::DecimalPlacesMismatch));
    }

    #[test]
    fn mul_by_quantity_computes_extended_price() {
        let unit = Money::new("SGD", 2, 140).unwrap();
        let extended = unit.mul_by_quantity(3).unwrap();
        assert_eq!(extended.minor_units(), 420);
    }

    #[test]
    fn overflow_is_arithmetic_error() {
        let big = Money::new("SGD", 2, i64::MAX).unwrap();
        let one = Money::new("SGD", 2, 1).unwrap();
        assert_eq!(big.add(&one), Err(KernelError::Arithmetic));
    }

    #[test]
    fn currency_code_is_upper_cased() {
        let m = Money::new("sgd", 2, 0).unwrap();
        assert_eq!(m.currency(), "SGD");
    }

    #[test]
    fn rejects_out_of_range_decimal_places() {
        assert!(Money::new("SGD", 5, 0).is_err());
    }
}
