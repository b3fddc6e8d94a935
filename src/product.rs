// src/product.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! Product reference. The kernel echoes this data through unparsed — it
//! never interprets `name`/`description`, which are catalog-supplied
//! display strings.

use crate::error::{KernelError, KernelResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductRef {
    sku: String,
    name: Option<String>,
    description: Option<String>,
}

impl ProductRef {
    pub fn new(sku: impl Into<String>) -> KernelResult<Self> {
        let sku = sku.into();
        if sku.is_empty() || sku.len() > 128 {
            return Err(KernelError::InvalidProduct(format!("sku must be 1..=128 bytes, got {}", sku.len())));
        }
        Ok(Self {
            sku,
            name: None,
            description: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_sku() {
        assert!(ProductRef::new("").is_err());
    }

    #[test]
    fn rejects_oversized_sku() {
        let sku = "X".repeat(129);
        assert!(ProductRef::new(sku).is_err());
    }

    #[test]
    fn accepts_optional_display_fields() {
        let p = ProductRef::new("KOPI001")
            .unwrap()
            .with_name("Kopi")
            .with_description("Coffee with condensed milk");
        assert_eq!(p.name(), Some("Kopi"));
        assert_eq!(p.description(), Some("Coffee with condensed milk"));
    }
}
