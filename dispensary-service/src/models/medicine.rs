//! Medicine master model for dispensary-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A stocked medicine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub medicine_id: Uuid,
    pub name: String,
    pub salt: Option<String>,
    pub strength: Option<String>,
    pub form: Option<String>,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub stock: i64,
    pub min_stock: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Medicine {
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }
}

/// Input for adding a medicine to the master list.
#[derive(Debug, Clone)]
pub struct CreateMedicine {
    pub name: String,
    pub salt: Option<String>,
    pub strength: Option<String>,
    pub form: Option<String>,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub stock: i64,
    pub min_stock: i64,
}

/// Input for editing a medicine. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateMedicine {
    pub name: Option<String>,
    pub salt: Option<String>,
    pub strength: Option<String>,
    pub form: Option<String>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub stock: Option<i64>,
    pub min_stock: Option<i64>,
}

/// Filter parameters for listing medicines.
#[derive(Debug, Clone, Default)]
pub struct ListMedicinesFilter {
    /// Substring match on name.
    pub search: Option<String>,
    /// Substring match on salt, used to find alternatives.
    pub salt: Option<String>,
    pub low_stock_only: bool,
    pub limit: Option<i64>,
}

impl ListMedicinesFilter {
    pub fn matches(&self, medicine: &Medicine) -> bool {
        let contains = |haystack: Option<&str>, needle: &Option<String>| match needle {
            Some(n) => haystack
                .map(|h| h.to_lowercase().contains(&n.trim().to_lowercase()))
                .unwrap_or(false),
            None => true,
        };
        contains(Some(&medicine.name), &self.search)
            && contains(medicine.salt.as_deref(), &self.salt)
            && (!self.low_stock_only || medicine.is_low_stock())
    }
}
