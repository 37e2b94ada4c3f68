//! Inventory collaborators: the stock adjustment contract and the medicine catalog.

use std::collections::BTreeMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{CreateMedicine, LineItem, ListMedicinesFilter, Medicine, UpdateMedicine};
use crate::services::error::DispensaryError;

/// A signed change to one medicine's stock: positive reserves, negative releases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAdjustment {
    pub item: String,
    pub quantity: i64,
}

impl StockAdjustment {
    pub fn reserve(item: impl Into<String>, quantity: i64) -> Self {
        Self {
            item: item.into(),
            quantity,
        }
    }

    pub fn release(item: impl Into<String>, quantity: i64) -> Self {
        Self {
            item: item.into(),
            quantity: -quantity,
        }
    }

    pub fn inverse(&self) -> Self {
        Self {
            item: self.item.clone(),
            quantity: -self.quantity,
        }
    }
}

fn totals_by_item(items: &[LineItem]) -> BTreeMap<String, i64> {
    let mut totals = BTreeMap::new();
    for item in items {
        let total = totals.entry(item.stock_key()).or_insert(0_i64);
        *total = total.saturating_add(item.quantity);
    }
    totals
}

/// Reservations needed to dispense `items`, one per medicine.
pub fn reservations_for(items: &[LineItem]) -> Vec<StockAdjustment> {
    totals_by_item(items)
        .into_iter()
        .map(|(item, quantity)| StockAdjustment::reserve(item, quantity))
        .collect()
}

/// Releases returning every unit of `items` to stock.
pub fn releases_for(items: &[LineItem]) -> Vec<StockAdjustment> {
    totals_by_item(items)
        .into_iter()
        .map(|(item, quantity)| StockAdjustment::release(item, quantity))
        .collect()
}

/// Net per-medicine change when a bill's items go from `old` to `new`.
///
/// Releases come first so a swap between medicines never trips a
/// reservation on stock the same edit is about to return.
pub fn delta_between(old: &[LineItem], new: &[LineItem]) -> Vec<StockAdjustment> {
    let mut net = totals_by_item(new);
    for (item, quantity) in totals_by_item(old) {
        let change = net.entry(item).or_insert(0_i64);
        *change = change.saturating_sub(quantity);
    }
    let mut adjustments: Vec<StockAdjustment> = net
        .into_iter()
        .filter(|(_, quantity)| *quantity != 0)
        .map(|(item, quantity)| StockAdjustment { item, quantity })
        .collect();
    adjustments.sort_by_key(|a| a.quantity > 0);
    adjustments
}

/// Adjustments that take back `applied`, newest first.
pub fn undo(applied: &[StockAdjustment]) -> Vec<StockAdjustment> {
    applied.iter().rev().map(StockAdjustment::inverse).collect()
}

/// Reserve and release medicine stock.
///
/// Releasing a medicine that has left the master list succeeds without
/// effect. `apply` must be all-or-nothing. The provided implementation issues calls
/// one at a time and compensates in reverse order when one fails; stores with
/// real transactions should override it.
#[async_trait]
pub trait StockLedger: Send + Sync {
    async fn reserve(&self, item: &str, quantity: i64) -> Result<(), DispensaryError>;

    async fn release(&self, item: &str, quantity: i64) -> Result<(), DispensaryError>;

    async fn apply(&self, adjustments: &[StockAdjustment]) -> Result<(), DispensaryError> {
        let mut applied: Vec<&StockAdjustment> = Vec::with_capacity(adjustments.len());
        for adjustment in adjustments {
            match apply_one(self, adjustment).await {
                Ok(()) => applied.push(adjustment),
                Err(err) => {
                    for done in applied.into_iter().rev() {
                        if let Err(undo) = apply_one(self, &done.inverse()).await {
                            tracing::error!(
                                item = %done.item,
                                quantity = done.quantity,
                                error = %undo,
                                "Failed to roll back stock adjustment"
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

async fn apply_one<L: StockLedger + ?Sized>(
    ledger: &L,
    adjustment: &StockAdjustment,
) -> Result<(), DispensaryError> {
    if adjustment.quantity >= 0 {
        ledger.reserve(&adjustment.item, adjustment.quantity).await
    } else {
        ledger.release(&adjustment.item, -adjustment.quantity).await
    }
}

/// The medicines master list.
#[async_trait]
pub trait MedicineCatalog: Send + Sync {
    async fn create_medicine(&self, input: &CreateMedicine) -> Result<Medicine, DispensaryError>;

    async fn get_medicine(&self, medicine_id: Uuid) -> Result<Option<Medicine>, DispensaryError>;

    async fn update_medicine(
        &self,
        medicine_id: Uuid,
        input: &UpdateMedicine,
    ) -> Result<Option<Medicine>, DispensaryError>;

    async fn list_medicines(
        &self,
        filter: &ListMedicinesFilter,
    ) -> Result<Vec<Medicine>, DispensaryError>;
}
