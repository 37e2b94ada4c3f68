//! In-memory medicines master and stock ledger.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{stock_key, CreateMedicine, ListMedicinesFilter, Medicine, UpdateMedicine};
use crate::services::error::{DispensaryError, StockError};
use crate::services::stock::{MedicineCatalog, StockAdjustment, StockLedger};

/// Field checks shared by every catalog implementation.
pub fn check_medicine(
    name: &str,
    prices: [Decimal; 2],
    levels: [i64; 2],
) -> Result<(), DispensaryError> {
    if name.trim().is_empty() {
        return Err(DispensaryError::validation("medicine name is required"));
    }
    if prices.iter().any(|p| *p < Decimal::ZERO) {
        return Err(DispensaryError::validation("prices must not be negative"));
    }
    if levels.iter().any(|l| *l < 0) {
        return Err(DispensaryError::validation("stock levels must not be negative"));
    }
    Ok(())
}

fn duplicate(name: &str) -> DispensaryError {
    DispensaryError::validation(format!("medicine '{}' already exists", name.trim()))
}

/// Process-local inventory. A batch of adjustments is checked and applied
/// under a single write lock.
#[derive(Default)]
pub struct InMemoryInventory {
    medicines: RwLock<HashMap<Uuid, Medicine>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }
}

fn find_by_key<'a>(
    medicines: &'a mut HashMap<Uuid, Medicine>,
    key: &str,
) -> Option<&'a mut Medicine> {
    medicines.values_mut().find(|m| stock_key(&m.name) == key)
}

fn adjust(
    medicines: &mut HashMap<Uuid, Medicine>,
    adjustment: &StockAdjustment,
) -> Result<(), StockError> {
    let Some(medicine) = find_by_key(medicines, &adjustment.item) else {
        if adjustment.quantity < 0 {
            warn!(item = %adjustment.item, quantity = -adjustment.quantity, "Released stock for a medicine no longer listed");
            return Ok(());
        }
        return Err(StockError::UnknownItem(adjustment.item.clone()));
    };
    if medicine.stock < adjustment.quantity {
        return Err(StockError::Insufficient {
            item: adjustment.item.clone(),
            requested: adjustment.quantity,
            available: medicine.stock,
        });
    }
    medicine.stock -= adjustment.quantity;
    medicine.updated_utc = Utc::now();
    Ok(())
}

#[async_trait]
impl StockLedger for InMemoryInventory {
    async fn reserve(&self, item: &str, quantity: i64) -> Result<(), DispensaryError> {
        self.apply(&[StockAdjustment::reserve(item, quantity)]).await
    }

    async fn release(&self, item: &str, quantity: i64) -> Result<(), DispensaryError> {
        self.apply(&[StockAdjustment::release(item, quantity)]).await
    }

    async fn apply(&self, adjustments: &[StockAdjustment]) -> Result<(), DispensaryError> {
        let mut medicines = self.medicines.write().await;
        let mut staged = medicines.clone();
        for adjustment in adjustments {
            adjust(&mut staged, adjustment)?;
        }
        *medicines = staged;
        Ok(())
    }
}

#[async_trait]
impl MedicineCatalog for InMemoryInventory {
    async fn create_medicine(&self, input: &CreateMedicine) -> Result<Medicine, DispensaryError> {
        check_medicine(
            &input.name,
            [input.cost_price, input.selling_price],
            [input.stock, input.min_stock],
        )?;

        let mut medicines = self.medicines.write().await;
        let key = stock_key(&input.name);
        if find_by_key(&mut medicines, &key).is_some() {
            return Err(duplicate(&input.name));
        }

        let now = Utc::now();
        let medicine = Medicine {
            medicine_id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            salt: input.salt.clone(),
            strength: input.strength.clone(),
            form: input.form.clone(),
            cost_price: input.cost_price,
            selling_price: input.selling_price,
            stock: input.stock,
            min_stock: input.min_stock,
            created_utc: now,
            updated_utc: now,
        };
        medicines.insert(medicine.medicine_id, medicine.clone());
        info!(medicine_id = %medicine.medicine_id, name = %medicine.name, "Medicine created");
        Ok(medicine)
    }

    async fn get_medicine(&self, medicine_id: Uuid) -> Result<Option<Medicine>, DispensaryError> {
        Ok(self.medicines.read().await.get(&medicine_id).cloned())
    }

    async fn update_medicine(
        &self,
        medicine_id: Uuid,
        input: &UpdateMedicine,
    ) -> Result<Option<Medicine>, DispensaryError> {
        let mut medicines = self.medicines.write().await;
        let Some(current) = medicines.get(&medicine_id) else {
            return Ok(None);
        };

        let mut next = current.clone();
        if let Some(name) = &input.name {
            next.name = name.trim().to_string();
        }
        if let Some(salt) = &input.salt {
            next.salt = Some(salt.clone());
        }
        if let Some(strength) = &input.strength {
            next.strength = Some(strength.clone());
        }
        if let Some(form) = &input.form {
            next.form = Some(form.clone());
        }
        next.cost_price = input.cost_price.unwrap_or(next.cost_price);
        next.selling_price = input.selling_price.unwrap_or(next.selling_price);
        next.stock = input.stock.unwrap_or(next.stock);
        next.min_stock = input.min_stock.unwrap_or(next.min_stock);
        check_medicine(
            &next.name,
            [next.cost_price, next.selling_price],
            [next.stock, next.min_stock],
        )?;

        let key = stock_key(&next.name);
        let taken = medicines
            .values()
            .any(|m| m.medicine_id != medicine_id && stock_key(&m.name) == key);
        if taken {
            return Err(duplicate(&next.name));
        }

        next.updated_utc = Utc::now();
        medicines.insert(medicine_id, next.clone());
        Ok(Some(next))
    }

    async fn list_medicines(
        &self,
        filter: &ListMedicinesFilter,
    ) -> Result<Vec<Medicine>, DispensaryError> {
        let medicines = self.medicines.read().await;
        let mut found: Vec<Medicine> = medicines
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        if let Some(limit) = filter.limit {
            found.truncate(limit.max(0) as usize);
        }
        Ok(found)
    }
}
