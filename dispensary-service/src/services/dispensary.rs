//! Dispense operations: lifecycle transitions wired to stock and persistence.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    DispenseFilter, DispenseRecord, LineItem, NewDispense, PaymentMode, ReportSummary,
    ReportWindow,
};
use crate::services::error::{DispensaryError, StockError};
use crate::services::ledger::post_payment;
use crate::services::lifecycle::{self, ensure_active};
use crate::services::metrics::{
    record_error, record_payment, record_stock_rejection, record_transition,
};
use crate::services::report::summarize;
use crate::services::repository::DispenseRepository;
use crate::services::stock::{undo, StockAdjustment, StockLedger};

/// Result of an edit: the stored record plus any money now owed back.
#[derive(Debug, Clone)]
pub struct Revised {
    pub record: DispenseRecord,
    pub refund_due: Decimal,
}

/// Entry point for every dispense operation.
///
/// Stock moves before the record is saved; when the save fails the stock
/// movement is taken back, so a failed call leaves both stores unchanged.
pub struct Dispensary {
    dispenses: Arc<dyn DispenseRepository>,
    stock: Arc<dyn StockLedger>,
}

impl Dispensary {
    pub fn new(dispenses: Arc<dyn DispenseRepository>, stock: Arc<dyn StockLedger>) -> Self {
        Self { dispenses, stock }
    }

    /// Price the draft, reserve its stock, and store it.
    #[instrument(skip_all, fields(items = draft.items.len()))]
    pub async fn create(&self, draft: NewDispense) -> Result<DispenseRecord, DispensaryError> {
        let opening = lifecycle::open(&draft).inspect_err(|e| record_error(e.kind()))?;
        self.move_stock(&opening.reservations).await?;
        // A zero-total dispense is settled, and billed, on creation.
        let bill_number = if lifecycle::settled_on_open(&opening) {
            Some(self.bill_number_or_take_back(&opening.reservations).await?)
        } else {
            None
        };

        let record = match self
            .dispenses
            .insert(&draft, &opening.charges, bill_number)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                self.take_back(&opening.reservations).await;
                record_error(e.kind());
                return Err(e);
            }
        };

        record_transition("created");
        info!(
            dispense_id = %record.id,
            total = %record.total,
            status = %record.payment_status(),
            "Dispense created"
        );
        Ok(record)
    }

    pub async fn get(&self, id: Uuid) -> Result<DispenseRecord, DispensaryError> {
        self.dispenses
            .load(id)
            .await?
            .ok_or_else(|| DispensaryError::NotFound(format!("Dispense {}", id)))
    }

    pub async fn list(
        &self,
        filter: &DispenseFilter,
    ) -> Result<Vec<DispenseRecord>, DispensaryError> {
        self.dispenses.query(filter).await
    }

    /// Replace the items and amounts of an active dispense.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn update(
        &self,
        id: Uuid,
        items: Vec<LineItem>,
        tax: Decimal,
        discount: Decimal,
        expected_version: Option<i64>,
    ) -> Result<Revised, DispensaryError> {
        let current = self.load_at(id, expected_version).await?;
        let revision = lifecycle::revise(&current, items, tax, discount)
            .inspect_err(|e| record_error(e.kind()))?;

        let mut next = revision.record;
        self.move_stock(&revision.stock).await?;
        if lifecycle::needs_bill_number(&next) {
            next.bill_number = Some(self.bill_number_or_take_back(&revision.stock).await?);
        }
        let record = self.save_or_take_back(&next, &revision.stock).await?;

        if revision.refund_due > Decimal::ZERO {
            warn!(
                dispense_id = %record.id,
                refund_due = %revision.refund_due,
                "Edit left collected amount above the new total"
            );
        }
        record_transition("updated");
        info!(dispense_id = %record.id, total = %record.total, "Dispense updated");

        Ok(Revised {
            record,
            refund_due: revision.refund_due,
        })
    }

    /// Cancel an active dispense and return all of its stock.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        id: Uuid,
        expected_version: Option<i64>,
    ) -> Result<DispenseRecord, DispensaryError> {
        let current = self.load_at(id, expected_version).await?;
        let cancellation = lifecycle::cancel(&current).inspect_err(|e| record_error(e.kind()))?;

        self.move_stock(&cancellation.stock).await?;
        let record = self
            .save_or_take_back(&cancellation.record, &cancellation.stock)
            .await?;

        record_transition("cancelled");
        info!(
            dispense_id = %record.id,
            paid_amount = %record.paid_amount,
            "Dispense cancelled"
        );
        Ok(record)
    }

    /// Post a collection (positive) or refund (negative) against a dispense.
    #[instrument(skip(self, reference))]
    pub async fn pay(
        &self,
        id: Uuid,
        amount: Decimal,
        mode: PaymentMode,
        reference: Option<String>,
        expected_version: Option<i64>,
    ) -> Result<DispenseRecord, DispensaryError> {
        let mut next = self.load_at(id, expected_version).await?;
        let entry = post_payment(&mut next, amount, mode, reference)
            .inspect_err(|e| record_error(e.kind()))?;
        if lifecycle::needs_bill_number(&next) {
            next.bill_number = Some(self.dispenses.next_bill_number(Utc::now().date_naive()).await?);
        }
        let record = self.dispenses.save(&next).await.inspect_err(|e| record_error(e.kind()))?;

        let kind = if entry.is_refund() { "refund" } else { "collection" };
        record_payment(kind, mode.as_str());
        info!(
            dispense_id = %record.id,
            amount = %entry.amount,
            paid_amount = %record.paid_amount,
            status = %record.payment_status(),
            "Payment posted"
        );
        Ok(record)
    }

    /// Make sure an active dispense has a bill number, assigning one if needed.
    #[instrument(skip(self))]
    pub async fn issue_bill(&self, id: Uuid) -> Result<DispenseRecord, DispensaryError> {
        let current = self.get(id).await?;
        ensure_active(&current, "bill")?;
        if current.bill_number.is_some() {
            return Ok(current);
        }

        let mut next = current;
        next.bill_number = Some(self.dispenses.next_bill_number(Utc::now().date_naive()).await?);
        let record = self.dispenses.save(&next).await?;

        record_transition("billed");
        info!(
            dispense_id = %record.id,
            bill_number = %record.bill_number.as_deref().unwrap_or(""),
            "Bill issued"
        );
        Ok(record)
    }

    /// Reconciliation totals for dispenses created inside `window`.
    #[instrument(skip(self))]
    pub async fn report(&self, window: ReportWindow) -> Result<ReportSummary, DispensaryError> {
        let filter = DispenseFilter {
            created_from: Some(window.start_date),
            created_to: Some(window.end_date),
            ..Default::default()
        };
        let records = self.dispenses.query(&filter).await?;
        Ok(summarize(&records, &window))
    }

    pub async fn health_check(&self) -> Result<(), DispensaryError> {
        self.dispenses.health_check().await
    }

    async fn load_at(
        &self,
        id: Uuid,
        expected_version: Option<i64>,
    ) -> Result<DispenseRecord, DispensaryError> {
        let record = self.get(id).await?;
        match expected_version {
            Some(expected) if expected != record.version => {
                record_error("conflict");
                Err(DispensaryError::Conflict {
                    id,
                    expected,
                    actual: record.version,
                })
            }
            _ => Ok(record),
        }
    }

    async fn move_stock(&self, adjustments: &[StockAdjustment]) -> Result<(), DispensaryError> {
        if adjustments.is_empty() {
            return Ok(());
        }
        self.stock.apply(adjustments).await.inspect_err(|e| {
            if let DispensaryError::Stock(stock) = e {
                let reason = match stock {
                    StockError::Insufficient { .. } => "insufficient",
                    StockError::UnknownItem(_) => "unknown_item",
                };
                record_stock_rejection(reason);
                warn!(error = %stock, "Stock reservation rejected");
            }
            record_error(e.kind());
        })
    }

    async fn save_or_take_back(
        &self,
        record: &DispenseRecord,
        moved: &[StockAdjustment],
    ) -> Result<DispenseRecord, DispensaryError> {
        match self.dispenses.save(record).await {
            Ok(saved) => Ok(saved),
            Err(e) => {
                self.take_back(moved).await;
                record_error(e.kind());
                Err(e)
            }
        }
    }

    async fn bill_number_or_take_back(
        &self,
        moved: &[StockAdjustment],
    ) -> Result<String, DispensaryError> {
        match self.dispenses.next_bill_number(Utc::now().date_naive()).await {
            Ok(number) => Ok(number),
            Err(e) => {
                self.take_back(moved).await;
                record_error(e.kind());
                Err(e)
            }
        }
    }

    async fn take_back(&self, moved: &[StockAdjustment]) {
        if moved.is_empty() {
            return;
        }
        if let Err(e) = self.stock.apply(&undo(moved)).await {
            tracing::error!(error = %e, "Failed to take back stock after a failed save");
        }
    }
}
