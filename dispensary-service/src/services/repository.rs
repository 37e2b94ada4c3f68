//! Persistence contract for dispense records and its in-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{DispenseFilter, DispenseRecord, DispenseState, NewDispense};
use crate::services::charges::Charges;
use crate::services::error::DispensaryError;

/// `<prefix>-<YYYYMMDD>-<seq:05>`
pub fn format_bill_number(prefix: &str, day: NaiveDate, seq: i64) -> String {
    format!("{}-{}-{:05}", prefix, day.format("%Y%m%d"), seq)
}

/// Where dispense records live.
///
/// `save` is a compare-and-swap on `version`: the record passed in carries the
/// version it was loaded at, and the stored copy must still be at that version.
#[async_trait]
pub trait DispenseRepository: Send + Sync {
    /// Persist a new active record with `paid_amount = 0` and version 1.
    async fn insert(
        &self,
        draft: &NewDispense,
        charges: &Charges,
        bill_number: Option<String>,
    ) -> Result<DispenseRecord, DispensaryError>;

    async fn load(&self, id: Uuid) -> Result<Option<DispenseRecord>, DispensaryError>;

    /// Store `record`, bumping `version` and `updated_at`.
    async fn save(&self, record: &DispenseRecord) -> Result<DispenseRecord, DispensaryError>;

    /// Matching records, newest first.
    async fn query(&self, filter: &DispenseFilter)
        -> Result<Vec<DispenseRecord>, DispensaryError>;

    /// Next bill number for `day`; sequences restart every day.
    async fn next_bill_number(&self, day: NaiveDate) -> Result<String, DispensaryError>;

    async fn health_check(&self) -> Result<(), DispensaryError> {
        Ok(())
    }
}

/// Process-local store used when no database is configured, and in tests.
pub struct InMemoryDispenses {
    bill_prefix: String,
    records: RwLock<HashMap<Uuid, DispenseRecord>>,
    bill_sequences: RwLock<HashMap<NaiveDate, i64>>,
}

impl InMemoryDispenses {
    pub fn new(bill_prefix: impl Into<String>) -> Self {
        Self {
            bill_prefix: bill_prefix.into(),
            records: RwLock::new(HashMap::new()),
            bill_sequences: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl DispenseRepository for InMemoryDispenses {
    #[instrument(skip_all)]
    async fn insert(
        &self,
        draft: &NewDispense,
        charges: &Charges,
        bill_number: Option<String>,
    ) -> Result<DispenseRecord, DispensaryError> {
        let now = Utc::now();
        let record = DispenseRecord {
            id: Uuid::new_v4(),
            subject: draft.subject.clone(),
            items: draft.items.clone(),
            subtotal: charges.subtotal,
            tax: charges.tax,
            discount: charges.discount,
            total: charges.total,
            paid_amount: Decimal::ZERO,
            state: DispenseState::Active,
            bill_number,
            payments: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        };

        self.records.write().await.insert(record.id, record.clone());
        debug!(dispense_id = %record.id, "Dispense stored");
        Ok(record)
    }

    async fn load(&self, id: Uuid) -> Result<Option<DispenseRecord>, DispensaryError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    #[instrument(skip_all, fields(dispense_id = %record.id, version = record.version))]
    async fn save(&self, record: &DispenseRecord) -> Result<DispenseRecord, DispensaryError> {
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&record.id)
            .ok_or_else(|| DispensaryError::NotFound(format!("Dispense {}", record.id)))?;

        if stored.version != record.version {
            return Err(DispensaryError::Conflict {
                id: record.id,
                expected: record.version,
                actual: stored.version,
            });
        }

        let mut next = record.clone();
        next.version += 1;
        next.updated_at = Utc::now();
        *stored = next.clone();
        Ok(next)
    }

    async fn query(
        &self,
        filter: &DispenseFilter,
    ) -> Result<Vec<DispenseRecord>, DispensaryError> {
        let records = self.records.read().await;
        let mut matched: Vec<DispenseRecord> = records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matched.truncate(limit.max(0) as usize);
        }
        Ok(matched)
    }

    async fn next_bill_number(&self, day: NaiveDate) -> Result<String, DispensaryError> {
        let mut sequences = self.bill_sequences.write().await;
        let seq = sequences.entry(day).or_insert(0);
        *seq += 1;
        Ok(format_bill_number(&self.bill_prefix, day, *seq))
    }
}
