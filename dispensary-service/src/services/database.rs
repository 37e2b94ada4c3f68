//! Database service for dispensary-service.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    stock_key, CreateMedicine, DispenseFilter, DispenseRecord, DispenseState, DispenseSubject,
    LineItem, ListMedicinesFilter, Medicine, NewDispense, PaymentEntry, UpdateMedicine,
};
use crate::services::charges::Charges;
use crate::services::error::{DispensaryError, StockError};
use crate::services::inventory::check_medicine;
use crate::services::ledger::derive_payment_status;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::repository::{format_bill_number, DispenseRepository};
use crate::services::stock::{MedicineCatalog, StockAdjustment, StockLedger};

const DISPENSE_COLUMNS: &str = "dispense_id, patient_id, appointment_id, appointment_day, \
     daily_token, items, subtotal, tax, discount, total, paid_amount, state, bill_number, \
     payments, version, created_utc, updated_utc, cancelled_utc";

const MEDICINE_COLUMNS: &str = "medicine_id, name, salt, strength, form, cost_price, \
     selling_price, stock, min_stock, created_utc, updated_utc";

#[derive(sqlx::FromRow)]
struct DispenseRow {
    dispense_id: Uuid,
    patient_id: Option<String>,
    appointment_id: Option<String>,
    appointment_day: Option<NaiveDate>,
    daily_token: Option<i32>,
    items: Json<Vec<LineItem>>,
    subtotal: Decimal,
    tax: Decimal,
    discount: Decimal,
    total: Decimal,
    paid_amount: Decimal,
    state: String,
    bill_number: Option<String>,
    payments: Json<Vec<PaymentEntry>>,
    version: i64,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
    cancelled_utc: Option<DateTime<Utc>>,
}

impl TryFrom<DispenseRow> for DispenseRecord {
    type Error = DispensaryError;

    fn try_from(row: DispenseRow) -> Result<Self, Self::Error> {
        let state = DispenseState::from_string(&row.state).ok_or_else(|| {
            DispensaryError::Database(anyhow::anyhow!(
                "dispense {} has unknown state '{}'",
                row.dispense_id,
                row.state
            ))
        })?;
        Ok(DispenseRecord {
            id: row.dispense_id,
            subject: DispenseSubject {
                patient_id: row.patient_id,
                appointment_id: row.appointment_id,
                appointment_day: row.appointment_day,
                daily_token: row.daily_token,
            },
            items: row.items.0,
            subtotal: row.subtotal,
            tax: row.tax,
            discount: row.discount,
            total: row.total,
            paid_amount: row.paid_amount,
            state,
            bill_number: row.bill_number,
            payments: row.payments.0,
            version: row.version,
            created_at: row.created_utc,
            updated_at: row.updated_utc,
            cancelled_at: row.cancelled_utc,
        })
    }
}

fn db_error(action: &str, e: sqlx::Error) -> DispensaryError {
    DispensaryError::Database(anyhow::anyhow!("Failed to {}: {}", action, e))
}

/// Unique-name violations are a caller mistake, not an outage.
fn medicine_write_error(name: &str, e: sqlx::Error) -> DispensaryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DispensaryError::validation(format!("medicine '{}' already exists", name.trim()))
        }
        _ => db_error("write medicine", e),
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    bill_prefix: String,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "dispensary-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self {
            pool,
            bill_prefix: "DSP".to_string(),
        })
    }

    /// Prefix used when formatting bill numbers.
    pub fn with_bill_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bill_prefix = prefix.into();
        self
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

// =========================================================================
// Dispense Operations
// =========================================================================

#[async_trait]
impl DispenseRepository for Database {
    #[instrument(skip_all, fields(items = draft.items.len()))]
    async fn insert(
        &self,
        draft: &NewDispense,
        charges: &Charges,
        bill_number: Option<String>,
    ) -> Result<DispenseRecord, DispensaryError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_dispense"])
            .start_timer();

        let dispense_id = Uuid::new_v4();
        let status = derive_payment_status(charges.total, Decimal::ZERO);
        let sql = format!(
            r#"
            INSERT INTO dispenses (
                dispense_id, patient_id, appointment_id, appointment_day, daily_token, items,
                subtotal, tax, discount, total, paid_amount, state, payment_status, bill_number,
                payments, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, 'active', $11, $12, '[]'::jsonb, 1)
            RETURNING {}
            "#,
            DISPENSE_COLUMNS
        );

        let row = sqlx::query_as::<_, DispenseRow>(&sql)
            .bind(dispense_id)
            .bind(&draft.subject.patient_id)
            .bind(&draft.subject.appointment_id)
            .bind(draft.subject.appointment_day)
            .bind(draft.subject.daily_token)
            .bind(Json(&draft.items))
            .bind(charges.subtotal)
            .bind(charges.tax)
            .bind(charges.discount)
            .bind(charges.total)
            .bind(status.as_str())
            .bind(&bill_number)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("create dispense", e))?;

        timer.observe_duration();
        info!(dispense_id = %row.dispense_id, "Dispense inserted");

        row.try_into()
    }

    #[instrument(skip(self))]
    async fn load(&self, id: Uuid) -> Result<Option<DispenseRecord>, DispensaryError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_dispense"])
            .start_timer();

        let sql = format!("SELECT {} FROM dispenses WHERE dispense_id = $1", DISPENSE_COLUMNS);
        let row = sqlx::query_as::<_, DispenseRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("get dispense", e))?;

        timer.observe_duration();

        row.map(DispenseRecord::try_from).transpose()
    }

    #[instrument(skip_all, fields(dispense_id = %record.id, version = record.version))]
    async fn save(&self, record: &DispenseRecord) -> Result<DispenseRecord, DispensaryError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_dispense"])
            .start_timer();

        let sql = format!(
            r#"
            UPDATE dispenses
            SET items = $3,
                subtotal = $4,
                tax = $5,
                discount = $6,
                total = $7,
                paid_amount = $8,
                state = $9,
                payment_status = $10,
                bill_number = $11,
                payments = $12,
                cancelled_utc = $13,
                version = version + 1,
                updated_utc = NOW()
            WHERE dispense_id = $1 AND version = $2
            RETURNING {}
            "#,
            DISPENSE_COLUMNS
        );

        let row = sqlx::query_as::<_, DispenseRow>(&sql)
            .bind(record.id)
            .bind(record.version)
            .bind(Json(&record.items))
            .bind(record.subtotal)
            .bind(record.tax)
            .bind(record.discount)
            .bind(record.total)
            .bind(record.paid_amount)
            .bind(record.state.as_str())
            .bind(record.payment_status().as_str())
            .bind(&record.bill_number)
            .bind(Json(&record.payments))
            .bind(record.cancelled_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("save dispense", e))?;

        timer.observe_duration();

        match row {
            Some(row) => row.try_into(),
            None => {
                let actual: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM dispenses WHERE dispense_id = $1")
                        .bind(record.id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(|e| db_error("read dispense version", e))?;
                match actual {
                    Some(actual) => {
                        warn!(expected = record.version, actual, "Stale dispense version");
                        Err(DispensaryError::Conflict {
                            id: record.id,
                            expected: record.version,
                            actual,
                        })
                    }
                    None => Err(DispensaryError::NotFound(format!("Dispense {}", record.id))),
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn query(
        &self,
        filter: &DispenseFilter,
    ) -> Result<Vec<DispenseRecord>, DispensaryError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["query_dispenses"])
            .start_timer();

        let sql = format!(
            r#"
            SELECT {}
            FROM dispenses
            WHERE ($1::text IS NULL OR patient_id = $1)
              AND ($2::date IS NULL OR appointment_day = $2)
              AND ($3::int IS NULL OR daily_token = $3)
              AND ($4::date IS NULL OR (created_utc AT TIME ZONE 'UTC')::date >= $4)
              AND ($5::date IS NULL OR (created_utc AT TIME ZONE 'UTC')::date <= $5)
              AND ($6::text IS NULL OR payment_status = $6)
            ORDER BY created_utc DESC
            LIMIT $7
            "#,
            DISPENSE_COLUMNS
        );

        let rows = sqlx::query_as::<_, DispenseRow>(&sql)
            .bind(&filter.patient_id)
            .bind(filter.appointment_day)
            .bind(filter.daily_token)
            .bind(filter.created_from)
            .bind(filter.created_to)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list dispenses", e))?;

        timer.observe_duration();

        rows.into_iter().map(DispenseRecord::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn next_bill_number(&self, day: NaiveDate) -> Result<String, DispensaryError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["next_bill_number"])
            .start_timer();

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO dispense_bill_counters (bill_day, last_seq)
            VALUES ($1, 1)
            ON CONFLICT (bill_day) DO UPDATE SET last_seq = dispense_bill_counters.last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(day)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("allocate bill number", e))?;

        timer.observe_duration();

        Ok(format_bill_number(&self.bill_prefix, day, seq))
    }

    /// Check database health.
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), DispensaryError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("run health check", e))?;

        timer.observe_duration();
        Ok(())
    }
}

// =========================================================================
// Stock Operations
// =========================================================================

/// One conditional update; the `stock >= $2` guard keeps stock from going negative.
async fn adjust_stock(
    conn: &mut PgConnection,
    adjustment: &StockAdjustment,
) -> Result<(), DispensaryError> {
    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE medicines
        SET stock = stock - $2, updated_utc = NOW()
        WHERE lower(btrim(name)) = $1 AND stock >= $2
        RETURNING stock
        "#,
    )
    .bind(&adjustment.item)
    .bind(adjustment.quantity)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_error("adjust stock", e))?;

    if updated.is_some() {
        return Ok(());
    }

    let available: Option<i64> =
        sqlx::query_scalar("SELECT stock FROM medicines WHERE lower(btrim(name)) = $1")
            .bind(&adjustment.item)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| db_error("read stock", e))?;

    let err = match available {
        None if adjustment.quantity < 0 => {
            warn!(item = %adjustment.item, quantity = -adjustment.quantity, "Released stock for a medicine no longer listed");
            return Ok(());
        }
        None => StockError::UnknownItem(adjustment.item.clone()),
        Some(available) => StockError::Insufficient {
            item: adjustment.item.clone(),
            requested: adjustment.quantity,
            available,
        },
    };
    debug!(item = %adjustment.item, quantity = adjustment.quantity, error = %err, "Stock adjustment rejected");
    Err(err.into())
}

#[async_trait]
impl StockLedger for Database {
    async fn reserve(&self, item: &str, quantity: i64) -> Result<(), DispensaryError> {
        self.apply(&[StockAdjustment::reserve(stock_key(item), quantity)])
            .await
    }

    async fn release(&self, item: &str, quantity: i64) -> Result<(), DispensaryError> {
        self.apply(&[StockAdjustment::release(stock_key(item), quantity)])
            .await
    }

    /// The whole batch runs in one transaction.
    #[instrument(skip_all, fields(adjustments = adjustments.len()))]
    async fn apply(&self, adjustments: &[StockAdjustment]) -> Result<(), DispensaryError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_stock"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin stock transaction", e))?;
        for adjustment in adjustments {
            adjust_stock(&mut tx, adjustment).await?;
        }
        tx.commit()
            .await
            .map_err(|e| db_error("commit stock transaction", e))?;

        timer.observe_duration();
        Ok(())
    }
}

// =========================================================================
// Medicine Operations
// =========================================================================

#[async_trait]
impl MedicineCatalog for Database {
    #[instrument(skip(self, input), fields(name = %input.name))]
    async fn create_medicine(&self, input: &CreateMedicine) -> Result<Medicine, DispensaryError> {
        check_medicine(
            &input.name,
            [input.cost_price, input.selling_price],
            [input.stock, input.min_stock],
        )?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_medicine"])
            .start_timer();

        let sql = format!(
            r#"
            INSERT INTO medicines (medicine_id, name, salt, strength, form, cost_price, selling_price, stock, min_stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            MEDICINE_COLUMNS
        );

        let medicine = sqlx::query_as::<_, Medicine>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.name.trim())
            .bind(&input.salt)
            .bind(&input.strength)
            .bind(&input.form)
            .bind(input.cost_price)
            .bind(input.selling_price)
            .bind(input.stock)
            .bind(input.min_stock)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| medicine_write_error(&input.name, e))?;

        timer.observe_duration();
        info!(medicine_id = %medicine.medicine_id, "Medicine created");

        Ok(medicine)
    }

    #[instrument(skip(self))]
    async fn get_medicine(&self, medicine_id: Uuid) -> Result<Option<Medicine>, DispensaryError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_medicine"])
            .start_timer();

        let sql = format!("SELECT {} FROM medicines WHERE medicine_id = $1", MEDICINE_COLUMNS);
        let medicine = sqlx::query_as::<_, Medicine>(&sql)
            .bind(medicine_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("get medicine", e))?;

        timer.observe_duration();

        Ok(medicine)
    }

    #[instrument(skip(self, input))]
    async fn update_medicine(
        &self,
        medicine_id: Uuid,
        input: &UpdateMedicine,
    ) -> Result<Option<Medicine>, DispensaryError> {
        let Some(current) = self.get_medicine(medicine_id).await? else {
            return Ok(None);
        };
        let name = input.name.as_deref().unwrap_or(&current.name);
        check_medicine(
            name,
            [
                input.cost_price.unwrap_or(current.cost_price),
                input.selling_price.unwrap_or(current.selling_price),
            ],
            [
                input.stock.unwrap_or(current.stock),
                input.min_stock.unwrap_or(current.min_stock),
            ],
        )?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_medicine"])
            .start_timer();

        let sql = format!(
            r#"
            UPDATE medicines
            SET name = COALESCE($2, name),
                salt = COALESCE($3, salt),
                strength = COALESCE($4, strength),
                form = COALESCE($5, form),
                cost_price = COALESCE($6, cost_price),
                selling_price = COALESCE($7, selling_price),
                stock = COALESCE($8, stock),
                min_stock = COALESCE($9, min_stock),
                updated_utc = NOW()
            WHERE medicine_id = $1
            RETURNING {}
            "#,
            MEDICINE_COLUMNS
        );

        let medicine = sqlx::query_as::<_, Medicine>(&sql)
            .bind(medicine_id)
            .bind(input.name.as_deref().map(str::trim))
            .bind(&input.salt)
            .bind(&input.strength)
            .bind(&input.form)
            .bind(input.cost_price)
            .bind(input.selling_price)
            .bind(input.stock)
            .bind(input.min_stock)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| medicine_write_error(name, e))?;

        timer.observe_duration();

        Ok(medicine)
    }

    #[instrument(skip(self))]
    async fn list_medicines(
        &self,
        filter: &ListMedicinesFilter,
    ) -> Result<Vec<Medicine>, DispensaryError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_medicines"])
            .start_timer();

        let sql = format!(
            r#"
            SELECT {}
            FROM medicines
            WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
              AND ($2::text IS NULL OR salt ILIKE '%' || $2 || '%')
              AND (NOT $3 OR stock <= min_stock)
            ORDER BY lower(name)
            LIMIT $4
            "#,
            MEDICINE_COLUMNS
        );

        let medicines = sqlx::query_as::<_, Medicine>(&sql)
            .bind(filter.search.as_deref().map(str::trim))
            .bind(filter.salt.as_deref().map(str::trim))
            .bind(filter.low_stock_only)
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list medicines", e))?;

        timer.observe_duration();

        Ok(medicines)
    }
}
