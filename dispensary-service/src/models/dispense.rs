//! Dispense record model for dispensary-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::line_item::LineItem;
use super::money::non_negative;
use crate::services::ledger::derive_payment_status;

/// Settlement classification shown for a dispense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "partial" => Some(PaymentStatus::Partial),
            "paid" => Some(PaymentStatus::Paid),
            "cancelled" => Some(PaymentStatus::Cancelled),
            _ => None,
        }
    }

    /// Settlement progress; `Cancelled` has no rank.
    pub fn rank(&self) -> Option<u8> {
        match self {
            PaymentStatus::Pending => Some(0),
            PaymentStatus::Partial => Some(1),
            PaymentStatus::Paid => Some(2),
            PaymentStatus::Cancelled => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted lifecycle state. Drafts never reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispenseState {
    Active,
    Cancelled,
}

impl DispenseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispenseState::Active => "active",
            DispenseState::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "active" => Some(DispenseState::Active),
            "cancelled" => Some(DispenseState::Cancelled),
            _ => None,
        }
    }
}

/// How a payment was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    #[default]
    Cash,
    Online,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::Online => "online",
        }
    }
}

/// One posting against a dispense. Negative amounts are refunds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEntry {
    pub amount: Decimal,
    pub mode: PaymentMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl PaymentEntry {
    pub fn is_refund(&self) -> bool {
        self.amount < Decimal::ZERO
    }
}

/// Who the dispense is billed to. Identifiers are opaque.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseSubject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_day: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_token: Option<i32>,
}

impl DispenseSubject {
    pub fn patient(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: Some(patient_id.into()),
            ..Self::default()
        }
    }

    pub fn token(appointment_day: NaiveDate, daily_token: i32) -> Self {
        Self {
            appointment_day: Some(appointment_day),
            daily_token: Some(daily_token),
            ..Self::default()
        }
    }

    /// A patient, an appointment, or a day + token pair.
    pub fn is_identified(&self) -> bool {
        let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        has(&self.patient_id)
            || has(&self.appointment_id)
            || (self.appointment_day.is_some() && self.daily_token.is_some())
    }
}

/// Client-side draft of a dispense.
#[derive(Debug, Clone)]
pub struct NewDispense {
    pub subject: DispenseSubject,
    pub items: Vec<LineItem>,
    pub tax: Decimal,
    pub discount: Decimal,
}

/// A persisted billing transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseRecord {
    pub id: Uuid,
    pub subject: DispenseSubject,
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub state: DispenseState,
    pub bill_number: Option<String>,
    pub payments: Vec<PaymentEntry>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl DispenseRecord {
    /// Derived on every read from the numeric fields and the lifecycle state.
    pub fn payment_status(&self) -> PaymentStatus {
        match self.state {
            DispenseState::Cancelled => PaymentStatus::Cancelled,
            DispenseState::Active => derive_payment_status(self.total, self.paid_amount),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == DispenseState::Cancelled
    }

    /// `total - paid_amount`; negative when money is owed back.
    pub fn balance(&self) -> Decimal {
        self.total - self.paid_amount
    }

    pub fn amount_due(&self) -> Decimal {
        non_negative(self.balance())
    }

    pub fn refund_due(&self) -> Decimal {
        non_negative(-self.balance())
    }
}

/// Filter parameters for listing dispenses.
#[derive(Debug, Clone, Default)]
pub struct DispenseFilter {
    pub patient_id: Option<String>,
    pub appointment_day: Option<NaiveDate>,
    pub daily_token: Option<i32>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
    pub status: Option<PaymentStatus>,
    pub limit: Option<i64>,
}

impl DispenseFilter {
    pub fn matches(&self, record: &DispenseRecord) -> bool {
        let created = record.created_at.date_naive();
        self.patient_id
            .as_ref()
            .is_none_or(|p| record.subject.patient_id.as_ref() == Some(p))
            && self
                .appointment_day
                .is_none_or(|d| record.subject.appointment_day == Some(d))
            && self
                .daily_token
                .is_none_or(|t| record.subject.daily_token == Some(t))
            && self.created_from.is_none_or(|from| created >= from)
            && self.created_to.is_none_or(|to| created <= to)
            && self.status.is_none_or(|s| record.payment_status() == s)
    }
}
