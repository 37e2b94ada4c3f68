use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    DispenseFilter, DispenseRecord, DispenseSubject, LineItem, NewDispense, PaymentMode,
    PaymentStatus,
};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRequest {
    #[validate(length(max = 200))]
    pub name: String,
    #[validate(length(max = 50))]
    pub strength: Option<String>,
    #[validate(length(max = 50))]
    pub form: Option<String>,
    #[validate(length(max = 50))]
    pub duration: Option<String>,
    /// Units to dispense; derived from `days` and `dosesPerDay` when absent.
    pub quantity: Option<i64>,
    pub days: Option<i64>,
    pub doses_per_day: Option<i64>,
    pub unit_price: Decimal,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

impl From<LineItemRequest> for LineItem {
    fn from(req: LineItemRequest) -> Self {
        // Neither a quantity nor a course leaves 0, which fails line item validation.
        let quantity = req.quantity.unwrap_or_else(|| {
            req.days
                .map(|days| LineItem::course_quantity(days, req.doses_per_day.unwrap_or(1)))
                .unwrap_or(0)
        });
        let duration = req
            .duration
            .or_else(|| req.days.filter(|d| *d > 0).map(|d| format!("{} days", d)));
        LineItem {
            name: req.name,
            strength: req.strength,
            form: req.form,
            duration,
            quantity,
            unit_price: req.unit_price,
            notes: req.notes,
        }
    }
}

fn into_items(items: Vec<LineItemRequest>) -> Vec<LineItem> {
    items.into_iter().map(LineItem::from).collect()
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDispenseRequest {
    #[validate(length(max = 64))]
    pub patient_id: Option<String>,
    #[validate(length(max = 64))]
    pub appointment_id: Option<String>,
    pub appointment_day: Option<NaiveDate>,
    pub daily_token: Option<i32>,
    #[validate(nested)]
    pub items: Vec<LineItemRequest>,
    #[serde(default)]
    pub tax: Decimal,
    #[serde(default)]
    pub discount: Decimal,
}

impl From<CreateDispenseRequest> for NewDispense {
    fn from(req: CreateDispenseRequest) -> Self {
        NewDispense {
            subject: DispenseSubject {
                patient_id: req.patient_id,
                appointment_id: req.appointment_id,
                appointment_day: req.appointment_day,
                daily_token: req.daily_token,
            },
            items: into_items(req.items),
            tax: req.tax,
            discount: req.discount,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDispenseRequest {
    #[validate(nested)]
    pub items: Vec<LineItemRequest>,
    #[serde(default)]
    pub tax: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub expected_version: Option<i64>,
}

impl UpdateDispenseRequest {
    pub fn into_parts(self) -> (Vec<LineItem>, Decimal, Decimal, Option<i64>) {
        (
            into_items(self.items),
            self.tax,
            self.discount,
            self.expected_version,
        )
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Negative for a refund.
    pub amount: Decimal,
    #[serde(default)]
    pub mode: PaymentMode,
    #[validate(length(max = 100))]
    pub reference: Option<String>,
    pub expected_version: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionQuery {
    pub expected_version: Option<i64>,
}

/// Lookup parameters for listing dispenses.
///
/// One of `patientId`, `date` + `token`, or `startDate` + `endDate` is required.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseListQuery {
    pub patient_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub token: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

impl DispenseListQuery {
    /// `Err` carries the message for a 400 response.
    pub fn into_filter(self) -> Result<DispenseFilter, String> {
        let by_patient = self.patient_id.as_deref().is_some_and(|p| !p.trim().is_empty());
        let by_token = self.date.is_some() && self.token.is_some();
        let by_range = self.start_date.is_some() && self.end_date.is_some();
        if !(by_patient || by_token || by_range) {
            return Err(
                "patientId, date and token, or startDate and endDate are required".to_string(),
            );
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err("startDate must not be after endDate".to_string());
            }
        }
        let status = match self.status.as_deref() {
            Some(s) => Some(
                PaymentStatus::from_string(s).ok_or_else(|| format!("unknown status '{}'", s))?,
            ),
            None => None,
        };

        Ok(DispenseFilter {
            patient_id: self.patient_id.filter(|p| !p.trim().is_empty()),
            appointment_day: self.date,
            daily_token: self.token,
            created_from: self.start_date,
            created_to: self.end_date,
            status,
            limit: Some(self.limit.unwrap_or(100).clamp(1, 500)),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// A dispense as returned to clients, with its derived amounts.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseResponse {
    #[serde(flatten)]
    pub record: DispenseRecord,
    pub payment_status: PaymentStatus,
    pub balance: Decimal,
    pub amount_due: Decimal,
    pub refund_due: Decimal,
}

impl From<DispenseRecord> for DispenseResponse {
    fn from(record: DispenseRecord) -> Self {
        Self {
            payment_status: record.payment_status(),
            balance: record.balance(),
            amount_due: record.amount_due(),
            refund_due: record.refund_due(),
            record,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseListResponse {
    pub dispenses: Vec<DispenseResponse>,
    pub count: usize,
}

impl From<Vec<DispenseRecord>> for DispenseListResponse {
    fn from(records: Vec<DispenseRecord>) -> Self {
        let dispenses: Vec<DispenseResponse> =
            records.into_iter().map(DispenseResponse::from).collect();
        Self {
            count: dispenses.len(),
            dispenses,
        }
    }
}
