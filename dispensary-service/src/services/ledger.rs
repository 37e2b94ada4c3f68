//! Payment postings and settlement status.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::models::money::{in_range, round2};
use crate::models::{DispenseRecord, PaymentEntry, PaymentMode, PaymentStatus};
use crate::services::error::DispensaryError;

/// The one settlement rule used everywhere a status is shown or stored.
///
/// `paid >= total` is checked first, so a zero-total bill is settled as soon
/// as it exists.
pub fn derive_payment_status(total: Decimal, paid: Decimal) -> PaymentStatus {
    if paid >= total {
        PaymentStatus::Paid
    } else if paid <= Decimal::ZERO {
        PaymentStatus::Pending
    } else {
        PaymentStatus::Partial
    }
}

/// Apply a collection (positive) or refund (negative) to an active record.
///
/// The record is only touched when every check passes.
pub fn post_payment(
    record: &mut DispenseRecord,
    amount: Decimal,
    mode: PaymentMode,
    reference: Option<String>,
) -> Result<PaymentEntry, DispensaryError> {
    if record.is_cancelled() {
        return Err(DispensaryError::invalid_state(
            "cannot post payments to a cancelled dispense",
        ));
    }

    let amount = round2(amount);
    if amount.is_zero() {
        return Err(DispensaryError::validation("payment amount must be non-zero"));
    }

    let paid = record
        .paid_amount
        .checked_add(amount)
        .filter(|p| in_range(amount) && in_range(*p))
        .ok_or_else(|| DispensaryError::validation("amount out of range"))?;
    if paid < Decimal::ZERO {
        return Err(DispensaryError::validation(format!(
            "refund of {} exceeds the {} collected",
            -amount, record.paid_amount
        )));
    }

    let entry = PaymentEntry {
        amount,
        mode,
        reference,
        recorded_at: Utc::now(),
    };
    record.paid_amount = paid;
    record.payments.push(entry.clone());

    Ok(entry)
}
