//! Lifecycle transitions of a dispense record.
//!
//! Draft -> Active -> Cancelled. These functions are pure: they validate a
//! transition and return the next record plus the stock movements it needs.
//! Persisting the record and moving the stock is the caller's job.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::models::money::non_negative;
use crate::models::{DispenseRecord, DispenseState, LineItem, NewDispense, PaymentStatus};
use crate::services::charges::{compute_charges, Charges};
use crate::services::error::DispensaryError;
use crate::services::ledger::derive_payment_status;
use crate::services::stock::{delta_between, releases_for, reservations_for, StockAdjustment};

/// A validated draft, ready to be reserved and persisted.
#[derive(Debug, Clone)]
pub struct Opening {
    pub charges: Charges,
    pub reservations: Vec<StockAdjustment>,
}

/// An edited record and what the edit implies.
#[derive(Debug, Clone)]
pub struct Revision {
    pub record: DispenseRecord,
    pub stock: Vec<StockAdjustment>,
    /// Collected money now above the new total. Advisory only.
    pub refund_due: Decimal,
}

/// A cancelled record and the stock it hands back.
#[derive(Debug, Clone)]
pub struct Cancellation {
    pub record: DispenseRecord,
    pub stock: Vec<StockAdjustment>,
}

pub fn ensure_active(record: &DispenseRecord, action: &str) -> Result<(), DispensaryError> {
    match record.state {
        DispenseState::Active => Ok(()),
        DispenseState::Cancelled => Err(DispensaryError::invalid_state(format!(
            "cannot {} dispense {}: it is cancelled",
            action, record.id
        ))),
    }
}

/// Draft -> Active: validate the subject and the charges.
pub fn open(draft: &NewDispense) -> Result<Opening, DispensaryError> {
    if !draft.subject.is_identified() {
        return Err(DispensaryError::validation(
            "a patient, an appointment, or a date and token is required",
        ));
    }
    let charges = compute_charges(&draft.items, draft.tax, draft.discount)?;
    Ok(Opening {
        charges,
        reservations: reservations_for(&draft.items),
    })
}

/// Replace the items and amounts of an active record.
///
/// `paid_amount` is left alone; when it now exceeds the total the excess is
/// reported as `refund_due` for the operator to settle with a negative posting.
pub fn revise(
    record: &DispenseRecord,
    items: Vec<LineItem>,
    tax: Decimal,
    discount: Decimal,
) -> Result<Revision, DispensaryError> {
    ensure_active(record, "edit")?;
    let charges = compute_charges(&items, tax, discount)?;
    let stock = delta_between(&record.items, &items);

    let mut next = record.clone();
    next.items = items;
    next.subtotal = charges.subtotal;
    next.tax = charges.tax;
    next.discount = charges.discount;
    next.total = charges.total;

    let refund_due = non_negative(next.paid_amount - next.total);

    Ok(Revision {
        record: next,
        stock,
        refund_due,
    })
}

/// Active -> Cancelled. Every item goes back to stock; payments stay for audit.
pub fn cancel(record: &DispenseRecord) -> Result<Cancellation, DispensaryError> {
    ensure_active(record, "cancel")?;
    let mut next = record.clone();
    next.state = DispenseState::Cancelled;
    next.cancelled_at = Some(Utc::now());
    Ok(Cancellation {
        stock: releases_for(&record.items),
        record: next,
    })
}

/// Whether the draft is fully paid the moment it is stored (zero total).
pub fn settled_on_open(opening: &Opening) -> bool {
    derive_payment_status(opening.charges.total, Decimal::ZERO) == PaymentStatus::Paid
}

/// A record gets its bill number the first time it is fully paid.
pub fn needs_bill_number(record: &DispenseRecord) -> bool {
    record.bill_number.is_none() && record.payment_status() == PaymentStatus::Paid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DispenseSubject;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn draft(items: Vec<LineItem>) -> NewDispense {
        NewDispense {
            subject: DispenseSubject::patient("p-1"),
            items,
            tax: dec!(5),
            discount: Decimal::ZERO,
        }
    }

    fn persisted(draft: &NewDispense, opening: &Opening) -> DispenseRecord {
        let now = Utc::now();
        DispenseRecord {
            id: Uuid::new_v4(),
            subject: draft.subject.clone(),
            items: draft.items.clone(),
            subtotal: opening.charges.subtotal,
            tax: opening.charges.tax,
            discount: opening.charges.discount,
            total: opening.charges.total,
            paid_amount: Decimal::ZERO,
            state: DispenseState::Active,
            bill_number: None,
            payments: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        }
    }

    #[test]
    fn open_requires_an_identified_subject() {
        let mut d = draft(vec![LineItem::new("Paracetamol", 10, dec!(2))]);
        d.subject = DispenseSubject::default();
        assert!(matches!(open(&d), Err(DispensaryError::Validation(_))));
    }

    #[test]
    fn open_prices_and_reserves() {
        let d = draft(vec![LineItem::new("Paracetamol", 10, dec!(2))]);
        let opening = open(&d).unwrap();
        assert_eq!(opening.charges.total, dec!(25));
        assert_eq!(
            opening.reservations,
            vec![StockAdjustment::reserve("paracetamol", 10)]
        );
        assert_eq!(persisted(&d, &opening).payment_status(), PaymentStatus::Pending);
    }

    #[test]
    fn zero_total_opens_as_paid() {
        let mut d = draft(vec![LineItem::new("Sample Pack", 1, Decimal::ZERO)]);
        d.tax = Decimal::ZERO;
        let opening = open(&d).unwrap();
        assert!(settled_on_open(&opening));
        assert_eq!(persisted(&d, &opening).payment_status(), PaymentStatus::Paid);
    }

    #[test]
    fn revise_below_paid_reports_refund_due() {
        let d = draft(vec![LineItem::new("Paracetamol", 10, dec!(2))]);
        let mut record = persisted(&d, &open(&d).unwrap());
        record.paid_amount = dec!(25);

        let revision = revise(
            &record,
            vec![LineItem::new("Paracetamol", 5, dec!(2))],
            dec!(5),
            Decimal::ZERO,
        )
        .unwrap();

        assert_eq!(revision.record.total, dec!(15));
        assert_eq!(revision.refund_due, dec!(10));
        assert_eq!(revision.record.paid_amount, dec!(25));
        assert_eq!(revision.record.payment_status(), PaymentStatus::Paid);
        assert_eq!(
            revision.stock,
            vec![StockAdjustment::release("paracetamol", 5)]
        );
    }

    #[test]
    fn cancel_is_terminal() {
        let d = draft(vec![LineItem::new("Paracetamol", 10, dec!(2))]);
        let record = persisted(&d, &open(&d).unwrap());
        let cancelled = cancel(&record).unwrap().record;

        assert_eq!(cancelled.payment_status(), PaymentStatus::Cancelled);
        assert!(matches!(cancel(&cancelled), Err(DispensaryError::InvalidState(_))));
        assert!(matches!(
            revise(&cancelled, d.items.clone(), Decimal::ZERO, Decimal::ZERO),
            Err(DispensaryError::InvalidState(_))
        ));
    }

    #[test]
    fn cancel_returns_every_unit() {
        let d = draft(vec![
            LineItem::new("Paracetamol", 10, dec!(2)),
            LineItem::new("ORS", 3, dec!(1)),
        ]);
        let record = persisted(&d, &open(&d).unwrap());
        assert_eq!(
            cancel(&record).unwrap().stock,
            vec![
                StockAdjustment::release("ors", 3),
                StockAdjustment::release("paracetamol", 10),
            ]
        );
    }
}
