//! Reconciliation totals over dispenses created in a window.

use crate::models::money::{non_negative, sum};
use crate::models::{DispenseRecord, PaymentStatus, ReportSummary, ReportWindow};

/// Summarise `records` created inside `window`.
///
/// Cancelled records count towards `count` but not towards any money total.
/// Never fails; an empty selection yields zeros.
pub fn summarize<'a, I>(records: I, window: &ReportWindow) -> ReportSummary
where
    I: IntoIterator<Item = &'a DispenseRecord>,
{
    let in_window: Vec<&DispenseRecord> = records
        .into_iter()
        .filter(|r| window.contains(r.created_at))
        .collect();
    let live = || in_window.iter().filter(|r| !r.is_cancelled());

    ReportSummary {
        total_billed: sum(live().map(|r| r.total)),
        total_collected: sum(live().map(|r| r.paid_amount)),
        total_pending: sum(live()
            .filter(|r| {
                matches!(
                    r.payment_status(),
                    PaymentStatus::Pending | PaymentStatus::Partial
                )
            })
            .map(|r| non_negative(r.total - r.paid_amount))),
        total_refunds: sum(live().map(|r| non_negative(r.paid_amount - r.total))),
        count: in_window.len(),
        cancelled_count: in_window.iter().filter(|r| r.is_cancelled()).count(),
    }
}
