//! Bill totals from line items, tax and discount.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::money::{checked_sum, in_range, non_negative, round2};
use crate::models::LineItem;
use crate::services::error::DispensaryError;

/// Computed bill amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Charges {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

/// `subtotal = round2(sum(amounts))`, `total = round2(max(0, subtotal + tax - discount))`.
///
/// Tax and discount are kept to the cent. A discount larger than subtotal
/// plus tax clamps the total to zero. Amounts past `MAX_AMOUNT` are rejected.
pub fn compute_charges(
    items: &[LineItem],
    tax: Decimal,
    discount: Decimal,
) -> Result<Charges, DispensaryError> {
    if items.is_empty() {
        return Err(DispensaryError::validation("no line items"));
    }
    if items.iter().any(|item| !item.is_valid()) {
        return Err(DispensaryError::validation("invalid line item"));
    }
    if tax < Decimal::ZERO {
        return Err(DispensaryError::validation("invalid tax"));
    }
    if discount < Decimal::ZERO {
        return Err(DispensaryError::validation("invalid discount"));
    }

    let out_of_range = || DispensaryError::validation("amount out of range");
    let tax = round2(tax);
    let discount = round2(discount);
    if !in_range(tax) || !in_range(discount) {
        return Err(out_of_range());
    }
    let subtotal = items
        .iter()
        .map(LineItem::amount)
        .collect::<Option<Vec<_>>>()
        .and_then(checked_sum)
        .filter(|s| in_range(*s))
        .ok_or_else(out_of_range)?;
    let total = round2(non_negative(subtotal + tax - discount));
    if !in_range(total) {
        return Err(out_of_range());
    }

    Ok(Charges {
        subtotal,
        tax,
        discount,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::money::MAX_AMOUNT;
    use rust_decimal_macros::dec;

    #[test]
    fn paracetamol_with_tax() {
        let items = vec![LineItem::new("Paracetamol", 10, dec!(2))];
        let charges = compute_charges(&items, dec!(5), Decimal::ZERO).unwrap();
        assert_eq!(charges.subtotal, dec!(20));
        assert_eq!(charges.total, dec!(25));
    }

    #[test]
    fn subtotal_rounds_once_after_summing() {
        let items = vec![
            LineItem::new("A", 1, dec!(0.333)),
            LineItem::new("B", 1, dec!(0.333)),
            LineItem::new("C", 1, dec!(0.333)),
        ];
        let charges = compute_charges(&items, Decimal::ZERO, Decimal::ZERO).unwrap();
        // 0.999 -> 1.00; rounding each term first would give 0.99.
        assert_eq!(charges.subtotal, dec!(1.00));
        assert_eq!(
            charges.subtotal,
            round2(items.iter().map(|i| i.amount().unwrap()).sum())
        );
    }

    #[test]
    fn oversized_discount_clamps_to_zero() {
        let items = vec![LineItem::new("Cough Syrup", 1, dec!(80))];
        let charges = compute_charges(&items, dec!(4), dec!(500)).unwrap();
        assert_eq!(charges.total, Decimal::ZERO);
    }

    #[test]
    fn total_never_negative_across_inputs() {
        let items = vec![LineItem::new("Zinc", 3, dec!(1.25))];
        for tax in [dec!(0), dec!(0.5), dec!(10)] {
            for discount in [dec!(0), dec!(3.75), dec!(4.25), dec!(1000)] {
                let charges = compute_charges(&items, tax, discount).unwrap();
                assert!(charges.total >= Decimal::ZERO);
            }
        }
    }

    #[test]
    fn rejects_empty_items() {
        let err = compute_charges(&[], Decimal::ZERO, Decimal::ZERO).unwrap_err();
        assert!(matches!(err, DispensaryError::Validation(ref m) if m == "no line items"));
    }

    #[test]
    fn rejects_negative_quantity_or_price() {
        let bad_qty = vec![LineItem::new("Zinc", -1, dec!(1))];
        let bad_price = vec![LineItem::new("Zinc", 1, dec!(-1))];
        for items in [bad_qty, bad_price] {
            let err = compute_charges(&items, Decimal::ZERO, Decimal::ZERO).unwrap_err();
            assert!(matches!(err, DispensaryError::Validation(ref m) if m == "invalid line item"));
        }
    }

    #[test]
    fn rejects_negative_tax_and_discount() {
        let items = vec![LineItem::new("Zinc", 1, dec!(1))];
        assert!(compute_charges(&items, dec!(-1), Decimal::ZERO).is_err());
        assert!(compute_charges(&items, Decimal::ZERO, dec!(-1)).is_err());
    }

    #[test]
    fn huge_line_items_are_rejected_not_overflowed() {
        let items = vec![LineItem::new("X", i64::MAX, Decimal::MAX)];
        let err = compute_charges(&items, Decimal::ZERO, Decimal::ZERO).unwrap_err();
        assert!(matches!(err, DispensaryError::Validation(ref m) if m == "amount out of range"));

        let past_columns = vec![LineItem::new("X", 2, MAX_AMOUNT)];
        assert!(compute_charges(&past_columns, Decimal::ZERO, Decimal::ZERO).is_err());
        assert!(compute_charges(&[LineItem::new("X", 1, dec!(1))], Decimal::MAX, Decimal::ZERO).is_err());
    }

    #[test]
    fn tax_and_discount_are_kept_to_the_cent() {
        let items = vec![LineItem::new("Paracetamol", 10, dec!(2))];
        let charges = compute_charges(&items, dec!(0.006), dec!(0.004)).unwrap();
        assert_eq!(charges.tax, dec!(0.01));
        assert_eq!(charges.discount, dec!(0.00));
        assert_eq!(charges.total, charges.subtotal + charges.tax - charges.discount);
    }
}
