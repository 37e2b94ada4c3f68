//! Line item model for dispensary-service.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One dispensed medicine on a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    pub quantity: i64,
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl LineItem {
    pub fn new(name: impl Into<String>, quantity: i64, unit_price: Decimal) -> Self {
        Self {
            name: name.into(),
            strength: None,
            form: None,
            duration: None,
            quantity,
            unit_price,
            notes: None,
        }
    }

    /// `quantity * unit_price`, unrounded. `None` on overflow.
    pub fn amount(&self) -> Option<Decimal> {
        Decimal::from(self.quantity).checked_mul(self.unit_price)
    }

    /// Non-empty name, positive quantity, non-negative price.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && self.quantity > 0 && self.unit_price >= Decimal::ZERO
    }

    /// Key used to match the item against the medicines master.
    pub fn stock_key(&self) -> String {
        stock_key(&self.name)
    }

    /// Units needed for a dosing course. A missing dose count means one per day.
    pub fn course_quantity(days: i64, doses_per_day: i64) -> i64 {
        if days <= 0 {
            return 0;
        }
        days.saturating_mul(doses_per_day.max(1))
    }
}

/// Case- and whitespace-insensitive medicine key.
pub fn stock_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn amount_is_quantity_times_price() {
        let item = LineItem::new("Paracetamol", 10, dec!(2.15));
        assert_eq!(item.amount(), Some(dec!(21.50)));
        assert_eq!(LineItem::new("X", i64::MAX, Decimal::MAX).amount(), None);
    }

    #[test]
    fn rejects_blank_names_and_non_positive_quantities() {
        assert!(!LineItem::new("  ", 1, dec!(1)).is_valid());
        assert!(!LineItem::new("Cetirizine", 0, dec!(1)).is_valid());
        assert!(!LineItem::new("Cetirizine", -2, dec!(1)).is_valid());
        assert!(!LineItem::new("Cetirizine", 2, dec!(-0.01)).is_valid());
        assert!(LineItem::new("Cetirizine", 2, Decimal::ZERO).is_valid());
    }

    #[test]
    fn course_quantity_defaults_to_one_dose() {
        assert_eq!(LineItem::course_quantity(5, 3), 15);
        assert_eq!(LineItem::course_quantity(5, 0), 5);
        assert_eq!(LineItem::course_quantity(0, 3), 0);
        assert_eq!(LineItem::course_quantity(i64::MAX, 2), i64::MAX);
    }

    #[test]
    fn deserializes_camel_case_payload() {
        let item: LineItem = serde_json::from_str(
            r#"{"name":"Amoxicillin","strength":"500mg","quantity":6,"unitPrice":"4.50"}"#,
        )
        .unwrap();
        assert_eq!(item.strength.as_deref(), Some("500mg"));
        assert_eq!(item.unit_price, dec!(4.50));
        assert!(item.form.is_none());
    }
}
