use serde::{Deserialize, Serialize};

use printdesk_core::{EngineError, EngineResult, Length, Money};

/// One optional cost component of a line item: `quantity × unit_cost`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostComponent {
    pub quantity: u32,
    pub unit_cost: Money,
}

impl CostComponent {
    pub fn subtotal(&self) -> EngineResult<Money> {
        self.unit_cost.checked_mul(self.quantity)
    }
}

/// A line of a work order.
///
/// Up to three independently optional cost components (print, pressing,
/// badge); `material_length` is this line's contribution to the order's
/// aggregate roll consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub print: Option<CostComponent>,
    pub pressing: Option<CostComponent>,
    pub badge: Option<CostComponent>,
    pub material_length: Option<Length>,
}

impl LineItem {
    pub fn validate(&self) -> EngineResult<()> {
        if self.description.trim().is_empty() {
            return Err(EngineError::validation(
                "line item description cannot be empty",
            ));
        }
        if self.print.is_none() && self.pressing.is_none() && self.badge.is_none() {
            return Err(EngineError::validation(
                "line item needs at least one cost component",
            ));
        }
        for component in [&self.print, &self.pressing, &self.badge]
            .into_iter()
            .flatten()
        {
            if component.quantity == 0 {
                return Err(EngineError::validation(
                    "cost component quantity must be positive",
                ));
            }
        }
        Ok(())
    }

    pub fn total(&self) -> EngineResult<Money> {
        let mut total = Money::ZERO;
        for component in [&self.print, &self.pressing, &self.badge]
            .into_iter()
            .flatten()
        {
            total = total.checked_add(component.subtotal()?)?;
        }
        Ok(total)
    }
}

/// Order total: sum of line-item totals. Fixed at creation; recomputed only
/// when line items are edited.
pub fn order_total(items: &[LineItem]) -> EngineResult<Money> {
    let mut total = Money::ZERO;
    for item in items {
        total = total.checked_add(item.total()?)?;
    }
    Ok(total)
}

/// Aggregate length the order draws from its material type's rolls.
pub fn required_material_length(items: &[LineItem]) -> EngineResult<Length> {
    let mut total = Length::ZERO;
    for length in items.iter().filter_map(|i| i.material_length) {
        total = total.checked_add(length)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(quantity: u32, unit_cents: i64) -> CostComponent {
        CostComponent {
            quantity,
            unit_cost: Money::from_hundredths(unit_cents),
        }
    }

    fn item(print: Option<CostComponent>, pressing: Option<CostComponent>) -> LineItem {
        LineItem {
            description: "jersey front".to_string(),
            print,
            pressing,
            badge: None,
            material_length: None,
        }
    }

    #[test]
    fn line_total_sums_present_components() {
        let line = LineItem {
            description: "team kit".to_string(),
            print: Some(component(10, 1_500)),
            pressing: Some(component(10, 500)),
            badge: Some(component(2, 250)),
            material_length: None,
        };
        // 10×15.00 + 10×5.00 + 2×2.50
        assert_eq!(line.total().unwrap(), Money::from_hundredths(20_500));
    }

    #[test]
    fn missing_components_contribute_nothing() {
        let line = item(Some(component(3, 1_000)), None);
        assert_eq!(line.total().unwrap(), Money::from_hundredths(3_000));
    }

    #[test]
    fn validate_requires_description_and_a_component() {
        let mut line = item(Some(component(1, 100)), None);
        assert!(line.validate().is_ok());

        line.description = " ".to_string();
        assert!(line.validate().is_err());

        let empty = LineItem {
            description: "x".to_string(),
            print: None,
            pressing: None,
            badge: None,
            material_length: None,
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_quantity() {
        let line = item(Some(component(0, 100)), None);
        assert!(line.validate().is_err());
    }

    #[test]
    fn order_total_and_length_aggregate_across_items() {
        let mut a = item(Some(component(1, 1_000)), None);
        a.material_length = Some(Length::from_hundredths(120));
        let mut b = item(Some(component(2, 2_000)), None);
        b.material_length = Some(Length::from_hundredths(80));
        let c = item(Some(component(1, 500)), None);

        let items = vec![a, b, c];
        assert_eq!(order_total(&items).unwrap(), Money::from_hundredths(5_500));
        assert_eq!(
            required_material_length(&items).unwrap(),
            Length::from_hundredths(200)
        );
    }
}
