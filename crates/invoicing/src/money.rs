/// Format an amount in minor units (2 decimals) with thousands separators.
///
/// `format_minor(123456, "MAD")` -> `"1,234.56 MAD"`.
pub fn format_minor(amount: u64, currency: &str) -> String {
    let units = (amount / 100).to_string();
    let cents = amount % 100;

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, ch) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if currency.is_empty() {
        format!("{grouped}.{cents:02}")
    } else {
        format!("{grouped}.{cents:02} {currency}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands() {
        assert_eq!(format_minor(123_456, "MAD"), "1,234.56 MAD");
        assert_eq!(format_minor(100_000_000, ""), "1,000,000.00");
    }

    #[test]
    fn pads_cents() {
        assert_eq!(format_minor(5, "EUR"), "0.05 EUR");
        assert_eq!(format_minor(99_900, "EUR"), "999.00 EUR");
    }
}
