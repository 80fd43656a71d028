//! Human-readable traffic figures.

const BILLION: f64 = 1_000_000_000.0;
const MILLION: f64 = 1_000_000.0;
const THOUSAND: f64 = 1_000.0;

/// Format a traffic value expressed in billions with a B/M/K suffix.
///
/// Values under one thousand are rounded to a whole number.
///
/// ```
/// use sitepulse_core::format::format_traffic;
///
/// assert_eq!(format_traffic(3.2), "3.20 B");
/// assert_eq!(format_traffic(0.45), "450.00 M");
/// ```
pub fn format_traffic(billions: f64) -> String {
    let value = billions * BILLION;
    if value >= BILLION {
        format!("{:.2} B", value / BILLION)
    } else if value >= MILLION {
        format!("{:.2} M", value / MILLION)
    } else if value >= THOUSAND {
        format!("{:.2} K", value / THOUSAND)
    } else {
        format!("{}", value.round())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_suffix_by_magnitude() {
        assert_eq!(format_traffic(1.0), "1.00 B");
        assert_eq!(format_traffic(0.0015), "1.50 M");
        assert_eq!(format_traffic(0.000_002_5), "2.50 K");
    }

    #[test]
    fn small_values_are_whole_numbers() {
        assert_eq!(format_traffic(0.0), "0");
        assert_eq!(format_traffic(0.000_000_42), "420");
    }
}
