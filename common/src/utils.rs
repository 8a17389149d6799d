use crate::config::{COIN_DECIMALS, COIN_VALUE};

// Format an atomic amount into a human readable decimal string
pub fn format_coin(amount: u64) -> String {
    format!(
        "{}.{:0width$}",
        amount / COIN_VALUE,
        amount % COIN_VALUE,
        width = COIN_DECIMALS as usize
    )
}

// Parse a decimal string into an atomic amount
// Returns None on malformed input, too many decimals or overflow
pub fn parse_coin(value: &str) -> Option<u64> {
    let value = value.trim();
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return None;
    }

    if frac.len() > COIN_DECIMALS as usize {
        return None;
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().ok()?
    };

    let frac: u64 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = COIN_DECIMALS as usize);
        padded.parse().ok()?
    };

    whole.checked_mul(COIN_VALUE)?.checked_add(frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_atomic_amounts() {
        assert_eq!(format_coin(0), "0.00000000");
        assert_eq!(format_coin(COIN_VALUE), "1.00000000");
        assert_eq!(format_coin(COIN_VALUE + 1), "1.00000001");
        assert_eq!(format_coin(10 * COIN_VALUE - 1), "9.99999999");
    }

    #[test]
    fn parse_decimal_amounts() {
        assert_eq!(parse_coin("1"), Some(COIN_VALUE));
        assert_eq!(parse_coin("0.00000001"), Some(1));
        assert_eq!(parse_coin("1.5"), Some(COIN_VALUE + COIN_VALUE / 2));
        assert_eq!(parse_coin("100.00001"), Some(100 * COIN_VALUE + 1_000));
        assert_eq!(parse_coin(".5"), Some(COIN_VALUE / 2));
        assert_eq!(parse_coin(""), None);
        assert_eq!(parse_coin("."), None);
        assert_eq!(parse_coin("1.000000001"), None);
        assert_eq!(parse_coin("abc"), None);
    }

    #[test]
    fn parse_rejects_overflow() {
        assert_eq!(parse_coin("999999999999999999999"), None);
    }

    #[test]
    fn format_parse_consistency() {
        for amount in [0u64, 1, 42, COIN_VALUE, 123 * COIN_VALUE + 456] {
            assert_eq!(parse_coin(&format_coin(amount)), Some(amount));
        }
    }
}
