//! Number rendering shared by every text artifact the solver reads.
//!
//! The solver-side readers were written against files whose reals always
//! carry a fractional part (`40.0`, not `40`) and whose exponents are signed
//! and at least two digits wide (`1e-05`, `1.0e+23`). Rust's own formatting
//! differs on both counts, so every writer goes through these helpers.

/// Renders a real as the shortest decimal that round-trips, always keeping a
/// fractional part, switching to exponent form below `1e-4` and from `1e16`.
pub fn real(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_owned();
    }

    // Debug already picks the same fixed/exponent switch points
    let debug = format!("{:?}", value);
    match debug.split_once('e') {
        Some((mantissa, exponent)) => format!("{}e{}", mantissa, signed_exponent(exponent)),
        None => debug,
    }
}

/// Renders a real in scientific notation with `digits` mantissa decimals,
/// e.g. `scientific(1e-4, 1) == "1.0e-04"`.
pub fn scientific(value: f64, digits: usize) -> String {
    let raw = format!("{:.*e}", digits, value);
    match raw.split_once('e') {
        Some((mantissa, exponent)) => format!("{}e{}", mantissa, signed_exponent(exponent)),
        None => raw,
    }
}

fn signed_exponent(exponent: &str) -> String {
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent.trim_start_matches('+')),
    };
    format!("{}{:0>2}", sign, digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_reals_keep_fraction() {
        assert_eq!(real(40.0), "40.0");
        assert_eq!(real(-440.0), "-440.0");
        assert_eq!(real(0.0), "0.0");
        assert_eq!(real(-0.0), "-0.0");
    }

    #[test]
    fn fractional_reals_are_shortest_round_trip() {
        assert_eq!(real(0.02), "0.02");
        assert_eq!(real(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(real(0.0001), "0.0001");
    }

    #[test]
    fn small_and_large_reals_use_padded_exponent() {
        assert_eq!(real(1e-5), "1e-05");
        assert_eq!(real(-1.4695761589768238e-13), "-1.4695761589768238e-13");
        assert_eq!(real(1e16), "1e+16");
        assert_eq!(real(1e15), "1000000000000000.0");
    }

    #[test]
    fn scientific_pads_exponent() {
        assert_eq!(scientific(1e-4, 1), "1.0e-04");
        assert_eq!(scientific(2.5e-7, 1), "2.5e-07");
        assert_eq!(scientific(12345.678, 1), "1.2e+04");
        assert_eq!(scientific(1e123, 1), "1.0e+123");
    }
}
