//! Fixed-width encoding of fractional times for scratch filenames.
//!
//! Subdivision writes every transient frame as `<prefix>@<fraction>.<ext>`. The
//! fraction is printed with [`FRACTION_DIGITS`] decimals so that a plain lexical
//! sort of sibling filenames yields the frames in temporal order. Every dyadic
//! rational `k / 2^d` with `d <= MAX_SPLIT_DEPTH` has an exact decimal expansion
//! of `d` digits, so the encoding is exact for anything bisection can emit.

pub const FRACTION_SEPARATOR: char = '@';

/// Decimal digits after the point. Matches the binary mantissa width of `f64`.
pub const FRACTION_DIGITS: usize = f64::MANTISSA_DIGITS as usize;

/// Deepest bisection whose midpoints are still exactly representable.
pub const MAX_SPLIT_DEPTH: u32 = f64::MANTISSA_DIGITS;

/// Tolerance for point-in-range checks against encoded fractions.
pub const FRACTION_EPSILON: f64 = f64::EPSILON;

/// Format `value` (clamped to `[0, 1]`) as a fixed-width, lexically sortable string.
pub fn encode(value: f64) -> String {
    let clamped = if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    };
    format!("{clamped:.prec$}", prec = FRACTION_DIGITS)
}

pub fn decode(encoded: &str) -> Option<f64> {
    let value: f64 = encoded.parse().ok()?;
    (0.0..=1.0).contains(&value).then_some(value)
}

/// `<prefix>@<fraction>.<ext>`
pub fn fractional_name(prefix: &str, value: f64, extension: &str) -> String {
    format!(
        "{prefix}{FRACTION_SEPARATOR}{}.{extension}",
        encode(value)
    )
}

/// Split a fractional-indexed filename back into its prefix and time.
///
/// Returns `None` for integer-indexed or otherwise foreign names.
pub fn parse_fractional_name(file_name: &str) -> Option<(&str, f64)> {
    let (prefix, rest) = file_name.rsplit_once(FRACTION_SEPARATOR)?;
    let encoded = match rest.rsplit_once('.') {
        // The fraction itself contains a '.', so only strip a trailing extension.
        Some((head, ext)) if head.contains('.') && !ext.is_empty() => head,
        _ => rest,
    };
    if encoded.len() != FRACTION_DIGITS + 2 {
        return None;
    }
    Some((prefix, decode(encoded)?))
}

/// `true` when `value` lies inside `[min, max]`, widened by [`FRACTION_EPSILON`].
pub fn in_range(value: f64, min: f64, max: f64) -> bool {
    value >= min - FRACTION_EPSILON && value <= max + FRACTION_EPSILON
}
