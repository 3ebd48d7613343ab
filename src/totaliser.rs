//! Accumulating quantity counters

use core::fmt::{self, Display};

/// Fixed-point totaliser in thousandths of a volume unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Totaliser(pub u64);

impl Totaliser {
    pub const SCALE: u64 = 1000;

    /// Add a (non-negative) increment in whole units; negative or NaN
    /// increments are ignored
    pub fn add(&mut self, amount: f64) {
        if amount > 0.0 {
            let milli = (amount * Self::SCALE as f64 + 0.5) as u64;
            self.0 = self.0.saturating_add(milli);
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    /// Value in hundredths, saturated to `bits` wide
    pub fn hundredths(&self, bits: u32) -> u64 {
        let max = (1u64 << bits) - 1;
        (self.0 / 10).min(max)
    }

    /// Parse the `whole.fraction` form written by [`Display`]
    pub fn parse(text: &str) -> Option<Self> {
        let (whole, frac) = match text.split_once('.') {
            Some((w, f)) => (w, f),
            None => (text, ""),
        };
        if whole.is_empty() || frac.len() > 3 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let whole: u64 = whole.parse().ok()?;
        let mut milli = 0u64;
        for (i, b) in frac.bytes().enumerate() {
            milli += (b - b'0') as u64 * 10u64.pow(2 - i as u32);
        }
        whole
            .checked_mul(Self::SCALE)?
            .checked_add(milli)
            .map(Self)
    }
}

impl Display for Totaliser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.0 / Self::SCALE, self.0 % Self::SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let t = Totaliser(12_345_678);
        let text = alloc::format!("{t}");
        assert_eq!(text, "12345.678");
        assert_eq!(Totaliser::parse(&text), Some(t));
        assert_eq!(Totaliser::parse("7"), Some(Totaliser(7000)));
        assert_eq!(Totaliser::parse("7.5"), Some(Totaliser(7500)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Totaliser::parse(""), None);
        assert_eq!(Totaliser::parse("1.2345"), None);
        assert_eq!(Totaliser::parse("abc"), None);
        assert_eq!(Totaliser::parse("-1.0"), None);
    }

    #[test]
    fn test_add_ignores_negative() {
        let mut t = Totaliser::default();
        t.add(1.25);
        t.add(-4.0);
        t.add(f64::NAN);
        assert_eq!(t, Totaliser(1250));
    }

    #[test]
    fn test_hundredths_saturates() {
        assert_eq!(Totaliser(12_340).hundredths(34), 1234);
        assert_eq!(Totaliser(u64::MAX).hundredths(34), (1 << 34) - 1);
    }
}
