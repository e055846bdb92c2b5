//! Amount recognition for invoices with Western or Arabic number formatting.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::patterns::{AMOUNT_TOKEN, CURRENCY, TOTAL_AMOUNT};
use super::{ExtractionMatch, FieldExtractor};
use crate::script::normalize_digits;

/// Extractor for the labeled invoice total.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmountExtractor;

impl AmountExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FieldExtractor for AmountExtractor {
    type Output = ExtractionMatch<Decimal>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        // The last labeled total on the page is the final payable amount
        self.extract_all(text).into_iter().last()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let text = normalize_digits(text);
        let mut results = Vec::new();

        for caps in TOTAL_AMOUNT.captures_iter(&text) {
            let Some(token) = caps.get(1) else {
                continue;
            };
            if let Some(amount) = parse_amount(token.as_str()) {
                results.push(
                    ExtractionMatch::new(amount, token.as_str())
                        .with_position(token.start(), token.end()),
                );
            }
        }

        results
    }
}

/// Parse an amount string such as `"1,234.50"`, `"1.234,50"`, `"SAR 99"` or
/// `"١٢٠٫٥٠"`.
///
/// Currency codes and symbols are ignored. Anything else that is not part of
/// a single number makes the whole value unparsable.
pub fn parse_amount(value: &str) -> Option<Decimal> {
    let normalized = normalize_digits(value);
    let stripped = CURRENCY.replace_all(&normalized, "");
    let token = stripped.trim().trim_end_matches(['.', ',']).trim();

    if token.is_empty() || !AMOUNT_TOKEN.is_match(token) {
        return None;
    }

    let compact: String = token
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{00a0}' | '\''))
        .collect();

    Decimal::from_str(&strip_grouping(&compact)).ok()
}

/// Remove thousands separators and turn the decimal separator into `.`.
fn strip_grouping(token: &str) -> String {
    let last_dot = token.rfind('.');
    let last_comma = token.rfind(',');

    let decimal_sep = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(d), None) => {
            // "1.234.567" is grouping, "1.5" and "1.234" are decimals
            (token.matches('.').count() == 1 || token.len() - d - 1 != 3).then_some('.')
        }
        (None, Some(c)) => {
            // "1,234" is grouping, "12,50" is a decimal comma
            (token.matches(',').count() == 1 && token.len() - c - 1 != 3).then_some(',')
        }
        (None, None) => None,
    };

    let mut out = String::with_capacity(token.len());
    let split_at = decimal_sep.and_then(|sep| token.rfind(sep));
    for (i, ch) in token.char_indices() {
        match ch {
            '.' | ',' if Some(i) == split_at => out.push('.'),
            '.' | ',' => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Render an amount with two decimals.
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount)
}
