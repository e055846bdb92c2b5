//! Common regex patterns for English and Arabic invoice text.
//!
//! Patterns run on digit-normalized text, so only ASCII digits appear here.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Numeric dates
    pub static ref DATE_DMY: Regex = Regex::new(
        r"\b(\d{1,2})[./\-](\d{1,2})[./\-](\d{4})\b"
    ).unwrap();

    pub static ref DATE_YMD: Regex = Regex::new(
        r"\b(\d{4})[./\-](\d{1,2})[./\-](\d{1,2})\b"
    ).unwrap();

    // "1 May 2024", "1 مايو 2024"
    pub static ref DATE_DAY_MONTH_NAME: Regex = Regex::new(
        r"\b(\d{1,2})(?:st|nd|rd|th)?\s+([A-Za-z]+|[\x{0621}-\x{064A}]+)\.?,?\s+(\d{4})\b"
    ).unwrap();

    // "May 1, 2024"
    pub static ref DATE_MONTH_NAME_DAY: Regex = Regex::new(
        r"\b([A-Za-z]+)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b"
    ).unwrap();

    // Labeled due date (English and Arabic)
    pub static ref DUE_DATE: Regex = Regex::new(
        r"(?i)(?:\b(?:due\s+date|payment\s+due|due\s+on|pay\s+by|due)\b|تاريخ\s+الاستحقاق|الاستحقاق|يستحق\s+في)[\s:.\-]*(.+?)(?:\n|$)"
    ).unwrap();

    // Labeled total (the final payable amount, not subtotals)
    pub static ref TOTAL_AMOUNT: Regex = Regex::new(
        r"(?i)(?:\b(?:grand\s+total|total\s+amount|amount\s+due|total\s+due|balance\s+due|total)\b|المبلغ\s+الإجمالي|الإجمالي|الاجمالي|المجموع)[^\d\n\-]{0,24}(-?\d[\d,.\x{00a0}]*)"
    ).unwrap();

    // Number token inside an amount string
    pub static ref AMOUNT_TOKEN: Regex = Regex::new(
        r"^-?\d[\d,.\x{00a0}' ]*$"
    ).unwrap();

    // Currency markers stripped before amount parsing
    pub static ref CURRENCY: Regex = Regex::new(
        r"(?i)\b(?:SAR|AED|EGP|USD|EUR|GBP|KWD|QAR|BHD|OMR|JOD|PLN)\b|[$€£]|ر\.?\s?س\.?|د\.?\s?إ\.?|ريال|درهم|جنيه"
    ).unwrap();

    // Biller / vendor label
    pub static ref BILLER: Regex = Regex::new(
        r"(?im)^\s*(?:\b(?:biller|vendor|supplier|seller|bill\s+from|issued\s+by|company|from)\b|اسم\s+الشركة|اسم\s+الجهة|المورد|البائع)[\s:]+(.+?)\s*$"
    ).unwrap();

    // Address label
    pub static ref ADDRESS: Regex = Regex::new(
        r"(?im)^\s*(?:\baddress\b|العنوان)[\s:]+(.+?)\s*$"
    ).unwrap();

    // Street-like line used when no address label exists
    pub static ref STREET_HINT: Regex = Regex::new(
        r"(?i)\d+\s+\w+.*\b(?:st|street|rd|road|ave|avenue|blvd|lane|way)\b\.?|شارع|طريق|ص\.\s?ب|حي\s"
    ).unwrap();

    // Lines that are labels of other fields and never a biller name
    pub static ref NON_NAME_LINE: Regex = Regex::new(
        r"(?i)\b(?:invoice|total|due|date|amount|tax|vat|qty|quantity|bill\s+to|address)\b|فاتورة|الإجمالي|المجموع|الضريبة|تاريخ|العنوان"
    ).unwrap();
}
