//! PII detection and redaction
//!
//! Stateless pattern set. `us_passport` and `driver_license` are broad
//! alphanumeric shapes that also match many product codes and ids; expect
//! false positives from both, and overlap between them.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    IpAddress,
    UsPassport,
    DriverLicense,
}

impl PiiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Ssn => "ssn",
            Self::CreditCard => "credit_card",
            Self::IpAddress => "ip_address",
            Self::UsPassport => "us_passport",
            Self::DriverLicense => "driver_license",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Email => "Email address",
            Self::Phone => "Phone number",
            Self::Ssn => "Social Security Number",
            Self::CreditCard => "Credit card number",
            Self::IpAddress => "IP address",
            Self::UsPassport => "US Passport number",
            Self::DriverLicense => "Driver's license number",
        }
    }
}

impl fmt::Display for PiiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static PATTERNS: Lazy<Vec<(PiiType, Regex)>> = Lazy::new(|| {
    [
        (PiiType::Email, r"(?i)\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b"),
        (
            PiiType::Phone,
            r"(?i)\b(?:\+?1[-.\s]?)?\(?([0-9]{3})\)?[-.\s]?([0-9]{3})[-.\s]?([0-9]{4})\b",
        ),
        (PiiType::Ssn, r"(?i)\b\d{3}-?\d{2}-?\d{4}\b"),
        (
            PiiType::CreditCard,
            r"(?i)\b(?:4[0-9]{12}(?:[0-9]{3})?|5[1-5][0-9]{14}|3[47][0-9]{13}|3[0-9]{13}|6(?:011|5[0-9]{2})[0-9]{12})\b",
        ),
        (PiiType::IpAddress, r"(?i)\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b"),
        (PiiType::UsPassport, r"(?i)\b[A-Z]{1,2}[0-9]{6,9}\b"),
        (PiiType::DriverLicense, r"(?i)\b[A-Z]{1,2}[0-9]{4,8}\b"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("static PII pattern")))
    .collect()
});

/// One PII match (byte offsets into the scanned text)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub pii_type: PiiType,
    pub matched: String,
    pub start: usize,
    pub end: usize,
}

/// All findings, grouped by pattern in declaration order
pub fn detect(text: &str) -> Vec<Finding> {
    PATTERNS
        .iter()
        .flat_map(|(kind, re)| {
            re.find_iter(text).map(move |m| Finding {
                pii_type: *kind,
                matched: m.as_str().to_string(),
                start: m.start(),
                end: m.end(),
            })
        })
        .collect()
}

pub fn has_pii(text: &str) -> bool {
    PATTERNS.iter().any(|(_, re)| re.is_match(text))
}

/// Distinct PII types present, in declaration order
pub fn pii_types(text: &str) -> Vec<PiiType> {
    PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(kind, _)| *kind)
        .collect()
}

/// Mask every finding with `mask`, one mask char per matched character
///
/// Overlapping findings are merged, then spans are replaced from the highest
/// start offset down so no replacement shifts an offset still to be processed.
pub fn redact(text: &str, mask: char) -> String {
    let mut spans: Vec<(usize, usize)> = detect(text).iter().map(|f| (f.start, f.end)).collect();
    spans.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let mut out = text.to_string();
    for &(start, end) in merged.iter().rev() {
        let width = text[start..end].chars().count();
        out.replace_range(start..end, &mask.to_string().repeat(width));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_email_and_ip() {
        let findings = detect("mail bob@example.com from 10.0.0.1");
        let types: Vec<_> = findings.iter().map(|f| f.pii_type).collect();
        assert!(types.contains(&PiiType::Email));
        assert!(types.contains(&PiiType::IpAddress));
        let email = findings.iter().find(|f| f.pii_type == PiiType::Email).unwrap();
        assert_eq!(email.matched, "bob@example.com");
        assert_eq!((email.start, email.end), (5, 20));
    }

    #[test]
    fn detects_phone_ssn_and_card() {
        assert!(pii_types("call 555-123-4567").contains(&PiiType::Phone));
        assert!(pii_types("ssn 123-45-6789").contains(&PiiType::Ssn));
        assert!(pii_types("card 4111111111111111").contains(&PiiType::CreditCard));
    }

    #[test]
    fn passport_patterns_are_case_insensitive() {
        assert!(pii_types("id ab1234567").contains(&PiiType::UsPassport));
    }

    #[test]
    fn clean_text_has_no_pii() {
        assert!(!has_pii("What is the capital of France?"));
        assert!(detect("plain words only").is_empty());
    }

    #[test]
    fn redact_masks_every_span_in_place() {
        let text = "a@b.io and c@d.io";
        let redacted = redact(text, '*');
        assert_eq!(redacted, "****** and ******");
        assert_eq!(redacted.len(), text.len());
    }

    #[test]
    fn redact_handles_overlapping_findings() {
        // passport-shaped id nested inside an email address
        let text = "contact bob.AB123456@x.io now";
        let findings = detect(text);
        assert!(findings.iter().any(|f| f.pii_type == PiiType::UsPassport));
        assert_eq!(redact(text, '#'), format!("contact {} now", "#".repeat(17)));
    }
}
