// Pattern literals are fixed; compiling them cannot fail at runtime
#![allow(clippy::unwrap_used)]

use regex::Regex;
use lazy_static::lazy_static;
use sha2::{Sha256, Digest};
use base64::{Engine as _, engine::general_purpose};

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").unwrap();
    static ref PHONE_REGEX: Regex = Regex::new(r"(?:\+1[-.\s]?)?(?:\(\d{3}\)|\b\d{3})[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap();
    static ref SSN_REGEX: Regex = Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap();
    static ref CREDIT_CARD_REGEX: Regex = Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b").unwrap();
    static ref IP_REGEX: Regex = Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").unwrap();
    static ref MRN_REGEX: Regex = Regex::new(r"(?i)\bMRN[:#\s-]*\d{4,}\b").unwrap();
    static ref DOB_REGEX: Regex = Regex::new(r"\b(?:19|20)\d{2}-\d{2}-\d{2}\b|\b\d{1,2}/\d{1,2}/(?:19|20)\d{2}\b").unwrap();
    static ref DEFAULT_REDACTOR: PiiRedactor = PiiRedactor::new(RedactionConfig::default());
}

/// Characters kept in a log preview unless configured otherwise
pub const DEFAULT_PREVIEW_CHARS: usize = 80;

/// PII redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_phones: bool,
    pub redact_ssn: bool,
    pub redact_credit_cards: bool,
    pub redact_ip_addresses: bool,
    pub redact_mrn: bool,
    pub redact_dates: bool,
    pub hash_for_correlation: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_phones: true,
            redact_ssn: true,
            redact_credit_cards: true,
            redact_ip_addresses: true,
            redact_mrn: true,
            redact_dates: true,
            hash_for_correlation: true,
        }
    }
}

/// PII redactor for log messages
pub struct PiiRedactor {
    config: RedactionConfig,
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }
    
    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();
        
        if self.config.redact_emails {
            result = self.redact_emails(&result);
        }

        // SSN and card numbers before phones, the phone pattern overlaps both
        if self.config.redact_ssn {
            result = self.redact_ssn(&result);
        }
        
        if self.config.redact_credit_cards {
            result = self.redact_credit_cards(&result);
        }

        if self.config.redact_phones {
            result = self.redact_phones(&result);
        }
        
        if self.config.redact_ip_addresses {
            result = self.redact_ip_addresses(&result);
        }

        if self.config.redact_mrn {
            result = self.redact_with(&MRN_REGEX, &result, "MRN", "MRN[REDACTED]");
        }

        if self.config.redact_dates {
            result = self.redact_with(&DOB_REGEX, &result, "DATE", "[DATE]");
        }

        
        result
    }

    /// Redact, then keep at most `max_chars` characters for a log line
    pub fn preview(&self, text: &str, max_chars: usize) -> String {
        let redacted = self.redact(text);
        let mut chars = redacted.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
    
    fn redact_emails(&self, text: &str) -> String {
        EMAIL_REGEX.replace_all(text, |caps: &regex::Captures| {
            let email = &caps[0];
            if self.config.hash_for_correlation {
                format!("EMAIL[{}]", self.hash_value(email))
            } else {
                match email.split_once('@') {
                    Some((local, domain)) => format!(
                        "{}***@{}***",
                        local.chars().next().unwrap_or('*'),
                        domain.chars().next().unwrap_or('*')
                    ),
                    None => "***@***.com".to_string(),
                }
            }
        }).to_string()
    }
    
    fn redact_phones(&self, text: &str) -> String {
        PHONE_REGEX.replace_all(text, |caps: &regex::Captures| {
            if self.config.hash_for_correlation {
                format!("PHONE[{}]", self.hash_value(&caps[0]))
            } else {
                "(***) ***-****".to_string()
            }
        }).to_string()
    }
    
    fn redact_ssn(&self, text: &str) -> String {
        self.redact_with(&SSN_REGEX, text, "SSN", "***-**-****")
    }
    
    fn redact_credit_cards(&self, text: &str) -> String {
        self.redact_with(&CREDIT_CARD_REGEX, text, "CC", "****-****-****-****")
    }
    
    fn redact_ip_addresses(&self, text: &str) -> String {
        IP_REGEX.replace_all(text, |caps: &regex::Captures| {
            if self.config.hash_for_correlation {
                format!("IP[{}]", self.hash_value(&caps[0]))
            } else {
                let parts: Vec<&str> = caps[0].split('.').collect();
                match (parts.first(), parts.last()) {
                    (Some(first), Some(last)) if parts.len() == 4 => format!("{first}.***.***.{last}"),
                    _ => "***.***.***.***".to_string(),
                }
            }
        }).to_string()
    }

    fn redact_with(&self, pattern: &Regex, text: &str, tag: &str, mask: &str) -> String {
        pattern.replace_all(text, |caps: &regex::Captures| {
            if self.config.hash_for_correlation {
                format!("{}[{}]", tag, self.hash_value(&caps[0]))
            } else {
                mask.to_string()
            }
        }).to_string()
    }
    
    fn hash_value(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        let result = hasher.finalize();
        general_purpose::STANDARD.encode(&result[..8]) // Use first 8 bytes for shorter hash
    }
}

/// Redact with the default configuration and keep `max_chars` characters
pub fn redact_preview_with(text: &str, max_chars: usize) -> String {
    DEFAULT_REDACTOR.preview(text, max_chars)
}
