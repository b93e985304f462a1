//! Payout destination validation
//!
//! Destinations are PayPal email addresses. A destination fails when it is
//! not a plausible address or when its domain belongs to a disposable
//! mailbox service.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::DestinationValidator;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .expect("Invalid email regex")
});

static DISPOSABLE_DOMAINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "10minutemail.com",
        "dispostable.com",
        "fakeinbox.com",
        "getnada.com",
        "guerrillamail.com",
        "guerrillamail.net",
        "mailinator.com",
        "maildrop.cc",
        "mintemail.com",
        "sharklasers.com",
        "temp-mail.org",
        "tempmail.com",
        "throwawaymail.com",
        "trashmail.com",
        "yopmail.com",
    ]
    .into_iter()
    .collect()
});

/// Destinations that failed validation, each listed once in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationReport {
    pub invalid_emails: Vec<String>,
    pub disposable_emails: Vec<String>,
}

impl DestinationReport {
    pub fn is_clean(&self) -> bool {
        self.invalid_emails.is_empty() && self.disposable_emails.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationCheck {
    Valid,
    Invalid,
    Disposable,
}

/// Format check plus a disposable-domain blocklist
#[derive(Debug, Clone, Default)]
pub struct EmailDestinationValidator {
    extra_disposable: HashSet<String>,
}

impl EmailDestinationValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add domains to the built-in blocklist
    pub fn with_disposable_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extra_disposable: domains
                .into_iter()
                .map(|d| d.as_ref().trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn check(&self, destination: &str) -> DestinationCheck {
        let destination = destination.trim();
        if !EMAIL_REGEX.is_match(destination) {
            return DestinationCheck::Invalid;
        }
        let domain = match destination.rsplit_once('@') {
            Some((_, domain)) => domain.to_lowercase(),
            None => return DestinationCheck::Invalid,
        };
        if self.is_disposable(&domain) {
            DestinationCheck::Disposable
        } else {
            DestinationCheck::Valid
        }
    }

    /// A domain is disposable when it or any parent domain is blocklisted
    fn is_disposable(&self, domain: &str) -> bool {
        let mut candidate = domain;
        loop {
            if DISPOSABLE_DOMAINS.contains(candidate) || self.extra_disposable.contains(candidate) {
                return true;
            }
            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => candidate = parent,
                _ => return false,
            }
        }
    }

    pub fn report(&self, destinations: &[String]) -> DestinationReport {
        let mut seen = HashSet::new();
        let mut report = DestinationReport::default();
        for destination in destinations {
            if !seen.insert(destination.as_str()) {
                continue;
            }
            match self.check(destination) {
                DestinationCheck::Valid => {}
                DestinationCheck::Invalid => report.invalid_emails.push(destination.clone()),
                DestinationCheck::Disposable => report.disposable_emails.push(destination.clone()),
            }
        }
        report
    }
}

#[async_trait]
impl DestinationValidator for EmailDestinationValidator {
    async fn validate(&self, destinations: &[String]) -> DestinationReport {
        self.report(destinations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_check() {
        let validator = EmailDestinationValidator::new();
        assert_eq!(validator.check("ana@example.com"), DestinationCheck::Valid);
        assert_eq!(validator.check(" ana.b+pay@mail.example.co "), DestinationCheck::Valid);
        for bad in ["", "ana", "ana@", "@example.com", "ana@example", "ana@@example.com", "a b@x.io"] {
            assert_eq!(validator.check(bad), DestinationCheck::Invalid, "{}", bad);
        }
    }

    #[test]
    fn test_disposable_domains_and_subdomains() {
        let validator = EmailDestinationValidator::new();
        assert_eq!(validator.check("x@Mailinator.com"), DestinationCheck::Disposable);
        assert_eq!(validator.check("x@eu.yopmail.com"), DestinationCheck::Disposable);
        assert_eq!(validator.check("x@notmailinator.com"), DestinationCheck::Valid);
    }

    #[test]
    fn test_extra_domains_from_config() {
        let validator = EmailDestinationValidator::with_disposable_domains(["Burner.example"]);
        assert_eq!(validator.check("x@burner.example"), DestinationCheck::Disposable);
    }

    #[tokio::test]
    async fn test_report_lists_each_destination_once() {
        let validator = EmailDestinationValidator::new();
        let destinations: Vec<String> = [
            "ok@example.com",
            "broken",
            "x@yopmail.com",
            "broken",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let report = validator.validate(&destinations).await;
        assert_eq!(report.invalid_emails, vec!["broken"]);
        assert_eq!(report.disposable_emails, vec!["x@yopmail.com"]);
        assert!(!report.is_clean());
    }
}
