//! Email and phone number extraction from page text.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::debug;

const EXCLUDED_EMAIL_DOMAINS: &[&str] = &[
    "example.com",
    "domain.com",
    "yoursite.com",
    "yourdomain.com",
    "example.org",
    "email.com",
    "test.com",
    "sample.com",
];

const ASSET_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".css", ".js", ".pdf", ".doc", ".mp3", ".mp4",
];

const SERVICE_DOMAINS: &[&str] = &[
    "sentry.io",
    "sentry.wixpress.com",
    "sentry-next.wixpress.com",
    "contactprivacy.com",
    "whois.tucows.com",
    "domainsbyproxy.com",
    "secureserver.net",
    "hostmaster.sk",
    "nic.it",
];

const MEANINGFUL_TERMS: &[&str] = &[
    "info",
    "contact",
    "support",
    "hello",
    "sales",
    "admin",
    "contatti",
    "assistenza",
    "ufficio",
    "segreteria",
    "privacy",
];

struct Patterns {
    email: Regex,
    hash_local: Regex,
    uuid_local: Regex,
    long_hex_local: Regex,
    phone: Regex,
    ip: Regex,
    date: Vec<Regex>,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            let date = [
                r"^20\d{6}$",
                r"^\d{8}$",
                r"^\d{6}$",
                r"^(19|20)\d{2}\d{4}$",
            ]
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;

            Some(Patterns {
                email: Regex::new(
                    r"\b[A-Za-z0-9][A-Za-z0-9._%+-]{1,64}@(?:[A-Za-z0-9-]{1,63}\.){1,8}[A-Za-z]{2,63}\b",
                )
                .ok()?,
                hash_local: Regex::new(r"^[0-9a-f]{32}@").ok()?,
                uuid_local: Regex::new(
                    r"(?i)^[0-9a-f]{8}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{12}$",
                )
                .ok()?,
                long_hex_local: Regex::new(r"(?i)^[0-9a-f]{12,64}$").ok()?,
                phone: Regex::new(r"\+{0,2}\(?\d[\d\s().\-/]{5,22}\d").ok()?,
                ip: Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$").ok()?,
                date,
            })
        })
        .as_ref()
}

/// Candidate email addresses, lowercased, with obvious false positives removed.
pub fn extract_emails(text: &str) -> BTreeSet<String> {
    let Some(p) = patterns() else {
        return BTreeSet::new();
    };

    p.email
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|email| !ASSET_EXTENSIONS.iter().any(|ext| email.contains(ext)))
        .filter(|email| !p.hash_local.is_match(email))
        .filter(|email| {
            let Some((local, domain)) = email.split_once('@') else {
                return false;
            };
            if EXCLUDED_EMAIL_DOMAINS.contains(&domain) {
                return false;
            }
            let distinct: BTreeSet<char> = local.chars().collect();
            !(distinct.len() <= 2 && local.len() > 4)
        })
        .collect()
}

/// Keep addresses on the target domain or with a contact-like local part.
pub fn filter_emails(emails: &BTreeSet<String>, domain: &str) -> BTreeSet<String> {
    let Some(p) = patterns() else {
        return BTreeSet::new();
    };

    let domain = domain.to_lowercase();
    let bare_domain = domain.replace("www.", "");
    let mail_domain = format!("mail.{}", bare_domain);

    let kept: BTreeSet<String> = emails
        .iter()
        .filter(|email| {
            let Some((local, email_domain)) = email.split_once('@') else {
                return false;
            };
            let local = local.to_lowercase();
            let email_domain = email_domain.to_lowercase();

            if SERVICE_DOMAINS.contains(&email_domain.as_str()) {
                debug!("Filtering out service domain email: {}", email);
                return false;
            }
            if p.uuid_local.is_match(&local) || p.long_hex_local.is_match(&local) {
                debug!("Filtering out email with pattern-like local part: {}", email);
                return false;
            }
            email_domain == domain
                || email_domain == mail_domain
                || email_domain == bare_domain
                || MEANINGFUL_TERMS.iter().any(|term| local.contains(term))
        })
        .cloned()
        .collect();

    debug!(
        "Email filtering: {} in, {} kept",
        emails.len(),
        kept.len()
    );
    kept
}

/// Candidate phone numbers: digit runs of 7 to 15 digits, optionally `+`-prefixed.
pub fn extract_phone_numbers(text: &str) -> BTreeSet<String> {
    let Some(p) = patterns() else {
        return BTreeSet::new();
    };

    p.phone
        .find_iter(text)
        .filter_map(|m| {
            let raw = m.as_str();
            let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
            if !(7..=15).contains(&digits.len()) {
                return None;
            }
            if raw.starts_with('+') {
                Some(format!("+{}", digits))
            } else {
                Some(raw.trim().to_string())
            }
        })
        .collect()
}

/// Drop date-like, IP-like, sequential and timestamp-like values; keep 8 to 15 digits.
pub fn filter_phone_numbers(phones: &BTreeSet<String>) -> BTreeSet<String> {
    let Some(p) = patterns() else {
        return BTreeSet::new();
    };

    phones
        .iter()
        .filter(|phone| !p.ip.is_match(phone))
        .filter_map(|phone| {
            let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
            let cleaned = if phone.starts_with('+') {
                format!("+{}", digits)
            } else {
                digits.clone()
            };

            if p.date.iter().any(|re| re.is_match(&cleaned)) {
                return None;
            }
            if is_ascending_run(&cleaned) {
                return None;
            }
            if looks_like_timestamp(&cleaned) {
                return None;
            }
            (8..=15).contains(&digits.len()).then_some(cleaned)
        })
        .collect()
}

/// Six or more digits, each one more than the previous.
fn is_ascending_run(value: &str) -> bool {
    let digits: Vec<u32> = match value.chars().map(|c| c.to_digit(10)).collect() {
        Some(d) => d,
        None => return false,
    };
    digits.len() >= 6 && digits.windows(2).all(|w| w[1] == w[0] + 1)
}

fn looks_like_timestamp(value: &str) -> bool {
    value.len() == 10
        && (value.starts_with('1') || value.starts_with('2'))
        && value
            .parse::<u64>()
            .is_ok_and(|ts| (1_000_000_000..=9_999_999_999).contains(&ts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_emails_drops_false_positives() {
        let text = "Write to Info@Acme.it or sales@acme.it. \
            Ignore logo@2x.png, user@example.com, aaaaa@acme.it and \
            0123456789abcdef0123456789abcdef@acme.it";
        let emails = extract_emails(text);
        assert_eq!(
            emails,
            BTreeSet::from(["info@acme.it".to_string(), "sales@acme.it".to_string()])
        );
    }

    #[test]
    fn test_filter_emails_keeps_domain_and_meaningful() {
        let emails = BTreeSet::from([
            "mario@acme.it".to_string(),
            "mario@mail.acme.it".to_string(),
            "contatti@gmail.com".to_string(),
            "random@gmail.com".to_string(),
            "info@sentry.io".to_string(),
            "deadbeefcafe1234@acme.it".to_string(),
        ]);
        let kept = filter_emails(&emails, "www.acme.it");
        assert_eq!(
            kept,
            BTreeSet::from([
                "contatti@gmail.com".to_string(),
                "mario@acme.it".to_string(),
                "mario@mail.acme.it".to_string(),
            ])
        );
    }

    #[test]
    fn test_extract_phone_numbers() {
        let phones = extract_phone_numbers("Call +39 06 1234 5678 or (02) 555-0199. Year 2024.");
        assert!(phones.contains("+390612345678"));
        assert!(phones.contains("(02) 555-0199"));
        assert_eq!(phones.len(), 2);
    }

    #[test]
    fn test_filter_phone_numbers() {
        let phones = BTreeSet::from([
            "+390612345678".to_string(),
            "(02) 555-0199".to_string(),
            "20240517".to_string(),
            "192.168.100.200".to_string(),
            "1234567890".to_string(),
            "1700000000".to_string(),
            "0655501990".to_string(),
        ]);
        let kept = filter_phone_numbers(&phones);
        assert_eq!(
            kept,
            BTreeSet::from([
                "+390612345678".to_string(),
                "025550199".to_string(),
                "0655501990".to_string(),
            ])
        );
    }

    #[test]
    fn test_ascending_run() {
        assert!(is_ascending_run("123456"));
        assert!(is_ascending_run("3456789"));
        assert!(!is_ascending_run("12345"));
        assert!(!is_ascending_run("123465"));
        assert!(!is_ascending_run("+123456"));
    }
}
