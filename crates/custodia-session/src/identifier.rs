//! Identifier normalisation (spec §4.4 step 1): detect whether a login
//! identifier is an email, a phone number, or a username, and normalise it
//! to the form it was stored under.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Email,
    Phone,
    Username,
}

/// Normalise `raw` and classify it. Emails are lower-cased; phone numbers
/// keep only a leading `+` and digits; usernames are lower-cased.
pub fn normalize_identifier(raw: &str) -> (IdentifierKind, String) {
    let trimmed = raw.trim();
    if trimmed.contains('@') {
        return (IdentifierKind::Email, trimmed.to_ascii_lowercase());
    }
    let looks_like_phone = trimmed.starts_with('+') || trimmed.chars().all(|c| c.is_ascii_digit());
    if looks_like_phone && trimmed.chars().any(|c| c.is_ascii_digit()) {
        let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
        let normalised = if trimmed.starts_with('+') { format!("+{digits}") } else { digits };
        return (IdentifierKind::Phone, normalised);
    }
    (IdentifierKind::Username, trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_email() {
        let (kind, value) = normalize_identifier(" Alice@Example.COM ");
        assert_eq!(kind, IdentifierKind::Email);
        assert_eq!(value, "alice@example.com");
    }

    #[test]
    fn detects_phone_with_plus() {
        let (kind, value) = normalize_identifier("+1 (555) 123-4567");
        assert_eq!(kind, IdentifierKind::Phone);
        assert_eq!(value, "+15551234567");
    }

    #[test]
    fn falls_back_to_username() {
        let (kind, value) = normalize_identifier("CoolUser99");
        assert_eq!(kind, IdentifierKind::Username);
        assert_eq!(value, "cooluser99");
    }
}
