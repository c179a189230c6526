//! Small shared helpers: money rounding, slugs, normalization

/// Round a monetary amount to cents
#[inline]
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Lowercase + trim, used for emails and plan codes
#[inline]
pub fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Uppercase + trim, used for coupon codes
#[inline]
pub fn normalize_code(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Minimal email shape check: one `@`, non-empty local part, dotted domain
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        _ => false,
    }
}

/// URL slug: ascii alphanumerics separated by single dashes
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "profile".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(1.0 / 3.0), 0.33);
        assert_eq!(round_cents(99.999), 100.0);
        assert_eq!(round_cents(0.0), 0.0);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Ana's Bakery & Café "), "ana-s-bakery-caf");
        assert_eq!(slugify("Plumber -- 24/7"), "plumber-24-7");
        assert_eq!(slugify("***"), "profile");
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("ana@example.com"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ana@@example.com"));
        assert!(!is_valid_email("an a@example.com"));
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_key("  Ana@Example.COM "), "ana@example.com");
        assert_eq!(normalize_code(" summer20 "), "SUMMER20");
    }
}
