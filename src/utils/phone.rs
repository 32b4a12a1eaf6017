/// Normalizes a Kenyan mobile number to `+254XXXXXXXXX`.
///
/// Accepts `+2547XXXXXXXX`, `+2541XXXXXXXX`, `07XXXXXXXX` and `01XXXXXXXX`,
/// ignoring spaces and dashes. Anything else returns `None`.
pub fn normalize_kenyan_phone(raw: &str) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !matches!(c, ' ' | '-')).collect();

    let local = if let Some(rest) = compact.strip_prefix("+254") {
        rest.to_string()
    } else if let Some(rest) = compact.strip_prefix('0') {
        rest.to_string()
    } else {
        return None;
    };

    let valid = local.len() == 9
        && matches!(local.as_bytes()[0], b'7' | b'1')
        && local.bytes().all(|b| b.is_ascii_digit());
    valid.then(|| format!("+254{}", local))
}

pub fn validate_kenyan_phone(raw: &str) -> Result<(), validator::ValidationError> {
    match normalize_kenyan_phone(raw) {
        Some(_) => Ok(()),
        None => Err(validator::ValidationError::new("kenyan_phone")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_local_and_international_forms() {
        assert_eq!(
            normalize_kenyan_phone("0712345678").as_deref(),
            Some("+254712345678")
        );
        assert_eq!(
            normalize_kenyan_phone("+254 712-345-678").as_deref(),
            Some("+254712345678")
        );
        assert_eq!(
            normalize_kenyan_phone("0110123456").as_deref(),
            Some("+254110123456")
        );
    }

    #[test]
    fn rejects_other_numbers() {
        assert!(normalize_kenyan_phone("254712345678").is_none());
        assert!(normalize_kenyan_phone("0812345678").is_none());
        assert!(normalize_kenyan_phone("07123").is_none());
        assert!(normalize_kenyan_phone("07123456a8").is_none());
    }
}
