use rand::{distributions::Alphanumeric, thread_rng, Rng};

const REFERENCE_PREFIX: &str = "PAY-";
const REFERENCE_LENGTH: usize = 12;

/// A new opaque payment reference such as `PAY-7G2K9QX4M1ZA`.
pub fn generate_reference() -> String {
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFERENCE_LENGTH)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{}{}", REFERENCE_PREFIX, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_have_expected_shape() {
        let reference = generate_reference();
        assert!(reference.starts_with("PAY-"));
        assert_eq!(reference.len(), 16);
        assert!(reference[4..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn references_differ() {
        assert_ne!(generate_reference(), generate_reference());
    }
}
