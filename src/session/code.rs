//! Screen code generation
//!
//! Codes are short tokens an operator types to attach a terminal to a
//! location. Uniqueness is owned by the store's unique index; the
//! generator just draws and lets the caller retry on collision.

use rand::Rng;

/// Alphabet for generated codes; no lower case, so operator entry is
/// case-insensitive by normalization
pub const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draw a fresh random code of `length` characters
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_length_and_charset() {
        let code = generate_code(5);

        assert_eq!(code.len(), 5);
        assert!(code.bytes().all(|b| CODE_CHARSET.contains(&b)));
    }

    #[test]
    fn test_zero_length_code_is_empty() {
        assert_eq!(generate_code(0), "");
    }
}
