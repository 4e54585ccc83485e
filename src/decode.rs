//! Substitution decoder for index payloads.
//!
//! The index service returns every series as an obfuscated string together
//! with a per-request key table. The first half of the key table lists the
//! cipher symbols and the second half their plain counterparts.

use std::collections::HashMap;

use crate::error::{CoreError, Result};

/// A validated cipher → plain substitution table.
#[derive(Debug, Clone)]
pub struct KeyTable {
    mapping: HashMap<char, char>,
}

impl KeyTable {
    /// Builds the mapping from a raw key-table string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKeyTable`] if the string has an odd number of
    /// characters or repeats a symbol in its cipher half.
    pub fn parse(raw: &str) -> Result<Self> {
        let chars: Vec<char> = raw.chars().collect();
        if chars.len() % 2 != 0 {
            return Err(CoreError::InvalidKeyTable {
                reason: format!("odd length {}", chars.len()),
            });
        }

        let (cipher, plain) = chars.split_at(chars.len() / 2);
        let mut mapping = HashMap::with_capacity(cipher.len());
        for (&c, &p) in cipher.iter().zip(plain) {
            if mapping.insert(c, p).is_some() {
                return Err(CoreError::InvalidKeyTable {
                    reason: format!("duplicate cipher symbol {c:?}"),
                });
            }
        }

        Ok(Self { mapping })
    }

    /// Number of symbol pairs in the table.
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Maps every symbol of `payload` through the table, preserving order.
    pub fn decode(&self, payload: &str) -> Result<String> {
        payload
            .chars()
            .enumerate()
            .map(|(position, symbol)| {
                self.mapping
                    .get(&symbol)
                    .copied()
                    .ok_or(CoreError::DecodeKeyMismatch { symbol, position })
            })
            .collect()
    }
}

/// Decodes `payload` with the key table it was issued with.
pub fn decode(key_table: &str, payload: &str) -> Result<String> {
    KeyTable::parse(key_table)?.decode(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "abcdefghijk1234567890,";

    fn encode(key: &str, plain: &str) -> String {
        let chars: Vec<char> = key.chars().collect();
        let (cipher, plain_half) = chars.split_at(chars.len() / 2);
        plain
            .chars()
            .map(|p| {
                let i = plain_half.iter().position(|&x| x == p).unwrap();
                cipher[i]
            })
            .collect()
    }

    #[test]
    fn test_decode_maps_each_symbol() {
        assert_eq!(decode("abc,12", "abca").unwrap(), ",12,");
    }

    #[test]
    fn test_decode_preserves_length() {
        let plain = "1,,23,4";
        let cipher = encode("ABCDEFGH1234567,", plain);
        let decoded = decode("ABCDEFGH1234567,", &cipher).unwrap();
        assert_eq!(decoded.chars().count(), cipher.chars().count());
    }

    #[test]
    fn test_round_trip() {
        let key = "zyxwvutsrqp0123456789,";
        let plain = "120,,9876,5,43";
        let cipher = encode(key, plain);
        assert_ne!(cipher, plain);
        assert_eq!(decode(key, &cipher).unwrap(), plain);
    }

    #[test]
    fn test_decode_empty_payload() {
        assert_eq!(decode(KEY, "").unwrap(), "");
    }

    #[test]
    fn test_decode_unknown_symbol() {
        let err = decode("ab12", "abz").unwrap_err();
        assert_eq!(
            err,
            CoreError::DecodeKeyMismatch {
                symbol: 'z',
                position: 2
            }
        );
    }

    #[test]
    fn test_plain_symbol_is_not_a_cipher_symbol() {
        // '1' only appears in the plain half
        assert!(decode("ab12", "1").is_err());
    }

    #[test]
    fn test_odd_key_table_rejected() {
        assert!(matches!(
            KeyTable::parse("abc"),
            Err(CoreError::InvalidKeyTable { .. })
        ));
    }

    #[test]
    fn test_duplicate_cipher_symbol_rejected() {
        assert!(matches!(
            KeyTable::parse("aa12"),
            Err(CoreError::InvalidKeyTable { .. })
        ));
    }

    #[test]
    fn test_multibyte_symbols() {
        let table = KeyTable::parse("甲乙1,").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.decode("乙甲乙").unwrap(), ",1,");
    }
}
