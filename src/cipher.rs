//! Byte substitution applied to every byte crossing the relay hop.
//!
//! Both constructions are keyed only by the sum of the passphrase, so they
//! obscure traffic from a casual observer and nothing more. Session code only
//! sees the [`Cipher`] trait.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MULTIPLIER: u32 = 13;
const INCREMENT: u32 = 7;

/// CipherError is returned while building a cipher from configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("passphrase must not be empty")]
    EmptySecret,

    #[error("permutation repeats value {value} at slot {slot}")]
    DegenerateCipher { slot: usize, value: u8 },

    #[error("unsupported cipher method: {0}")]
    UnsupportedMethod(String),
}

/// Cipher transforms buffers in place. `decode` undoes `encode`.
pub trait Cipher: Send + Sync {
    fn encode(&self, buf: &mut [u8]);
    fn decode(&self, buf: &mut [u8]);
}

/// Method selects how the substitution table is derived from the passphrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Caesar shift by the passphrase sum
    Shift,
    /// Linear congruential permutation seeded by the passphrase sum
    Permutation,
}

impl FromStr for Method {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shift" | "simple" => Ok(Method::Shift),
            "permutation" | "random" => Ok(Method::Permutation),
            other => Err(CipherError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Shift => f.write_str("shift"),
            Method::Permutation => f.write_str("permutation"),
        }
    }
}

/// TableCipher holds a pair of inverse 256-entry substitution tables
#[derive(Clone, PartialEq, Eq)]
pub struct TableCipher {
    encode: [u8; 256],
    decode: [u8; 256],
}

/// TableCipher implementation block
impl TableCipher {
    /// new derives the tables for `method` from `secret`
    pub fn new(method: Method, secret: &str) -> Result<Self, CipherError> {
        let seed = secret_sum(secret)?;
        match method {
            Method::Shift => Ok(Self::shift(seed)),
            Method::Permutation => Self::permutation(seed, MULTIPLIER, INCREMENT),
        }
    }

    fn shift(seed: u8) -> Self {
        let mut encode = [0u8; 256];
        let mut decode = [0u8; 256];

        for b in 0..=255u8 {
            encode[b as usize] = b.wrapping_add(seed);
            decode[b as usize] = b.wrapping_sub(seed);
        }

        Self { encode, decode }
    }

    /// permutation walks x -> (a*x + c) mod 256 from the seed; slot i encodes
    /// to the i-th value visited
    fn permutation(seed: u8, a: u32, c: u32) -> Result<Self, CipherError> {
        let mut encode = [0u8; 256];
        let mut decode = [0u8; 256];
        let mut seen = [false; 256];
        let mut x = seed as u32;

        for slot in 0..256 {
            let value = x as u8;
            if seen[value as usize] {
                return Err(CipherError::DegenerateCipher { slot, value });
            }
            seen[value as usize] = true;

            encode[slot] = value;
            decode[value as usize] = slot as u8;
            x = (a * x + c) % 256;
        }

        Ok(Self { encode, decode })
    }

    pub fn encode_byte(&self, b: u8) -> u8 {
        self.encode[b as usize]
    }

    pub fn decode_byte(&self, b: u8) -> u8 {
        self.decode[b as usize]
    }
}

impl Cipher for TableCipher {
    fn encode(&self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.encode[*b as usize];
        }
    }

    fn decode(&self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.decode[*b as usize];
        }
    }
}

// Tables are keyed by the passphrase; keep them out of logs
impl fmt::Debug for TableCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableCipher").finish_non_exhaustive()
    }
}

/// secret_sum adds up the character codes of the passphrase, mod 256
fn secret_sum(secret: &str) -> Result<u8, CipherError> {
    if secret.is_empty() {
        return Err(CipherError::EmptySecret);
    }

    let sum = secret.chars().fold(0u32, |acc, c| (acc + c as u32) % 256);
    Ok(sum as u8)
}

/// Pass is what one direction of a stream does with a cipher
#[derive(Clone, Copy)]
pub enum Pass<'a> {
    Plain,
    Encode(&'a dyn Cipher),
    Decode(&'a dyn Cipher),
}

/// Pass implementation block
impl Pass<'_> {
    /// apply transforms `buf` in place. Callers pass exactly the bytes read.
    pub fn apply(&self, buf: &mut [u8]) {
        match self {
            Pass::Plain => {}
            Pass::Encode(cipher) => cipher.encode(buf),
            Pass::Decode(cipher) => cipher.decode(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_bytes() -> Vec<u8> {
        (0..=255u8).collect()
    }

    #[test]
    fn tables_are_mutual_inverses() {
        for method in [Method::Shift, Method::Permutation] {
            for secret in ["123456", "x", "correct horse battery staple", "ключ"] {
                let cipher = TableCipher::new(method, secret).unwrap();
                for b in 0..=255u8 {
                    assert_eq!(cipher.decode_byte(cipher.encode_byte(b)), b);
                    assert_eq!(cipher.encode_byte(cipher.decode_byte(b)), b);
                }
            }
        }
    }

    #[test]
    fn every_seed_yields_a_full_permutation() {
        for seed in 0..=255u8 {
            assert!(TableCipher::permutation(seed, MULTIPLIER, INCREMENT).is_ok());
        }
    }

    #[test]
    fn construction_is_deterministic() {
        let a = TableCipher::new(Method::Permutation, "hunter2").unwrap();
        let b = TableCipher::new(Method::Permutation, "hunter2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn shift_moves_by_character_sum() {
        // 'a' + 'b' = 97 + 98 = 195
        let cipher = TableCipher::new(Method::Shift, "ab").unwrap();
        assert_eq!(cipher.encode_byte(0), 195);
        assert_eq!(cipher.encode_byte(100), 39);
        assert_eq!(cipher.decode_byte(39), 100);
    }

    #[test]
    fn permutation_starts_at_seed() {
        // 'A' = 65, then 13 * 65 + 7 = 852 = 84 (mod 256)
        let cipher = TableCipher::new(Method::Permutation, "A").unwrap();
        assert_eq!(cipher.encode_byte(0), 65);
        assert_eq!(cipher.encode_byte(1), 84);
        assert_eq!(cipher.decode_byte(84), 1);
    }

    #[test]
    fn repeating_recurrence_is_rejected() {
        // An even multiplier collapses onto a short cycle
        let err = TableCipher::permutation(1, 2, 0).unwrap_err();
        assert!(matches!(err, CipherError::DegenerateCipher { .. }));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert_eq!(
            TableCipher::new(Method::Shift, "").unwrap_err(),
            CipherError::EmptySecret
        );
    }

    #[test]
    fn method_names_include_legacy_aliases() {
        assert_eq!("simple".parse::<Method>().unwrap(), Method::Shift);
        assert_eq!("random".parse::<Method>().unwrap(), Method::Permutation);
        assert!(matches!(
            "aes".parse::<Method>(),
            Err(CipherError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn pass_transforms_in_place() {
        let cipher = TableCipher::new(Method::Permutation, "secret").unwrap();
        let mut buf = all_bytes();

        Pass::Encode(&cipher).apply(&mut buf);
        assert_ne!(buf, all_bytes());

        Pass::Decode(&cipher).apply(&mut buf);
        assert_eq!(buf, all_bytes());

        Pass::Plain.apply(&mut buf);
        assert_eq!(buf, all_bytes());
    }
}
