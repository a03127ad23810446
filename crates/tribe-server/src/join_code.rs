//! Random join codes for communities.
//!
//! Codes carry no uniqueness guarantee of their own. The store rejects a
//! duplicate code and the caller retries with a fresh one.

use rand::Rng;

use crate::error::{AppError, Result};

pub const DEFAULT_ALPHABET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
pub const DEFAULT_CODE_LENGTH: usize = 6;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Width of the `communities.join_code` column.
pub const MAX_CODE_LENGTH: usize = 32;

#[derive(Debug, Clone)]
pub struct JoinCodeGenerator {
    alphabet: Vec<char>,
    length: usize,
}

impl JoinCodeGenerator {
    pub fn new(alphabet: &str, length: usize) -> Result<Self> {
        let alphabet: Vec<char> = alphabet.chars().collect();
        if alphabet.is_empty() {
            return Err(AppError::Validation(
                "Join code alphabet must not be empty".to_string(),
            ));
        }
        if length == 0 {
            return Err(AppError::Validation(
                "Join code length must be positive".to_string(),
            ));
        }
        if length > MAX_CODE_LENGTH {
            return Err(AppError::Validation(format!(
                "Join code length must be at most {MAX_CODE_LENGTH}"
            )));
        }
        Ok(Self { alphabet, length })
    }

    pub fn with_length(length: usize) -> Result<Self> {
        Self::new(DEFAULT_ALPHABET, length)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of distinct codes this generator can produce.
    pub fn code_space(&self) -> f64 {
        (self.alphabet.len() as f64).powi(self.length as i32)
    }

    pub fn generate(&self) -> String {
        self.generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng>(&self, rng: &mut R) -> String {
        (0..self.length)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect()
    }
}

impl Default for JoinCodeGenerator {
    fn default() -> Self {
        Self {
            alphabet: DEFAULT_ALPHABET.chars().collect(),
            length: DEFAULT_CODE_LENGTH,
        }
    }
}
