//! Validation of user-typed identities and grades.
//!
//! Both checks run before any encryption or ledger call.

use std::{fmt, str::FromStr};

use anchor_lang::prelude::Pubkey;

use crate::GradebookError;

/// A wallet address, used both as access-control subject and storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(Pubkey);

impl Identity {
    pub const fn new(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }

    pub const fn pubkey(&self) -> &Pubkey {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl From<Pubkey> for Identity {
    fn from(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }
}

impl FromStr for Identity {
    type Err = GradebookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_identity(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Parses a base58 wallet address. Surrounding whitespace is ignored.
pub fn parse_identity(input: &str) -> Result<Identity, GradebookError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(GradebookError::InvalidInput("student address is required".into()));
    }
    trimmed
        .parse::<Pubkey>()
        .map(Identity)
        .map_err(|_| GradebookError::InvalidInput(format!("invalid student address `{trimmed}`")))
}

/// Parses a grade: a non-negative whole number that fits in a `u32`.
pub fn parse_grade(input: &str) -> Result<u32, GradebookError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(GradebookError::InvalidInput("grade is required".into()));
    }
    if trimmed.starts_with('-') {
        return Err(GradebookError::InvalidInput(format!(
            "grade must be non-negative, got `{trimmed}`"
        )));
    }
    trimmed.parse::<u32>().map_err(|_| {
        GradebookError::InvalidInput(format!("grade must be a whole number, got `{trimmed}`"))
    })
}
