//! Off-chain side of the confidential gradebook.
//!
//! [`GradebookClient`] validates user input, drives a caller's
//! [`ConfidentialSession`] and talks to a deployed gradebook through
//! [`GradebookLedger`]. Neither trait is implemented here for a real wallet
//! or RPC endpoint; the `test-utils` feature provides in-memory fakes.

mod client;
pub use client::{GradebookClient, Role};

mod config;
pub use config::{grade_record_address, gradebook_address, ClientArgs};

mod error;
pub use error::GradebookError;

mod input;
pub use input::{parse_grade, parse_identity, Identity};

mod ledger;
pub use ledger::GradebookLedger;

mod session;
pub use session::{ConfidentialSession, EncryptedGrade, SealedValue, SealingPermission};

#[cfg(feature = "test-utils")]
pub mod test_utils;
