//! The confidential-computing capabilities a caller's session provides.
//!
//! The gradebook never looks inside these values; it only moves them between
//! the session and the program.

use crate::{GradebookError, Identity};

/// A `u32` grade encrypted for the MXE, in the shape `submit_grade` takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedGrade {
    pub ciphertext: [u8; 32],
    /// x25519 key the shared secret with the MXE was derived from.
    pub encryption_pubkey: [u8; 32],
    pub nonce: u128,
}

/// The key a sealed result should be encrypted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealingPermission {
    pub pubkey: [u8; 32],
    pub nonce: u128,
}

/// A value encrypted to one requester, as carried by the `GradeSealed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealedValue {
    pub ciphertext: [u8; 32],
    pub nonce: [u8; 16],
}

/// Wallet and encryption capabilities of the active caller.
///
/// Every method fails with [`GradebookError::AdapterFailure`].
pub trait ConfidentialSession {
    /// The connected wallet. Fails when no wallet is connected.
    fn identity(&self) -> Result<Identity, GradebookError>;

    /// Encrypts a plaintext grade for the MXE.
    fn encrypt_grade(&self, grade: u32) -> Result<EncryptedGrade, GradebookError>;

    /// Produces a fresh permission bound to this session's key.
    fn generate_permission(&self) -> Result<SealingPermission, GradebookError>;

    /// Opens a value sealed to one of this session's permissions.
    fn unseal(&self, sealed: &SealedValue) -> Result<u32, GradebookError>;
}
