//! The gradebook program's call surface, as seen from a caller.

use anchor_lang::prelude::Pubkey;

use crate::{EncryptedGrade, GradebookError, Identity, SealedValue, SealingPermission};

/// Entry points of a deployed gradebook.
///
/// Implementations send the matching instruction, wait for the MXE callback,
/// and translate program errors through [`GradebookError::from_anchor`]. A
/// call that returns `Ok` has been applied in full.
pub trait GradebookLedger {
    /// Address of the gradebook account the calls go to.
    fn address(&self) -> Pubkey;

    /// `submit_grade`, signed by `caller`.
    fn submit_grade(
        &self,
        caller: &Identity,
        student: &Identity,
        grade: &EncryptedGrade,
    ) -> Result<(), GradebookError>;

    /// `view_my_grade`, signed by `caller`. Returns the `GradeSealed` payload.
    fn view_my_grade(
        &self,
        caller: &Identity,
        permission: &SealingPermission,
    ) -> Result<SealedValue, GradebookError>;

    /// `get_class_average`. Returns the revealed average.
    fn class_average(&self) -> Result<u32, GradebookError>;
}
