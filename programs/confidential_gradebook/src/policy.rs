//! Who may do what with a gradebook.
//!
//! Every check returns before any account is written, so a rejected call has
//! no side effects.

use anchor_lang::prelude::Pubkey;

use crate::state::{GradeRecord, Gradebook};
use crate::ErrorCode;

/// Only the configured teacher may create or overwrite grades.
pub fn authorize_submit(gradebook: &Gradebook, caller: &Pubkey) -> Result<(), ErrorCode> {
    if gradebook.is_teacher(caller) {
        Ok(())
    } else {
        Err(ErrorCode::Unauthorized)
    }
}

/// Anyone may read their own grade. A record without a grade is `GradeNotFound`,
/// someone else's record is `Unauthorized`.
pub fn authorize_read_own(record: &GradeRecord, caller: &Pubkey) -> Result<(), ErrorCode> {
    if record.student != *caller {
        return Err(ErrorCode::Unauthorized);
    }
    if !record.has_grade {
        return Err(ErrorCode::GradeNotFound);
    }
    Ok(())
}

/// The average is public; it only needs totals to exist.
pub fn authorize_read_aggregate(gradebook: &Gradebook) -> Result<(), ErrorCode> {
    if !gradebook.totals_initialized {
        return Err(ErrorCode::ClassTotalsNotReady);
    }
    Ok(())
}

pub fn ensure_accepting_submissions(gradebook: &Gradebook) -> Result<(), ErrorCode> {
    if !gradebook.totals_initialized {
        return Err(ErrorCode::ClassTotalsNotReady);
    }
    if gradebook.submission_pending {
        return Err(ErrorCode::SubmissionPending);
    }
    Ok(())
}
