//! Where the deployed gradebook lives and who its teacher is.

use anchor_lang::prelude::Pubkey;
use clap::Parser;
use confidential_gradebook::{DEFAULT_TEACHER, GRADEBOOK_SEED, GRADE_RECORD_SEED};

use crate::Identity;

/// Gradebook client arguments.
///
/// Every flag can also come from the environment.
#[derive(Debug, Clone, Parser)]
pub struct ClientArgs {
    /// Program id of the deployed gradebook program.
    #[arg(
        long = "program-id",
        env = "GRADEBOOK_PROGRAM_ID",
        default_value_t = confidential_gradebook::ID
    )]
    pub program_id: Pubkey,

    /// Address of the gradebook account.
    #[arg(long = "gradebook", env = "GRADEBOOK_ADDRESS")]
    pub gradebook: Pubkey,

    /// Wallet that may submit grades. Must match the deployed gradebook.
    #[arg(long = "teacher", env = "GRADEBOOK_TEACHER", default_value_t = DEFAULT_TEACHER)]
    pub teacher: Pubkey,
}

impl ClientArgs {
    pub fn teacher(&self) -> Identity {
        Identity::new(self.teacher)
    }

    /// PDA of `student`'s grade record in the configured gradebook.
    pub fn grade_record_address(&self, student: &Identity) -> Pubkey {
        grade_record_address(&self.program_id, &self.gradebook, student)
    }
}

/// PDA of the gradebook created by `authority`.
pub fn gradebook_address(program_id: &Pubkey, authority: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[GRADEBOOK_SEED, authority.as_ref()], program_id).0
}

/// PDA of a student's grade record.
pub fn grade_record_address(program_id: &Pubkey, gradebook: &Pubkey, student: &Identity) -> Pubkey {
    Pubkey::find_program_address(
        &[GRADE_RECORD_SEED, gradebook.as_ref(), student.pubkey().as_ref()],
        program_id,
    )
    .0
}
