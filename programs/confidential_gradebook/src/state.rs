use anchor_lang::prelude::*;

use crate::policy;
use crate::ErrorCode;

// ============================================================================
// ENCRYPTED FIELD LAYOUT
// ============================================================================
//
// The MXE reads ciphertexts straight out of account data, so the encrypted
// fields sit right after the 8 byte discriminator.

/// Offset of `Gradebook::class_totals` in account data.
pub const CLASS_TOTALS_OFFSET: u32 = 8;
/// `ClassTotals { sum, count }` is two ciphertexts.
pub const CLASS_TOTALS_LEN: u32 = 32 * 2;

/// Offset of `GradeRecord::grade` in account data.
pub const GRADE_OFFSET: u32 = 8;
pub const GRADE_LEN: u32 = 32;

/// Slots a latched computation gets before the authority may clear it.
/// Roughly ten minutes at 400ms slots.
pub const PENDING_TIMEOUT_SLOTS: u64 = 1_500;

// ============================================================================
// GRADEBOOK
// ============================================================================

/// One class: the teacher allowed to write grades and the encrypted aggregate.
#[account]
pub struct Gradebook {
    /// Encrypted `ClassTotals { sum, count }`, owned by the MXE
    pub class_totals: [[u8; 32]; 2],
    /// Nonce of `class_totals`
    pub totals_nonce: u128,
    /// Wallet that created the gradebook
    pub authority: Pubkey,
    /// Only wallet allowed to submit grades
    pub teacher: Pubkey,
    /// Set once `init_class_totals` has completed
    pub totals_initialized: bool,
    /// A computation that rewrites `class_totals` is in flight
    pub submission_pending: bool,
    /// Computation account of the latched computation
    pub pending_computation: Pubkey,
    /// Slot the latch was taken at
    pub pending_since_slot: u64,
    /// Plaintext mirror of the encrypted student count
    pub graded_students: u64,
    /// Last revealed class average
    pub class_average: u32,
    pub average_revealed_at: i64,
    pub bump: u8,
}

impl Gradebook {
    // 8 (disc) + 64 + 16 + 32 + 32 + 1 + 1 + 32 + 8 + 8 + 4 + 8 + 1
    pub const SIZE: usize = 8 + 32 * 2 + 16 + 32 + 32 + 1 + 1 + 32 + 8 + 8 + 4 + 8 + 1;

    pub fn new(authority: Pubkey, teacher: Pubkey, bump: u8) -> Self {
        Self {
            class_totals: [[0; 32]; 2],
            totals_nonce: 0,
            authority,
            teacher,
            totals_initialized: false,
            submission_pending: false,
            pending_computation: Pubkey::default(),
            pending_since_slot: 0,
            graded_students: 0,
            class_average: 0,
            average_revealed_at: 0,
            bump,
        }
    }

    pub fn is_teacher(&self, caller: &Pubkey) -> bool {
        self.teacher == *caller
    }

    /// Latches the gradebook before queueing `init_class_totals`.
    pub fn begin_totals_init(
        &mut self,
        computation: Pubkey,
        slot: u64,
    ) -> std::result::Result<(), ErrorCode> {
        if self.totals_initialized {
            return Err(ErrorCode::ClassTotalsAlreadyInitialized);
        }
        if self.submission_pending {
            return Err(ErrorCode::SubmissionPending);
        }
        self.latch(computation, slot);
        Ok(())
    }

    /// Latches the gradebook before queueing `record_grade`.
    /// At most one computation may rewrite the totals at a time.
    pub fn begin_submission(
        &mut self,
        computation: Pubkey,
        slot: u64,
    ) -> std::result::Result<(), ErrorCode> {
        policy::ensure_accepting_submissions(self)?;
        self.latch(computation, slot);
        Ok(())
    }

    fn latch(&mut self, computation: Pubkey, slot: u64) {
        self.submission_pending = true;
        self.pending_computation = computation;
        self.pending_since_slot = slot;
    }

    fn release(&mut self) {
        self.submission_pending = false;
        self.pending_computation = Pubkey::default();
        self.pending_since_slot = 0;
    }

    /// True if `computation` is the one holding the latch.
    /// Callbacks of cleared computations must not touch the totals.
    pub fn is_pending(&self, computation: &Pubkey) -> bool {
        self.submission_pending && self.pending_computation == *computation
    }

    /// Drops a latch whose computation never called back.
    /// Returns the computation that was latched.
    pub fn clear_stale_pending(&mut self, slot: u64) -> std::result::Result<Pubkey, ErrorCode> {
        if !self.submission_pending {
            return Err(ErrorCode::NoPendingComputation);
        }
        if slot < self.pending_since_slot.saturating_add(PENDING_TIMEOUT_SLOTS) {
            return Err(ErrorCode::PendingComputationNotExpired);
        }
        let computation = self.pending_computation;
        self.release();
        Ok(computation)
    }

    pub fn store_totals(&mut self, ciphertexts: [[u8; 32]; 2], nonce: u128) {
        self.class_totals = ciphertexts;
        self.totals_nonce = nonce;
        self.totals_initialized = true;
        self.release();
    }

    /// Applies the totals produced by `record_grade` and releases the latch.
    pub fn complete_submission(
        &mut self,
        ciphertexts: [[u8; 32]; 2],
        nonce: u128,
        first_grade: bool,
    ) {
        self.store_totals(ciphertexts, nonce);
        if first_grade {
            self.graded_students += 1;
        }
    }

    /// Releases the latch without touching the encrypted state.
    pub fn abort_pending(&mut self) {
        self.release();
    }

    pub fn store_average(&mut self, average: u32, revealed_at: i64) {
        self.class_average = average;
        self.average_revealed_at = revealed_at;
    }
}

// ============================================================================
// GRADE RECORD
// ============================================================================

/// A student's encrypted grade. One per (gradebook, student), enforced by the PDA seeds.
#[account]
pub struct GradeRecord {
    /// Encrypted grade, owned by the MXE
    pub grade: [u8; 32],
    /// Nonce of `grade`
    pub nonce: u128,
    pub gradebook: Pubkey,
    pub student: Pubkey,
    /// False until the first `record_grade` callback lands
    pub has_grade: bool,
    /// Number of times the grade was written
    pub revision: u32,
    pub updated_at: i64,
    pub bump: u8,
}

impl GradeRecord {
    // 8 (disc) + 32 + 16 + 32 + 32 + 1 + 4 + 8 + 1
    pub const SIZE: usize = 8 + 32 + 16 + 32 + 32 + 1 + 4 + 8 + 1;

    pub fn new(gradebook: Pubkey, student: Pubkey, bump: u8) -> Self {
        Self {
            grade: [0; 32],
            nonce: 0,
            gradebook,
            student,
            has_grade: false,
            revision: 0,
            updated_at: 0,
            bump,
        }
    }

    /// Ties a (possibly freshly created) record to its owner.
    pub fn bind(&mut self, gradebook: Pubkey, student: Pubkey, bump: u8) {
        self.gradebook = gradebook;
        self.student = student;
        self.bump = bump;
    }

    /// Writes a new encrypted grade. Returns true if this is the student's first grade.
    pub fn store_grade(&mut self, ciphertext: [u8; 32], nonce: u128, updated_at: i64) -> bool {
        let first_grade = !self.has_grade;
        self.grade = ciphertext;
        self.nonce = nonce;
        self.has_grade = true;
        self.revision += 1;
        self.updated_at = updated_at;
        first_grade
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialized<T: AnchorSerialize>(value: &T) -> Vec<u8> {
        let mut data = Vec::new();
        value.serialize(&mut data).unwrap();
        data
    }

    fn gradebook() -> Gradebook {
        Gradebook::new(Pubkey::new_unique(), Pubkey::new_unique(), 254)
    }

    fn empty_record() -> GradeRecord {
        GradeRecord::new(Pubkey::default(), Pubkey::default(), 0)
    }

    #[test]
    fn sizes_cover_serialized_accounts() {
        let book = gradebook();
        assert_eq!(serialized(&book).len() + 8, Gradebook::SIZE);

        let record = empty_record();
        assert_eq!(serialized(&record).len() + 8, GradeRecord::SIZE);
    }

    #[test]
    fn encrypted_fields_follow_discriminator() {
        let mut book = gradebook();
        book.class_totals = [[7; 32], [9; 32]];
        let data = serialized(&book);
        let start = CLASS_TOTALS_OFFSET as usize - 8;
        let end = start + CLASS_TOTALS_LEN as usize;
        assert!(data[start..start + 32].iter().all(|b| *b == 7));
        assert!(data[start + 32..end].iter().all(|b| *b == 9));

        let mut record = empty_record();
        record.grade = [3; 32];
        let data = serialized(&record);
        let start = GRADE_OFFSET as usize - 8;
        assert!(data[start..start + GRADE_LEN as usize].iter().all(|b| *b == 3));
    }

    #[test]
    fn totals_init_runs_once() {
        let mut book = gradebook();
        let computation = Pubkey::new_unique();
        book.begin_totals_init(computation, 10).unwrap();
        assert!(book.submission_pending);
        assert!(book.is_pending(&computation));
        assert!(matches!(
            book.begin_totals_init(Pubkey::new_unique(), 11),
            Err(ErrorCode::SubmissionPending)
        ));

        book.store_totals([[1; 32]; 2], 42);
        assert!(book.totals_initialized);
        assert!(!book.submission_pending);
        assert_eq!(book.totals_nonce, 42);
        assert!(!book.is_pending(&computation));
        assert!(matches!(
            book.begin_totals_init(Pubkey::new_unique(), 12),
            Err(ErrorCode::ClassTotalsAlreadyInitialized)
        ));
    }

    #[test]
    fn submissions_are_serialized() {
        let mut book = gradebook();
        assert!(matches!(
            book.begin_submission(Pubkey::new_unique(), 1),
            Err(ErrorCode::ClassTotalsNotReady)
        ));

        book.store_totals([[0; 32]; 2], 1);
        book.begin_submission(Pubkey::new_unique(), 2).unwrap();
        assert!(matches!(
            book.begin_submission(Pubkey::new_unique(), 3),
            Err(ErrorCode::SubmissionPending)
        ));

        book.complete_submission([[2; 32]; 2], 2, true);
        assert_eq!(book.graded_students, 1);
        book.begin_submission(Pubkey::new_unique(), 4).unwrap();
        book.complete_submission([[3; 32]; 2], 3, false);
        assert_eq!(book.graded_students, 1);
        assert_eq!(book.class_totals, [[3; 32]; 2]);
    }

    #[test]
    fn abort_keeps_previous_totals() {
        let mut book = gradebook();
        book.store_totals([[5; 32]; 2], 5);
        book.begin_submission(Pubkey::new_unique(), 7).unwrap();
        book.abort_pending();

        assert!(!book.submission_pending);
        assert_eq!(book.pending_computation, Pubkey::default());
        assert_eq!(book.class_totals, [[5; 32]; 2]);
        assert_eq!(book.totals_nonce, 5);
        assert_eq!(book.graded_students, 0);
    }

    #[test]
    fn lost_computation_can_be_cleared_after_timeout() {
        let mut book = gradebook();
        book.store_totals([[5; 32]; 2], 5);
        assert!(matches!(
            book.clear_stale_pending(1_000_000),
            Err(ErrorCode::NoPendingComputation)
        ));

        let lost = Pubkey::new_unique();
        book.begin_submission(lost, 100).unwrap();
        assert!(matches!(
            book.clear_stale_pending(100 + PENDING_TIMEOUT_SLOTS - 1),
            Err(ErrorCode::PendingComputationNotExpired)
        ));
        assert!(book.is_pending(&lost));

        assert_eq!(book.clear_stale_pending(100 + PENDING_TIMEOUT_SLOTS).unwrap(), lost);
        assert!(!book.submission_pending);
        assert!(!book.is_pending(&lost));
        assert_eq!(book.class_totals, [[5; 32]; 2]);
        assert_eq!(book.totals_nonce, 5);

        // the next submission latches again and a late callback of the lost one is stale
        let next = Pubkey::new_unique();
        book.begin_submission(next, 2_000).unwrap();
        assert!(!book.is_pending(&lost));
        assert!(book.is_pending(&next));
    }

    #[test]
    fn stalled_totals_init_can_be_retried() {
        let mut book = gradebook();
        book.begin_totals_init(Pubkey::new_unique(), 0).unwrap();
        book.clear_stale_pending(PENDING_TIMEOUT_SLOTS).unwrap();

        assert!(!book.totals_initialized);
        book.begin_totals_init(Pubkey::new_unique(), PENDING_TIMEOUT_SLOTS).unwrap();
        assert!(book.submission_pending);
    }

    #[test]
    fn record_tracks_first_grade_and_revisions() {
        let mut record = empty_record();
        let (book, student) = (Pubkey::new_unique(), Pubkey::new_unique());
        record.bind(book, student, 253);

        assert!(record.store_grade([1; 32], 10, 100));
        assert!(!record.store_grade([2; 32], 11, 200));
        assert!(record.has_grade);
        assert_eq!(record.revision, 2);
        assert_eq!(record.grade, [2; 32]);
        assert_eq!(record.nonce, 11);
        assert_eq!(record.updated_at, 200);
        assert_eq!(record.student, student);
        assert_eq!(record.gradebook, book);
    }
}
