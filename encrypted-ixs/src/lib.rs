use arcis::*;

#[encrypted]
mod circuits {
    use arcis::*;

    // ============================================================================
    // CONFIDENTIAL GRADEBOOK - Encrypted Instructions
    // ============================================================================
    //
    // These circuits run inside the MXE cluster. Grades and class totals stay
    // encrypted for the whole computation; the only plaintext that ever leaves
    // the cluster is the class average.
    //
    // - Individual grades are stored as Enc<Mxe, u32> in a per-student account
    // - The running (sum, count) pair is stored as Enc<Mxe, ClassTotals>
    // - A student's grade is re-encrypted to the student's own key on request
    // ============================================================================

    /// Running aggregate over every recorded grade.
    pub struct ClassTotals {
        sum: u64,
        count: u64,
    }

    /// Creates the empty aggregate for a new gradebook.
    #[instruction]
    pub fn init_class_totals(mxe: Mxe) -> Enc<Mxe, ClassTotals> {
        let totals = ClassTotals { sum: 0, count: 0 };
        mxe.from_arcis(totals)
    }

    // ============================================================================
    // GRADE SUBMISSION
    // ============================================================================

    /// Stores a grade submitted by the teacher and folds it into the totals.
    ///
    /// On a resubmission the previously stored grade is retracted from the sum
    /// and the student count is left alone, so every student contributes
    /// exactly once. On a first submission `previous_ctxt` points at an empty
    /// account and is ignored.
    #[instruction]
    pub fn record_grade(
        grade_ctxt: Enc<Shared, u32>,
        previous_ctxt: Enc<Mxe, u32>,
        totals_ctxt: Enc<Mxe, ClassTotals>,
        is_resubmission: bool,
    ) -> (Enc<Mxe, u32>, Enc<Mxe, ClassTotals>) {
        let grade = grade_ctxt.to_arcis();
        let previous = previous_ctxt.to_arcis();
        let mut totals = totals_ctxt.to_arcis();

        let retracted = if is_resubmission { previous as u64 } else { 0 };
        // `retracted` is this student's share of `sum`, so this never underflows
        totals.sum = (totals.sum - retracted) + grade as u64;
        if !is_resubmission {
            totals.count += 1;
        }

        (
            previous_ctxt.owner.from_arcis(grade),
            totals_ctxt.owner.from_arcis(totals),
        )
    }

    // ============================================================================
    // READS
    // ============================================================================

    /// Re-encrypts a stored grade to the requester's x25519 key.
    /// Only the holder of the matching secret key can read the result.
    #[instruction]
    pub fn seal_grade(requester: Shared, grade_ctxt: Enc<Mxe, u32>) -> Enc<Shared, u32> {
        let grade = grade_ctxt.to_arcis();
        requester.from_arcis(grade)
    }

    /// Reveals the floor of sum / count. An empty class averages to 0.
    #[instruction]
    pub fn class_average(totals_ctxt: Enc<Mxe, ClassTotals>) -> u32 {
        let totals = totals_ctxt.to_arcis();

        // MPC evaluates both sides, keep the divisor non-zero
        let divisor = if totals.count == 0 { 1 } else { totals.count };
        let average = totals.sum / divisor;

        (average as u32).reveal()
    }
}
