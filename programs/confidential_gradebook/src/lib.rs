use anchor_lang::prelude::*;
use arcium_anchor::prelude::*;

pub mod policy;
pub mod state;

use state::*;

// ============================================================================
// CONFIDENTIAL GRADEBOOK - Solana Program
// ============================================================================
//
// A teacher submits grades encrypted to the MXE. Each grade is stored in a
// per-student PDA and folded into an encrypted (sum, count) pair held by the
// gradebook. Nobody, the program included, ever sees a grade in plaintext.
//
// Flow:
// 1. initialize_gradebook fixes the teacher (deployment parameter)
// 2. init_class_totals asks the MXE for an encrypted zero aggregate
// 3. submit_grade (teacher only) -> record_grade circuit -> callback writes
//    grade and totals together
// 4. view_my_grade (student only) -> seal_grade re-encrypts to the student key
// 5. get_class_average (anyone) -> class_average reveals sum / count
// 6. clear_pending_submission (authority) unlatches a computation that never
//    called back
// ============================================================================

const COMP_DEF_OFFSET_INIT_CLASS_TOTALS: u32 = comp_def_offset("init_class_totals");
const COMP_DEF_OFFSET_RECORD_GRADE: u32 = comp_def_offset("record_grade");
const COMP_DEF_OFFSET_SEAL_GRADE: u32 = comp_def_offset("seal_grade");
const COMP_DEF_OFFSET_CLASS_AVERAGE: u32 = comp_def_offset("class_average");

declare_id!("2KkhWJFVSEDqFNfY8bFMPr5CcG69UsserryduVumHyQr");

/// Teacher used when `initialize_gradebook` is called without one.
pub const DEFAULT_TEACHER: Pubkey = pubkey!("4wVnfV8fFp4SeSZDn6e31adtf2cEVdNLYmWwCv69zjVd");

pub const GRADEBOOK_SEED: &[u8] = b"gradebook";
pub const GRADE_RECORD_SEED: &[u8] = b"grade";

#[arcium_program]
pub mod confidential_gradebook {
    use super::*;

    // ========================================================================
    // SETUP
    // ========================================================================

    /// Creates the gradebook of the signing authority.
    /// `teacher` falls back to `DEFAULT_TEACHER`.
    pub fn initialize_gradebook(
        ctx: Context<InitializeGradebook>,
        teacher: Option<Pubkey>,
    ) -> Result<()> {
        let authority = ctx.accounts.authority.key();
        let teacher = teacher.unwrap_or(DEFAULT_TEACHER);

        ctx.accounts
            .gradebook
            .set_inner(Gradebook::new(authority, teacher, ctx.bumps.gradebook));

        msg!("Gradebook created by {} for teacher {}", authority, teacher);
        emit!(GradebookInitialized {
            gradebook: ctx.accounts.gradebook.key(),
            authority,
            teacher,
        });

        Ok(())
    }

    pub fn init_class_totals_comp_def(ctx: Context<InitClassTotalsCompDef>) -> Result<()> {
        init_comp_def(ctx.accounts, None, None)?;
        Ok(())
    }

    pub fn init_record_grade_comp_def(ctx: Context<InitRecordGradeCompDef>) -> Result<()> {
        init_comp_def(ctx.accounts, None, None)?;
        Ok(())
    }

    pub fn init_seal_grade_comp_def(ctx: Context<InitSealGradeCompDef>) -> Result<()> {
        init_comp_def(ctx.accounts, None, None)?;
        Ok(())
    }

    pub fn init_class_average_comp_def(ctx: Context<InitClassAverageCompDef>) -> Result<()> {
        init_comp_def(ctx.accounts, None, None)?;
        Ok(())
    }

    /// Asks the MXE for the encrypted zero aggregate. Authority only, runs once.
    pub fn init_class_totals(
        ctx: Context<InitClassTotals>,
        computation_offset: u64,
        nonce: u128,
    ) -> Result<()> {
        let computation = ctx.accounts.computation_account.key();
        ctx.accounts
            .gradebook
            .begin_totals_init(computation, Clock::get()?.slot)?;
        ctx.accounts.sign_pda_account.bump = ctx.bumps.sign_pda_account;

        let gradebook_key = ctx.accounts.gradebook.key();
        let args = ArgBuilder::new().plaintext_u128(nonce).build();

        queue_computation(
            ctx.accounts,
            computation_offset,
            args,
            None,
            vec![InitClassTotalsCallback::callback_ix(
                computation_offset,
                &ctx.accounts.mxe_account,
                &[CallbackAccount {
                    pubkey: gradebook_key,
                    is_writable: true,
                }],
            )?],
            1,
            0,
        )?;

        Ok(())
    }

    #[arcium_callback(encrypted_ix = "init_class_totals")]
    pub fn init_class_totals_callback(
        ctx: Context<InitClassTotalsCallback>,
        output: SignedComputationOutputs<InitClassTotalsOutput>,
    ) -> Result<()> {
        let computation = ctx.accounts.computation_account.key();
        if !ctx.accounts.gradebook.is_pending(&computation) {
            msg!("Ignoring init_class_totals callback of cleared computation {}", computation);
            return Ok(());
        }

        let totals = match output.verify_output(
            &ctx.accounts.cluster_account,
            &ctx.accounts.computation_account,
        ) {
            Ok(InitClassTotalsOutput { field_0 }) => field_0,
            Err(_) => {
                // Leave the gradebook uninitialized so the authority can retry
                ctx.accounts.gradebook.abort_pending();
                msg!("init_class_totals aborted");
                return Ok(());
            }
        };

        let gradebook = &mut ctx.accounts.gradebook;
        gradebook.store_totals(totals.ciphertexts, totals.nonce);

        emit!(ClassTotalsInitialized {
            gradebook: gradebook.key(),
        });

        Ok(())
    }

    // ========================================================================
    // GRADE SUBMISSION (teacher)
    // ========================================================================

    /// Submits or replaces a student's grade.
    /// `encrypted_grade` is a u32 encrypted with the x25519 secret shared
    /// between `encryption_pubkey` and the MXE.
    pub fn submit_grade(
        ctx: Context<SubmitGrade>,
        computation_offset: u64,
        student: Pubkey,
        encrypted_grade: [u8; 32],
        encryption_pubkey: [u8; 32],
        nonce: u128,
    ) -> Result<()> {
        policy::authorize_submit(&ctx.accounts.gradebook, &ctx.accounts.teacher.key())?;
        let computation = ctx.accounts.computation_account.key();
        ctx.accounts
            .gradebook
            .begin_submission(computation, Clock::get()?.slot)?;
        ctx.accounts.sign_pda_account.bump = ctx.bumps.sign_pda_account;

        let gradebook_key = ctx.accounts.gradebook.key();
        let totals_nonce = ctx.accounts.gradebook.totals_nonce;

        let record = &mut ctx.accounts.grade_record;
        record.bind(gradebook_key, student, ctx.bumps.grade_record);
        let record_key = record.key();
        let previous_nonce = record.nonce;
        let is_resubmission = record.has_grade;

        // Argument order follows record_grade(grade, previous, totals, is_resubmission)
        let args = ArgBuilder::new()
            .x25519_pubkey(encryption_pubkey)
            .plaintext_u128(nonce)
            .encrypted_u32(encrypted_grade)
            .plaintext_u128(previous_nonce)
            .account(record_key, GRADE_OFFSET, GRADE_LEN)
            .plaintext_u128(totals_nonce)
            .account(gradebook_key, CLASS_TOTALS_OFFSET, CLASS_TOTALS_LEN)
            .plaintext_bool(is_resubmission)
            .build();

        msg!(
            "Queueing grade for {} (resubmission: {})",
            student,
            is_resubmission
        );

        queue_computation(
            ctx.accounts,
            computation_offset,
            args,
            None,
            vec![RecordGradeCallback::callback_ix(
                computation_offset,
                &ctx.accounts.mxe_account,
                &[
                    CallbackAccount {
                        pubkey: gradebook_key,
                        is_writable: true,
                    },
                    CallbackAccount {
                        pubkey: record_key,
                        is_writable: true,
                    },
                ],
            )?],
            1,
            0,
        )?;

        Ok(())
    }

    /// Writes grade and totals in one go, or neither if the computation failed.
    #[arcium_callback(encrypted_ix = "record_grade")]
    pub fn record_grade_callback(
        ctx: Context<RecordGradeCallback>,
        output: SignedComputationOutputs<RecordGradeOutput>,
    ) -> Result<()> {
        let computation = ctx.accounts.computation_account.key();
        if !ctx.accounts.gradebook.is_pending(&computation) {
            msg!("Ignoring record_grade callback of cleared computation {}", computation);
            return Ok(());
        }

        let (grade, totals) = match output.verify_output(
            &ctx.accounts.cluster_account,
            &ctx.accounts.computation_account,
        ) {
            Ok(RecordGradeOutput {
                field_0:
                    RecordGradeOutputStruct0 {
                        field_0: grade,
                        field_1: totals,
                    },
            }) => (grade, totals),
            Err(_) => {
                // Returning an error would revert the unlatch and wedge the gradebook
                ctx.accounts.gradebook.abort_pending();
                msg!("record_grade aborted for {}", ctx.accounts.grade_record.student);
                emit!(GradeSubmissionAborted {
                    gradebook: ctx.accounts.gradebook.key(),
                    student: ctx.accounts.grade_record.student,
                });
                return Ok(());
            }
        };

        let now = Clock::get()?.unix_timestamp;
        let record = &mut ctx.accounts.grade_record;
        let first_grade = record.store_grade(grade.ciphertexts[0], grade.nonce, now);

        let gradebook = &mut ctx.accounts.gradebook;
        gradebook.complete_submission(totals.ciphertexts, totals.nonce, first_grade);

        emit!(GradeRecorded {
            gradebook: gradebook.key(),
            student: record.student,
            revision: record.revision,
            graded_students: gradebook.graded_students,
            timestamp: now,
        });

        Ok(())
    }

    /// Releases a latch whose computation never called back. Authority only,
    /// and only once `PENDING_TIMEOUT_SLOTS` have passed since it was taken.
    pub fn clear_pending_submission(ctx: Context<ClearPendingSubmission>) -> Result<()> {
        let slot = Clock::get()?.slot;
        let gradebook = &mut ctx.accounts.gradebook;
        let computation = gradebook.clear_stale_pending(slot)?;

        msg!("Cleared pending computation {} at slot {}", computation, slot);
        emit!(PendingSubmissionCleared {
            gradebook: gradebook.key(),
            computation,
            slot,
        });

        Ok(())
    }

    // ========================================================================
    // READS
    // ========================================================================
    //
    // Reads pass the ciphertexts by value. An account reference would be read
    // when the cluster runs the computation, which may be after a
    // record_grade callback replaced the ciphertext the nonce belongs to.

    /// Re-encrypts the signer's grade to `requester_pubkey`.
    /// The result is emitted in `GradeSealed`.
    pub fn view_my_grade(
        ctx: Context<ViewMyGrade>,
        computation_offset: u64,
        requester_pubkey: [u8; 32],
        requester_nonce: u128,
    ) -> Result<()> {
        policy::authorize_read_own(&ctx.accounts.grade_record, &ctx.accounts.student.key())?;
        ctx.accounts.sign_pda_account.bump = ctx.bumps.sign_pda_account;

        let record = &ctx.accounts.grade_record;
        let record_key = record.key();
        let args = ArgBuilder::new()
            .x25519_pubkey(requester_pubkey)
            .plaintext_u128(requester_nonce)
            .plaintext_u128(record.nonce)
            .encrypted_u32(record.grade)
            .build();

        queue_computation(
            ctx.accounts,
            computation_offset,
            args,
            None,
            vec![SealGradeCallback::callback_ix(
                computation_offset,
                &ctx.accounts.mxe_account,
                &[CallbackAccount {
                    pubkey: record_key,
                    is_writable: false,
                }],
            )?],
            1,
            0,
        )?;

        Ok(())
    }

    #[arcium_callback(encrypted_ix = "seal_grade")]
    pub fn seal_grade_callback(
        ctx: Context<SealGradeCallback>,
        output: SignedComputationOutputs<SealGradeOutput>,
    ) -> Result<()> {
        let sealed = match output.verify_output(
            &ctx.accounts.cluster_account,
            &ctx.accounts.computation_account,
        ) {
            Ok(SealGradeOutput { field_0 }) => field_0,
            Err(_) => return Err(ErrorCode::AbortedComputation.into()),
        };

        // Only the requester's x25519 secret opens this
        emit!(GradeSealed {
            student: ctx.accounts.grade_record.student,
            ciphertext: sealed.ciphertexts[0],
            nonce: sealed.nonce.to_le_bytes(),
        });

        Ok(())
    }

    /// Reveals the class average. Open to any signer.
    pub fn get_class_average(ctx: Context<GetClassAverage>, computation_offset: u64) -> Result<()> {
        policy::authorize_read_aggregate(&ctx.accounts.gradebook)?;
        ctx.accounts.sign_pda_account.bump = ctx.bumps.sign_pda_account;

        let gradebook = &ctx.accounts.gradebook;
        let gradebook_key = gradebook.key();
        let [sum, count] = gradebook.class_totals;
        let args = ArgBuilder::new()
            .plaintext_u128(gradebook.totals_nonce)
            .encrypted_u64(sum)
            .encrypted_u64(count)
            .build();

        queue_computation(
            ctx.accounts,
            computation_offset,
            args,
            None,
            vec![ClassAverageCallback::callback_ix(
                computation_offset,
                &ctx.accounts.mxe_account,
                &[CallbackAccount {
                    pubkey: gradebook_key,
                    is_writable: true,
                }],
            )?],
            1,
            0,
        )?;

        Ok(())
    }

    #[arcium_callback(encrypted_ix = "class_average")]
    pub fn class_average_callback(
        ctx: Context<ClassAverageCallback>,
        output: SignedComputationOutputs<ClassAverageOutput>,
    ) -> Result<()> {
        let average = match output.verify_output(
            &ctx.accounts.cluster_account,
            &ctx.accounts.computation_account,
        ) {
            Ok(ClassAverageOutput { field_0 }) => field_0,
            Err(_) => return Err(ErrorCode::AbortedComputation.into()),
        };

        let now = Clock::get()?.unix_timestamp;
        let gradebook = &mut ctx.accounts.gradebook;
        gradebook.store_average(average, now);

        emit!(ClassAverageRevealed {
            gradebook: gradebook.key(),
            average,
            graded_students: gradebook.graded_students,
            timestamp: now,
        });

        Ok(())
    }
}

// ============================================================================
// CONTEXT STRUCTURES
// ============================================================================

#[derive(Accounts)]
pub struct InitializeGradebook<'info> {
    #[account(mut)]
    pub authority: Signer<'info>,

    #[account(
        init,
        payer = authority,
        space = Gradebook::SIZE,
        seeds = [GRADEBOOK_SEED, authority.key().as_ref()],
        bump
    )]
    pub gradebook: Account<'info, Gradebook>,

    pub system_program: Program<'info, System>,
}

// ============================================================================
// ARCIUM COMPUTATION DEFINITIONS
// ============================================================================

#[init_computation_definition_accounts("init_class_totals", payer)]
#[derive(Accounts)]
pub struct InitClassTotalsCompDef<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    #[account(mut, address = derive_mxe_pda!())]
    pub mxe_account: Box<Account<'info, MXEAccount>>,
    #[account(mut)]
    /// CHECK: comp_def_account, checked by arcium program
    pub comp_def_account: UncheckedAccount<'info>,
    pub arcium_program: Program<'info, Arcium>,
    pub system_program: Program<'info, System>,
}

#[init_computation_definition_accounts("record_grade", payer)]
#[derive(Accounts)]
pub struct InitRecordGradeCompDef<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    #[account(mut, address = derive_mxe_pda!())]
    pub mxe_account: Box<Account<'info, MXEAccount>>,
    #[account(mut)]
    /// CHECK: comp_def_account, checked by arcium program
    pub comp_def_account: UncheckedAccount<'info>,
    pub arcium_program: Program<'info, Arcium>,
    pub system_program: Program<'info, System>,
}

#[init_computation_definition_accounts("seal_grade", payer)]
#[derive(Accounts)]
pub struct InitSealGradeCompDef<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    #[account(mut, address = derive_mxe_pda!())]
    pub mxe_account: Box<Account<'info, MXEAccount>>,
    #[account(mut)]
    /// CHECK: comp_def_account, checked by arcium program
    pub comp_def_account: UncheckedAccount<'info>,
    pub arcium_program: Program<'info, Arcium>,
    pub system_program: Program<'info, System>,
}

#[init_computation_definition_accounts("class_average", payer)]
#[derive(Accounts)]
pub struct InitClassAverageCompDef<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    #[account(mut, address = derive_mxe_pda!())]
    pub mxe_account: Box<Account<'info, MXEAccount>>,
    #[account(mut)]
    /// CHECK: comp_def_account, checked by arcium program
    pub comp_def_account: UncheckedAccount<'info>,
    pub arcium_program: Program<'info, Arcium>,
    pub system_program: Program<'info, System>,
}

// ============================================================================
// CLASS TOTALS CONTEXTS
// ============================================================================

#[queue_computation_accounts("init_class_totals", authority)]
#[derive(Accounts)]
#[instruction(computation_offset: u64)]
pub struct InitClassTotals<'info> {
    #[account(mut)]
    pub authority: Signer<'info>,

    /// The seeds make the signer the gradebook authority
    #[account(
        mut,
        seeds = [GRADEBOOK_SEED, authority.key().as_ref()],
        bump = gradebook.bump
    )]
    pub gradebook: Box<Account<'info, Gradebook>>,

    #[account(
        init_if_needed,
        space = 9,
        payer = authority,
        seeds = [&SIGN_PDA_SEED],
        bump,
        address = derive_sign_pda!(),
    )]
    pub sign_pda_account: Account<'info, ArciumSignerAccount>,
    #[account(address = derive_mxe_pda!())]
    pub mxe_account: Account<'info, MXEAccount>,
    #[account(mut, address = derive_mempool_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    /// CHECK: mempool_account
    pub mempool_account: UncheckedAccount<'info>,
    #[account(mut, address = derive_execpool_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    /// CHECK: executing_pool
    pub executing_pool: UncheckedAccount<'info>,
    #[account(mut, address = derive_comp_pda!(computation_offset, mxe_account, ErrorCode::ClusterNotSet))]
    /// CHECK: computation_account
    pub computation_account: UncheckedAccount<'info>,
    #[account(address = derive_comp_def_pda!(COMP_DEF_OFFSET_INIT_CLASS_TOTALS))]
    pub comp_def_account: Account<'info, ComputationDefinitionAccount>,
    #[account(mut, address = derive_cluster_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    pub cluster_account: Account<'info, Cluster>,
    #[account(mut, address = ARCIUM_FEE_POOL_ACCOUNT_ADDRESS)]
    pub pool_account: Account<'info, FeePool>,
    #[account(mut, address = ARCIUM_CLOCK_ACCOUNT_ADDRESS)]
    pub clock_account: Account<'info, ClockAccount>,
    pub system_program: Program<'info, System>,
    pub arcium_program: Program<'info, Arcium>,
}

#[callback_accounts("init_class_totals")]
#[derive(Accounts)]
pub struct InitClassTotalsCallback<'info> {
    pub arcium_program: Program<'info, Arcium>,
    #[account(address = derive_comp_def_pda!(COMP_DEF_OFFSET_INIT_CLASS_TOTALS))]
    pub comp_def_account: Account<'info, ComputationDefinitionAccount>,
    #[account(address = derive_mxe_pda!())]
    pub mxe_account: Account<'info, MXEAccount>,
    /// CHECK: computation_account
    pub computation_account: UncheckedAccount<'info>,
    #[account(address = derive_cluster_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    pub cluster_account: Account<'info, Cluster>,
    #[account(address = ::anchor_lang::solana_program::sysvar::instructions::ID)]
    /// CHECK: instructions_sysvar
    pub instructions_sysvar: AccountInfo<'info>,
    #[account(mut)]
    pub gradebook: Account<'info, Gradebook>,
}

// ============================================================================
// GRADE SUBMISSION CONTEXTS
// ============================================================================

#[queue_computation_accounts("record_grade", teacher)]
#[derive(Accounts)]
#[instruction(computation_offset: u64, student: Pubkey)]
pub struct SubmitGrade<'info> {
    #[account(mut)]
    pub teacher: Signer<'info>,

    #[account(
        mut,
        seeds = [GRADEBOOK_SEED, gradebook.authority.as_ref()],
        bump = gradebook.bump
    )]
    pub gradebook: Box<Account<'info, Gradebook>>,

    /// Seeds: ["grade", gradebook, student]
    #[account(
        init_if_needed,
        payer = teacher,
        space = GradeRecord::SIZE,
        seeds = [GRADE_RECORD_SEED, gradebook.key().as_ref(), student.as_ref()],
        bump
    )]
    pub grade_record: Box<Account<'info, GradeRecord>>,

    #[account(
        init_if_needed,
        space = 9,
        payer = teacher,
        seeds = [&SIGN_PDA_SEED],
        bump,
        address = derive_sign_pda!(),
    )]
    pub sign_pda_account: Account<'info, ArciumSignerAccount>,
    #[account(address = derive_mxe_pda!())]
    pub mxe_account: Account<'info, MXEAccount>,
    #[account(mut, address = derive_mempool_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    /// CHECK: mempool_account
    pub mempool_account: UncheckedAccount<'info>,
    #[account(mut, address = derive_execpool_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    /// CHECK: executing_pool
    pub executing_pool: UncheckedAccount<'info>,
    #[account(mut, address = derive_comp_pda!(computation_offset, mxe_account, ErrorCode::ClusterNotSet))]
    /// CHECK: computation_account
    pub computation_account: UncheckedAccount<'info>,
    #[account(address = derive_comp_def_pda!(COMP_DEF_OFFSET_RECORD_GRADE))]
    pub comp_def_account: Account<'info, ComputationDefinitionAccount>,
    #[account(mut, address = derive_cluster_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    pub cluster_account: Account<'info, Cluster>,
    #[account(mut, address = ARCIUM_FEE_POOL_ACCOUNT_ADDRESS)]
    pub pool_account: Account<'info, FeePool>,
    #[account(mut, address = ARCIUM_CLOCK_ACCOUNT_ADDRESS)]
    pub clock_account: Account<'info, ClockAccount>,
    pub system_program: Program<'info, System>,
    pub arcium_program: Program<'info, Arcium>,
}

#[callback_accounts("record_grade")]
#[derive(Accounts)]
pub struct RecordGradeCallback<'info> {
    pub arcium_program: Program<'info, Arcium>,
    #[account(address = derive_comp_def_pda!(COMP_DEF_OFFSET_RECORD_GRADE))]
    pub comp_def_account: Account<'info, ComputationDefinitionAccount>,
    #[account(address = derive_mxe_pda!())]
    pub mxe_account: Account<'info, MXEAccount>,
    /// CHECK: computation_account
    pub computation_account: UncheckedAccount<'info>,
    #[account(address = derive_cluster_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    pub cluster_account: Account<'info, Cluster>,
    #[account(address = ::anchor_lang::solana_program::sysvar::instructions::ID)]
    /// CHECK: instructions_sysvar
    pub instructions_sysvar: AccountInfo<'info>,
    #[account(mut)]
    pub gradebook: Box<Account<'info, Gradebook>>,
    #[account(
        mut,
        constraint = grade_record.gradebook == gradebook.key() @ ErrorCode::Unauthorized
    )]
    pub grade_record: Box<Account<'info, GradeRecord>>,
}

// ============================================================================
// READ CONTEXTS
// ============================================================================

#[derive(Accounts)]
pub struct ClearPendingSubmission<'info> {
    pub authority: Signer<'info>,

    #[account(
        mut,
        seeds = [GRADEBOOK_SEED, authority.key().as_ref()],
        bump = gradebook.bump
    )]
    pub gradebook: Account<'info, Gradebook>,
}

#[queue_computation_accounts("seal_grade", student)]
#[derive(Accounts)]
#[instruction(computation_offset: u64)]
pub struct ViewMyGrade<'info> {
    #[account(mut)]
    pub student: Signer<'info>,

    pub gradebook: Box<Account<'info, Gradebook>>,

    /// Derived from the signer, so a student can only ever reach their own record
    #[account(
        seeds = [GRADE_RECORD_SEED, gradebook.key().as_ref(), student.key().as_ref()],
        bump = grade_record.bump
    )]
    pub grade_record: Box<Account<'info, GradeRecord>>,

    #[account(
        init_if_needed,
        space = 9,
        payer = student,
        seeds = [&SIGN_PDA_SEED],
        bump,
        address = derive_sign_pda!(),
    )]
    pub sign_pda_account: Account<'info, ArciumSignerAccount>,
    #[account(address = derive_mxe_pda!())]
    pub mxe_account: Account<'info, MXEAccount>,
    #[account(mut, address = derive_mempool_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    /// CHECK: mempool_account
    pub mempool_account: UncheckedAccount<'info>,
    #[account(mut, address = derive_execpool_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    /// CHECK: executing_pool
    pub executing_pool: UncheckedAccount<'info>,
    #[account(mut, address = derive_comp_pda!(computation_offset, mxe_account, ErrorCode::ClusterNotSet))]
    /// CHECK: computation_account
    pub computation_account: UncheckedAccount<'info>,
    #[account(address = derive_comp_def_pda!(COMP_DEF_OFFSET_SEAL_GRADE))]
    pub comp_def_account: Account<'info, ComputationDefinitionAccount>,
    #[account(mut, address = derive_cluster_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    pub cluster_account: Account<'info, Cluster>,
    #[account(mut, address = ARCIUM_FEE_POOL_ACCOUNT_ADDRESS)]
    pub pool_account: Account<'info, FeePool>,
    #[account(mut, address = ARCIUM_CLOCK_ACCOUNT_ADDRESS)]
    pub clock_account: Account<'info, ClockAccount>,
    pub system_program: Program<'info, System>,
    pub arcium_program: Program<'info, Arcium>,
}

#[callback_accounts("seal_grade")]
#[derive(Accounts)]
pub struct SealGradeCallback<'info> {
    pub arcium_program: Program<'info, Arcium>,
    #[account(address = derive_comp_def_pda!(COMP_DEF_OFFSET_SEAL_GRADE))]
    pub comp_def_account: Account<'info, ComputationDefinitionAccount>,
    #[account(address = derive_mxe_pda!())]
    pub mxe_account: Account<'info, MXEAccount>,
    /// CHECK: computation_account
    pub computation_account: UncheckedAccount<'info>,
    #[account(address = derive_cluster_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    pub cluster_account: Account<'info, Cluster>,
    #[account(address = ::anchor_lang::solana_program::sysvar::instructions::ID)]
    /// CHECK: instructions_sysvar
    pub instructions_sysvar: AccountInfo<'info>,
    pub grade_record: Box<Account<'info, GradeRecord>>,
}

#[queue_computation_accounts("class_average", payer)]
#[derive(Accounts)]
#[instruction(computation_offset: u64)]
pub struct GetClassAverage<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,

    pub gradebook: Box<Account<'info, Gradebook>>,

    #[account(
        init_if_needed,
        space = 9,
        payer = payer,
        seeds = [&SIGN_PDA_SEED],
        bump,
        address = derive_sign_pda!(),
    )]
    pub sign_pda_account: Account<'info, ArciumSignerAccount>,
    #[account(address = derive_mxe_pda!())]
    pub mxe_account: Account<'info, MXEAccount>,
    #[account(mut, address = derive_mempool_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    /// CHECK: mempool_account
    pub mempool_account: UncheckedAccount<'info>,
    #[account(mut, address = derive_execpool_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    /// CHECK: executing_pool
    pub executing_pool: UncheckedAccount<'info>,
    #[account(mut, address = derive_comp_pda!(computation_offset, mxe_account, ErrorCode::ClusterNotSet))]
    /// CHECK: computation_account
    pub computation_account: UncheckedAccount<'info>,
    #[account(address = derive_comp_def_pda!(COMP_DEF_OFFSET_CLASS_AVERAGE))]
    pub comp_def_account: Account<'info, ComputationDefinitionAccount>,
    #[account(mut, address = derive_cluster_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    pub cluster_account: Account<'info, Cluster>,
    #[account(mut, address = ARCIUM_FEE_POOL_ACCOUNT_ADDRESS)]
    pub pool_account: Account<'info, FeePool>,
    #[account(mut, address = ARCIUM_CLOCK_ACCOUNT_ADDRESS)]
    pub clock_account: Account<'info, ClockAccount>,
    pub system_program: Program<'info, System>,
    pub arcium_program: Program<'info, Arcium>,
}

#[callback_accounts("class_average")]
#[derive(Accounts)]
pub struct ClassAverageCallback<'info> {
    pub arcium_program: Program<'info, Arcium>,
    #[account(address = derive_comp_def_pda!(COMP_DEF_OFFSET_CLASS_AVERAGE))]
    pub comp_def_account: Account<'info, ComputationDefinitionAccount>,
    #[account(address = derive_mxe_pda!())]
    pub mxe_account: Account<'info, MXEAccount>,
    /// CHECK: computation_account
    pub computation_account: UncheckedAccount<'info>,
    #[account(address = derive_cluster_pda!(mxe_account, ErrorCode::ClusterNotSet))]
    pub cluster_account: Account<'info, Cluster>,
    #[account(address = ::anchor_lang::solana_program::sysvar::instructions::ID)]
    /// CHECK: instructions_sysvar
    pub instructions_sysvar: AccountInfo<'info>,
    #[account(mut)]
    pub gradebook: Box<Account<'info, Gradebook>>,
}

// ============================================================================
// EVENTS
// ============================================================================

#[event]
pub struct GradebookInitialized {
    pub gradebook: Pubkey,
    pub authority: Pubkey,
    pub teacher: Pubkey,
}

#[event]
pub struct ClassTotalsInitialized {
    pub gradebook: Pubkey,
}

/// The grade itself never appears in an event
#[event]
pub struct GradeRecorded {
    pub gradebook: Pubkey,
    pub student: Pubkey,
    pub revision: u32,
    pub graded_students: u64,
    pub timestamp: i64,
}

#[event]
pub struct GradeSubmissionAborted {
    pub gradebook: Pubkey,
    pub student: Pubkey,
}

#[event]
pub struct PendingSubmissionCleared {
    pub gradebook: Pubkey,
    pub computation: Pubkey,
    pub slot: u64,
}

/// Grade re-encrypted to the requester's x25519 key
#[event]
pub struct GradeSealed {
    pub student: Pubkey,
    pub ciphertext: [u8; 32],
    pub nonce: [u8; 16],
}

#[event]
pub struct ClassAverageRevealed {
    pub gradebook: Pubkey,
    pub average: u32,
    pub graded_students: u64,
    pub timestamp: i64,
}

// ============================================================================
// ERRORS
// ============================================================================

#[error_code]
pub enum ErrorCode {
    #[msg("The computation was aborted")]
    AbortedComputation,
    #[msg("Cluster not set")]
    ClusterNotSet,
    #[msg("Unauthorized action")]
    Unauthorized,
    #[msg("No grade recorded for this student")]
    GradeNotFound,
    #[msg("Another grade submission is still being computed")]
    SubmissionPending,
    #[msg("Class totals have not been initialized")]
    ClassTotalsNotReady,
    #[msg("Class totals are already initialized")]
    ClassTotalsAlreadyInitialized,
    #[msg("No computation is pending")]
    NoPendingComputation,
    #[msg("The pending computation has not timed out yet")]
    PendingComputationNotExpired,
}
