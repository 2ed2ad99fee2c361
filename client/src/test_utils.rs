//! In-memory stand-ins for a wallet session and a deployed gradebook.
//!
//! Encryption is a blake3 keystream over the value, bound to a key and a
//! nonce. It only models who can open what; it is not confidential.

use std::{
    cell::Cell,
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use anchor_lang::{error::ErrorCode as AnchorErrorCode, prelude::Pubkey};
use confidential_gradebook::{
    policy,
    state::{GradeRecord, Gradebook},
};

use crate::{
    grade_record_address, gradebook_address, ClientArgs, ConfidentialSession, EncryptedGrade,
    GradebookError, GradebookLedger, Identity, SealedValue, SealingPermission,
};

const MXE_KEY: [u8; 32] = *b"gradebook-fake-mxe-cluster-key!!";
const SESSION_KEY_CONTEXT: &str = "gradebook-client test-utils 2026 session x25519";

fn mask(key: &[u8; 32], nonce: u128, lane: u8) -> [u8; 32] {
    let mut input = [0u8; 17];
    input[..16].copy_from_slice(&nonce.to_le_bytes());
    input[16] = lane;
    *blake3::keyed_hash(key, &input).as_bytes()
}

fn seal(value: u64, key: &[u8; 32], nonce: u128, lane: u8) -> [u8; 32] {
    let mut block = [0u8; 32];
    block[..8].copy_from_slice(&value.to_le_bytes());
    for (b, m) in block.iter_mut().zip(mask(key, nonce, lane)) {
        *b ^= m;
    }
    block
}

/// `None` when the ciphertext was not produced under `key`.
fn open(ciphertext: &[u8; 32], key: &[u8; 32], nonce: u128, lane: u8) -> Option<u64> {
    let mut block = *ciphertext;
    for (b, m) in block.iter_mut().zip(mask(key, nonce, lane)) {
        *b ^= m;
    }
    if block[8..].iter().any(|b| *b != 0) {
        return None;
    }
    let mut value = [0u8; 8];
    value.copy_from_slice(&block[..8]);
    Some(u64::from_le_bytes(value))
}

// ============================================================================
// SESSION
// ============================================================================

/// A wallet session whose sealing key is derived from its identity.
#[derive(Debug)]
pub struct FakeSession {
    identity: Option<Identity>,
    key: [u8; 32],
    next_nonce: Cell<u128>,
}

impl FakeSession {
    pub fn connected(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            key: blake3::derive_key(SESSION_KEY_CONTEXT, &identity.to_bytes()),
            next_nonce: Cell::new(1),
        }
    }

    /// A session with no wallet; every capability fails.
    pub fn disconnected() -> Self {
        Self { identity: None, key: [0; 32], next_nonce: Cell::new(1) }
    }

    /// A fresh random-looking identity with its own session.
    pub fn random() -> Self {
        Self::connected(Identity::new(Pubkey::new_unique()))
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.key
    }

    fn connected_identity(&self) -> Result<Identity, GradebookError> {
        self.identity.ok_or_else(|| GradebookError::AdapterFailure("no wallet connected".into()))
    }

    fn nonce(&self) -> u128 {
        let nonce = self.next_nonce.get();
        self.next_nonce.set(nonce + 1);
        nonce
    }
}

impl ConfidentialSession for FakeSession {
    fn identity(&self) -> Result<Identity, GradebookError> {
        self.connected_identity()
    }

    fn encrypt_grade(&self, grade: u32) -> Result<EncryptedGrade, GradebookError> {
        self.connected_identity()?;
        let nonce = self.nonce();
        Ok(EncryptedGrade {
            ciphertext: seal(u64::from(grade), &self.key, nonce, 0),
            encryption_pubkey: self.key,
            nonce,
        })
    }

    fn generate_permission(&self) -> Result<SealingPermission, GradebookError> {
        self.connected_identity()?;
        Ok(SealingPermission { pubkey: self.key, nonce: self.nonce() })
    }

    fn unseal(&self, sealed: &SealedValue) -> Result<u32, GradebookError> {
        self.connected_identity()?;
        open(&sealed.ciphertext, &self.key, u128::from_le_bytes(sealed.nonce), 0)
            .and_then(|value| u32::try_from(value).ok())
            .ok_or_else(|| {
                GradebookError::AdapterFailure("sealed value is not addressed to this session".into())
            })
    }
}

// ============================================================================
// LEDGER
// ============================================================================

struct QueuedGrade {
    computation: Pubkey,
    student: Pubkey,
    grade: EncryptedGrade,
    is_resubmission: bool,
}

/// A queued `class_average` computation. The totals were copied when it was
/// queued, the way `get_class_average` passes them to the cluster.
#[derive(Debug, Clone)]
pub struct QueuedAverage {
    totals: [[u8; 32]; 2],
    nonce: u128,
}

/// A queued `seal_grade` computation, with the grade copied at queue time.
#[derive(Debug, Clone)]
pub struct QueuedSeal {
    grade: [u8; 32],
    nonce: u128,
    permission: SealingPermission,
}

struct LedgerState {
    program_id: Pubkey,
    address: Pubkey,
    gradebook: Gradebook,
    records: HashMap<Pubkey, GradeRecord>,
    queued: VecDeque<QueuedGrade>,
    lost: Vec<QueuedGrade>,
    hold_computations: bool,
    fail_next_computation: bool,
    lose_next_computation: bool,
    mxe_nonce: u128,
    clock: i64,
    slot: u64,
}

impl LedgerState {
    fn next_nonce(&mut self) -> u128 {
        self.mxe_nonce += 1;
        self.mxe_nonce
    }

    fn seal_totals(&mut self, sum: u64, count: u64) -> ([[u8; 32]; 2], u128) {
        let nonce = self.next_nonce();
        ([seal(sum, &MXE_KEY, nonce, 0), seal(count, &MXE_KEY, nonce, 1)], nonce)
    }

    fn init_class_totals(&mut self) -> Result<(), GradebookError> {
        self.gradebook.begin_totals_init(Pubkey::new_unique(), self.slot)?;
        let (totals, nonce) = self.seal_totals(0, 0);
        self.gradebook.store_totals(totals, nonce);
        Ok(())
    }

    /// The `record_grade` circuit followed by its callback.
    fn run_record_grade(&mut self, job: QueuedGrade) {
        if !self.gradebook.is_pending(&job.computation) {
            return;
        }
        if std::mem::take(&mut self.fail_next_computation) {
            self.gradebook.abort_pending();
            return;
        }
        let Some((grade, sum, count)) = self.compute_record_grade(&job) else {
            self.gradebook.abort_pending();
            return;
        };

        let grade_nonce = self.next_nonce();
        let grade_ciphertext = seal(grade, &MXE_KEY, grade_nonce, 0);
        let (totals, totals_nonce) = self.seal_totals(sum, count);
        self.clock += 1;

        let Some(record) = self.records.get_mut(&job.student) else {
            self.gradebook.abort_pending();
            return;
        };
        let first_grade = record.store_grade(grade_ciphertext, grade_nonce, self.clock);
        self.gradebook.complete_submission(totals, totals_nonce, first_grade);
    }

    fn compute_record_grade(&self, job: &QueuedGrade) -> Option<(u64, u64, u64)> {
        let grade = open(&job.grade.ciphertext, &job.grade.encryption_pubkey, job.grade.nonce, 0)?;
        u32::try_from(grade).ok()?;

        // Read at run time; the latch keeps both ciphertexts unchanged until the callback
        let record = self.records.get(&job.student)?;
        let retracted = if job.is_resubmission {
            open(&record.grade, &MXE_KEY, record.nonce, 0)?
        } else {
            0
        };

        let nonce = self.gradebook.totals_nonce;
        let sum = open(&self.gradebook.class_totals[0], &MXE_KEY, nonce, 0)?;
        let count = open(&self.gradebook.class_totals[1], &MXE_KEY, nonce, 1)?;
        let count = if job.is_resubmission { count } else { count + 1 };
        Some((grade, (sum - retracted) + grade, count))
    }
}

/// A deployed gradebook plus an MXE that computes on plaintext.
///
/// Clones share state, so several clients can talk to the same gradebook.
#[derive(Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    /// A gradebook for `teacher` with class totals already initialized.
    pub fn new(teacher: Identity) -> Self {
        Self::without_totals(teacher).with_totals()
    }

    /// A gradebook whose `init_class_totals` has not run yet.
    pub fn without_totals(teacher: Identity) -> Self {
        let program_id = confidential_gradebook::ID;
        let authority = Pubkey::new_unique();
        let address = gradebook_address(&program_id, &authority);
        Self::at(program_id, address, authority, teacher)
    }

    /// The gradebook `args` points at, deployed with totals initialized.
    pub fn deployed(args: &ClientArgs) -> Self {
        Self::at(args.program_id, args.gradebook, Pubkey::new_unique(), args.teacher())
            .with_totals()
    }

    fn at(program_id: Pubkey, address: Pubkey, authority: Pubkey, teacher: Identity) -> Self {
        let state = LedgerState {
            program_id,
            address,
            gradebook: Gradebook::new(authority, *teacher.pubkey(), 255),
            records: HashMap::new(),
            queued: VecDeque::new(),
            lost: Vec::new(),
            hold_computations: false,
            fail_next_computation: false,
            lose_next_computation: false,
            mxe_nonce: 0,
            clock: 0,
            slot: 0,
        };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn with_totals(self) -> Self {
        self.lock()
            .init_class_totals()
            .expect("fresh gradebook accepts totals initialization");
        self
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().expect("ledger state poisoned")
    }

    /// PDA of `student`'s grade record.
    pub fn record_address(&self, student: &Identity) -> Pubkey {
        let state = self.lock();
        grade_record_address(&state.program_id, &state.address, student)
    }

    pub fn init_class_totals(&self) -> Result<(), GradebookError> {
        self.lock().init_class_totals()
    }

    /// Queue `record_grade` computations instead of running them.
    pub fn hold_computations(&self) {
        self.lock().hold_computations = true;
    }

    /// Run every queued computation and stop queueing.
    pub fn release_computations(&self) {
        let mut state = self.lock();
        state.hold_computations = false;
        while let Some(job) = state.queued.pop_front() {
            state.run_record_grade(job);
        }
    }

    /// Abort the next `record_grade` computation.
    pub fn fail_next_computation(&self) {
        self.lock().fail_next_computation = true;
    }

    /// The next `record_grade` computation never calls back until
    /// [`Self::deliver_late_callbacks`].
    pub fn lose_next_computation(&self) {
        self.lock().lose_next_computation = true;
    }

    /// Delivers the callbacks of lost computations.
    pub fn deliver_late_callbacks(&self) {
        let mut state = self.lock();
        for job in std::mem::take(&mut state.lost) {
            state.run_record_grade(job);
        }
    }

    pub fn advance_slots(&self, slots: u64) {
        self.lock().slot += slots;
    }

    /// `clear_pending_submission`, signed by the gradebook authority.
    /// Returns the computation that was released.
    pub fn clear_pending_submission(&self) -> Result<Pubkey, GradebookError> {
        let mut state = self.lock();
        let slot = state.slot;
        Ok(state.gradebook.clear_stale_pending(slot)?)
    }

    pub fn gradebook(&self) -> Gradebook {
        self.lock().gradebook.clone()
    }

    pub fn record(&self, student: &Identity) -> Option<GradeRecord> {
        self.lock().records.get(student.pubkey()).cloned()
    }

    /// `get_class_average` up to the point the computation is queued.
    pub fn queue_class_average(&self) -> Result<QueuedAverage, GradebookError> {
        let state = self.lock();
        policy::authorize_read_aggregate(&state.gradebook)?;
        Ok(QueuedAverage {
            totals: state.gradebook.class_totals,
            nonce: state.gradebook.totals_nonce,
        })
    }

    /// The `class_average` circuit followed by its callback.
    pub fn run_class_average(&self, queued: &QueuedAverage) -> Result<u32, GradebookError> {
        let aborted = || GradebookError::Ledger("class_average computation aborted".into());
        let sum = open(&queued.totals[0], &MXE_KEY, queued.nonce, 0).ok_or_else(aborted)?;
        let count = open(&queued.totals[1], &MXE_KEY, queued.nonce, 1).ok_or_else(aborted)?;
        let average = u32::try_from(sum / count.max(1))
            .map_err(|_| GradebookError::Ledger("class average overflows u32".into()))?;

        let mut state = self.lock();
        state.clock += 1;
        let revealed_at = state.clock;
        state.gradebook.store_average(average, revealed_at);
        Ok(average)
    }

    /// `view_my_grade` up to the point the computation is queued.
    pub fn queue_view_my_grade(
        &self,
        caller: &Identity,
        permission: &SealingPermission,
    ) -> Result<QueuedSeal, GradebookError> {
        let state = self.lock();
        // No PDA for the signer, so Anchor fails the account check
        let record = state
            .records
            .get(caller.pubkey())
            .ok_or_else(|| GradebookError::from(AnchorErrorCode::AccountNotInitialized))?;
        policy::authorize_read_own(record, caller.pubkey())?;
        Ok(QueuedSeal { grade: record.grade, nonce: record.nonce, permission: *permission })
    }

    /// The `seal_grade` circuit followed by its callback.
    pub fn run_seal_grade(&self, queued: &QueuedSeal) -> Result<SealedValue, GradebookError> {
        let grade = open(&queued.grade, &MXE_KEY, queued.nonce, 0)
            .ok_or_else(|| GradebookError::Ledger("seal_grade computation aborted".into()))?;
        let permission = &queued.permission;
        Ok(SealedValue {
            ciphertext: seal(grade, &permission.pubkey, permission.nonce, 0),
            nonce: permission.nonce.to_le_bytes(),
        })
    }
}

impl GradebookLedger for InMemoryLedger {
    fn address(&self) -> Pubkey {
        self.lock().address
    }

    fn submit_grade(
        &self,
        caller: &Identity,
        student: &Identity,
        grade: &EncryptedGrade,
    ) -> Result<(), GradebookError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        policy::authorize_submit(&state.gradebook, caller.pubkey())?;
        let computation = Pubkey::new_unique();
        state.gradebook.begin_submission(computation, state.slot)?;

        let address = state.address;
        let record = state
            .records
            .entry(*student.pubkey())
            .or_insert_with(|| GradeRecord::new(address, *student.pubkey(), 0));
        let job = QueuedGrade {
            computation,
            student: *student.pubkey(),
            grade: grade.clone(),
            is_resubmission: record.has_grade,
        };

        if std::mem::take(&mut state.lose_next_computation) {
            state.lost.push(job);
        } else if state.hold_computations {
            state.queued.push_back(job);
        } else {
            state.run_record_grade(job);
        }
        Ok(())
    }

    fn view_my_grade(
        &self,
        caller: &Identity,
        permission: &SealingPermission,
    ) -> Result<SealedValue, GradebookError> {
        let queued = self.queue_view_my_grade(caller, permission)?;
        self.run_seal_grade(&queued)
    }

    fn class_average(&self) -> Result<u32, GradebookError> {
        let queued = self.queue_class_average()?;
        self.run_class_average(&queued)
    }
}
