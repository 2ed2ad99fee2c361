//! Request/response façade used by any presentation layer.

use tracing::{debug, info, warn};

use crate::{
    input::{parse_grade, parse_identity},
    ClientArgs, ConfidentialSession, GradebookError, GradebookLedger, Identity,
};

/// Which view the connected wallet gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// May submit grades.
    Teacher,
    /// May read their own grade and the class average.
    Student,
}

/// Binds a caller session to a deployed gradebook.
#[derive(Debug)]
pub struct GradebookClient<S, L> {
    session: S,
    ledger: L,
    teacher: Identity,
}

impl<S, L> GradebookClient<S, L>
where
    S: ConfidentialSession,
    L: GradebookLedger,
{
    pub const fn new(session: S, ledger: L, teacher: Identity) -> Self {
        Self { session, ledger, teacher }
    }

    /// Binds to the gradebook configured in `args`. Fails if `ledger` talks to
    /// a different gradebook.
    pub fn from_args(session: S, ledger: L, args: &ClientArgs) -> Result<Self, GradebookError> {
        if ledger.address() != args.gradebook {
            return Err(GradebookError::InvalidInput(format!(
                "ledger serves gradebook {}, configured {}",
                ledger.address(),
                args.gradebook
            )));
        }
        info!(
            target: "gradebook",
            gradebook = %args.gradebook,
            teacher = %args.teacher,
            "gradebook client configured"
        );
        Ok(Self::new(session, ledger, args.teacher()))
    }

    pub const fn session(&self) -> &S {
        &self.session
    }

    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    pub const fn teacher(&self) -> &Identity {
        &self.teacher
    }

    /// Role of the connected wallet.
    pub fn role(&self) -> Result<Role, GradebookError> {
        let caller = self.session.identity()?;
        Ok(if caller == self.teacher { Role::Teacher } else { Role::Student })
    }

    /// Encrypts and submits `grade` for `student`.
    ///
    /// Input is validated before the caller is authorized, and the caller is
    /// authorized before anything is encrypted.
    pub fn submit_grade(&self, student: &str, grade: &str) -> Result<(), GradebookError> {
        let student = parse_identity(student)?;
        let grade = parse_grade(grade)?;

        let caller = self.session.identity()?;
        if caller != self.teacher {
            warn!(target: "gradebook", %caller, "grade submission from non-teacher wallet");
            return Err(GradebookError::Unauthorized);
        }

        let encrypted = self.session.encrypt_grade(grade)?;
        debug!(target: "gradebook", %student, "submitting encrypted grade");
        self.ledger.submit_grade(&caller, &student, &encrypted)?;

        info!(target: "gradebook", %student, "grade submitted");
        Ok(())
    }

    /// Fetches and unseals the caller's own grade.
    pub fn fetch_my_grade(&self) -> Result<u32, GradebookError> {
        let caller = self.session.identity()?;
        let permission = self.session.generate_permission()?;

        debug!(target: "gradebook", %caller, "requesting sealed grade");
        let sealed = self.ledger.view_my_grade(&caller, &permission)?;
        self.session.unseal(&sealed)
    }

    /// Fetches the class average. Needs no wallet.
    pub fn fetch_class_average(&self) -> Result<u32, GradebookError> {
        let average = self.ledger.class_average()?;
        debug!(target: "gradebook", average, "class average revealed");
        Ok(average)
    }
}
