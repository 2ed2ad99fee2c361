//! End-to-end flows against the in-memory gradebook.

use anchor_lang::prelude::Pubkey;
use clap::Parser;
use confidential_gradebook::{policy, state::PENDING_TIMEOUT_SLOTS};
use gradebook_client::{
    test_utils::{FakeSession, InMemoryLedger},
    ClientArgs, ConfidentialSession, GradebookClient, GradebookError, GradebookLedger, Identity,
    Role,
};

struct Class {
    teacher: Identity,
    ledger: InMemoryLedger,
}

impl Class {
    fn new() -> Self {
        let teacher = Identity::new(Pubkey::new_unique());
        Self { teacher, ledger: InMemoryLedger::new(teacher) }
    }

    fn client(&self, session: FakeSession) -> GradebookClient<FakeSession, InMemoryLedger> {
        GradebookClient::new(session, self.ledger.clone(), self.teacher)
    }

    fn teacher_client(&self) -> GradebookClient<FakeSession, InMemoryLedger> {
        self.client(FakeSession::connected(self.teacher))
    }

    fn student(&self) -> (Identity, GradebookClient<FakeSession, InMemoryLedger>) {
        let student = Identity::new(Pubkey::new_unique());
        (student, self.client(FakeSession::connected(student)))
    }
}

#[test]
fn only_the_teacher_may_submit() {
    let class = Class::new();
    let (student, student_client) = class.student();
    let gradebook = class.ledger.gradebook();

    assert!(policy::authorize_submit(&gradebook, class.teacher.pubkey()).is_ok());
    assert!(policy::authorize_submit(&gradebook, student.pubkey()).is_err());

    assert_eq!(
        student_client.submit_grade(&student.to_string(), "100"),
        Err(GradebookError::Unauthorized)
    );
    assert!(class.ledger.record(&student).is_none());

    // bypassing the client check, the ledger still refuses
    let forged = student_client.session().encrypt_grade(100).unwrap();
    assert_eq!(
        class.ledger.submit_grade(&student, &student, &forged),
        Err(GradebookError::Unauthorized)
    );
    assert!(class.ledger.record(&student).is_none());
    assert!(!class.ledger.gradebook().submission_pending);
}

#[test]
fn roles_follow_the_configured_teacher() {
    let class = Class::new();
    let (_, student_client) = class.student();

    assert_eq!(class.teacher_client().role().unwrap(), Role::Teacher);
    assert_eq!(student_client.role().unwrap(), Role::Student);
    assert!(matches!(
        class.client(FakeSession::disconnected()).role(),
        Err(GradebookError::AdapterFailure(_))
    ));
}

#[test]
fn student_reads_back_submitted_grade() {
    let class = Class::new();
    let (student, student_client) = class.student();

    class.teacher_client().submit_grade(&student.to_string(), "87").unwrap();

    assert_eq!(student_client.fetch_my_grade().unwrap(), 87);
    let record = class.ledger.record(&student).unwrap();
    assert!(record.has_grade);
    assert_eq!(record.revision, 1);
}

#[test]
fn sealed_grade_is_bound_to_its_requester() {
    let class = Class::new();
    let (student, student_client) = class.student();
    let (_, eavesdropper) = class.student();
    class.teacher_client().submit_grade(&student.to_string(), "42").unwrap();

    let permission = student_client.session().generate_permission().unwrap();
    let sealed = class.ledger.view_my_grade(&student, &permission).unwrap();

    assert_eq!(student_client.session().unseal(&sealed).unwrap(), 42);
    assert!(matches!(
        eavesdropper.session().unseal(&sealed),
        Err(GradebookError::AdapterFailure(_))
    ));
    // asking for "own" grade as someone else finds nothing
    assert_eq!(eavesdropper.fetch_my_grade(), Err(GradebookError::NotFound));
}

#[test]
fn nothing_is_found_before_any_submission() {
    let class = Class::new();
    for _ in 0..4 {
        let (_, student_client) = class.student();
        assert_eq!(student_client.fetch_my_grade(), Err(GradebookError::NotFound));
    }
    assert_eq!(class.teacher_client().fetch_my_grade(), Err(GradebookError::NotFound));
    assert_eq!(class.teacher_client().fetch_class_average().unwrap(), 0);
}

#[test]
fn average_of_three_students() {
    let class = Class::new();
    let teacher = class.teacher_client();
    for grade in ["10", "20", "30"] {
        let (student, _) = class.student();
        teacher.submit_grade(&student.to_string(), grade).unwrap();
    }

    let (_, anyone) = class.student();
    assert_eq!(anyone.fetch_class_average().unwrap(), 20);

    let gradebook = class.ledger.gradebook();
    assert_eq!(gradebook.graded_students, 3);
    assert_eq!(gradebook.class_average, 20);
}

#[test]
fn resubmission_replaces_the_previous_contribution() {
    let class = Class::new();
    let teacher = class.teacher_client();
    let (a, a_client) = class.student();
    let (b, _) = class.student();
    let (c, _) = class.student();

    teacher.submit_grade(&a.to_string(), "10").unwrap();
    teacher.submit_grade(&b.to_string(), "20").unwrap();
    teacher.submit_grade(&c.to_string(), "30").unwrap();

    teacher.submit_grade(&c.to_string(), "60").unwrap();
    assert_eq!(teacher.fetch_class_average().unwrap(), 30);

    for grade in ["0", "90", "45", "15"] {
        teacher.submit_grade(&a.to_string(), grade).unwrap();
    }
    // a=15, b=20, c=60
    assert_eq!(teacher.fetch_class_average().unwrap(), 31);
    assert_eq!(a_client.fetch_my_grade().unwrap(), 15);

    let gradebook = class.ledger.gradebook();
    assert_eq!(gradebook.graded_students, 3);
    assert_eq!(class.ledger.record(&a).unwrap().revision, 5);
}

#[test]
fn malformed_input_is_rejected_before_authorization() {
    let class = Class::new();
    let (_, student_client) = class.student();

    for client in [class.teacher_client(), student_client] {
        assert!(matches!(
            client.submit_grade("not-an-address", "50"),
            Err(GradebookError::InvalidInput(_))
        ));
    }

    let (student, _) = class.student();
    let teacher = class.teacher_client();
    for grade in ["-5", "7.5", "fifty", ""] {
        assert!(matches!(
            teacher.submit_grade(&student.to_string(), grade),
            Err(GradebookError::InvalidInput(_))
        ));
    }
    assert!(class.ledger.record(&student).is_none());
    assert_eq!(class.ledger.gradebook().graded_students, 0);
}

#[test]
fn disconnected_teacher_cannot_submit() {
    let class = Class::new();
    let (student, _) = class.student();

    let client = class.client(FakeSession::disconnected());
    assert!(matches!(
        client.submit_grade(&student.to_string(), "50"),
        Err(GradebookError::AdapterFailure(_))
    ));
    assert!(class.ledger.record(&student).is_none());
}

#[test]
fn submissions_do_not_interleave() {
    let class = Class::new();
    let teacher = class.teacher_client();
    let (a, a_client) = class.student();
    let (b, _) = class.student();

    teacher.submit_grade(&a.to_string(), "50").unwrap();
    class.ledger.hold_computations();
    teacher.submit_grade(&b.to_string(), "100").unwrap();

    assert_eq!(
        teacher.submit_grade(&a.to_string(), "70"),
        Err(GradebookError::SubmissionPending)
    );
    // reads copy the ciphertexts when queued, so they see the state before
    // the pending submission
    assert_eq!(teacher.fetch_class_average().unwrap(), 50);
    assert_eq!(a_client.fetch_my_grade().unwrap(), 50);

    class.ledger.release_computations();
    assert_eq!(teacher.fetch_class_average().unwrap(), 75);
    teacher.submit_grade(&a.to_string(), "70").unwrap();
    assert_eq!(teacher.fetch_class_average().unwrap(), 85);
}

#[test]
fn reads_queued_before_a_callback_use_their_own_snapshot() {
    let class = Class::new();
    let teacher = class.teacher_client();
    let (a, a_client) = class.student();
    let (b, _) = class.student();
    teacher.submit_grade(&a.to_string(), "50").unwrap();

    // average queued while b's grade is in flight, run after its callback
    class.ledger.hold_computations();
    teacher.submit_grade(&b.to_string(), "100").unwrap();
    let average = class.ledger.queue_class_average().unwrap();
    class.ledger.release_computations();
    assert_eq!(class.ledger.run_class_average(&average).unwrap(), 50);
    assert_eq!(teacher.fetch_class_average().unwrap(), 75);

    // a's grade sealed from the ciphertext it was queued with, not the resubmission
    let permission = a_client.session().generate_permission().unwrap();
    let seal = class.ledger.queue_view_my_grade(&a, &permission).unwrap();
    teacher.submit_grade(&a.to_string(), "70").unwrap();
    let sealed = class.ledger.run_seal_grade(&seal).unwrap();
    assert_eq!(a_client.session().unseal(&sealed).unwrap(), 50);
    assert_eq!(a_client.fetch_my_grade().unwrap(), 70);
}

#[test]
fn lost_computation_is_cleared_by_the_authority() {
    let class = Class::new();
    let teacher = class.teacher_client();
    let (a, a_client) = class.student();
    let (b, _) = class.student();
    teacher.submit_grade(&a.to_string(), "40").unwrap();

    class.ledger.lose_next_computation();
    teacher.submit_grade(&a.to_string(), "90").unwrap();
    assert_eq!(
        teacher.submit_grade(&b.to_string(), "60"),
        Err(GradebookError::SubmissionPending)
    );
    assert!(matches!(class.ledger.clear_pending_submission(), Err(GradebookError::Ledger(_))));

    class.ledger.advance_slots(PENDING_TIMEOUT_SLOTS);
    class.ledger.clear_pending_submission().unwrap();
    teacher.submit_grade(&b.to_string(), "60").unwrap();

    // the lost callback arrives after the latch moved on and is ignored
    class.ledger.deliver_late_callbacks();
    assert_eq!(a_client.fetch_my_grade().unwrap(), 40);
    assert_eq!(teacher.fetch_class_average().unwrap(), 50);
    assert_eq!(class.ledger.record(&a).unwrap().revision, 1);
    assert!(matches!(class.ledger.clear_pending_submission(), Err(GradebookError::Ledger(_))));
}

#[test]
fn client_binds_to_the_configured_gradebook() {
    let teacher = Identity::new(Pubkey::new_unique());
    let gradebook = Pubkey::new_unique();
    let args = ClientArgs::try_parse_from([
        "gradebook",
        "--gradebook",
        &gradebook.to_string(),
        "--teacher",
        &teacher.to_string(),
    ])
    .unwrap();
    let ledger = InMemoryLedger::deployed(&args);

    let client =
        GradebookClient::from_args(FakeSession::connected(teacher), ledger.clone(), &args).unwrap();
    assert_eq!(client.ledger().address(), gradebook);
    assert_eq!(client.teacher(), &teacher);
    assert_eq!(client.role().unwrap(), Role::Teacher);

    let student = Identity::new(Pubkey::new_unique());
    client.submit_grade(&student.to_string(), "64").unwrap();
    assert_eq!(ledger.record_address(&student), args.grade_record_address(&student));
    assert_eq!(ledger.record(&student).unwrap().gradebook, gradebook);

    let elsewhere = InMemoryLedger::new(teacher);
    assert!(matches!(
        GradebookClient::from_args(FakeSession::connected(teacher), elsewhere, &args),
        Err(GradebookError::InvalidInput(_))
    ));
}

#[test]
fn aborted_computation_leaves_grades_untouched() {
    let class = Class::new();
    let teacher = class.teacher_client();
    let (a, a_client) = class.student();
    let (b, b_client) = class.student();

    teacher.submit_grade(&a.to_string(), "40").unwrap();
    class.ledger.fail_next_computation();
    teacher.submit_grade(&a.to_string(), "90").unwrap();
    class.ledger.fail_next_computation();
    teacher.submit_grade(&b.to_string(), "90").unwrap();

    assert_eq!(a_client.fetch_my_grade().unwrap(), 40);
    assert_eq!(b_client.fetch_my_grade(), Err(GradebookError::NotFound));
    assert_eq!(teacher.fetch_class_average().unwrap(), 40);

    let gradebook = class.ledger.gradebook();
    assert!(!gradebook.submission_pending);
    assert_eq!(gradebook.graded_students, 1);

    // the gradebook keeps accepting grades afterwards
    teacher.submit_grade(&b.to_string(), "60").unwrap();
    assert_eq!(teacher.fetch_class_average().unwrap(), 50);
}

#[test]
fn uninitialized_totals_reject_grades_and_averages() {
    let teacher = Identity::new(Pubkey::new_unique());
    let ledger = InMemoryLedger::without_totals(teacher);
    let client = GradebookClient::new(FakeSession::connected(teacher), ledger.clone(), teacher);
    let student = Identity::new(Pubkey::new_unique());

    assert!(matches!(
        client.submit_grade(&student.to_string(), "10"),
        Err(GradebookError::Ledger(_))
    ));
    assert!(matches!(client.fetch_class_average(), Err(GradebookError::Ledger(_))));

    ledger.init_class_totals().unwrap();
    assert!(matches!(ledger.init_class_totals(), Err(GradebookError::Ledger(_))));
    client.submit_grade(&student.to_string(), "10").unwrap();
    assert_eq!(client.fetch_class_average().unwrap(), 10);
}
