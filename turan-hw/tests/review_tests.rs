//! Review State Machine Integration Tests

mod helpers;

use helpers::{count_rows, Harness, Step, EXPECTED_TEXT};
use turan_common::db::HomeworkStatus;
use turan_hw::models::ReviewDecision;
use turan_hw::services::scoring::ScoringOutcome;
use turan_hw::HomeworkError;

/// Submitted and routed to manual review by a failing transcriber
async fn under_review() -> (Harness, uuid::Uuid) {
    let h = Harness::new(vec![Step::Fail]).await;
    let homework_id = h.submitted().await;
    let outcome = h.assembly.worker.process(homework_id).await.unwrap();
    assert!(matches!(outcome, ScoringOutcome::UnderReview { .. }));
    (h, homework_id)
}

#[tokio::test]
async fn test_manual_approval_credits_once() {
    let (h, homework_id) = under_review().await;
    let review = &h.assembly.state.review;
    let student = h.classroom.students[0];

    let hw = review
        .review(&h.teacher(), homework_id, ReviewDecision::Approved, "Well read")
        .await
        .unwrap();
    assert_eq!(hw.status, HomeworkStatus::Approved);
    assert_eq!(hw.coins_awarded, 10);
    assert_eq!(hw.teacher_feedback, "Well read");
    assert_eq!(hw.reviewed_by, Some(h.classroom.teacher));
    assert!(hw.reviewed_at.is_some());
    assert_eq!(h.balance(student).await, 10);

    // Approving again only refreshes the feedback
    let hw = review
        .review(&h.admin(), homework_id, ReviewDecision::Approved, "Confirmed")
        .await
        .unwrap();
    assert_eq!(hw.status, HomeworkStatus::Approved);
    assert_eq!(hw.teacher_feedback, "Confirmed");
    assert_eq!(hw.coins_awarded, 10);
    assert_eq!(h.balance(student).await, 10);
    assert_eq!(
        count_rows(&h.classroom.pool, "SELECT COUNT(*) FROM coin_transactions").await,
        1
    );
}

#[tokio::test]
async fn test_manual_approval_after_auto_approval_does_not_double_credit() {
    let h = Harness::new(vec![Step::text(EXPECTED_TEXT)]).await;
    let homework_id = h.submitted().await;
    h.assembly.worker.process(homework_id).await.unwrap();

    h.assembly
        .state
        .review
        .review(&h.teacher(), homework_id, ReviewDecision::Approved, "")
        .await
        .unwrap();

    assert_eq!(h.balance(h.classroom.students[0]).await, 10);
}

#[tokio::test]
async fn test_approved_record_cannot_be_rejected() {
    let h = Harness::new(vec![Step::text(EXPECTED_TEXT)]).await;
    let homework_id = h.submitted().await;
    h.assembly.worker.process(homework_id).await.unwrap();

    let err = h
        .assembly
        .state
        .review
        .review(&h.teacher(), homework_id, ReviewDecision::Rejected, "no")
        .await
        .unwrap_err();
    assert!(matches!(err, HomeworkError::InvalidState(_)), "{:?}", err);
}

#[tokio::test]
async fn test_only_group_teacher_or_admin_may_review() {
    let (h, homework_id) = under_review().await;
    let review = &h.assembly.state.review;

    let other_teacher = h.caller(h.classroom.other_teacher);
    let err = review
        .review(&other_teacher, homework_id, ReviewDecision::Approved, "")
        .await
        .unwrap_err();
    assert!(matches!(err, HomeworkError::Forbidden(_)), "{:?}", err);

    let err = review
        .review(&h.student(0), homework_id, ReviewDecision::Approved, "")
        .await
        .unwrap_err();
    assert!(matches!(err, HomeworkError::Forbidden(_)), "{:?}", err);

    assert_eq!(h.balance(h.classroom.students[0]).await, 0);
}

#[tokio::test]
async fn test_view_is_limited_to_owner_and_reviewers() {
    let (h, homework_id) = under_review().await;
    let review = &h.assembly.state.review;

    assert!(review.view(&h.student(0), homework_id).await.is_ok());
    assert!(review.view(&h.teacher(), homework_id).await.is_ok());
    assert!(review.view(&h.admin(), homework_id).await.is_ok());

    let err = review.view(&h.student(1), homework_id).await.unwrap_err();
    assert!(matches!(err, HomeworkError::NotFound(_)), "{:?}", err);
}

#[tokio::test]
async fn test_second_chance_opens_next_attempt() {
    let (h, homework_id) = under_review().await;
    let review = &h.assembly.state.review;

    review
        .review(&h.teacher(), homework_id, ReviewDecision::Rejected, "Try again")
        .await
        .unwrap();

    let next = review.grant_second_chance(&h.teacher(), homework_id).await.unwrap();
    assert_eq!(next.status, HomeworkStatus::SecondChance);
    assert_eq!(next.attempt_number, 2);
    assert_eq!(next.lesson_id, h.classroom.lesson);
    assert_ne!(next.id, homework_id);

    // The rejected attempt stays as it was
    let old = review.view(&h.teacher(), homework_id).await.unwrap();
    assert_eq!(old.status, HomeworkStatus::Rejected);

    // Granting twice from the same record is refused
    let err = review
        .grant_second_chance(&h.teacher(), homework_id)
        .await
        .unwrap_err();
    assert!(matches!(err, HomeworkError::InvalidState(_)), "{:?}", err);

    // The new attempt accepts audio
    let hw = h
        .assembly
        .state
        .intake
        .submit(&h.student(0), next.id, "audio/ogg", helpers::AUDIO)
        .await
        .unwrap();
    assert_eq!(hw.status, HomeworkStatus::Submitted);
}

#[tokio::test]
async fn test_rejection_at_max_attempts_is_terminal() {
    let h = Harness::with_settings(vec![Step::Fail], &[("max_homework_attempts", "1")]).await;
    let homework_id = h.submitted().await;
    h.assembly.worker.process(homework_id).await.unwrap();
    let review = &h.assembly.state.review;

    review
        .review(&h.teacher(), homework_id, ReviewDecision::Rejected, "")
        .await
        .unwrap();

    let err = review
        .grant_second_chance(&h.teacher(), homework_id)
        .await
        .unwrap_err();
    assert!(matches!(err, HomeworkError::InvalidState(_)), "{:?}", err);

    let err = review
        .review(&h.teacher(), homework_id, ReviewDecision::Approved, "")
        .await
        .unwrap_err();
    assert!(matches!(err, HomeworkError::InvalidState(_)), "{:?}", err);
}

#[tokio::test]
async fn test_second_chance_requires_rejection() {
    let (h, homework_id) = under_review().await;

    let err = h
        .assembly
        .state
        .review
        .grant_second_chance(&h.teacher(), homework_id)
        .await
        .unwrap_err();
    assert!(matches!(err, HomeworkError::InvalidState(_)), "{:?}", err);
}

#[tokio::test]
async fn test_superseded_attempt_cannot_be_reviewed() {
    // Three failed calls route attempt 1 to manual review; attempt 2 reads cleanly
    let h = Harness::new(vec![
        Step::Fail,
        Step::Fail,
        Step::Fail,
        Step::text(EXPECTED_TEXT),
    ])
    .await;
    let homework_id = h.submitted().await;
    let outcome = h.assembly.worker.process(homework_id).await.unwrap();
    assert!(matches!(outcome, ScoringOutcome::UnderReview { .. }));

    let review = &h.assembly.state.review;
    review
        .review(&h.teacher(), homework_id, ReviewDecision::Rejected, "Try again")
        .await
        .unwrap();
    let next = review.grant_second_chance(&h.teacher(), homework_id).await.unwrap();

    h.assembly
        .state
        .intake
        .submit(&h.student(0), next.id, "audio/wav", helpers::AUDIO)
        .await
        .unwrap();
    let outcome = h.assembly.worker.process(next.id).await.unwrap();
    assert!(matches!(outcome, ScoringOutcome::Approved { .. }), "{:?}", outcome);
    assert_eq!(h.balance(h.classroom.students[0]).await, 10);

    let err = review
        .review(&h.teacher(), homework_id, ReviewDecision::Approved, "Changed my mind")
        .await
        .unwrap_err();
    assert!(matches!(err, HomeworkError::InvalidState(_)), "{:?}", err);

    let old = review.view(&h.teacher(), homework_id).await.unwrap();
    assert_eq!(old.status, HomeworkStatus::Rejected);
    assert_eq!(old.teacher_feedback, "Try again");
    assert_eq!(h.balance(h.classroom.students[0]).await, 10);
    assert_eq!(
        count_rows(&h.classroom.pool, "SELECT COUNT(*) FROM coin_transactions").await,
        1
    );
}
