//! Coin Ledger Integration Tests

mod helpers;

use helpers::Harness;
use std::sync::Arc;
use turan_common::db::TransactionKind;
use turan_hw::models::TransactionLinks;
use turan_hw::HomeworkError;

#[tokio::test]
async fn test_overdraft_is_refused_and_balance_unchanged() {
    let h = Harness::new(vec![]).await;
    let ledger = &h.assembly.state.ledger;
    let student = h.classroom.students[0];

    ledger
        .credit(student, 10, "Quiz bonus", TransactionLinks::default())
        .await
        .unwrap();

    let err = ledger
        .debit(student, 15, "Sticker pack", TransactionLinks::default())
        .await
        .unwrap_err();
    match err {
        HomeworkError::InsufficientFunds { requested, available } => {
            assert_eq!((requested, available), (15, 10));
        }
        other => panic!("expected insufficient funds, got {:?}", other),
    }

    let account = ledger.account(student).await.unwrap();
    assert_eq!((account.total, account.earned, account.spent), (10, 10, 0));
    assert_eq!(ledger.transactions(student).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_transactions_newest_first_and_reconciled() {
    let h = Harness::new(vec![]).await;
    let ledger = &h.assembly.state.ledger;
    let student = h.classroom.students[0];

    ledger.credit(student, 30, "Homework", TransactionLinks::default()).await.unwrap();
    ledger.debit(student, 12, "Pen", TransactionLinks::default()).await.unwrap();
    ledger
        .post(student, TransactionKind::Bonus, 5, "Top reader", TransactionLinks::default())
        .await
        .unwrap();

    let txs = ledger.transactions(student).await.unwrap();
    let kinds: Vec<_> = txs.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![TransactionKind::Bonus, TransactionKind::Spent, TransactionKind::Earned]
    );

    let account = ledger.account(student).await.unwrap();
    assert_eq!(account.total, 23);
    assert_eq!(account.total, account.earned - account.spent);

    let rec = ledger.reconcile(student).await.unwrap();
    assert!(rec.consistent);
    assert_eq!(rec.log_credits - rec.log_debits, 23);
}

#[tokio::test]
async fn test_concurrent_debits_never_overdraw() {
    let h = Harness::new(vec![]).await;
    let ledger = Arc::clone(&h.assembly.state.ledger);
    let student = h.classroom.students[0];

    ledger.credit(student, 50, "Start", TransactionLinks::default()).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let ledger = Arc::clone(&ledger);
        tasks.push(tokio::spawn(async move {
            ledger.debit(student, 10, "Treat", TransactionLinks::default()).await
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(HomeworkError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    assert_eq!(succeeded, 5);
    let account = ledger.account(student).await.unwrap();
    assert_eq!(account.total, 0);
    assert!(ledger.reconcile(student).await.unwrap().consistent);
}

#[tokio::test]
async fn test_tampered_account_is_frozen() {
    let h = Harness::new(vec![]).await;
    let ledger = &h.assembly.state.ledger;
    let student = h.classroom.students[0];
    let mut events = h.assembly.state.event_bus.subscribe();

    ledger.credit(student, 10, "Start", TransactionLinks::default()).await.unwrap();

    sqlx::query("UPDATE coin_accounts SET total = 99 WHERE student_id = ?")
        .bind(student.to_string())
        .execute(&h.classroom.pool)
        .await
        .unwrap();

    let err = ledger
        .credit(student, 5, "More", TransactionLinks::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HomeworkError::LedgerInvariant(_)), "{:?}", err);
    assert!(ledger.is_frozen(student));

    // Frozen accounts refuse further mutation
    let err = ledger
        .debit(student, 1, "Anything", TransactionLinks::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HomeworkError::LedgerInvariant(_)), "{:?}", err);

    let mut violation_seen = false;
    while let Ok(event) = events.try_recv() {
        if event.event_type() == "LedgerInvariantViolated" {
            violation_seen = true;
        }
    }
    assert!(violation_seen);
    assert_eq!(ledger.transactions(student).await.unwrap().len(), 1);
}
