//! Budget persistence across process restarts, beyond the single-session
//! unit tests colocated with the implementation.

use std::time::Duration;

use wallbot::write_budget::WriteBudget;

#[tokio::test]
async fn counters_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("budget.db");

    {
        let budget = WriteBudget::open(&path, 10, Duration::from_secs(3600)).unwrap();
        budget.commit().await.unwrap();
        budget.commit().await.unwrap();
        budget.commit().await.unwrap();
    }

    let budget = WriteBudget::open(&path, 10, Duration::from_secs(3600)).unwrap();
    let snap = budget.snapshot().await.unwrap();
    assert_eq!(snap.added, 3);
    assert_eq!(snap.max_adds, 10);
}

#[tokio::test]
async fn fetcher_pauses_once_budget_exhausted_then_resumes_next_period() {
    let dir = tempfile::tempdir().unwrap();
    let budget = WriteBudget::open(dir.path().join("budget.db"), 1, Duration::from_secs(1)).unwrap();

    assert!(budget.allow().await.unwrap());
    budget.commit().await.unwrap();
    assert!(!budget.allow().await.unwrap());

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert!(budget.allow().await.unwrap());
    let snap = budget.snapshot().await.unwrap();
    assert_eq!(snap.added, 0);
}
