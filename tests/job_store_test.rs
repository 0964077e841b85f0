//! Job store behavior against a real sqlite database: pagination
//! contract, arithmetic counters, and set-once terminal writes.

use tempfile::TempDir;

use anycrawl::broker::models::{JobResultRow, JobStatus};
use anycrawl::broker::repository::{JobRepository, new_job_row};
use anycrawl::types::JobKind;

async fn repo(tmp: &TempDir) -> JobRepository {
    let db_path = tmp.path().join("anycrawl-test.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    let repo = JobRepository::connect(&url).await.unwrap();
    repo.run_migrations().await.unwrap();
    repo
}

fn result_row(job_uuid: &str, n: i64) -> JobResultRow {
    JobResultRow {
        uuid: format!("{n:04}-{}", uuid::Uuid::new_v4()),
        job_uuid: job_uuid.to_string(),
        url: format!("https://example.com/page-{n}"),
        data: format!("{{\"n\":{n}}}"),
        status: "success".to_string(),
        created_at: 1_000 + n,
        updated_at: 1_000 + n,
    }
}

#[tokio::test]
async fn job_roundtrip_and_counters() {
    let tmp = TempDir::new().unwrap();
    let repo = repo(&tmp).await;

    let job = new_job_row(
        JobKind::Crawl,
        "queue:crawl:static",
        "https://example.com",
        "{}".to_string(),
        None,
        Some("api".to_string()),
    );
    repo.create_job(&job).await.unwrap();

    let loaded = repo.get_job(&job.job_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Pending);
    assert_eq!(loaded.job_type, JobKind::Crawl);
    assert_eq!(loaded.total, 0);

    repo.update_counters(&job.uuid, 1, 1, 0, 2).await.unwrap();
    repo.update_counters(&job.uuid, 1, 0, 1, 0).await.unwrap();

    let loaded = repo.get_job(&job.job_id).await.unwrap().unwrap();
    assert_eq!(loaded.total, 2);
    assert_eq!(loaded.completed, 1);
    assert_eq!(loaded.failed, 1);
    assert_eq!(loaded.credits_used, 2);
    assert!(loaded.completed + loaded.failed <= loaded.total);
}

#[tokio::test]
async fn terminal_write_happens_exactly_once() {
    let tmp = TempDir::new().unwrap();
    let repo = repo(&tmp).await;

    let job = new_job_row(
        JobKind::Crawl,
        "queue:crawl:static",
        "https://example.com",
        "{}".to_string(),
        None,
        None,
    );
    repo.create_job(&job).await.unwrap();

    // Many racing finalizers: only the first write transitions the row.
    let first = repo.mark_terminal(&job.uuid, JobStatus::Completed, true, None).await.unwrap();
    let second = repo.mark_terminal(&job.uuid, JobStatus::Failed, false, Some("late")).await.unwrap();
    let third = repo
        .mark_terminal(&job.uuid, JobStatus::Cancelled, false, None)
        .await
        .unwrap();

    assert!(first);
    assert!(!second);
    assert!(!third);

    let loaded = repo.get_job(&job.job_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Completed);
    assert!(loaded.is_success);
    assert_eq!(loaded.error_message, None);
}

#[tokio::test]
async fn pagination_is_ordered_bounded_and_idempotent() {
    let tmp = TempDir::new().unwrap();
    let repo = repo(&tmp).await;

    let job = new_job_row(
        JobKind::Crawl,
        "queue:crawl:static",
        "https://example.com",
        "{}".to_string(),
        None,
        None,
    );
    repo.create_job(&job).await.unwrap();

    for n in 0..250 {
        repo.insert_result(&result_row(&job.uuid, n)).await.unwrap();
    }

    assert_eq!(repo.count_results(&job.uuid).await.unwrap(), 250);

    // Page size cap.
    let page = repo.list_results(&job.uuid, 0, 100).await.unwrap();
    assert_eq!(page.len(), 100);
    assert_eq!(page[0].url, "https://example.com/page-0");
    assert_eq!(page[99].url, "https://example.com/page-99");

    // Stable second read of the same page (no appends in between).
    let again = repo.list_results(&job.uuid, 0, 100).await.unwrap();
    let urls: Vec<_> = page.iter().map(|r| &r.url).collect();
    let urls_again: Vec<_> = again.iter().map(|r| &r.url).collect();
    assert_eq!(urls, urls_again);

    // Walking skip by returned length covers everything exactly once.
    let mut seen = Vec::new();
    let mut skip = 0;
    loop {
        let page = repo.list_results(&job.uuid, skip, 100).await.unwrap();
        if page.is_empty() {
            break;
        }
        skip += page.len() as i64;
        seen.extend(page.into_iter().map(|r| r.url));
    }
    assert_eq!(seen.len(), 250);
    seen.dedup();
    assert_eq!(seen.len(), 250, "no page overlap");
}

#[tokio::test]
async fn expired_jobs_are_evicted_with_results() {
    let tmp = TempDir::new().unwrap();
    let repo = repo(&tmp).await;

    let mut job = new_job_row(
        JobKind::Scrape,
        "queue:scrape:static",
        "https://example.com",
        "{}".to_string(),
        None,
        None,
    );
    job.job_expire_at = 1; // long past
    repo.create_job(&job).await.unwrap();
    repo.insert_result(&result_row(&job.uuid, 0)).await.unwrap();

    let evicted = repo.evict_expired().await.unwrap();
    assert_eq!(evicted, 1);
    assert!(repo.get_job(&job.job_id).await.unwrap().is_none());
    assert_eq!(repo.count_results(&job.uuid).await.unwrap(), 0);
}
