//! End-to-end orchestration scenarios against the in-memory store and a scripted
//! worker client.

mod common;

use chrono::Duration;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use common::*;
use translation_orchestrator::clock::Clock;
use translation_orchestrator::error::{AdmissionError, OrchestratorError};
use translation_orchestrator::orchestration::{CallbackOutcome, DispatchOutcome, RetryOutcome};
use translation_orchestrator::services::QuotaService;
use translation_orchestrator::state_machine::{BatchTaskState, JobState};
use translation_orchestrator::store::{CredentialStore, InMemoryStore, JobStore};

async fn wait_for<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_single_batch_job_completes_in_line_order() {
    let h = harness(
        test_config(vec![worker_config("w1", 10)]),
        &[SECRET_A],
        FakeWorkerClient::accepting(),
    );

    let receipt = h.orchestrator.accept_job(submission("job-a", 3)).await.unwrap();
    assert_eq!(receipt.status, JobState::Pending);
    assert_eq!(receipt.total_lines, 3);
    assert_eq!(receipt.batch_count, 1);
    assert_eq!(receipt.servers_assigned, 1);

    let (distribution, _) = h.orchestrator.run_distribution("job-a").await;
    assert_eq!(distribution.unwrap().outcomes, vec![DispatchOutcome::Accepted]);
    assert_eq!(h.worker_client.calls(), 1);

    let (url, request) = h.worker_client.requests().remove(0);
    assert_eq!(url, "http://w1.test");
    assert_eq!(request.session_id, "job-a_batch0");
    assert_eq!(request.callback_url, "http://orchestrator.test/callback/job-a/0");
    assert_eq!(request.credentials, vec![SECRET_A.to_string()]);
    assert_eq!(request.model, "gemini-2.5-flash");
    assert_eq!(request.total_internal_batches, 1);
    assert!(request.is_retry.is_none());

    let status = h.orchestrator.job_status("job-a").await.unwrap();
    assert_eq!(status.status, JobState::Processing);
    assert_eq!(status.task_stats["processing"], 1);
    assert_eq!(h.orchestrator.workers()[0].active_jobs, 1);

    let mut callback = success_callback(&request);
    callback.results.reverse();
    let ack = h
        .orchestrator
        .handle_worker_callback("job-a", 0, callback)
        .await
        .unwrap();
    assert_eq!(ack.outcome, CallbackOutcome::Completed);
    assert_eq!(ack.completed_lines, 3);
    assert_eq!(ack.job_status, Some(JobState::Completed));

    let results = h.orchestrator.job_results("job-a").await.unwrap();
    assert_eq!(results.status, JobState::Completed);
    assert_eq!(
        results.results.iter().map(|l| l.index).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(results.results[0].translated, "dịch line 1");
    assert!(results.completed_at.is_some());

    let status = h.orchestrator.job_status("job-a").await.unwrap();
    assert_eq!(status.progress, 100.0);
    assert_eq!(h.orchestrator.workers()[0].active_jobs, 0);
}

#[tokio::test]
async fn test_dispatch_failure_is_retried_to_completion() {
    let h = harness(
        test_config(vec![worker_config("w1", 10)]),
        &[SECRET_A],
        FakeWorkerClient::scripted(|call, _| if call == 0 { Err(http_500()) } else { Ok(()) }),
    );

    h.orchestrator.accept_job(submission("job-b", 3)).await.unwrap();
    let (distribution, drain) = h.orchestrator.run_distribution("job-b").await;
    assert_eq!(
        distribution.unwrap().outcomes,
        vec![DispatchOutcome::RetryQueued]
    );
    assert_eq!(
        drain.unwrap().outcomes,
        vec![RetryOutcome::Dispatched(DispatchOutcome::Accepted)]
    );
    assert_eq!(h.worker_client.calls(), 2);

    let (_, retry) = h.worker_client.requests().remove(1);
    assert_eq!(retry.is_retry, Some(true));
    assert_eq!(retry.retry_count, Some(1));
    assert_eq!(h.orchestrator.workers()[0].failure_count, 1);

    let ack = h
        .orchestrator
        .handle_worker_callback("job-b", 0, success_callback(&retry))
        .await
        .unwrap();
    assert_eq!(ack.job_status, Some(JobState::Completed));

    let task = h.store.get_task("job-b", 0).await.unwrap().unwrap();
    assert_eq!(task.status, BatchTaskState::Completed);
    assert_eq!(task.retry_count, 1);
    let status = h.orchestrator.job_status("job-b").await.unwrap();
    assert_eq!(status.status, JobState::Completed);
}

#[tokio::test]
async fn test_job_waits_in_distributing_while_all_credentials_cool_down() {
    let h = harness(
        test_config(vec![worker_config("w1", 10)]),
        &[SECRET_A],
        FakeWorkerClient::accepting(),
    );
    let mut credential = h.store.list_credentials().await.unwrap().remove(0);
    credential.cooldown_until = Some(h.clock.now() + Duration::minutes(10));
    h.store.save_credential(&credential).await.unwrap();

    h.orchestrator.accept_job(submission("job-c", 3)).await.unwrap();
    let (distribution, _) = h.orchestrator.run_distribution("job-c").await;
    assert!(distribution.unwrap().waiting_for_credentials);
    assert_eq!(h.worker_client.calls(), 0);

    let status = h.orchestrator.job_status("job-c").await.unwrap();
    assert_eq!(status.status, JobState::Distributing);
    assert_eq!(status.task_stats["pending"], 1);

    let report = h.orchestrator.sweep_once().await.unwrap();
    assert_eq!(report.resumed, 0);
    assert_eq!(h.worker_client.calls(), 0);

    h.clock.advance(Duration::minutes(11));
    let report = h.orchestrator.sweep_once().await.unwrap();
    assert_eq!(report.resumed, 1);
    assert_eq!(h.worker_client.calls(), 1);
    let status = h.orchestrator.job_status("job-c").await.unwrap();
    assert_eq!(status.status, JobState::Processing);
}

#[tokio::test]
async fn test_exhausted_batch_yields_partial_completion_and_refund() {
    let mut config = test_config(vec![worker_config("w1", 20), worker_config("w2", 20)]);
    config.batching.batch_size = 2;
    config.batching.merge_threshold = 0;
    let h = harness(
        config,
        &[SECRET_A, SECRET_B],
        FakeWorkerClient::scripted(|_, request| {
            if request.session_id.ends_with("_batch1") {
                Err(http_500())
            } else {
                Ok(())
            }
        }),
    );
    h.quota.grant("user-1", 100);

    let mut job = submission("job-d", 4);
    job.user_id = Some("user-1".to_string());
    job.callback_url = Some("http://client.test/done".to_string());
    let receipt = h.orchestrator.accept_job(job).await.unwrap();
    assert_eq!(receipt.batch_count, 2);
    assert_eq!(receipt.servers_assigned, 2);
    assert_eq!(h.quota.remaining("user-1"), 96);

    let (_, drain) = h.orchestrator.run_distribution("job-d").await;
    let drain = drain.unwrap();
    assert_eq!(drain.processed, 3);
    assert_eq!(h.worker_client.calls_for("job-d_batch1"), 4);
    assert_eq!(h.worker_client.calls_for("job-d_batch0"), 1);

    let failed = h.store.get_task("job-d", 1).await.unwrap().unwrap();
    assert_eq!(failed.status, BatchTaskState::Failed);
    assert_eq!(failed.retry_count, 3);

    let request = h
        .worker_client
        .requests()
        .into_iter()
        .map(|(_, request)| request)
        .find(|request| request.session_id == "job-d_batch0")
        .unwrap();
    let ack = h
        .orchestrator
        .handle_worker_callback("job-d", 0, success_callback(&request))
        .await
        .unwrap();
    assert_eq!(ack.job_status, Some(JobState::PartialCompleted));

    let results = h.orchestrator.job_results("job-d").await.unwrap();
    assert_eq!(results.status, JobState::PartialCompleted);
    assert_eq!(
        results.results.iter().map(|l| l.index).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert!(results.error.is_some());
    assert_eq!(h.quota.remaining("user-1"), 98);

    let sent = h.notifier.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "http://client.test/done");
    assert_eq!(sent[0].1.status, JobState::PartialCompleted);
    assert_eq!(sent[0].1.completed_lines, 2);
}

#[tokio::test]
async fn test_redelivered_callback_is_a_noop() {
    let h = harness(
        test_config(vec![worker_config("w1", 10)]),
        &[SECRET_A],
        FakeWorkerClient::accepting(),
    );
    let mut job = submission("job-e", 3);
    job.callback_url = Some("http://client.test/done".to_string());
    h.orchestrator.accept_job(job).await.unwrap();
    h.orchestrator.run_distribution("job-e").await;

    let (_, request) = h.worker_client.requests().remove(0);
    let callback = success_callback(&request);
    h.orchestrator
        .handle_worker_callback("job-e", 0, callback.clone())
        .await
        .unwrap();
    let before = h.orchestrator.job_status("job-e").await.unwrap();

    let ack = h
        .orchestrator
        .handle_worker_callback("job-e", 0, callback)
        .await
        .unwrap();
    assert_eq!(ack.outcome, CallbackOutcome::Duplicate);
    assert!(ack.job_status.is_none());

    let after = h.orchestrator.job_status("job-e").await.unwrap();
    assert_eq!(before, after);
    assert_eq!(after.completed_lines, 3);
    assert_eq!(h.notifier.sent.lock().len(), 1);
    assert_eq!(h.orchestrator.workers()[0].active_jobs, 0);
}

#[tokio::test]
async fn test_callback_for_unknown_batch_is_ignored() {
    let h = harness(
        test_config(vec![worker_config("w1", 10)]),
        &[SECRET_A],
        FakeWorkerClient::accepting(),
    );
    h.orchestrator.accept_job(submission("job-f", 3)).await.unwrap();
    h.orchestrator.run_distribution("job-f").await;
    let (_, request) = h.worker_client.requests().remove(0);

    let ack = h
        .orchestrator
        .handle_worker_callback("job-f", 7, success_callback(&request))
        .await
        .unwrap();
    assert_eq!(ack.outcome, CallbackOutcome::Ignored);

    let ack = h
        .orchestrator
        .handle_worker_callback("no-such-job", 0, success_callback(&request))
        .await
        .unwrap();
    assert_eq!(ack.outcome, CallbackOutcome::Ignored);
}

#[tokio::test]
async fn test_ignored_callbacks_do_not_accumulate_job_locks() {
    let h = harness(
        test_config(vec![worker_config("w1", 10)]),
        &[SECRET_A],
        FakeWorkerClient::accepting(),
    );
    h.orchestrator.accept_job(submission("job-l", 3)).await.unwrap();
    h.orchestrator.run_distribution("job-l").await;
    let (_, request) = h.worker_client.requests().remove(0);
    let baseline = h.orchestrator.tracked_job_locks();

    for n in 0..200 {
        let ack = h
            .orchestrator
            .handle_worker_callback(&format!("ghost-{n}"), 0, success_callback(&request))
            .await
            .unwrap();
        assert_eq!(ack.outcome, CallbackOutcome::Ignored);
    }
    assert_eq!(h.orchestrator.tracked_job_locks(), baseline);

    let ack = h
        .orchestrator
        .handle_worker_callback("job-l", 0, success_callback(&request))
        .await
        .unwrap();
    assert_eq!(ack.outcome, CallbackOutcome::Completed);
    for _ in 0..5 {
        let ack = h
            .orchestrator
            .handle_worker_callback("job-l", 0, success_callback(&request))
            .await
            .unwrap();
        assert_eq!(ack.outcome, CallbackOutcome::Duplicate);
    }
    assert_eq!(h.orchestrator.tracked_job_locks(), 0);
}

#[tokio::test]
async fn test_malformed_callback_fails_only_its_batch() {
    let mut config = test_config(vec![worker_config("w1", 10), worker_config("w2", 10)]);
    config.batching.batch_size = 2;
    config.batching.merge_threshold = 0;
    let h = harness(config, &[SECRET_A, SECRET_B], FakeWorkerClient::accepting());

    h.orchestrator.accept_job(submission("job-g", 4)).await.unwrap();
    h.orchestrator.run_distribution("job-g").await;
    assert_eq!(h.worker_client.calls(), 2);

    let ack = h
        .orchestrator
        .handle_malformed_callback("job-g", 1, "expected value at line 1 column 1")
        .await
        .unwrap();
    assert_eq!(ack.outcome, CallbackOutcome::Failed);
    assert_eq!(h.store.retry_queue_len("job-g"), 0);

    let task = h.store.get_task("job-g", 1).await.unwrap().unwrap();
    assert_eq!(task.status, BatchTaskState::Failed);
    assert!(task.error_message.unwrap().contains("Parse error"));

    let request = h
        .worker_client
        .requests()
        .into_iter()
        .map(|(_, request)| request)
        .find(|request| request.session_id == "job-g_batch0")
        .unwrap();
    let ack = h
        .orchestrator
        .handle_worker_callback("job-g", 0, success_callback(&request))
        .await
        .unwrap();
    assert_eq!(ack.job_status, Some(JobState::PartialCompleted));
    assert_eq!(h.worker_client.calls(), 2);
}

#[tokio::test]
async fn test_credential_failure_callback_retries_with_fresh_credential() {
    let mut config = test_config(vec![worker_config("w1", 10)]);
    config.credentials.max_per_batch = 1;
    let h = harness(config, &[SECRET_A, SECRET_B], FakeWorkerClient::accepting());

    h.orchestrator.accept_job(submission("job-h", 3)).await.unwrap();
    h.orchestrator.run_distribution("job-h").await;
    let (_, first) = h.worker_client.requests().remove(0);
    assert_eq!(first.credentials.len(), 1);

    let ack = h
        .orchestrator
        .handle_worker_callback("job-h", 0, credential_failure_callback(&first))
        .await
        .unwrap();
    assert_eq!(ack.outcome, CallbackOutcome::RetryQueued);

    let client = h.worker_client.clone();
    wait_for(move || client.calls() == 2).await;
    let (_, retry) = h.worker_client.requests().remove(1);
    assert_eq!(retry.is_retry, Some(true));
    assert_eq!(retry.credentials.len(), 1);
    assert_ne!(retry.credentials, first.credentials);

    let store = h.store.clone();
    let mut processing = false;
    for _ in 0..200 {
        let task = store.get_task("job-h", 0).await.unwrap().unwrap();
        if task.status == BatchTaskState::Processing {
            processing = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }
    assert!(processing);

    let ack = h
        .orchestrator
        .handle_worker_callback("job-h", 0, success_callback(&retry))
        .await
        .unwrap();
    assert_eq!(ack.job_status, Some(JobState::Completed));

    let credentials = h.orchestrator.credentials().await;
    let cooled: Vec<_> = credentials
        .iter()
        .filter(|c| c.cooldown_until.is_some())
        .collect();
    assert_eq!(cooled.len(), 1);
    assert_eq!(cooled[0].secret, first.credentials[0]);
}

#[tokio::test]
async fn test_non_credential_callback_failure_is_terminal() {
    let h = harness(
        test_config(vec![worker_config("w1", 10)]),
        &[SECRET_A],
        FakeWorkerClient::accepting(),
    );
    h.orchestrator.accept_job(submission("job-i", 3)).await.unwrap();
    h.orchestrator.run_distribution("job-i").await;
    let (_, request) = h.worker_client.requests().remove(0);

    let mut callback = success_callback(&request);
    callback.status = "failed".to_string();
    callback.error = Some("model returned fewer lines than requested".to_string());
    callback.results.clear();
    callback.credential_usage.clear();

    let ack = h
        .orchestrator
        .handle_worker_callback("job-i", 0, callback)
        .await
        .unwrap();
    assert_eq!(ack.outcome, CallbackOutcome::Failed);
    assert_eq!(ack.job_status, Some(JobState::Failed));
    assert_eq!(h.worker_client.calls(), 1);
}

#[tokio::test]
async fn test_admission_rejections() {
    let h = harness(test_config(Vec::new()), &[SECRET_A], FakeWorkerClient::accepting());
    let err = h.orchestrator.accept_job(submission("x", 3)).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Admission(AdmissionError::NoWorkers)));

    let h = harness(
        test_config(vec![worker_config("w1", 10)]),
        &[],
        FakeWorkerClient::accepting(),
    );
    let err = h.orchestrator.accept_job(submission("x", 3)).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Admission(AdmissionError::NoCredentials)));

    let h = harness(
        test_config(vec![worker_config("w1", 10)]),
        &[SECRET_A],
        FakeWorkerClient::accepting(),
    );
    let err = h.orchestrator.accept_job(submission("x", 0)).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));
    let err = h.orchestrator.accept_job(submission("  ", 2)).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));

    h.orchestrator.accept_job(submission("dup", 2)).await.unwrap();
    let err = h.orchestrator.accept_job(submission("dup", 2)).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::DuplicateSession(_)));
}

#[tokio::test]
async fn test_insufficient_quota_charges_nothing() {
    let h = harness(
        test_config(vec![worker_config("w1", 10)]),
        &[SECRET_A],
        FakeWorkerClient::accepting(),
    );
    h.quota.grant("user-2", 2);

    let mut job = submission("job-q", 3);
    job.user_id = Some("user-2".to_string());
    let err = h.orchestrator.accept_job(job).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Admission(AdmissionError::InsufficientQuota { requested: 3 })
    ));
    assert_eq!(h.quota.remaining("user-2"), 2);
    assert!(h.store.get_job("job-q").await.unwrap().is_none());
    assert!(h.quota.check_and_charge_lines("user-2", 2).await.unwrap());
}

#[tokio::test]
async fn test_sweeper_expires_jobs_past_their_lifetime() {
    let mut config = test_config(vec![worker_config("w1", 10)]);
    config.jobs.max_lifetime_seconds = Some(60);
    let h = harness(config, &[SECRET_A], FakeWorkerClient::accepting());
    h.quota.grant("user-3", 10);

    let mut credential = h.store.list_credentials().await.unwrap().remove(0);
    credential.cooldown_until = Some(h.clock.now() + Duration::hours(1));
    h.store.save_credential(&credential).await.unwrap();

    let mut job = submission("job-x", 3);
    job.user_id = Some("user-3".to_string());
    h.orchestrator.accept_job(job).await.unwrap();
    h.orchestrator.run_distribution("job-x").await;
    assert_eq!(h.quota.remaining("user-3"), 7);

    h.clock.advance(Duration::seconds(61));
    let report = h.orchestrator.sweep_once().await.unwrap();
    assert_eq!(report.expired, 1);

    let status = h.orchestrator.job_status("job-x").await.unwrap();
    assert_eq!(status.status, JobState::Failed);
    assert_eq!(status.error.as_deref(), Some("job exceeded its maximum lifetime"));
    assert_eq!(status.task_stats["failed"], 1);
    assert_eq!(h.quota.remaining("user-3"), 10);
    assert_eq!(h.worker_client.calls(), 0);
}

#[tokio::test]
async fn test_partial_results_visible_before_completion() {
    let mut config = test_config(vec![worker_config("w1", 10), worker_config("w2", 10)]);
    config.batching.batch_size = 2;
    config.batching.merge_threshold = 0;
    let h = harness(config, &[SECRET_A, SECRET_B], FakeWorkerClient::accepting());

    h.orchestrator.accept_job(submission("job-p", 4)).await.unwrap();
    h.orchestrator.run_distribution("job-p").await;
    let request = h
        .worker_client
        .requests()
        .into_iter()
        .map(|(_, request)| request)
        .find(|request| request.session_id == "job-p_batch1")
        .unwrap();

    let mut callback = success_callback(&request);
    callback.results[0].translated = "[ERROR] 3: ba".to_string();
    h.orchestrator
        .handle_worker_callback("job-p", 1, callback)
        .await
        .unwrap();

    let results = h.orchestrator.job_results("job-p").await.unwrap();
    assert_eq!(results.status, JobState::Processing);
    assert_eq!(results.completed_lines, 2);
    assert_eq!(
        results.results.iter().map(|l| l.index).collect::<Vec<_>>(),
        vec![3, 4]
    );
    assert_eq!(results.results[0].translated, "ba");

    let status = h.orchestrator.job_status("job-p").await.unwrap();
    assert_eq!(status.progress, 50.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callbacks_finalize_exactly_once() {
    let mut config = test_config(vec![worker_config("w1", 100), worker_config("w2", 100)]);
    config.batching.batch_size = 2;
    config.batching.merge_threshold = 0;
    let h = harness(config, &[SECRET_A, SECRET_B], FakeWorkerClient::accepting());

    let mut job = submission("job-cc", 8);
    job.callback_url = Some("http://client.test/done".to_string());
    h.orchestrator.accept_job(job).await.unwrap();
    h.orchestrator.run_distribution("job-cc").await;
    let requests = h.worker_client.requests();
    assert_eq!(requests.len(), 4);

    let handles: Vec<_> = requests
        .into_iter()
        .map(|(_, request)| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .handle_keyed_callback(&request.session_id, success_callback(&request))
                    .await
            })
        })
        .collect();

    let receipts: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    assert!(receipts.iter().all(|r| r.outcome == CallbackOutcome::Completed));
    let finalizers = receipts.iter().filter(|r| r.job_status.is_some()).count();
    assert_eq!(finalizers, 1);

    let status = h.orchestrator.job_status("job-cc").await.unwrap();
    assert_eq!(status.status, JobState::Completed);
    assert_eq!(status.completed_lines, 8);
    assert_eq!(h.notifier.sent.lock().len(), 1);

    let results = h.orchestrator.job_results("job-cc").await.unwrap();
    let indices: Vec<u32> = results.results.iter().map(|line| line.index).collect();
    assert_eq!(indices, (1..=8).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_initial_wave_never_exceeds_worker_count() {
    let mut config = test_config(vec![worker_config("w1", 100), worker_config("w2", 100)]);
    config.batching.batch_size = 2;
    config.batching.merge_threshold = 0;
    let h = harness(
        config,
        &[SECRET_A, SECRET_B],
        FakeWorkerClient::accepting().with_latency(StdDuration::from_millis(20)),
    );

    h.orchestrator.accept_job(submission("job-sem", 12)).await.unwrap();
    let (distribution, _) = h.orchestrator.run_distribution("job-sem").await;
    assert_eq!(distribution.unwrap().dispatched, 6);
    assert_eq!(h.worker_client.calls(), 6);
    assert_eq!(h.worker_client.peak_in_flight(), 2);
}

#[tokio::test]
async fn test_failed_persist_leaves_session_free_and_quota_intact() {
    let store = Arc::new(InMemoryStore::with_credentials([SECRET_A]));
    let jobs = Arc::new(FailingCreateStore::new(store.clone()));
    let h = harness_with_jobs(
        test_config(vec![worker_config("w1", 10)]),
        jobs,
        store,
        FakeWorkerClient::accepting(),
    );
    h.quota.grant("user-p", 10);

    let mut job = submission("job-p", 3);
    job.user_id = Some("user-p".to_string());
    let err = h.orchestrator.accept_job(job.clone()).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Store(_)));
    assert_eq!(h.quota.remaining("user-p"), 10);
    assert!(h.store.get_job("job-p").await.unwrap().is_none());
    assert!(h.store.list_tasks("job-p").await.unwrap().is_empty());

    let receipt = h.orchestrator.accept_job(job).await.unwrap();
    assert_eq!(receipt.batch_count, 1);
    assert_eq!(h.quota.remaining("user-p"), 7);
    assert_eq!(h.store.list_tasks("job-p").await.unwrap().len(), 1);
}
