//! Master Module Tests
//!
//! ## Test Scopes
//! - **Worker Record**: throughput accounting, clock anomalies and the timeout predicate.
//! - **Dispatch Engine**: queue draining, retry-later/done signalling and timeout reclaim,
//!   driven by a manual clock.
//! - **HTTP Handlers**: status codes and bodies of the four endpoints, exercised in-process.

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::home::{Home, HomeState};
    use crate::master::protocol::*;
    use crate::master::{router, Clock, Dispatch, Master, MasterError, MasterState, WorkerRecord};

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use axum::Router;
    use futures::StreamExt;
    use std::collections::HashSet;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const WINDOW_MS: u64 = 4_000;
    const CHUNK_SIZE: usize = 4;

    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn at(now_ms: u64) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(now_ms)))
        }

        fn set(&self, now_ms: u64) {
            self.0.store(now_ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn test_config() -> Config {
        Config {
            processing_timeout: Duration::from_millis(WINDOW_MS),
            ..Config::default()
        }
    }

    fn write_home(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full_path = dir.path().join(path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full_path, content).unwrap();
        }
        dir
    }

    fn master_with(files: &[(&str, &str)], clock: Arc<ManualClock>) -> (TempDir, Master) {
        let dir = write_home(files);
        let mut home = Home::new(dir.path());
        home.load().unwrap();
        let master = Master::with_clock(home, &test_config(), clock);
        (dir, master)
    }

    fn assigned_path(outcome: &Dispatch) -> &str {
        &outcome.assignment().expect("expected a file").path
    }

    // ============================================================
    // WORKER RECORD
    // ============================================================

    #[test]
    fn test_finish_accumulates_throughput() {
        let mut record = WorkerRecord::new("worker-1", Duration::from_millis(WINDOW_MS));

        record.begin("a", 1_000, 0);
        assert!(record.has_in_flight());
        assert!(record.finish("a", 2_000));

        assert!(!record.has_in_flight());
        assert_eq!(record.total_bytes(), 1_000);
        assert_eq!(record.total_files(), 1);
        assert!((record.seconds_per_byte() - 0.002).abs() < 1e-12);
        assert!((record.seconds_per_file() - 2.0).abs() < 1e-12);
        assert!((record.estimate_seconds(500) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_finish_unknown_path_is_noop() {
        let mut record = WorkerRecord::new("worker-1", Duration::from_millis(WINDOW_MS));

        assert!(!record.finish("missing", 10));
        assert_eq!(record.total_files(), 0);
        assert_eq!(record.seconds_per_byte(), 0.0);
    }

    #[test]
    fn test_negative_elapsed_discards_sample() {
        let mut record = WorkerRecord::new("worker-1", Duration::from_millis(WINDOW_MS));

        record.begin("a", 100, 5_000);
        assert!(record.finish("a", 4_000));

        assert!(!record.has_in_flight());
        assert_eq!(record.total_bytes(), 0);
        assert_eq!(record.total_files(), 0);
    }

    #[test]
    fn test_begin_twice_overwrites() {
        let mut record = WorkerRecord::new("worker-1", Duration::from_millis(WINDOW_MS));

        record.begin("a", 10, 0);
        record.begin("a", 20, 100);

        assert_eq!(record.in_flight_count(), 1);
        let entry = record.in_flight("a").unwrap();
        assert_eq!(entry.size, 20);
        assert_eq!(entry.started_at, 100);
    }

    #[test]
    fn test_cold_worker_times_out_after_window_only() {
        let mut record = WorkerRecord::new("worker-1", Duration::from_millis(WINDOW_MS));
        assert_eq!(record.estimate_seconds(10_000_000), 0.0);

        record.begin("big", 10_000_000, 10_000);

        assert!(record.timed_out_files(10_000 + WINDOW_MS).is_empty());
        let timed_out = record.timed_out_files(10_000 + WINDOW_MS + 1);
        assert_eq!(timed_out.len(), 1);
        assert_eq!(timed_out[0].path, "big");
        assert_eq!(timed_out[0].started_at, 10_000);
        assert_eq!(timed_out[0].worker, "worker-1");
    }

    #[test]
    fn test_estimate_extends_timeout_for_large_files() {
        let mut record = WorkerRecord::new("worker-1", Duration::from_millis(WINDOW_MS));
        // 1000 bytes in 2 seconds
        record.begin("warmup", 1_000, 0);
        record.finish("warmup", 2_000);

        record.begin("b", 1_000, 100_000);

        // expected done at 102_000, timed out strictly after 106_000
        assert!(record.earliest_timed_out(106_000).is_none());
        assert!(record.earliest_timed_out(106_001).is_some());
    }

    #[test]
    fn test_timeout_is_monotone_in_time() {
        let mut record = WorkerRecord::new("worker-1", Duration::from_millis(WINDOW_MS));
        record.begin("warmup", 500, 0);
        record.finish("warmup", 1_500);
        record.begin("a", 3_000, 10_000);

        let first = (10_000..30_000)
            .step_by(7)
            .find(|&now| record.first_timed_out(now).is_some())
            .expect("should time out eventually");

        for now in (first..first + 20_000).step_by(13) {
            assert!(record.first_timed_out(now).is_some(), "not timed out at {}", now);
        }
    }

    #[test]
    fn test_earliest_timed_out_picks_oldest_assignment() {
        let mut record = WorkerRecord::new("worker-1", Duration::from_millis(WINDOW_MS));
        record.begin("a", 0, 300);
        record.begin("b", 0, 100);
        record.begin("c", 0, 200);

        let now = 100_000;
        assert_eq!(record.timed_out_files(now).len(), 3);
        assert_eq!(record.earliest_timed_out(now).unwrap().path, "b");
        assert_eq!(record.first_timed_out(now).unwrap().path, "a");

        assert!(record.remove("b"));
        assert!(!record.remove("b"));
        assert_eq!(record.earliest_timed_out(now).unwrap().path, "c");
    }

    // ============================================================
    // DISPATCH ENGINE
    // ============================================================

    #[test]
    fn test_single_worker_drains_home() {
        let clock = ManualClock::at(1_000);
        let (_dir, mut master) = master_with(
            &[("var/file1", "one"), ("var/dir1/file1", "two"), ("var/dir2/file2", "three")],
            clock.clone(),
        );
        master.register("worker-1").unwrap();

        for _ in 0..3 {
            let outcome = master.dispatch("worker-1").unwrap();
            assert!(matches!(outcome, Dispatch::Assigned(_)));
            let path = assigned_path(&outcome).to_string();
            clock.set(clock.now_ms() + 10);
            master.report_digest("worker-1", &path, "digest").unwrap();
        }

        let status = master.status(false);
        assert_eq!(status.state, HomeState { total: 3, finished: 3 });
        assert!(status.files.is_none());
        assert_eq!(master.dispatch("worker-1").unwrap(), Dispatch::Done);
        assert_eq!(master.worker("worker-1").unwrap().total_files(), 3);
    }

    #[test]
    fn test_files_dispatched_in_scan_order() {
        let clock = ManualClock::at(0);
        let (_dir, mut master) = master_with(&[("c", "c"), ("a", "a"), ("b/d", "d")], clock);
        master.register("worker-1").unwrap();

        let order: Vec<String> = (0..3)
            .map(|_| assigned_path(&master.dispatch("worker-1").unwrap()).to_string())
            .collect();
        assert_eq!(order, vec!["a", "b/d", "c"]);
    }

    #[test]
    fn test_assignment_records_file_size() {
        let clock = ManualClock::at(0);
        let (dir, mut master) = master_with(&[("sized", "0123456789")], clock);
        master.register("worker-1").unwrap();

        let outcome = master.dispatch("worker-1").unwrap();
        let assignment = outcome.assignment().unwrap();
        assert_eq!(assignment.size, 10);
        assert_eq!(assignment.full_path, dir.path().join("sized"));
        assert_eq!(master.worker("worker-1").unwrap().in_flight("sized").unwrap().size, 10);
    }

    #[test]
    fn test_register_twice_conflicts() {
        let (_dir, mut master) = master_with(&[("a", "a")], ManualClock::at(0));

        master.register("worker-1").unwrap();
        let result = master.register("worker-1");

        assert!(matches!(result, Err(MasterError::AlreadyRegistered(_))));
        assert_eq!(master.worker_names(), vec!["worker-1"]);
    }

    #[test]
    fn test_unregistered_worker_is_rejected() {
        let (_dir, mut master) = master_with(&[("a", "a")], ManualClock::at(0));

        assert!(matches!(master.dispatch("ghost"), Err(MasterError::NotRegistered(_))));
        assert!(matches!(
            master.report_digest("ghost", "a", "digest"),
            Err(MasterError::NotRegistered(_))
        ));
        assert!(master.is_queued("a"));
    }

    #[test]
    fn test_report_unknown_path_is_not_found() {
        let (_dir, mut master) = master_with(&[("a", "a")], ManualClock::at(0));
        master.register("worker-1").unwrap();

        let result = master.report_digest("worker-1", "missing", "digest");

        assert!(matches!(result, Err(MasterError::PathNotFound(_))));
        assert_eq!(master.status(false).state.finished, 0);
    }

    #[test]
    fn test_retry_later_while_file_in_flight() {
        let clock = ManualClock::at(0);
        let (_dir, mut master) = master_with(&[("a", "a")], clock.clone());
        master.register("worker-1").unwrap();
        master.register("worker-2").unwrap();

        assert!(matches!(master.dispatch("worker-1").unwrap(), Dispatch::Assigned(_)));

        clock.set(WINDOW_MS);
        assert_eq!(master.dispatch("worker-2").unwrap(), Dispatch::RetryLater);
        assert_eq!(master.dispatch("worker-1").unwrap(), Dispatch::RetryLater);
    }

    #[test]
    fn test_timed_out_file_is_reclaimed() {
        let clock = ManualClock::at(1_000);
        let (_dir, mut master) = master_with(&[("a", "a")], clock.clone());
        master.register("worker-1").unwrap();
        master.register("worker-2").unwrap();
        master.dispatch("worker-1").unwrap();

        clock.set(1_000 + WINDOW_MS + 1);
        assert_eq!(master.timed_out_files().len(), 1);
        let outcome = master.dispatch("worker-2").unwrap();

        match &outcome {
            Dispatch::Reclaimed { assignment, from } => {
                assert_eq!(assignment.path, "a");
                assert_eq!(from, "worker-1");
            }
            other => panic!("expected reclaim, got {:?}", other),
        }
        assert!(master.worker("worker-1").unwrap().in_flight("a").is_none());
        assert!(master.worker("worker-2").unwrap().in_flight("a").is_some());
        assert!(master.timed_out_files().is_empty());
    }

    #[test]
    fn test_late_report_after_reclaim() {
        let clock = ManualClock::at(0);
        let (_dir, mut master) = master_with(&[("a", "a")], clock.clone());
        master.register("worker-1").unwrap();
        master.register("worker-2").unwrap();
        master.dispatch("worker-1").unwrap();
        clock.set(WINDOW_MS + 1);
        master.dispatch("worker-2").unwrap();

        // the original worker was never cancelled and still reports
        master.report_digest("worker-1", "a", "late").unwrap();
        assert_eq!(master.home().digest("a"), Some("late"));
        assert_eq!(master.worker("worker-1").unwrap().total_files(), 0);
        assert_eq!(master.dispatch("worker-1").unwrap(), Dispatch::RetryLater);

        master.report_digest("worker-2", "a", "fresh").unwrap();
        assert_eq!(master.home().digest("a"), Some("fresh"));
        assert_eq!(master.dispatch("worker-1").unwrap(), Dispatch::Done);
    }

    #[test]
    fn test_reclaim_picks_globally_earliest_file() {
        let clock = ManualClock::at(0);
        let (_dir, mut master) = master_with(&[("a", "a"), ("b", "b")], clock.clone());
        for name in ["worker-1", "worker-2", "worker-3"] {
            master.register(name).unwrap();
        }

        clock.set(50);
        assert_eq!(assigned_path(&master.dispatch("worker-1").unwrap()), "a");
        clock.set(10);
        assert_eq!(assigned_path(&master.dispatch("worker-2").unwrap()), "b");

        clock.set(100_000);
        match master.dispatch("worker-3").unwrap() {
            Dispatch::Reclaimed { assignment, from } => {
                assert_eq!(assignment.path, "b");
                assert_eq!(from, "worker-2");
            }
            other => panic!("expected reclaim, got {:?}", other),
        }
        assert_eq!(master.earliest_timed_out().unwrap().path, "a");
    }

    #[test]
    fn test_queue_and_in_flight_are_exclusive() {
        let clock = ManualClock::at(0);
        let files: Vec<(String, String)> =
            (0..8).map(|i| (format!("f{}", i), "x".repeat(i))).collect();
        let refs: Vec<(&str, &str)> = files
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_str()))
            .collect();
        let (_dir, mut master) = master_with(&refs, clock.clone());
        master.register("worker-1").unwrap();
        master.register("worker-2").unwrap();

        for step in 0..12u64 {
            clock.set(step * 3_000);
            let name = if step % 2 == 0 { "worker-1" } else { "worker-2" };
            master.dispatch(name).unwrap();

            let mut seen = HashSet::new();
            for record in master.workers() {
                for path in record.in_flight_paths() {
                    assert!(seen.insert(path.to_string()), "{} in flight twice", path);
                    assert!(!master.is_queued(path), "{} queued and in flight", path);
                }
            }
        }
    }

    #[test]
    fn test_repeated_report_is_idempotent() {
        let (_dir, mut master) = master_with(&[("a", "a"), ("b", "b")], ManualClock::at(0));
        master.register("worker-1").unwrap();
        master.dispatch("worker-1").unwrap();

        master.report_digest("worker-1", "a", "digest").unwrap();
        let once = master.status(true);
        master.report_digest("worker-1", "a", "digest").unwrap();

        assert_eq!(master.status(true), once);
        assert_eq!(master.worker("worker-1").unwrap().total_files(), 1);
    }

    #[test]
    fn test_empty_home_is_done_immediately() {
        let (_dir, mut master) = master_with(&[], ManualClock::at(0));
        master.register("worker-1").unwrap();

        assert_eq!(master.dispatch("worker-1").unwrap(), Dispatch::Done);
    }

    #[test]
    fn test_abandoned_file_is_not_requeued() {
        let (_dir, mut master) = master_with(&[("a", "a")], ManualClock::at(0));
        master.register("worker-1").unwrap();
        master.dispatch("worker-1").unwrap();

        assert!(master.abandon("worker-1", "a"));
        assert!(!master.abandon("worker-1", "a"));
        assert_eq!(master.dispatch("worker-1").unwrap(), Dispatch::Done);
    }

    #[test]
    fn test_report_for_queued_path_dequeues_it() {
        let (_dir, mut master) = master_with(&[("a", "a"), ("b", "b")], ManualClock::at(0));
        master.register("worker-1").unwrap();
        master.register("worker-2").unwrap();

        master.report_digest("worker-2", "b", "early").unwrap();

        assert!(!master.is_queued("b"));
        assert_eq!(assigned_path(&master.dispatch("worker-1").unwrap()), "a");
        master.report_digest("worker-1", "a", "digest").unwrap();
        assert_eq!(master.dispatch("worker-1").unwrap(), Dispatch::Done);
        assert_eq!(master.home().digest("b"), Some("early"));
    }

    #[test]
    fn test_digested_files_are_not_queued() {
        let mut home = Home::from_paths("/does/not/exist", ["a", "b"]);
        home.set_digest("a", "digest");

        let master = Master::with_clock(home, &test_config(), ManualClock::at(0));

        let queued: Vec<&str> = master.queued_paths().collect();
        assert_eq!(queued, vec!["b"]);
        assert_eq!(master.progress().queued, 1);
        assert_eq!(master.progress().finished, 1);
    }

    // ============================================================
    // HTTP HANDLERS
    // ============================================================

    fn app_for(master: Master) -> (Arc<MasterState>, Router) {
        let state = MasterState::new(master, CHUNK_SIZE);
        let app = router(state.clone());
        (state, app)
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    fn register_request(name: &str) -> Request<Body> {
        Request::post(ENDPOINT_WORKER_REGISTER)
            .header(HEADER_WORKER_NAME, name)
            .body(Body::empty())
            .unwrap()
    }

    fn get_file_request(name: &str) -> Request<Body> {
        Request::get(ENDPOINT_GET_FILE)
            .header(HEADER_WORKER_NAME, name)
            .body(Body::empty())
            .unwrap()
    }

    fn report_request(name: &str, form: &str) -> Request<Body> {
        Request::put(ENDPOINT_UPDATE_FILE_HASH)
            .header(HEADER_WORKER_NAME, name)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_http_worker_register() {
        let (_dir, master) = master_with(&[("a", "a")], ManualClock::at(0));
        let (state, app) = app_for(master);

        let response = send(&app, register_request("worker-1")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, register_request("worker-1")).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(&app, register_request("worker-2")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let missing = Request::post(ENDPOINT_WORKER_REGISTER).body(Body::empty()).unwrap();
        let response = send(&app, missing).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(state.master().worker_names(), vec!["worker-1", "worker-2"]);
    }

    #[tokio::test]
    async fn test_http_get_file_streams_content() {
        let content = "streamed in several small frames";
        let (_dir, master) = master_with(&[("dir/file", content)], ManualClock::at(0));
        let (_state, app) = app_for(master);
        send(&app, register_request("worker-1")).await;

        let response = send(&app, get_file_request("worker-1")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(HEADER_FILE_PATH).unwrap().to_str().unwrap(),
            "dir/file"
        );

        let mut frames = response.into_body().into_data_stream();
        let mut received = Vec::new();
        let mut frame_count = 0;
        while let Some(frame) = frames.next().await {
            let frame = frame.unwrap();
            assert!(frame.len() <= CHUNK_SIZE, "frame of {} bytes", frame.len());
            received.extend_from_slice(&frame);
            frame_count += 1;
        }
        assert!(frame_count > 1);
        assert_eq!(received, content.as_bytes().to_vec());
    }

    #[tokio::test]
    async fn test_http_get_file_signals() {
        let (_dir, master) = master_with(&[("a", "a")], ManualClock::at(0));
        let (_state, app) = app_for(master);
        send(&app, register_request("worker-1")).await;
        send(&app, register_request("worker-2")).await;

        let response = send(&app, get_file_request("ghost")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let missing = Request::get(ENDPOINT_GET_FILE).body(Body::empty()).unwrap();
        assert_eq!(send(&app, missing).await.status(), StatusCode::BAD_REQUEST);

        assert_eq!(send(&app, get_file_request("worker-1")).await.status(), StatusCode::OK);
        assert_eq!(
            send(&app, get_file_request("worker-2")).await.status(),
            StatusCode::ACCEPTED
        );

        let response = send(&app, report_request("worker-1", "file_path=a&file_hash=abcd")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            send(&app, get_file_request("worker-2")).await.status(),
            StatusCode::NO_CONTENT
        );
    }

    #[tokio::test]
    async fn test_http_get_file_missing_on_disk() {
        let (dir, master) = master_with(&[("gone", "soon deleted")], ManualClock::at(0));
        fs::remove_file(dir.path().join("gone")).unwrap();
        let (state, app) = app_for(master);
        send(&app, register_request("worker-1")).await;

        let response = send(&app, get_file_request("worker-1")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!state.master().has_in_flight());
        assert_eq!(
            send(&app, get_file_request("worker-1")).await.status(),
            StatusCode::NO_CONTENT
        );
    }

    #[tokio::test]
    async fn test_http_update_file_hash_errors() {
        let (_dir, master) = master_with(&[("a", "a")], ManualClock::at(0));
        let (state, app) = app_for(master);
        send(&app, register_request("worker-1")).await;

        let cases = [
            ("ghost", "file_path=a&file_hash=abcd", StatusCode::BAD_REQUEST),
            ("worker-1", "file_hash=abcd", StatusCode::BAD_REQUEST),
            ("worker-1", "file_path=a", StatusCode::BAD_REQUEST),
            ("worker-1", "file_path=a&file_hash=", StatusCode::BAD_REQUEST),
            ("worker-1", "file_path=missing&file_hash=abcd", StatusCode::NOT_FOUND),
        ];
        for (name, form, expected) in cases {
            let response = send(&app, report_request(name, form)).await;
            assert_eq!(response.status(), expected, "form {:?} from {}", form, name);
        }

        assert_eq!(state.master().status(false).state.finished, 0);
    }

    #[tokio::test]
    async fn test_http_home_status() {
        let mut home = Home::from_paths("/does/not/exist", ["var/file1", "var/dir1/file1", "var/dir2/file2"]);
        home.set_digest("var/dir1/file1", "aaaa");
        let master = Master::with_clock(home, &test_config(), ManualClock::at(0));
        let (_state, app) = app_for(master);

        let request = Request::get(ENDPOINT_HOME_STATUS).body(Body::empty()).unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let status: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(status, serde_json::json!({"state": {"total": 3, "finished": 1}}));

        let request = Request::get(format!("{}?include_files=1", ENDPOINT_HOME_STATUS))
            .body(Body::empty())
            .unwrap();
        let response = send(&app, request).await;
        let status: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(
            status,
            serde_json::json!({
                "state": {"total": 3, "finished": 1},
                "files": {
                    "var/file1": null,
                    "var/dir1/file1": "aaaa",
                    "var/dir2/file2": null,
                },
            })
        );
    }

    #[test]
    fn test_include_files_flag_parsing() {
        let flag = |value: Option<&str>| HomeStatusQuery {
            include_files: value.map(str::to_string),
        }
        .wants_files();

        assert!(!flag(None));
        assert!(!flag(Some("")));
        assert!(!flag(Some("0")));
        assert!(!flag(Some("FALSE")));
        assert!(flag(Some("1")));
        assert!(flag(Some("yes")));
    }
}
