//! Integration tests for the transfer manager.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use courier_net::NetworkError;
use courier_net::http::{
    ScriptedEvent, ScriptedSession, ScriptedTask, Session, TaskState, TransferDelegate,
    TransferManager, TransferManagerBuilder,
};

const REDIRECTING: &str = "https://example.com/redirect";
const FAILING: &str = "https://example.com/fail";

fn redirect_then_ok() -> Vec<ScriptedEvent> {
    vec![
        ScriptedEvent::redirect("https://example.com/target"),
        ScriptedEvent::response(200),
        ScriptedEvent::data(&b"hello"[..]),
        ScriptedEvent::success(),
    ]
}

#[test]
fn test_redirect_then_success() {
    let session = ScriptedSession::new().with_script(REDIRECTING, redirect_then_ok());
    let manager = TransferManager::new(session);

    manager.start_transfer(REDIRECTING).expect("Failed to start transfer");
    manager.run().expect("Failed to start event loop");
    manager.join();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.state, TaskState::Completed);
    assert_eq!(snapshot.redirects, 1);
    assert_eq!(snapshot.status, Some(200));
    assert_eq!(snapshot.final_url.as_deref(), Some("https://example.com/target"));
    assert_eq!(snapshot.url.as_deref(), Some(REDIRECTING));
    assert_eq!(snapshot.progress.bytes_transferred, 5);
    assert!(snapshot.error.is_none());
    assert!(snapshot.is_success());
}

#[test]
fn test_server_error_then_transport_failure() {
    let session = ScriptedSession::new().with_script(
        FAILING,
        [
            ScriptedEvent::response(500),
            ScriptedEvent::failure(NetworkError::Connection("connection reset".into())),
        ],
    );
    let manager = TransferManager::new(session);

    manager.start_transfer(FAILING).expect("Failed to start transfer");
    manager.run().expect("Failed to start event loop");
    manager.join();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.state, TaskState::Failed);
    assert_eq!(snapshot.redirects, 0);
    assert_eq!(snapshot.status, Some(500));
    assert_eq!(
        snapshot.error,
        Some(NetworkError::Connection("connection reset".into()))
    );
}

#[test]
fn test_error_status_without_transport_error_completes() {
    let url = "https://example.com/missing";
    let session = ScriptedSession::new().with_script(
        url,
        [ScriptedEvent::response(404), ScriptedEvent::success()],
    );
    let manager = TransferManager::new(session);

    manager.start_transfer(url).unwrap();
    manager.run().unwrap();
    manager.join();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.state, TaskState::Completed);
    assert_eq!(snapshot.status, Some(404));
}

#[test]
fn test_join_returns_after_loop_drains() {
    let session = ScriptedSession::new()
        .with_script(REDIRECTING, redirect_then_ok())
        .with_event_delay(Duration::from_millis(10));
    let manager = TransferManager::new(session);

    manager.start_transfer(REDIRECTING).unwrap();
    manager.run().unwrap();
    assert!(manager.join_timeout(Duration::from_secs(5)));
    assert!(!manager.is_running());
    assert_eq!(manager.session().in_flight(), 0);
    assert!(manager.state().is_terminal());
}

#[test]
fn test_run_twice_is_ignored() {
    let session = ScriptedSession::new().with_script(REDIRECTING, redirect_then_ok());
    let manager = TransferManager::new(session);

    manager.start_transfer(REDIRECTING).unwrap();
    manager.run().unwrap();
    manager.run().unwrap();
    manager.join();

    assert_eq!(manager.state(), TaskState::Completed);
    assert_eq!(manager.session().tasks_created(), 1);
}

#[test]
fn test_start_while_in_progress_is_rejected() {
    let session = ScriptedSession::new()
        .with_script(REDIRECTING, redirect_then_ok())
        .with_event_delay(Duration::from_millis(50));
    let manager = TransferManager::new(session);

    manager.start_transfer(REDIRECTING).unwrap();
    let before = manager.snapshot();

    let err = manager.start_transfer(FAILING).unwrap_err();
    assert_eq!(err, NetworkError::TransferInProgress);
    assert_eq!(manager.snapshot().task_id, before.task_id);
    assert_eq!(manager.session().tasks_created(), 1);

    manager.run().unwrap();
    manager.join();
    assert_eq!(manager.state(), TaskState::Completed);
}

#[test]
fn test_new_transfer_after_completion() {
    let session = ScriptedSession::new()
        .with_script(REDIRECTING, redirect_then_ok())
        .with_script(FAILING, [ScriptedEvent::failure(NetworkError::Timeout)]);
    let manager = TransferManager::new(session);

    manager.start_transfer(REDIRECTING).unwrap();
    let first = manager.wait_for_completion(Some(Duration::from_secs(5))).unwrap();
    assert_eq!(first.redirects, 1);

    manager.start_transfer(FAILING).unwrap();
    let second = manager.wait_for_completion(Some(Duration::from_secs(5))).unwrap();
    assert_eq!(second.state, TaskState::Failed);
    assert_eq!(second.redirects, 0);
    assert_eq!(second.status, None);
    assert_eq!(second.error, Some(NetworkError::Timeout));
    assert_ne!(first.task_id, second.task_id);
}

#[test]
fn test_empty_url_is_rejected() {
    let manager = TransferManager::new(ScriptedSession::new());

    let err = manager.start_transfer("").unwrap_err();
    assert!(matches!(err, NetworkError::InvalidArgument(_)));
    assert_eq!(manager.state(), TaskState::Idle);
}

#[test]
fn test_unscripted_url_fails() {
    let manager = TransferManager::new(ScriptedSession::new());

    manager.start_transfer("https://example.com/nowhere").unwrap();
    manager.run().unwrap();
    manager.join();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.state, TaskState::Failed);
    assert!(matches!(snapshot.error, Some(NetworkError::Connection(_))));
}

#[test]
fn test_cancel_in_flight_transfer() {
    let session = ScriptedSession::new()
        .with_script(REDIRECTING, redirect_then_ok())
        .with_event_delay(Duration::from_millis(200));
    let manager = TransferManager::new(session);

    manager.start_transfer(REDIRECTING).unwrap();
    manager.run().unwrap();
    assert!(manager.cancel());
    manager.join();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.state, TaskState::Failed);
    assert_eq!(snapshot.error, Some(NetworkError::Cancelled));
    assert!(!manager.cancel());
}

/// Scripted session whose `resume` stalls, widening the window between task
/// creation and execution.
struct SlowResume {
    inner: ScriptedSession,
    delay: Duration,
}

impl Session for SlowResume {
    type Task = ScriptedTask;

    fn create_task(
        &self,
        url: &str,
        delegate: Arc<dyn TransferDelegate<ScriptedTask>>,
    ) -> courier_net::Result<ScriptedTask> {
        self.inner.create_task(url, delegate)
    }

    fn resume(&self, task: &ScriptedTask) {
        thread::sleep(self.delay);
        self.inner.resume(task);
    }

    fn cancel(&self, task: &ScriptedTask) {
        self.inner.cancel(task);
    }

    fn run_event_loop(&self) {
        self.inner.run_event_loop();
    }

    fn stop(&self) {
        self.inner.stop();
    }
}

#[test]
fn test_cancel_before_resume_completes_transfer() {
    let session = SlowResume {
        inner: ScriptedSession::new().with_script(REDIRECTING, redirect_then_ok()),
        delay: Duration::from_millis(200),
    };
    let manager = Arc::new(TransferManager::new(session));

    let starter = {
        let manager = manager.clone();
        thread::spawn(move || manager.start_transfer(REDIRECTING))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(manager.cancel());
    starter.join().unwrap().unwrap();

    let snapshot = manager
        .wait_for_completion(Some(Duration::from_secs(2)))
        .expect("Cancelled transfer never completed");
    assert_eq!(snapshot.state, TaskState::Failed);
    assert_eq!(snapshot.error, Some(NetworkError::Cancelled));

    // The manager accepts a new transfer afterwards
    manager.session().inner.script(FAILING, [ScriptedEvent::success()]);
    manager.start_transfer(FAILING).unwrap();
    let next = manager
        .wait_for_completion(Some(Duration::from_secs(2)))
        .unwrap();
    assert_eq!(next.state, TaskState::Completed);
}

#[test]
fn test_manager_redirect_limit() {
    let url = "https://example.com/loop";
    let session = ScriptedSession::new().with_script(
        url,
        [
            ScriptedEvent::redirect("https://example.com/1"),
            ScriptedEvent::redirect("https://example.com/2"),
            ScriptedEvent::redirect("https://example.com/3"),
            ScriptedEvent::response(200),
            ScriptedEvent::success(),
        ],
    );
    let manager = TransferManagerBuilder::new()
        .max_redirects(2)
        .build(session);

    manager.start_transfer(url).unwrap();
    manager.run().unwrap();
    manager.join();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.state, TaskState::Failed);
    assert_eq!(snapshot.redirects, 3);
    assert_eq!(snapshot.status, None);
    assert_eq!(snapshot.error, Some(NetworkError::TooManyRedirects));
}

#[test]
fn test_wait_for_status_from_another_thread() {
    let session = ScriptedSession::new()
        .with_script(REDIRECTING, redirect_then_ok())
        .with_event_delay(Duration::from_millis(10));
    let manager = Arc::new(TransferManager::new(session));

    let waiter = {
        let manager = manager.clone();
        thread::spawn(move || manager.wait_for_status(Some(Duration::from_secs(5))))
    };

    manager.start_transfer(REDIRECTING).unwrap();
    manager.run().unwrap();

    assert_eq!(waiter.join().unwrap(), Some(200));
    manager.join();
}

#[test]
fn test_join_from_many_threads() {
    let session = ScriptedSession::new()
        .with_script(REDIRECTING, redirect_then_ok())
        .with_event_delay(Duration::from_millis(10));
    let manager = Arc::new(TransferManager::new(session));

    manager.start_transfer(REDIRECTING).unwrap();
    manager.run().unwrap();

    let joiners: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            thread::spawn(move || {
                manager.join();
                manager.state()
            })
        })
        .collect();

    for joiner in joiners {
        assert_eq!(joiner.join().unwrap(), TaskState::Completed);
    }
}

#[test]
fn test_snapshots_are_consistent_while_running() {
    let session = ScriptedSession::new()
        .with_script(REDIRECTING, redirect_then_ok())
        .with_event_delay(Duration::from_millis(5));
    let manager = Arc::new(TransferManager::new(session));

    manager.start_transfer(REDIRECTING).unwrap();
    manager.run().unwrap();

    let reader = {
        let manager = manager.clone();
        thread::spawn(move || {
            let mut last_redirects = 0;
            while !manager.state().is_terminal() {
                let snapshot = manager.snapshot();
                assert!(snapshot.redirects >= last_redirects);
                if snapshot.status.is_some() {
                    assert_eq!(snapshot.redirects, 1);
                }
                last_redirects = snapshot.redirects;
                thread::yield_now();
            }
        })
    };

    manager.join();
    reader.join().unwrap();
    assert_eq!(manager.snapshot().redirects, 1);
}

#[test]
fn test_drop_while_running() {
    let session = ScriptedSession::new()
        .with_script(REDIRECTING, redirect_then_ok())
        .with_event_delay(Duration::from_millis(500));
    let manager = TransferManager::new(session);

    manager.start_transfer(REDIRECTING).unwrap();
    manager.run().unwrap();
    assert!(manager.is_running());
    drop(manager);
}
