//! A panic anywhere in the host ends the run with exit status 1. Kept in its
//! own test binary since the panic hook is process-wide.

use call_recorder::host::{self, ShutdownCoordinator, ShutdownState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panic_in_task_shuts_down_with_one() {
    let exits = Arc::new(Mutex::new(Vec::new()));
    let recorded = exits.clone();
    let shutdown = ShutdownCoordinator::new(move |code| recorded.lock().push(code));
    host::install_panic_hook(shutdown.clone());

    let task = tokio::spawn(async {
        panic!("writer task blew up");
    });
    assert!(task.await.unwrap_err().is_panic());

    let code = tokio::time::timeout(Duration::from_secs(5), shutdown.stopped())
        .await
        .unwrap();
    assert_eq!(code, 1);
    assert_eq!(*exits.lock(), vec![1]);
    assert_eq!(shutdown.state(), ShutdownState::Stopped);
}
