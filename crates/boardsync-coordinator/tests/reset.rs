//! Emergency recovery with `force_reset`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use boardsync_coordinator::{ChangeEvent, CoordinatorConfig, CoordinatorError, MainCoordinator};
use boardsync_core::{ChangeKind, ChangeSource, CoordinatorState, FileState, IncludeFileType};

fn stuck_event(started: oneshot::Sender<()>) -> ChangeEvent {
    ChangeEvent::new(ChangeSource::FileWatcher).on_update_ui(move || async move {
        let _ = started.send(());
        std::future::pending::<()>().await;
        Ok(())
    })
}

#[tokio::test]
async fn test_force_reset_abandons_running_and_queued_requests() {
    let coordinator = MainCoordinator::new(CoordinatorConfig::default()).unwrap();
    let (started_tx, started_rx) = oneshot::channel();

    let stuck = coordinator.submit(stuck_event(started_tx)).unwrap();
    let queued_ran = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&queued_ran);
    let queued = coordinator
        .submit(ChangeEvent::new(ChangeSource::UserEdit).on_update_ui(move || async move {
            seen.store(true, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();
    let (stuck_id, queued_id) = (stuck.request_id(), queued.request_id());

    started_rx.await.unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::UpdatingUI);
    assert_eq!(
        coordinator.context().current_operation.map(|op| op.request_id),
        Some(stuck_id)
    );
    assert_eq!(coordinator.pending_requests(), 2);

    coordinator.force_reset();

    assert!(coordinator.is_stable());
    assert!(coordinator.context().current_operation.is_none());
    assert_eq!(coordinator.pending_requests(), 0);
    let last = coordinator.history().latest().cloned().unwrap();
    assert!(last.forced);
    assert_eq!(last.from, CoordinatorState::UpdatingUI);

    assert!(matches!(
        stuck.await,
        Err(CoordinatorError::Abandoned { request_id }) if request_id == stuck_id
    ));
    assert!(matches!(
        queued.await,
        Err(CoordinatorError::Abandoned { request_id }) if request_id == queued_id
    ));
    assert!(!queued_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_coordinator_accepts_work_after_reset() {
    let coordinator = MainCoordinator::new(CoordinatorConfig::default()).unwrap();
    let (started_tx, started_rx) = oneshot::channel();
    let stuck = coordinator.submit(stuck_event(started_tx)).unwrap();
    started_rx.await.unwrap();

    coordinator.force_reset();
    let outcome = coordinator
        .handle_change(ChangeEvent::new(ChangeSource::Save))
        .await
        .unwrap();
    assert!(outcome.request_id > stuck.request_id());
    assert_eq!(outcome.phases.first(), Some(&CoordinatorState::DetectingChanges));
    assert!(matches!(stuck.await, Err(CoordinatorError::Abandoned { .. })));
    assert!(!coordinator.is_processing());
    assert!(coordinator.is_stable());
}

#[tokio::test]
async fn test_force_reset_resets_main_file_but_keeps_includes() {
    let coordinator = MainCoordinator::new(CoordinatorConfig::default()).unwrap();
    coordinator.register_include_file("todo.md", IncludeFileType::Column, "/board/todo.md");
    {
        let main = coordinator.main_file();
        let mut main = main.lock();
        main.begin_load(None).unwrap();
        main.complete_load().unwrap();
        main.mark_dirty(ChangeKind::Structure);
    }
    {
        let include = coordinator.include_file("todo.md").unwrap();
        let mut machine = include.state_machine.lock();
        machine.begin_load(None).unwrap();
        machine.complete_load().unwrap();
    }

    coordinator.force_reset();

    let main = coordinator.main_file();
    let main = main.lock();
    assert_eq!(main.state(), FileState::Idle);
    assert!(main.history().is_empty());
    assert_eq!(coordinator.include_paths(), vec!["todo.md".to_string()]);
    assert!(coordinator.include_file("todo.md").unwrap().state_machine.lock().is_stable());
}

#[tokio::test]
async fn test_force_reset_when_idle_is_harmless() {
    let coordinator = MainCoordinator::new(CoordinatorConfig::default()).unwrap();
    coordinator.force_reset();
    coordinator.force_reset();
    assert!(coordinator.history().is_empty());

    let outcome = coordinator
        .handle_change(ChangeEvent::new(ChangeSource::Redo))
        .await
        .unwrap();
    assert_eq!(outcome.phases.last(), Some(&CoordinatorState::Stable));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reset_during_synchronous_callback_leaves_new_requests_counted() {
    let coordinator = MainCoordinator::new(CoordinatorConfig::default()).unwrap();
    let (started_tx, started_rx) = oneshot::channel();
    let busy = coordinator
        .submit(ChangeEvent::new(ChangeSource::FileWatcher).on_update_ui(move || async move {
            let _ = started_tx.send(());
            // Blocks the worker thread, so the abort cannot land until the
            // pipeline has run to completion.
            std::thread::sleep(std::time::Duration::from_millis(300));
            Ok(())
        }))
        .unwrap();
    let busy_id = busy.request_id();
    started_rx.await.unwrap();

    coordinator.force_reset();

    let (release_tx, release_rx) = oneshot::channel::<()>();
    let next = coordinator
        .submit(ChangeEvent::new(ChangeSource::UserEdit).on_update_ui(move || async move {
            let _ = release_rx.await;
            Ok(())
        }))
        .unwrap();

    assert!(matches!(
        busy.await,
        Err(CoordinatorError::Abandoned { request_id }) if request_id == busy_id
    ));
    assert_eq!(coordinator.pending_requests(), 1);

    release_tx.send(()).unwrap();
    let outcome = next.await.unwrap();
    assert_eq!(outcome.phases.last(), Some(&CoordinatorState::Stable));
    assert_eq!(coordinator.pending_requests(), 0);
    assert!(coordinator.is_stable());
}
