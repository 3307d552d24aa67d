//! Conflict routing and include coordination through the pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use boardsync_coordinator::{ChangeEvent, CoordinatorConfig, MainCoordinator};
use boardsync_core::{
    CacheState, ChangeAnalysis, ChangeKind, ChangeSource, ConflictResolution, CoordinatorState,
    IncludeFileState, IncludeFileType, MachineConfig, SwitchedInclude,
};

fn loaded_coordinator(config: CoordinatorConfig) -> MainCoordinator {
    let coordinator = MainCoordinator::new(config).unwrap();
    let main = coordinator.main_file();
    let mut main = main.lock();
    main.begin_load(None).unwrap();
    main.complete_load().unwrap();
    drop(main);
    coordinator
}

fn load_include(coordinator: &MainCoordinator, path: &str) {
    coordinator.register_include_file(path, IncludeFileType::Column, format!("/board/{path}"));
    let include = coordinator.include_file(path).unwrap();
    let mut machine = include.state_machine.lock();
    machine.begin_load(None).unwrap();
    machine.complete_load().unwrap();
}

fn structural(save: bool) -> ChangeAnalysis {
    ChangeAnalysis {
        has_main_structure_change: true,
        is_legitimate_save: save,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_conflict_iff_structural_change_over_dirty_file() {
    for (dirty, save, expect_conflict) in [
        (false, false, false),
        (true, false, true),
        (true, true, false),
        (false, true, false),
    ] {
        let coordinator = loaded_coordinator(CoordinatorConfig::default());
        if dirty {
            coordinator.main_file().lock().mark_dirty(ChangeKind::Content);
        }
        let conflicts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&conflicts);
        let event = ChangeEvent::new(ChangeSource::FileWatcher)
            .on_analyze(move || async move { Ok(structural(save)) })
            .on_conflict(move |_| async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let outcome = coordinator.handle_change(event).await.unwrap();
        assert_eq!(outcome.conflict, expect_conflict, "dirty={dirty} save={save}");
        assert_eq!(conflicts.load(Ordering::SeqCst), usize::from(expect_conflict));
        assert!(coordinator.is_stable());
    }
}

#[tokio::test]
async fn test_conflict_handler_keeps_local_include_edits() {
    let coordinator = loaded_coordinator(CoordinatorConfig::default());
    load_include(&coordinator, "doing.md");
    let include = coordinator.include_file("doing.md").unwrap();
    include.state_machine.lock().mark_dirty(ChangeKind::Content);

    let handle = Arc::clone(&include.state_machine);
    let event = ChangeEvent::new(ChangeSource::FileWatcher)
        .on_analyze(|| async { Ok(structural(false)) })
        .on_conflict(move |_| async move {
            let mut machine = handle.lock();
            machine.enter_conflict(Some("changed on disk"))?;
            machine.resolve_conflict(ConflictResolution::KeepLocal)?;
            Ok(())
        });

    let outcome = coordinator.handle_change(event).await.unwrap();
    assert!(outcome.conflict);
    {
        let machine = include.state_machine.lock();
        assert_eq!(machine.state(), IncludeFileState::Dirty);
        assert_eq!(machine.cache_state(), CacheState::Invalid);
    }
    assert!(coordinator.has_unsaved_changes());
}

#[tokio::test]
async fn test_include_switch_driven_by_coordination_callback() {
    let coordinator = loaded_coordinator(CoordinatorConfig {
        machine: MachineConfig::default().with_auto_rollback(),
        ..Default::default()
    });
    load_include(&coordinator, "old.md");
    coordinator.register_include_file("new.md", IncludeFileType::Column, "/board/new.md");

    let driver = coordinator.clone();
    let event = ChangeEvent::new(ChangeSource::IncludeSwitch)
        .with_switched_includes(true)
        .on_analyze(|| async {
            Ok(ChangeAnalysis {
                has_switched_includes: true,
                switched_includes: vec![SwitchedInclude {
                    old_path: "old.md".into(),
                    new_path: "new.md".into(),
                    include_type: IncludeFileType::Column,
                }],
                ..Default::default()
            })
        })
        .on_coordinate_includes(move |analysis| async move {
            for switch in &analysis.switched_includes {
                if let Some(old) = driver.include_file(&switch.old_path) {
                    let mut machine = old.state_machine.lock();
                    machine.begin_switch(false)?;
                    machine.confirm_switch()?;
                }
                driver.unregister_include_file(&switch.old_path);
                if let Some(new) = driver.include_file(&switch.new_path) {
                    let mut machine = new.state_machine.lock();
                    machine.begin_reload()?;
                    machine.complete_reload()?;
                }
            }
            Ok(())
        });

    let old = coordinator.include_file("old.md").unwrap();
    let outcome = coordinator.handle_change(event).await.unwrap();
    assert_eq!(
        outcome.phases,
        vec![
            CoordinatorState::DetectingChanges,
            CoordinatorState::Analyzing,
            CoordinatorState::CoordinatingIncludes,
            CoordinatorState::UpdatingUI,
            CoordinatorState::Stable,
        ]
    );
    assert_eq!(old.state(), IncludeFileState::Disposed);
    assert_eq!(coordinator.include_paths(), vec!["new.md".to_string()]);
    assert!(coordinator
        .include_file("new.md")
        .unwrap()
        .state_machine
        .lock()
        .is_stable());
}

#[tokio::test]
async fn test_include_coordination_failure_leaves_coordinator_stable() {
    let coordinator = loaded_coordinator(CoordinatorConfig::default());
    load_include(&coordinator, "a.md");
    let include = coordinator.include_file("a.md").unwrap();

    let handle = Arc::clone(&include.state_machine);
    let event = ChangeEvent::new(ChangeSource::IncludeSwitch)
        .with_switched_includes(true)
        .on_analyze(|| async { Ok(ChangeAnalysis::default()) })
        .on_coordinate_includes(move |_| async move {
            // No switch was started.
            handle.lock().confirm_switch()?;
            Ok(())
        });

    let err = coordinator.handle_change(event).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "COORDINATING_INCLUDES callback failed: cannot confirm switch while LOADED (requires SWITCHING_OUT)"
    );
    assert!(coordinator.is_stable());
    assert_eq!(include.state(), IncludeFileState::Loaded);
}
