use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uiscout::platforms::memory::{MemoryEngine, MemoryNode, MemoryTree};
use uiscout::{ActionOptions, AppManager, AttachPolicy, ControllerConfig, MemoryNotifier, Specification, UIController};

fn spec(value: serde_json::Value) -> Specification {
    Specification::from_value(&value).unwrap()
}

fn controller(tree: &MemoryTree) -> (Arc<UIController>, Arc<MemoryNotifier>) {
    let config = ControllerConfig {
        default_timeout: Duration::from_millis(300),
        default_retry_interval: Duration::from_millis(20),
        screenshots_enabled: false,
        ..ControllerConfig::default()
    };
    let notifier = Arc::new(MemoryNotifier::new());
    let controller = UIController::new(Arc::new(MemoryEngine::new(tree.clone())), config)
        .with_notifier(notifier.clone());
    (Arc::new(controller), notifier)
}

fn player_window(pid: u32) -> MemoryNode {
    MemoryNode::new("Window", "Player")
        .with_pid(pid)
        .with_children(vec![
            MemoryNode::new("Button", "Play").with_auto_id("btnPlay"),
            MemoryNode::new("Slider", "Volume").with_auto_id("volume"),
        ])
}

fn entries() -> Vec<(String, Specification)> {
    vec![
        ("play".to_string(), spec(json!({"pwa_auto_id": "btnPlay"}))),
        ("volume".to_string(), spec(json!({"pwa_auto_id": "volume"}))),
    ]
}

#[test]
fn missing_window_is_not_ready() {
    let tree = MemoryTree::with_windows(vec![MemoryNode::new("Window", "Other")]);
    let (controller, notifier) = controller(&tree);
    let mut app = AppManager::new("Player", "", spec(json!({"pwa_title": "Player"})), controller);

    assert!(!app.is_running());
    assert!(!app.is_window_ready(Some(Duration::from_millis(50))).unwrap());
    assert_eq!(app.get_title(Some(Duration::from_millis(50))).unwrap(), None);
    assert!(notifier
        .messages()
        .contains(&"Could not find 'Player' window.".to_string()));
    assert!(!app.attach(AttachPolicy::Fail, Some(Duration::from_millis(100))).unwrap());
}

#[test]
fn window_and_snapshots_are_cached() {
    let tree = MemoryTree::with_windows(vec![player_window(1)]);
    let (controller, _) = controller(&tree);
    let mut app = AppManager::new("Player", "", spec(json!({"pwa_title": "Player"})), controller);

    assert_eq!(app.get_title(None).unwrap().as_deref(), Some("Player"));
    assert!(app.snapshot_cache().window().is_some());
    assert!(app.cache_snapshot("controls", &entries(), None).unwrap());
    assert!(app.get_from_snapshot("controls", "play").is_some());
    assert!(app.get_from_snapshot("controls", "stop").is_none());
    assert!(app.get_from_snapshot("missing", "play").is_none());

    app.clear_snapshot_cache(Some("controls"));
    assert!(app.get_from_snapshot("controls", "play").is_none());
    app.clear_all_caches();
    assert!(app.snapshot_cache().is_empty());
}

#[test]
fn snapshot_entries_heal_after_recreation() {
    let tree = MemoryTree::with_windows(vec![player_window(1)]);
    let (controller, _) = controller(&tree);
    let mut app = AppManager::new("Player", "", spec(json!({"pwa_title": "Player"})), controller);
    assert!(app.cache_snapshot("controls", &entries(), None).unwrap());

    let new_id = tree.recreate(tree.id_by_auto_id("btnPlay").unwrap()).unwrap();
    let healed = app.get_from_snapshot("controls", "play").unwrap();
    assert_eq!(healed.object_id(), tree.element(new_id).object_id());

    tree.remove(new_id).unwrap();
    assert!(app.get_from_snapshot("controls", "play").is_none());
}

#[test]
fn element_operations_run_inside_the_main_window() {
    let tree = MemoryTree::with_windows(vec![player_window(1)]);
    let (controller, _) = controller(&tree);
    let mut app = AppManager::new("Player", "", spec(json!({"pwa_title": "Player"})), controller);
    let play = spec(json!({"pwa_auto_id": "btnPlay"}));

    assert!(app.check_exists(&play, None).unwrap());
    assert_eq!(
        app.get_property(&play, "pwa_title", None).unwrap(),
        Some(json!("Play"))
    );
    assert_eq!(app.find_element(&play, None).unwrap().name().unwrap(), "Play");

    // the window starts inactive; app actions activate it
    assert!(app.run_action(&play, "click", ActionOptions::default()).unwrap());
    let commands: Vec<String> = tree.actions().into_iter().map(|a| a.command).collect();
    assert_eq!(commands, vec!["maximize", "scroll_into_view", "click"]);
}

#[test]
fn close_hides_window_and_clears_caches() {
    let tree = MemoryTree::with_windows(vec![player_window(1)]);
    let (controller, _) = controller(&tree);
    let mut app = AppManager::new("Player", "", spec(json!({"pwa_title": "Player"})), controller);
    assert!(app.cache_snapshot("controls", &entries(), None).unwrap());

    assert!(app.close(Some(Duration::from_millis(200))).unwrap());
    assert!(app.snapshot_cache().is_empty());
    let window = tree.props(tree.id_by_title("Player").unwrap()).unwrap();
    assert!(!window.visible);
}

#[cfg(unix)]
#[test]
fn attach_adopts_running_process_and_kill_clears_state() {
    let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
    let tree = MemoryTree::with_windows(vec![player_window(child.id())]);
    let (controller, notifier) = controller(&tree);
    let mut app = AppManager::new("Player", "sleep 30", spec(json!({"pwa_title": "Player"})), controller);

    assert!(app.attach(AttachPolicy::Fail, Some(Duration::from_millis(500))).unwrap());
    assert_eq!(app.pid(), Some(child.id()));
    assert!(app.is_running());
    assert!(app.cache_snapshot("controls", &entries(), None).unwrap());

    app.kill();
    assert_eq!(app.pid(), None);
    assert!(!app.is_running());
    assert!(app.snapshot_cache().is_empty());
    assert!(notifier
        .messages()
        .iter()
        .any(|m| m.starts_with("Force-closed")));
    child.wait().unwrap();
}

#[cfg(unix)]
#[test]
fn duplicate_windows_fail_under_strict_policy() {
    let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
    let tree = MemoryTree::with_windows(vec![player_window(child.id()), player_window(child.id())]);
    let (controller, notifier) = controller(&tree);
    let mut app = AppManager::new("Player", "sleep 30", spec(json!({"pwa_title": "Player"})), controller);

    assert!(!app.attach(AttachPolicy::Fail, Some(Duration::from_millis(200))).unwrap());
    assert!(notifier
        .messages()
        .contains(&"Multiple 'Player' windows found.".to_string()));

    assert!(app.attach(AttachPolicy::Oldest, Some(Duration::from_millis(200))).unwrap());
    assert_eq!(app.pid(), Some(child.id()));

    child.kill().unwrap();
    child.wait().unwrap();
}

#[cfg(unix)]
#[test]
fn launch_tracks_spawned_process() {
    let tree = MemoryTree::with_windows(vec![]);
    let (controller, _) = controller(&tree);
    let mut app = AppManager::new("Sleeper", "sleep 30", spec(json!({"pwa_title": "Sleeper"})), controller);

    assert!(app.launch(false, None).unwrap());
    let pid = app.pid().unwrap();
    assert!(app.is_running());
    // a second launch is a no-op
    assert!(app.launch(false, None).unwrap());
    assert_eq!(app.pid(), Some(pid));

    app.kill();
    assert!(!app.is_running());
}

#[cfg(unix)]
#[test]
fn launch_without_window_kills_process() {
    let tree = MemoryTree::with_windows(vec![]);
    let (controller, _) = controller(&tree);
    let mut app = AppManager::new("Sleeper", "sleep 30", spec(json!({"pwa_title": "Sleeper"})), controller);

    assert!(!app.launch(true, Some(Duration::from_millis(200))).unwrap());
    assert_eq!(app.pid(), None);
}
