use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uiscout::platforms::memory::{MemoryEngine, MemoryNode, MemoryTree};
use uiscout::{
    ActionOptions, ActivityMonitor, AutomationError, AutomationState, ControllerConfig, MemoryNotifier, NotifyStyle,
    ScrollDirection, Specification, StateCase, Target, UIController,
};

fn spec(value: serde_json::Value) -> Specification {
    Specification::from_value(&value).unwrap()
}

fn config() -> ControllerConfig {
    ControllerConfig {
        default_timeout: Duration::from_millis(300),
        default_retry_interval: Duration::from_millis(20),
        screenshots_enabled: false,
        ..ControllerConfig::default()
    }
}

fn editor_tree(active: bool) -> MemoryTree {
    let mut window = MemoryNode::new("Window", "notes.txt - Editor")
        .with_class("EditorWindow")
        .with_pid(4242)
        .with_children(vec![
            MemoryNode::new("Edit", "Text Editor").with_auto_id("textArea"),
            MemoryNode::new("Button", "Save").with_auto_id("btnSave"),
            MemoryNode::new("CheckBox", "Word Wrap"),
        ]);
    if active {
        window = window.activated();
    }
    MemoryTree::with_windows(vec![window, MemoryNode::new("Window", "Calculator")])
}

fn controller(tree: &MemoryTree, config: ControllerConfig) -> (UIController, Arc<MemoryNotifier>) {
    let notifier = Arc::new(MemoryNotifier::new());
    let controller = UIController::new(Arc::new(MemoryEngine::new(tree.clone())), config)
        .with_notifier(notifier.clone());
    (controller, notifier)
}

fn editor_target() -> Target {
    Target::spec(
        spec(json!({"pwa_title": ["icontains", "editor"]})),
        spec(json!({"pwa_auto_id": "textArea"})),
    )
}

fn value_of(tree: &MemoryTree, auto_id: &str) -> Option<String> {
    tree.props(tree.id_by_auto_id(auto_id).unwrap()).unwrap().value
}

#[test]
fn type_keys_in_active_window_notifies_success() {
    let tree = editor_tree(true);
    let (controller, notifier) = controller(&tree, config());

    let ok = controller
        .run_action(&editor_target(), "type_keys:Hello", &ActionOptions::default())
        .unwrap();

    assert!(ok);
    assert_eq!(value_of(&tree, "textArea").as_deref(), Some("Hello"));
    let events = notifier.events();
    let last = events.last().unwrap();
    assert_eq!(last.message, "Success: type_keys:Hello");
    assert_eq!(last.style, NotifyStyle::Success);
}

#[test]
fn inactive_window_needs_activation() {
    let tree = editor_tree(false);
    let (controller, notifier) = controller(&tree, config());

    let ok = controller
        .run_action(&editor_target(), "type_keys:Hello", &ActionOptions::default())
        .unwrap();
    assert!(!ok);
    assert_eq!(value_of(&tree, "textArea"), None);
    assert!(notifier
        .messages()
        .iter()
        .any(|m| m.starts_with("Failed: type_keys:Hello")));

    let err = controller
        .run_action(
            &editor_target(),
            "type_keys:Hello",
            &ActionOptions::default().raise_on_failure(true),
        )
        .unwrap_err();
    assert!(matches!(err, AutomationError::ActivationRequired { .. }));
}

#[test]
fn auto_activate_maximizes_before_acting() {
    let tree = editor_tree(false);
    let (controller, _) = controller(&tree, config());

    let ok = controller
        .run_action(
            &editor_target(),
            "type_keys:Hi",
            &ActionOptions::default().auto_activate(true),
        )
        .unwrap();
    assert!(ok);

    let commands: Vec<String> = tree.actions().into_iter().map(|a| a.command).collect();
    assert_eq!(commands, vec!["maximize", "type_keys"]);
    let window = tree.props(tree.id_by_title("notes.txt - Editor").unwrap()).unwrap();
    assert!(window.maximized && window.active);
}

#[test]
fn background_safe_commands_skip_activation() {
    let tree = MemoryTree::with_windows(vec![MemoryNode::new("Window", "Chat")
        .with_child(MemoryNode::new("Edit", "Message").with_handle(0x1f40))]);
    let (controller, _) = controller(&tree, config());
    let target = Target::spec(spec(json!({"pwa_title": "Chat"})), spec(json!({"pwa_title": "Message"})));

    assert!(controller
        .run_action(&target, "send_message_text:hi there", &ActionOptions::default())
        .unwrap());
    let id = tree.id_by_title("Message").unwrap();
    assert_eq!(tree.props(id).unwrap().value.as_deref(), Some("hi there"));
}

#[test]
fn secure_mode_masks_sensitive_values() {
    let tree = editor_tree(true);
    let (controller, notifier) = controller(
        &tree,
        ControllerConfig {
            secure_mode: true,
            ..config()
        },
    );

    assert!(controller
        .run_action(&editor_target(), "set_text:hunter2", &ActionOptions::default())
        .unwrap());
    assert!(controller
        .run_action(
            &Target::spec(spec(json!({"pwa_title": ["icontains", "editor"]})), spec(json!({"pwa_title": "Save"}))),
            "click",
            &ActionOptions::default(),
        )
        .unwrap());

    let messages = notifier.messages();
    assert!(messages.contains(&"Success: set_text:***".to_string()));
    assert!(messages.contains(&"Success: click".to_string()));
    assert!(messages.iter().all(|m| !m.contains("hunter2")));
}

#[test]
fn unknown_and_incomplete_actions_fail_softly() {
    let tree = editor_tree(true);
    let (controller, notifier) = controller(&tree, config());

    assert!(!controller
        .run_action(&editor_target(), "teleport:home", &ActionOptions::default())
        .unwrap());
    assert!(!controller
        .run_action(&editor_target(), "type_keys", &ActionOptions::default())
        .unwrap());
    assert_eq!(
        notifier.events().iter().filter(|e| e.style == NotifyStyle::Error).count(),
        2
    );
    assert!(tree.actions().is_empty());
}

#[test]
fn description_replaces_the_action_label() {
    let tree = editor_tree(true);
    let (controller, notifier) = controller(&tree, config());
    let options = ActionOptions::default()
        .description("Save the document")
        .notify_style(NotifyStyle::Info);
    let target = Target::spec(
        spec(json!({"pwa_title": ["icontains", "editor"]})),
        spec(json!({"pwa_auto_id": "btnSave"})),
    );

    assert!(controller.run_action(&target, "click", &options).unwrap());
    let events = notifier.events();
    assert_eq!(events.last().unwrap().message, "Success: Save the document");
    assert_eq!(events.last().unwrap().style, NotifyStyle::Info);
    let commands: Vec<String> = tree.actions().into_iter().map(|a| a.command).collect();
    assert_eq!(commands, vec!["scroll_into_view", "click"]);
}

#[test]
fn scrolls_container_until_target_is_visible() {
    let row = MemoryNode {
        hidden_until_scrolls: Some(2),
        ..MemoryNode::new("ListItem", "Row 40")
    };
    let tree = MemoryTree::with_windows(vec![MemoryNode::new("Window", "Inbox")
        .activated()
        .with_child(MemoryNode::new("List", "Messages").with_child(row))]);
    let (controller, _) = controller(&tree, config());
    let options = ActionOptions::default().scroll_if_needed(
        Some(spec(json!({"pwa_control_type": "List"}))),
        ScrollDirection::Down,
    );
    let target = Target::spec(spec(json!({"pwa_title": "Inbox"})), spec(json!({"pwa_title": "Row 40"})));

    assert!(controller.run_action(&target, "click", &options).unwrap());
    let scrolls = tree.actions().iter().filter(|a| a.command == "scroll").count();
    assert_eq!(scrolls, 2);
}

#[test]
fn property_reads_cover_extras() {
    let tree = MemoryTree::with_windows(vec![MemoryNode::new("Window", "Settings").with_children(vec![
        MemoryNode {
            toggle_state: Some("On".to_string()),
            ..MemoryNode::new("CheckBox", "Wi-Fi")
        },
        MemoryNode {
            value: Some("42".to_string()),
            ..MemoryNode::new("Edit", "Volume")
        },
        MemoryNode::new("Group", "Network").with_children(vec![
            MemoryNode::new("Text", "Ethernet"),
            MemoryNode::new("Text", "VPN"),
        ]),
    ])]);
    let (controller, _) = controller(&tree, config());
    let window = spec(json!({"pwa_title": "Settings"}));
    let target = |title: &str| Target::spec(window.clone(), spec(json!({"pwa_title": title})));

    assert_eq!(
        controller.get_property(&target("Wi-Fi"), "is_toggled", None).unwrap(),
        Some(json!(true))
    );
    assert_eq!(
        controller.get_property(&target("Volume"), "value", None).unwrap(),
        Some(json!("42"))
    );
    assert_eq!(
        controller.get_property(&target("Network"), "texts", None).unwrap(),
        Some(json!(["Network", "Ethernet", "VPN"]))
    );
    assert_eq!(
        controller.get_property(&target("Network"), "pwa_control_type", None).unwrap(),
        Some(json!("Group"))
    );
    assert_eq!(controller.get_property(&target("Bluetooth"), "text", None).unwrap(), None);
    assert!(matches!(
        controller.get_property(&target("Volume"), "loudness", None),
        Err(AutomationError::InvalidArgument(_))
    ));
}

#[test]
fn existence_checks() {
    let tree = editor_tree(true);
    let (controller, _) = controller(&tree, config());
    let window = spec(json!({"pwa_title": ["icontains", "editor"]}));

    assert!(controller.check_exists(&editor_target(), None).unwrap());
    assert!(!controller
        .check_exists(&Target::spec(window.clone(), spec(json!({"pwa_title": "Print"}))), Some(Duration::from_millis(50)))
        .unwrap());
    // ambiguous
    assert!(!controller
        .check_exists(&Target::spec(window, spec(json!({"pwa_class_name": ""}))), Some(Duration::ZERO))
        .unwrap());

    let element = controller.find_element(&editor_target(), None).unwrap();
    assert!(controller.check_exists(&Target::from(element), None).unwrap());
}

#[test]
fn stale_element_targets_are_not_visible() {
    let tree = editor_tree(true);
    let (controller, _) = controller(&tree, config());
    let element = controller.find_element(&editor_target(), None).unwrap();

    tree.remove(tree.id_by_auto_id("textArea").unwrap()).unwrap();
    assert!(!controller.check_exists(&Target::from(element), None).unwrap());
}

#[test]
fn wait_for_state_sees_later_changes() {
    let tree = editor_tree(true);
    let (controller, _) = controller(&tree, config());
    let id = tree.id_by_auto_id("textArea").unwrap();
    let background = tree.clone();
    let writer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        background
            .update(id, |node| node.value = Some("saved".to_string()))
            .unwrap();
    });

    let reached = controller
        .wait_for_state(
            &editor_target(),
            &spec(json!({"uia_value": "saved"})),
            Some(Duration::from_secs(2)),
            Some(Duration::from_millis(20)),
        )
        .unwrap();
    writer.join().unwrap();
    assert!(reached);
}

#[test]
fn wait_for_state_times_out() {
    let tree = editor_tree(true);
    let (controller, notifier) = controller(&tree, config());
    let started = Instant::now();

    let reached = controller
        .wait_for_state(
            &editor_target(),
            &spec(json!({"state_is_enabled": false})),
            Some(Duration::from_millis(150)),
            Some(Duration::from_millis(30)),
        )
        .unwrap();

    assert!(!reached);
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(notifier.messages().last().unwrap().contains("did not reach"));
}

#[test]
fn stop_requests_propagate() {
    let tree = editor_tree(true);
    let state = AutomationState::new();
    let (controller, _) = controller(&tree, config());
    let controller = controller.with_state(state.clone());
    state.stop();

    assert!(matches!(
        controller.run_action(&editor_target(), "click", &ActionOptions::default()),
        Err(AutomationError::Stopped)
    ));
    assert!(matches!(
        controller.check_exists(&editor_target(), None),
        Err(AutomationError::Stopped)
    ));
    assert!(matches!(
        controller.get_property(&editor_target(), "text", None),
        Err(AutomationError::Stopped)
    ));
}

#[test]
fn next_state_reports_first_present_case() {
    let tree = editor_tree(true);
    let (controller, _) = controller(&tree, config());
    let cases = vec![
        StateCase::new("save_dialog", spec(json!({"pwa_title": "Save As"})), None),
        StateCase {
            name: "unnamed".to_string(),
            window: None,
            element: None,
        },
        StateCase::new(
            "editing",
            spec(json!({"pwa_title": ["icontains", "editor"]})),
            Some(spec(json!({"pwa_auto_id": "textArea"}))),
        ),
    ];

    assert_eq!(
        controller.get_next_state(&cases, None, None).unwrap().as_deref(),
        Some("editing")
    );
    assert_eq!(
        controller
            .get_next_state(&cases[..2], Some(Duration::from_millis(100)), None)
            .unwrap(),
        None
    );
}

#[test]
fn snapshots_skip_misses_and_heal_stale_entries() {
    let tree = editor_tree(true);
    let (controller, notifier) = controller(&tree, config());
    let window = spec(json!({"pwa_title": ["icontains", "editor"]}));
    let entries = vec![
        ("editor".to_string(), spec(json!({"pwa_auto_id": "textArea"}))),
        ("save".to_string(), spec(json!({"pwa_title": "Save"}))),
        ("print".to_string(), spec(json!({"pwa_title": "Print"}))),
    ];

    let mut snapshot = controller.create_snapshot("main", &window, &entries, None).unwrap();
    assert_eq!(snapshot.len(), 2);
    assert!(!snapshot.contains("print"));
    assert!(notifier
        .messages()
        .contains(&"Snapshot 'main': Found 2/3".to_string()));

    let old_id = tree.id_by_auto_id("textArea").unwrap();
    let new_id = tree.recreate(old_id).unwrap();
    let healed = snapshot.get("editor").unwrap();
    assert_eq!(healed.object_id(), tree.element(new_id).object_id());
    assert!(!tree.is_alive(old_id));

    let none = vec![("print".to_string(), spec(json!({"pwa_title": "Print"})))];
    assert!(matches!(
        controller.create_snapshot("empty", &window, &none, None),
        Err(AutomationError::ElementNotFound(_))
    ));
}

#[test]
fn snapshot_heal_uses_the_creation_timeout() {
    let tree = editor_tree(true);
    let (controller, _) = controller(&tree, config());
    let window = spec(json!({"pwa_title": ["icontains", "editor"]}));
    let entries = vec![("save".to_string(), spec(json!({"pwa_auto_id": "btnSave"})))];
    let mut snapshot = controller
        .create_snapshot("main", &window, &entries, Some(Duration::from_secs(10)))
        .unwrap();

    let window_id = tree.id_by_title("notes.txt - Editor").unwrap();
    tree.remove(tree.id_by_auto_id("btnSave").unwrap()).unwrap();
    let background = tree.clone();
    let rebuilder = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(1000));
        background
            .add_child(window_id, MemoryNode::new("Button", "Save").with_auto_id("btnSave"))
            .unwrap();
    });

    let healed = snapshot.get("save");
    rebuilder.join().unwrap();
    assert_eq!(healed.unwrap().name().unwrap(), "Save");
}

#[test]
fn reads_wait_for_the_operator_to_go_idle() {
    let tree = editor_tree(true);
    let (controller, notifier) = controller(&tree, config());
    let monitor = ActivityMonitor::with_poll_interval(Duration::from_millis(250), Duration::from_millis(10));
    let controller = controller.with_activity_monitor(monitor.clone());
    let pausing = "User activity detected! Pausing automation...".to_string();

    monitor.record_human_activity();
    let started = Instant::now();
    assert!(controller.check_exists(&editor_target(), None).unwrap());
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(notifier.messages().iter().filter(|m| **m == pausing).count(), 1);

    monitor.record_human_activity();
    let started = Instant::now();
    assert_eq!(
        controller.get_property(&editor_target(), "pwa_title", None).unwrap(),
        Some(json!("Text Editor"))
    );
    assert!(started.elapsed() >= Duration::from_millis(200));

    monitor.record_human_activity();
    let started = Instant::now();
    assert!(controller
        .wait_for_state(&editor_target(), &spec(json!({"state_is_enabled": true})), None, None)
        .unwrap());
    assert!(started.elapsed() >= Duration::from_millis(200));

    monitor.record_human_activity();
    let started = Instant::now();
    let cases = vec![StateCase::new("editing", spec(json!({"pwa_title": ["icontains", "editor"]})), None)];
    assert_eq!(
        controller.get_next_state(&cases, None, None).unwrap().as_deref(),
        Some("editing")
    );
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(notifier.messages().iter().filter(|m| **m == pausing).count(), 4);
}

#[test]
fn wait_for_state_holds_while_paused() {
    let tree = editor_tree(true);
    let state = AutomationState::new();
    let (controller, notifier) = controller(&tree, config());
    let controller = controller.with_state(state.clone());
    let element = controller.find_element(&editor_target(), None).unwrap();
    let id = tree.id_by_auto_id("textArea").unwrap();

    state.pause();
    let background = tree.clone();
    let resumer = state.clone();
    let worker = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(150));
        resumer.resume();
        std::thread::sleep(Duration::from_millis(550));
        background
            .update(id, |node| node.value = Some("saved".to_string()))
            .unwrap();
    });

    let reached = controller
        .wait_for_state(
            &Target::from(element),
            &spec(json!({"uia_value": "saved"})),
            Some(Duration::from_millis(400)),
            Some(Duration::from_millis(20)),
        )
        .unwrap();
    worker.join().unwrap();
    assert!(reached);
    assert!(notifier
        .messages()
        .contains(&"Task paused. Waiting for resume...".to_string()));

    state.stop();
    assert!(matches!(
        controller.wait_for_state(&editor_target(), &spec(json!({"uia_value": "saved"})), None, None),
        Err(AutomationError::Stopped)
    ));
}
