#![cfg(target_os = "windows")]

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uiscout::{ActionOptions, AppManager, AttachPolicy, ControllerConfig, Specification, UIController};

fn spec(value: serde_json::Value) -> Specification {
    Specification::from_value(&value).unwrap()
}

#[test]
#[ignore]
fn notepad_round_trip() {
    uiscout::utils::init_tracing("debug");
    let config = ControllerConfig {
        screenshots_enabled: false,
        ..ControllerConfig::default()
    };
    let controller = Arc::new(UIController::for_platform(config).expect("Failed to create controller"));
    let mut app = AppManager::new(
        "Notepad",
        "notepad.exe",
        spec(json!({"proc_name": "notepad.exe", "pwa_control_type": "Window"})),
        controller.clone(),
    );
    assert!(app.attach(AttachPolicy::LaunchNew, Some(Duration::from_secs(2))).unwrap());

    let editor = spec(json!({"pwa_control_type": ["in", ["Edit", "Document"]]}));
    assert!(app.run_action(&editor, "set_text:hello from uiscout", ActionOptions::default()).unwrap());
    let text = app.get_property(&editor, "value", None).unwrap();
    assert_eq!(text, Some(json!("hello from uiscout")));

    assert!(app.cache_snapshot("main", &[("editor".to_string(), editor)], None).unwrap());
    assert!(app.get_from_snapshot("main", "editor").is_some());

    app.kill();
    assert!(!app.is_running());
}
