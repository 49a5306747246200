//! Declarative UI element resolution for desktop automation
//!
//! Windows and elements are described with specifications: property filters
//! with typed operators, positional relations, and selectors that sort and
//! pick among candidates. The engine resolves them against the platform's
//! accessibility tree under timeouts with cooperative pause and stop, and
//! keeps self-healing snapshots of elements found once.

pub mod action;
pub mod activity;
pub mod app;
pub mod config;
pub mod controller;
pub mod element;
pub mod errors;
pub mod finder;
pub mod locator;
pub mod notify;
pub mod platforms;
pub mod property;
pub mod resolver;
pub mod screenshot;
pub mod snapshot;
pub mod spec;
pub mod state;
pub mod suggest;
pub mod utils;

pub use action::{Action, Command};
pub use activity::ActivityMonitor;
pub use app::{AppManager, AttachPolicy};
pub use config::ControllerConfig;
pub use controller::{ActionOptions, StateCase, Target, UIController};
pub use element::{Rect, ScrollDirection, UIElement, UIElementImpl};
pub use errors::AutomationError;
pub use finder::{ElementFinder, FindOptions};
pub use locator::Locator;
pub use notify::{MemoryNotifier, Notifier, NotifyStyle, TracingNotifier};
pub use platforms::{create_engine, AccessibilityEngine, NativeFilter};
pub use property::{Property, ProcessInfoCache};
pub use resolver::{Resolver, Timing};
pub use snapshot::{Recipe, SnapshotCache, UISnapshot};
pub use spec::{Criterion, Operator, Specification};
pub use state::{AutomationState, RunState};
