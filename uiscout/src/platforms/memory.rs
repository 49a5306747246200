//! In-memory accessibility tree.
//!
//! Trees are described as nested [`MemoryNode`]s (usually loaded from JSON) and
//! can be mutated while searches run against them: titles change, nodes vanish
//! and reappear with new identities, windows get minimized. Every action
//! performed on an element is appended to an action log.

use crate::element::{PatternProperty, Rect, ScrollDirection, StateFlag, UIElement, UIElementImpl};
use crate::errors::AutomationError;
use crate::platforms::{walk_descendants, AccessibilityEngine, NativeFilter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

fn default_true() -> bool {
    true
}

/// Description of one node and its subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryNode {
    pub title: String,
    pub class_name: String,
    pub auto_id: String,
    pub control_type: String,
    pub framework_id: String,
    pub handle: Option<i64>,
    pub styles: Option<i64>,
    pub ex_styles: Option<i64>,
    pub pid: u32,
    pub thread_id: Option<u32>,
    pub rect: Rect,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub active: bool,
    pub minimized: bool,
    pub maximized: bool,
    pub focusable: bool,
    pub password: bool,
    pub offscreen: bool,
    pub labeled_by: Option<String>,
    pub value: Option<String>,
    pub toggle_state: Option<String>,
    pub expand_state: Option<String>,
    pub selection_items: Option<Vec<String>>,
    pub range_value: Option<Value>,
    pub grid_cell: Option<Value>,
    pub row_headers: Option<Vec<String>>,
    /// Stays invisible until this many scroll actions have hit the tree.
    pub hidden_until_scrolls: Option<u32>,
    pub children: Vec<MemoryNode>,
}

impl Default for MemoryNode {
    fn default() -> Self {
        Self {
            title: String::new(),
            class_name: String::new(),
            auto_id: String::new(),
            control_type: String::new(),
            framework_id: String::new(),
            handle: None,
            styles: None,
            ex_styles: None,
            pid: 0,
            thread_id: None,
            rect: Rect::default(),
            visible: true,
            enabled: true,
            active: false,
            minimized: false,
            maximized: false,
            focusable: false,
            password: false,
            offscreen: false,
            labeled_by: None,
            value: None,
            toggle_state: None,
            expand_state: None,
            selection_items: None,
            range_value: None,
            grid_cell: None,
            row_headers: None,
            hidden_until_scrolls: None,
            children: Vec::new(),
        }
    }
}

impl MemoryNode {
    pub fn new(control_type: &str, title: &str) -> Self {
        Self {
            control_type: control_type.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn with_auto_id(mut self, auto_id: &str) -> Self {
        self.auto_id = auto_id.to_string();
        self
    }

    pub fn with_class(mut self, class_name: &str) -> Self {
        self.class_name = class_name.to_string();
        self
    }

    pub fn with_rect(mut self, left: i32, top: i32, right: i32, bottom: i32) -> Self {
        self.rect = Rect::new(left, top, right, bottom);
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_handle(mut self, handle: i64) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Foreground window.
    pub fn activated(mut self) -> Self {
        self.active = true;
        self
    }

    pub fn with_child(mut self, child: MemoryNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = MemoryNode>) -> Self {
        self.children.extend(children);
        self
    }
}

/// One entry of the action log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub node: u64,
    pub title: String,
    pub command: String,
    pub argument: Option<String>,
}

#[derive(Debug)]
struct NodeData {
    parent: Option<u64>,
    children: Vec<u64>,
    props: MemoryNode,
}

#[derive(Debug)]
struct TreeState {
    nodes: HashMap<u64, NodeData>,
    root: u64,
    next_id: u64,
    scroll_count: u32,
    actions: Vec<ActionRecord>,
}

impl TreeState {
    fn insert(&mut self, parent: Option<u64>, mut node: MemoryNode) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let children = std::mem::take(&mut node.children);
        self.nodes.insert(
            id,
            NodeData {
                parent,
                children: Vec::new(),
                props: node,
            },
        );
        for child in children {
            let child_id = self.insert(Some(id), child);
            if let Some(data) = self.nodes.get_mut(&id) {
                data.children.push(child_id);
            }
        }
        id
    }

    fn remove_subtree(&mut self, id: u64) {
        if let Some(data) = self.nodes.remove(&id) {
            for child in data.children {
                self.remove_subtree(child);
            }
        }
    }

    fn node(&self, id: u64) -> Result<&NodeData, AutomationError> {
        self.nodes
            .get(&id)
            .ok_or_else(|| AutomationError::ElementNotFound(format!("memory node {id} no longer exists")))
    }

    fn node_mut(&mut self, id: u64) -> Result<&mut NodeData, AutomationError> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| AutomationError::ElementNotFound(format!("memory node {id} no longer exists")))
    }
}

/// Shared handle to a mutable in-memory tree.
#[derive(Debug, Clone)]
pub struct MemoryTree {
    state: Arc<RwLock<TreeState>>,
}

impl MemoryTree {
    /// Builds a tree whose root (the desktop) is `root`.
    pub fn new(root: MemoryNode) -> Self {
        let mut state = TreeState {
            nodes: HashMap::new(),
            root: 0,
            next_id: 0,
            scroll_count: 0,
            actions: Vec::new(),
        };
        state.root = state.insert(None, root);
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Desktop root with the given top-level windows.
    pub fn with_windows(windows: impl IntoIterator<Item = MemoryNode>) -> Self {
        Self::new(
            MemoryNode::new("Pane", "Desktop")
                .with_rect(0, 0, 1920, 1080)
                .with_children(windows),
        )
    }

    pub fn from_json(value: &Value) -> Result<Self, AutomationError> {
        let root: MemoryNode = serde_json::from_value(value.clone())?;
        Ok(Self::new(root))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, TreeState>, AutomationError> {
        self.state
            .read()
            .map_err(|_| AutomationError::Internal("memory tree lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, TreeState>, AutomationError> {
        self.state
            .write()
            .map_err(|_| AutomationError::Internal("memory tree lock poisoned".to_string()))
    }

    pub fn root_id(&self) -> u64 {
        self.read().map(|s| s.root).unwrap_or(0)
    }

    pub fn element(&self, id: u64) -> UIElement {
        UIElement::new(Box::new(MemoryElement {
            tree: self.clone(),
            id,
        }))
    }

    pub fn root(&self) -> UIElement {
        self.element(self.root_id())
    }

    /// Ids of all live nodes in pre-order.
    pub fn ids(&self) -> Vec<u64> {
        let Ok(state) = self.read() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut stack = vec![state.root];
        while let Some(id) = stack.pop() {
            if let Some(data) = state.nodes.get(&id) {
                out.push(id);
                stack.extend(data.children.iter().rev().copied());
            }
        }
        out
    }

    /// First node in pre-order whose properties satisfy `predicate`.
    pub fn find_id(&self, predicate: impl Fn(&MemoryNode) -> bool) -> Option<u64> {
        let ids = self.ids();
        let state = self.read().ok()?;
        ids.into_iter()
            .find(|id| state.nodes.get(id).map(|d| predicate(&d.props)).unwrap_or(false))
    }

    pub fn id_by_title(&self, title: &str) -> Option<u64> {
        self.find_id(|n| n.title == title)
    }

    pub fn id_by_auto_id(&self, auto_id: &str) -> Option<u64> {
        self.find_id(|n| n.auto_id == auto_id)
    }

    /// Snapshot of a node's current properties (children not included).
    pub fn props(&self, id: u64) -> Option<MemoryNode> {
        let state = self.read().ok()?;
        state.nodes.get(&id).map(|d| d.props.clone())
    }

    pub fn update(
        &self,
        id: u64,
        change: impl FnOnce(&mut MemoryNode),
    ) -> Result<(), AutomationError> {
        let mut state = self.write()?;
        change(&mut state.node_mut(id)?.props);
        Ok(())
    }

    /// Appends a subtree under `parent` and returns the new node's id.
    pub fn add_child(&self, parent: u64, node: MemoryNode) -> Result<u64, AutomationError> {
        let mut state = self.write()?;
        state.node(parent)?;
        let id = state.insert(Some(parent), node);
        state.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Removes a node and its subtree. Existing handles become stale.
    pub fn remove(&self, id: u64) -> Result<(), AutomationError> {
        let mut state = self.write()?;
        let parent = state.node(id)?.parent;
        if let Some(parent) = parent {
            if let Some(data) = state.nodes.get_mut(&parent) {
                data.children.retain(|c| *c != id);
            }
        }
        state.remove_subtree(id);
        Ok(())
    }

    /// Recreates a node in place with a new identity, as an application does
    /// when it rebuilds a control.
    pub fn recreate(&self, id: u64) -> Result<u64, AutomationError> {
        let mut state = self.write()?;
        let parent = state
            .node(id)?
            .parent
            .ok_or_else(|| AutomationError::InvalidArgument("cannot recreate the root".to_string()))?;
        let subtree = export_subtree(&state, id)?;
        let position = state
            .node(parent)?
            .children
            .iter()
            .position(|c| *c == id)
            .unwrap_or(0);
        state.remove_subtree(id);
        let new_id = state.insert(Some(parent), subtree);
        let siblings = &mut state.node_mut(parent)?.children;
        siblings.retain(|c| *c != id);
        siblings.insert(position.min(siblings.len()), new_id);
        Ok(new_id)
    }

    pub fn is_alive(&self, id: u64) -> bool {
        self.read().map(|s| s.nodes.contains_key(&id)).unwrap_or(false)
    }

    pub fn actions(&self) -> Vec<ActionRecord> {
        self.read().map(|s| s.actions.clone()).unwrap_or_default()
    }

    pub fn clear_actions(&self) {
        if let Ok(mut state) = self.write() {
            state.actions.clear();
        }
    }
}

fn export_subtree(state: &TreeState, id: u64) -> Result<MemoryNode, AutomationError> {
    let data = state.node(id)?;
    let mut node = data.props.clone();
    node.children = data
        .children
        .iter()
        .map(|child| export_subtree(state, *child))
        .collect::<Result<_, _>>()?;
    Ok(node)
}

/// Element handle into a [`MemoryTree`].
#[derive(Debug, Clone)]
pub struct MemoryElement {
    tree: MemoryTree,
    id: u64,
}

impl MemoryElement {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn with_props<T>(&self, read: impl FnOnce(&MemoryNode) -> T) -> Result<T, AutomationError> {
        let state = self.tree.read()?;
        Ok(read(&state.node(self.id)?.props))
    }

    fn perform(
        &self,
        command: &str,
        argument: Option<&str>,
        effect: impl FnOnce(&mut TreeState, u64) -> Result<(), AutomationError>,
    ) -> Result<(), AutomationError> {
        let mut state = self.tree.write()?;
        let node = state.node(self.id)?;
        if !node.props.enabled {
            return Err(AutomationError::ActionFailed(format!(
                "'{}' is disabled; cannot {command}",
                node.props.title
            )));
        }
        let title = node.props.title.clone();
        effect(&mut *state, self.id)?;
        debug!("memory action {command} on node {}", self.id);
        state.actions.push(ActionRecord {
            node: self.id,
            title,
            command: command.to_string(),
            argument: argument.map(str::to_string),
        });
        Ok(())
    }

    fn record(&self, command: &str, argument: Option<&str>) -> Result<(), AutomationError> {
        self.perform(command, argument, |_, _| Ok(()))
    }

    fn set_value(&self, command: &str, text: &str, append: bool) -> Result<(), AutomationError> {
        self.perform(command, Some(text), |state, id| {
            let props = &mut state.node_mut(id)?.props;
            let mut value = if append {
                props.value.clone().unwrap_or_default()
            } else {
                String::new()
            };
            value.push_str(text);
            props.value = Some(value);
            Ok(())
        })
    }
}

impl UIElementImpl for MemoryElement {
    fn object_id(&self) -> usize {
        let hash = blake3::hash(format!("memory:{}", self.id).as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes) as usize
    }

    fn name(&self) -> Result<String, AutomationError> {
        self.with_props(|p| p.title.clone())
    }

    fn class_name(&self) -> Result<String, AutomationError> {
        self.with_props(|p| p.class_name.clone())
    }

    fn automation_id(&self) -> Result<String, AutomationError> {
        self.with_props(|p| p.auto_id.clone())
    }

    fn control_type(&self) -> Result<String, AutomationError> {
        self.with_props(|p| p.control_type.clone())
    }

    fn framework_id(&self) -> Result<String, AutomationError> {
        self.with_props(|p| p.framework_id.clone())
    }

    fn native_handle(&self) -> Result<Option<i64>, AutomationError> {
        self.with_props(|p| p.handle)
    }

    fn window_styles(&self) -> Result<Option<(i64, i64)>, AutomationError> {
        self.with_props(|p| match (p.styles, p.ex_styles) {
            (None, None) => None,
            (style, ex_style) => Some((style.unwrap_or(0), ex_style.unwrap_or(0))),
        })
    }

    fn thread_id(&self) -> Result<Option<u32>, AutomationError> {
        self.with_props(|p| p.thread_id)
    }

    fn process_id(&self) -> Result<u32, AutomationError> {
        self.with_props(|p| p.pid)
    }

    fn bounds(&self) -> Result<Rect, AutomationError> {
        self.with_props(|p| p.rect)
    }

    fn state(&self, flag: StateFlag) -> Result<bool, AutomationError> {
        let state = self.tree.read()?;
        let props = &state.node(self.id)?.props;
        Ok(match flag {
            StateFlag::Visible => {
                props.visible
                    && props
                        .hidden_until_scrolls
                        .map_or(true, |needed| state.scroll_count >= needed)
            }
            StateFlag::Enabled => props.enabled,
            StateFlag::Active => props.active,
            StateFlag::Minimized => props.minimized,
            StateFlag::Maximized => props.maximized,
            StateFlag::Focusable => props.focusable,
            StateFlag::Password => props.password,
            StateFlag::Offscreen => props.offscreen,
            StateFlag::ContentElement | StateFlag::ControlElement => true,
        })
    }

    fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        let ids = {
            let state = self.tree.read()?;
            state.node(self.id)?.children.clone()
        };
        Ok(ids.into_iter().map(|id| self.tree.element(id)).collect())
    }

    fn parent(&self) -> Result<Option<UIElement>, AutomationError> {
        let parent = {
            let state = self.tree.read()?;
            state.node(self.id)?.parent
        };
        Ok(parent.map(|id| self.tree.element(id)))
    }

    fn labeled_by(&self) -> Result<Option<String>, AutomationError> {
        self.with_props(|p| p.labeled_by.clone())
    }

    fn pattern_value(&self, pattern: PatternProperty) -> Result<Option<Value>, AutomationError> {
        self.with_props(|p| match pattern {
            PatternProperty::Value => p.value.clone().map(Value::from),
            PatternProperty::ToggleState => p.toggle_state.clone().map(Value::from),
            PatternProperty::ExpandState => p.expand_state.clone().map(Value::from),
            PatternProperty::SelectionItems => p.selection_items.clone().map(Value::from),
            PatternProperty::RangeValueInfo => p.range_value.clone(),
            PatternProperty::GridCellInfo => p.grid_cell.clone(),
            PatternProperty::TableRowHeaders => p.row_headers.clone().map(Value::from),
        })
    }

    fn click(&self) -> Result<(), AutomationError> {
        self.record("click", None)
    }

    fn double_click(&self) -> Result<(), AutomationError> {
        self.record("double_click", None)
    }

    fn right_click(&self) -> Result<(), AutomationError> {
        self.record("right_click", None)
    }

    fn focus(&self) -> Result<(), AutomationError> {
        self.perform("focus", None, |state, id| {
            // Focusing a top-level window activates it and deactivates its siblings.
            let root = state.root;
            if state.node(id)?.parent == Some(root) {
                let siblings = state.node(root)?.children.clone();
                for sibling in siblings {
                    if let Some(data) = state.nodes.get_mut(&sibling) {
                        data.props.active = sibling == id;
                    }
                }
                state.node_mut(id)?.props.minimized = false;
            }
            Ok(())
        })
    }

    fn invoke(&self) -> Result<(), AutomationError> {
        self.record("invoke", None)
    }

    fn toggle(&self) -> Result<(), AutomationError> {
        self.perform("toggle", None, |state, id| {
            let props = &mut state.node_mut(id)?.props;
            let next = match props.toggle_state.as_deref() {
                Some("On") => "Off",
                _ => "On",
            };
            props.toggle_state = Some(next.to_string());
            Ok(())
        })
    }

    fn set_text(&self, text: &str) -> Result<(), AutomationError> {
        self.set_value("set_text", text, false)
    }

    fn type_keys(&self, keys: &str) -> Result<(), AutomationError> {
        self.set_value("type_keys", keys, true)
    }

    fn paste_text(&self, text: &str) -> Result<(), AutomationError> {
        self.set_value("paste_text", text, true)
    }

    fn send_message_text(&self, text: &str) -> Result<(), AutomationError> {
        if self.native_handle()?.is_none() {
            return Err(AutomationError::ActionFailed(
                "send_message_text requires a native window handle".to_string(),
            ));
        }
        self.set_value("send_message_text", text, false)
    }

    fn select(&self, item: &str) -> Result<(), AutomationError> {
        self.perform("select", Some(item), |state, id| {
            let props = &mut state.node_mut(id)?.props;
            if let Some(items) = &props.selection_items {
                if !items.iter().any(|i| i == item) {
                    return Err(AutomationError::ActionFailed(format!(
                        "Item '{item}' not found in selection list"
                    )));
                }
            }
            props.value = Some(item.to_string());
            Ok(())
        })
    }

    fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<(), AutomationError> {
        let argument = format!("{direction},{amount}");
        self.perform("scroll", Some(&argument), |state, _| {
            state.scroll_count += amount.max(1);
            Ok(())
        })
    }

    fn mouse_scroll(&self, direction: ScrollDirection) -> Result<(), AutomationError> {
        let argument = direction.to_string();
        self.perform("mouse_scroll", Some(&argument), |state, _| {
            state.scroll_count += 1;
            Ok(())
        })
    }

    fn scroll_into_view(&self) -> Result<(), AutomationError> {
        self.perform("scroll_into_view", None, |state, id| {
            state.node_mut(id)?.props.offscreen = false;
            Ok(())
        })
    }

    fn maximize(&self) -> Result<(), AutomationError> {
        self.perform("maximize", None, |state, id| {
            let props = &mut state.node_mut(id)?.props;
            props.maximized = true;
            props.minimized = false;
            props.active = true;
            Ok(())
        })
    }

    fn close(&self) -> Result<(), AutomationError> {
        self.perform("close", None, |state, id| {
            state.node_mut(id)?.props.visible = false;
            Ok(())
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl> {
        Box::new(self.clone())
    }
}

/// Engine over a [`MemoryTree`].
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    tree: MemoryTree,
}

impl MemoryEngine {
    pub fn new(tree: MemoryTree) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &MemoryTree {
        &self.tree
    }
}

impl AccessibilityEngine for MemoryEngine {
    fn root(&self) -> UIElement {
        self.tree.root()
    }

    fn is_desktop(&self, element: &UIElement) -> bool {
        element
            .as_any()
            .downcast_ref::<MemoryElement>()
            .map(|e| e.id == self.tree.root_id())
            .unwrap_or(false)
    }

    fn top_level_windows(&self, filter: &NativeFilter) -> Result<Vec<UIElement>, AutomationError> {
        Ok(self
            .tree
            .root()
            .children()?
            .into_iter()
            .filter(|w| w.is_visible() && filter.matches(w))
            .collect())
    }

    fn descendants(
        &self,
        root: &UIElement,
        max_depth: Option<usize>,
        filter: &NativeFilter,
    ) -> Result<Vec<UIElement>, AutomationError> {
        walk_descendants(root, max_depth, filter)
    }
}
