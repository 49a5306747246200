//! Lifecycle of one application: launch, attach, close, kill, plus window and
//! snapshot caching scoped to its main window.
//!
//! Any lifecycle change rebuilds the application's accessibility tree, so
//! `launch`, `attach`, `close` and `kill` drop every cached element.

use crate::controller::{ActionOptions, Target, UIController};
use crate::element::{StateFlag, UIElement};
use crate::errors::AutomationError;
use crate::notify::NotifyStyle;
use crate::property::Property;
use crate::spec::Specification;
use crate::snapshot::SnapshotCache;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::process::{Child, Command};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, error, info, warn};

pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_secs(3);
const ATTACH_POLL_INTERVAL: Duration = Duration::from_millis(500);
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(500);
const RELAUNCH_SETTLE: Duration = Duration::from_secs(1);

/// What `attach` does when several main windows match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachPolicy {
    #[default]
    Fail,
    Newest,
    Oldest,
    /// Kill every matching instance and launch a fresh one.
    Relaunch,
    LaunchNew,
}

impl FromStr for AttachPolicy {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(AttachPolicy::Fail),
            "newest" => Ok(AttachPolicy::Newest),
            "oldest" => Ok(AttachPolicy::Oldest),
            "relaunch" => Ok(AttachPolicy::Relaunch),
            "launch_new" => Ok(AttachPolicy::LaunchNew),
            other => Err(AutomationError::InvalidArgument(format!(
                "Unknown attach policy: '{other}'"
            ))),
        }
    }
}

impl fmt::Display for AttachPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttachPolicy::Fail => "fail",
            AttachPolicy::Newest => "newest",
            AttachPolicy::Oldest => "oldest",
            AttachPolicy::Relaunch => "relaunch",
            AttachPolicy::LaunchNew => "launch_new",
        })
    }
}

/// Splits a command line on whitespace, keeping double-quoted parts together.
fn split_command(command: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in command.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn executable_stem(name: &str) -> String {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name).to_lowercase();
    file.strip_suffix(".exe").map(str::to_string).unwrap_or(file)
}

/// Kills `pid` and all its descendants, deepest first. Returns how many
/// processes were signalled.
fn kill_process_tree(pid: u32) -> usize {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (child, process) in system.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*child);
        }
    }
    let mut order = Vec::new();
    let mut stack = vec![Pid::from_u32(pid)];
    while let Some(next) = stack.pop() {
        order.push(next);
        if let Some(kids) = children.get(&next) {
            stack.extend(kids.iter().copied());
        }
    }

    let mut killed = 0;
    for target in order.iter().rev() {
        if let Some(process) = system.process(*target) {
            if process.kill() {
                killed += 1;
            } else {
                warn!("Could not kill process {}", target);
            }
        }
    }
    killed
}

fn process_name(pid: u32) -> Option<String> {
    let mut system = System::new();
    let sys_pid = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
    system
        .process(sys_pid)
        .map(|p| p.name().to_string_lossy().to_string())
}

pub struct AppManager {
    name: String,
    command: String,
    main_window_spec: Specification,
    controller: Arc<UIController>,
    default_timeout: Duration,
    pid: Option<u32>,
    child: Option<Child>,
    cache: SnapshotCache,
}

impl AppManager {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        main_window_spec: Specification,
        controller: Arc<UIController>,
    ) -> Self {
        let default_timeout = controller.config().default_timeout;
        let name = name.into();
        info!("AppManager for '{}' initialized", name);
        Self {
            name,
            command: command.into(),
            main_window_spec,
            controller,
            default_timeout,
            pid: None,
            child: None,
            cache: SnapshotCache::new(),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn controller(&self) -> &Arc<UIController> {
        &self.controller
    }

    pub fn main_window_spec(&self) -> &Specification {
        &self.main_window_spec
    }

    pub fn snapshot_cache(&self) -> &SnapshotCache {
        &self.cache
    }

    fn emit(&self, message: &str, style: NotifyStyle) {
        self.controller.notifier().notify(&self.name, message, style);
    }

    /// Starts the application unless it is already running. With `wait_ready`
    /// the main window must appear within `timeout`, or the process is killed.
    pub fn launch(&mut self, wait_ready: bool, timeout: Option<Duration>) -> Result<bool, AutomationError> {
        self.clear_all_caches();
        let timeout = timeout.unwrap_or(self.default_timeout);
        if self.is_running() {
            self.emit(
                &format!("'{}' is already running (PID {:?}). Skipping launch.", self.name, self.pid),
                NotifyStyle::Info,
            );
            return Ok(true);
        }

        self.emit(&format!("Launching '{}'...", self.name), NotifyStyle::Process);
        let parts = split_command(&self.command);
        let Some((program, args)) = parts.split_first() else {
            return Err(AutomationError::InvalidArgument(format!(
                "'{}' has no command line to launch",
                self.name
            )));
        };
        let child = match Command::new(program).args(args).spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to launch '{}': {}", self.name, e);
                self.emit(&format!("Critical error launching '{}': {e}", self.name), NotifyStyle::Error);
                self.pid = None;
                return Ok(false);
            }
        };
        self.pid = Some(child.id());
        self.child = Some(child);
        info!("'{}' process started with PID {:?}", self.name, self.pid);

        if !wait_ready {
            return Ok(true);
        }
        if self.is_window_ready(Some(timeout))? {
            self.emit(&format!("'{}' launched successfully.", self.name), NotifyStyle::Success);
            Ok(true)
        } else {
            self.emit(
                &format!("'{}' window did not appear after {:.1}s.", self.name, timeout.as_secs_f64()),
                NotifyStyle::Error,
            );
            self.kill();
            Ok(false)
        }
    }

    /// Adopts a running instance found through the main window spec.
    pub fn attach(&mut self, policy: AttachPolicy, attach_timeout: Option<Duration>) -> Result<bool, AutomationError> {
        self.clear_all_caches();
        self.emit(
            &format!("Attempting to attach to '{}' (policy: {policy})...", self.name),
            NotifyStyle::Process,
        );
        if self.is_running() {
            self.emit(&format!("Already attached to '{}' (PID {:?}).", self.name, self.pid), NotifyStyle::Info);
            return Ok(true);
        }

        let attach_timeout = attach_timeout.unwrap_or(DEFAULT_ATTACH_TIMEOUT);
        let controller = self.controller.clone();
        let resolver = controller.resolver();
        let desktop = resolver.engine().root();
        let started = Instant::now();
        let mut candidates = Vec::new();
        while started.elapsed() < attach_timeout {
            candidates = resolver.find_all(&desktop, &self.main_window_spec)?;
            if !candidates.is_empty() {
                break;
            }
            std::thread::sleep(ATTACH_POLL_INTERVAL);
        }

        if candidates.is_empty() {
            self.emit(
                &format!("No instances of '{}' found after {:.1}s.", self.name, attach_timeout.as_secs_f64()),
                NotifyStyle::Warning,
            );
            if matches!(policy, AttachPolicy::Relaunch | AttachPolicy::LaunchNew) {
                info!("No instances found, launching as per policy '{}'", policy);
                return self.launch(true, None);
            }
            return Ok(false);
        }

        let target = if candidates.len() == 1 {
            candidates.remove(0)
        } else {
            warn!(
                "Found {} instances of '{}'. Applying policy '{}'",
                candidates.len(),
                self.name,
                policy
            );
            match policy {
                AttachPolicy::Fail => {
                    self.emit(&format!("Multiple '{}' windows found.", self.name), NotifyStyle::Error);
                    return Ok(false);
                }
                AttachPolicy::LaunchNew => return self.launch(true, None),
                AttachPolicy::Relaunch => {
                    self.emit("Closing conflicting windows...", NotifyStyle::Warning);
                    for window in &candidates {
                        match window.process_id() {
                            Ok(pid) => {
                                kill_process_tree(pid);
                            }
                            Err(e) => error!("No process for conflicting window: {}", e),
                        }
                    }
                    std::thread::sleep(RELAUNCH_SETTLE);
                    return self.launch(true, None);
                }
                AttachPolicy::Newest | AttachPolicy::Oldest => {
                    let finder = resolver.finder();
                    let created = |w: &UIElement| {
                        finder
                            .get_property(w, Property::ProcCreateTime)
                            .and_then(|v| v.as_str().map(str::to_string))
                            .unwrap_or_default()
                    };
                    candidates.sort_by_key(|w| created(w));
                    if policy == AttachPolicy::Newest {
                        candidates.reverse();
                    }
                    self.emit(&format!("Selected the {policy} window."), NotifyStyle::Info);
                    candidates.remove(0)
                }
            }
        };

        let pid = target.process_id()?;
        if process_name(pid).is_none() {
            self.emit(
                &format!("Window exists but process {pid} has disappeared."),
                NotifyStyle::Error,
            );
            return Ok(false);
        }
        self.pid = Some(pid);
        self.cache.set_window(target);
        self.emit(&format!("Successfully attached to '{}' (PID {pid}).", self.name), NotifyStyle::Success);
        Ok(true)
    }

    /// Closes the main window, killing the process if it stays visible.
    pub fn close(&mut self, timeout: Option<Duration>) -> Result<bool, AutomationError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        self.emit(&format!("Attempting to close '{}'...", self.name), NotifyStyle::Process);
        let Some(window) = self.get_window(Some(Duration::from_secs(1)))? else {
            self.emit(&format!("'{}' window not found to close.", self.name), NotifyStyle::Warning);
            self.clear_all_caches();
            return Ok(true);
        };
        if let Err(e) = window.close() {
            self.emit(&format!("Error closing '{}': {e}", self.name), NotifyStyle::Error);
            self.clear_all_caches();
            return Ok(false);
        }
        let deadline = Instant::now() + timeout;
        while window.is_visible() && Instant::now() < deadline {
            std::thread::sleep(CLOSE_POLL_INTERVAL);
        }
        if !window.is_visible() {
            self.emit(&format!("'{}' closed successfully.", self.name), NotifyStyle::Success);
            self.clear_all_caches();
            Ok(true)
        } else {
            self.emit(
                &format!("'{}' did not close after {:.1}s.", self.name, timeout.as_secs_f64()),
                NotifyStyle::Warning,
            );
            self.kill();
            Ok(false)
        }
    }

    /// Kills the process and its children.
    pub fn kill(&mut self) {
        self.clear_all_caches();
        let Some(pid) = self.pid.filter(|pid| process_name(*pid).is_some()) else {
            info!("'{}' is not running or its PID is unknown", self.name);
            self.pid = None;
            return;
        };
        self.emit(&format!("Force-closing '{}' (PID {pid})...", self.name), NotifyStyle::Warning);
        let killed = kill_process_tree(pid);
        debug!("Signalled {} process(es)", killed);
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.wait() {
                debug!("Could not reap launched process: {}", e);
            }
        }
        self.emit(&format!("Force-closed '{}'.", self.name), NotifyStyle::Success);
        self.pid = None;
    }

    /// Restores and focuses the main window.
    pub fn activate(&mut self, timeout: Option<Duration>) -> Result<bool, AutomationError> {
        self.emit(&format!("Activating '{}' window...", self.name), NotifyStyle::Process);
        let Some(window) = self.get_window(timeout)? else {
            self.emit(&format!("Could not activate '{}' window.", self.name), NotifyStyle::Error);
            return Ok(false);
        };
        let result = (|| {
            if window.state(StateFlag::Minimized)? {
                window.maximize()?;
            }
            window.focus()
        })();
        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                error!("Activation of '{}' failed: {}", self.name, e);
                Ok(false)
            }
        }
    }

    /// Whether the tracked process is alive and, with a command line set,
    /// still runs the expected executable.
    pub fn is_running(&self) -> bool {
        let Some(pid) = self.pid else { return false };
        let Some(running) = process_name(pid) else { return false };
        match split_command(&self.command).first() {
            Some(program) => executable_stem(&running) == executable_stem(program),
            None => true,
        }
    }

    pub fn is_window_ready(&mut self, timeout: Option<Duration>) -> Result<bool, AutomationError> {
        self.emit(&format!("Checking for '{}' window...", self.name), NotifyStyle::Process);
        let ready = self.get_window(timeout)?.is_some();
        if ready {
            self.emit(&format!("'{}' window is ready.", self.name), NotifyStyle::Success);
        } else {
            self.emit(&format!("Could not find '{}' window.", self.name), NotifyStyle::Warning);
        }
        Ok(ready)
    }

    /// The main window, from the cache while it stays visible.
    pub fn get_window(&mut self, timeout: Option<Duration>) -> Result<Option<UIElement>, AutomationError> {
        if let Some(window) = self.cache.window() {
            debug!("Returning cached window");
            return Ok(Some(window));
        }
        self.cache.clear_window();
        let timeout = timeout.unwrap_or(self.default_timeout);
        match self
            .controller
            .find_element(&Target::window(self.main_window_spec.clone()), Some(timeout))
        {
            Ok(window) => {
                if let Ok(pid) = window.process_id() {
                    self.pid = Some(pid);
                }
                self.cache.set_window(window.clone());
                Ok(Some(window))
            }
            Err(e) if e.is_resolution_failure() => {
                warn!("Could not get a unique window for '{}': {}", self.name, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_title(&mut self, timeout: Option<Duration>) -> Result<Option<String>, AutomationError> {
        Ok(match self.get_window(timeout)? {
            Some(window) => Some(window.name()?),
            None => None,
        })
    }

    fn require_window(&mut self, timeout: Option<Duration>) -> Result<UIElement, AutomationError> {
        self.get_window(timeout)?.ok_or_else(|| {
            AutomationError::WindowNotFound(format!("Main window for '{}' not found", self.name))
        })
    }

    pub fn find_element(&mut self, element_spec: &Specification, timeout: Option<Duration>) -> Result<UIElement, AutomationError> {
        let window = self.require_window(timeout)?;
        let timing = self.controller.timing(Some(timeout.unwrap_or(self.default_timeout)), None);
        self.controller.resolver().find_element(&window, element_spec, timing)
    }

    /// Runs an action inside the main window, activating it when needed.
    pub fn run_action(
        &self,
        element_spec: &Specification,
        action: &str,
        options: ActionOptions,
    ) -> Result<bool, AutomationError> {
        let mut options = options.auto_activate(true);
        options.timeout = options.timeout.or(Some(self.default_timeout));
        let target = Target::spec(self.main_window_spec.clone(), element_spec.clone());
        self.controller.run_action(&target, action, &options)
    }

    pub fn check_exists(&self, element_spec: &Specification, timeout: Option<Duration>) -> Result<bool, AutomationError> {
        let target = Target::spec(self.main_window_spec.clone(), element_spec.clone());
        self.controller
            .check_exists(&target, Some(timeout.unwrap_or(self.default_timeout)))
    }

    pub fn get_property(
        &self,
        element_spec: &Specification,
        property: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, AutomationError> {
        let target = Target::spec(self.main_window_spec.clone(), element_spec.clone());
        self.controller
            .get_property(&target, property, Some(timeout.unwrap_or(self.default_timeout)))
    }

    /// Snapshots elements of the main window under `name`. Returns whether
    /// anything was cached.
    pub fn cache_snapshot(
        &mut self,
        name: &str,
        elements: &[(String, Specification)],
        timeout: Option<Duration>,
    ) -> Result<bool, AutomationError> {
        self.emit(&format!("Caching snapshot '{name}' for '{}'...", self.name), NotifyStyle::Process);
        let window = self.require_window(timeout)?;
        let creation_timeout = timeout.unwrap_or(self.default_timeout);
        match self.controller.snapshot_window(name, &window, elements, creation_timeout) {
            Ok(snapshot) => {
                let count = snapshot.len();
                self.cache.insert(snapshot);
                self.emit(&format!("Snapshot '{name}' cached with {count} elements."), NotifyStyle::Success);
                Ok(true)
            }
            Err(AutomationError::Stopped) => Err(AutomationError::Stopped),
            Err(e) => {
                self.emit(&format!("Snapshot '{name}' found no elements: {e}"), NotifyStyle::Warning);
                Ok(false)
            }
        }
    }

    pub fn get_from_snapshot(&mut self, name: &str, key: &str) -> Option<UIElement> {
        if self.cache.snapshot(name).is_none() {
            warn!("Snapshot '{}' not found in cache. Use cache_snapshot first.", name);
            return None;
        }
        let element = self.cache.get(name, key);
        if element.is_none() {
            warn!("Element '{}' is missing or stale in snapshot '{}'", key, name);
        }
        element
    }

    pub fn clear_snapshot_cache(&mut self, name: Option<&str>) {
        self.cache.clear(name);
    }

    pub fn clear_window_cache(&mut self) {
        self.cache.clear_window();
    }

    pub fn clear_all_caches(&mut self) {
        self.cache.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_lines_split_on_unquoted_whitespace() {
        assert_eq!(
            split_command(r#""C:\Program Files\App\app.exe" --flag  value"#),
            vec![r"C:\Program Files\App\app.exe", "--flag", "value"]
        );
        assert!(split_command("   ").is_empty());
    }

    #[test]
    fn executable_names_compare_without_path_or_extension() {
        assert_eq!(executable_stem(r"C:\Windows\notepad.exe"), "notepad");
        assert_eq!(executable_stem("Notepad.EXE"), "notepad");
        assert_eq!(executable_stem("/usr/bin/sleep"), "sleep");
    }

    #[test]
    fn attach_policies_parse() {
        assert_eq!("launch_new".parse::<AttachPolicy>().unwrap(), AttachPolicy::LaunchNew);
        assert_eq!(AttachPolicy::default(), AttachPolicy::Fail);
        assert!("sometimes".parse::<AttachPolicy>().is_err());
    }
}
