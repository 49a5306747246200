//! uiscout CLI
//!
//! Resolves window/element specifications against the desktop (or a captured
//! tree with `--tree`) and runs actions, reads and waits on the result.
//!
//! Usage:
//!   uiscout find --window '{"pwa_title": ["icontains", "notepad"]}' --element '{"pwa_control_type": "Edit"}'
//!   uiscout action --window spec.yaml --element edit.yaml type_keys:Hello --auto-activate
//!   uiscout windows
//!   uiscout --tree captured.json suggest --window '{"pwa_title": "Settings"}' --element '{"pwa_title": "OK"}'

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uiscout::platforms::memory::{MemoryEngine, MemoryTree};
use uiscout::suggest::{
    clean_element_spec, create_optimal_element_spec, create_optimal_window_spec, format_spec,
    get_all_properties,
};
use uiscout::{
    create_engine, AccessibilityEngine, ActionOptions, ControllerConfig, NativeFilter, Specification,
    StateCase, Target, UIController, UIElement,
};

#[derive(Parser)]
#[command(name = "uiscout")]
#[command(about = "Find, inspect and drive desktop UI elements with declarative specifications")]
struct Cli {
    /// Controller configuration file (JSON or YAML)
    #[clap(long, global = true, env = "UISCOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Resolve against a captured element tree (JSON) instead of the desktop
    #[clap(long, global = true)]
    tree: Option<PathBuf>,

    /// Resolution timeout in seconds
    #[clap(long, global = true)]
    timeout: Option<f64>,

    /// Seconds between retry attempts
    #[clap(long, global = true)]
    retry_interval: Option<f64>,

    /// Mask sensitive action values in logs and notifications
    #[clap(long, global = true)]
    secure: bool,

    #[clap(long, global = true, env = "UISCOUT_LOG_LEVEL")]
    log_level: Option<String>,

    #[clap(long, global = true, value_enum, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
#[clap(rename_all = "lower")]
enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Window specification: JSON text, or a .json/.yaml file
    #[clap(long, short = 'w')]
    window: String,

    /// Element specification inside the window
    #[clap(long, short = 'e')]
    element: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a target and print its properties
    Find {
        #[command(flatten)]
        target: TargetArgs,
        /// List every current match instead of requiring exactly one
        #[clap(long)]
        all: bool,
    },
    /// Exit with status 0 when the target resolves, 1 otherwise
    Exists {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Run an action such as `click` or `type_keys:Hello`
    Action {
        #[command(flatten)]
        target: TargetArgs,
        action: String,
        #[clap(long)]
        auto_activate: bool,
        /// Seconds to wait before acting
        #[clap(long, default_value_t = 0.0)]
        delay_before: f64,
        /// Seconds to wait after acting
        #[clap(long, default_value_t = 0.0)]
        delay_after: f64,
    },
    /// Read one property (or text, texts, value, is_toggled)
    Property {
        #[command(flatten)]
        target: TargetArgs,
        name: String,
    },
    /// Wait until the target's properties match a state specification
    Wait {
        #[command(flatten)]
        target: TargetArgs,
        /// State specification: JSON text or file
        #[clap(long, short = 's')]
        state: String,
    },
    /// Report which of several named targets appears first
    NextState {
        /// Map of case name to `{window, element}`: JSON text or file
        cases: String,
    },
    /// List top-level windows
    Windows,
    /// Print every property of a target and a summary of its children
    Inspect {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Suggest the shortest specifications identifying a target
    Suggest {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Deserialize)]
struct CaseArgs {
    window: Option<Value>,
    element: Option<Value>,
}

/// JSON text, or the contents of a `.json`, `.yaml` or `.yml` file.
fn read_value(input: &str) -> Result<Value> {
    let path = Path::new(input);
    if path.is_file() {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref(),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            return serde_yaml::from_str(&text).with_context(|| format!("parsing YAML in {}", path.display()));
        }
        return serde_json::from_str(&text).with_context(|| format!("parsing JSON in {}", path.display()));
    }
    serde_json::from_str(input).with_context(|| format!("'{input}' is neither a file nor valid JSON"))
}

fn read_spec(input: &str) -> Result<Specification> {
    let value = read_value(input)?;
    Ok(Specification::from_value(&value)?)
}

impl TargetArgs {
    fn target(&self) -> Result<Target> {
        let window = read_spec(&self.window)?;
        Ok(match &self.element {
            Some(element) => Target::spec(window, read_spec(element)?),
            None => Target::window(window),
        })
    }
}

fn load_config(cli: &Cli) -> Result<ControllerConfig> {
    let mut config = match &cli.config {
        Some(path) => ControllerConfig::from_file(path)?,
        None => ControllerConfig::default(),
    }
    .with_env_overrides();
    if let Some(timeout) = cli.timeout {
        config.default_timeout = Duration::try_from_secs_f64(timeout).context("invalid --timeout")?;
    }
    if let Some(interval) = cli.retry_interval {
        config.default_retry_interval = Duration::try_from_secs_f64(interval).context("invalid --retry-interval")?;
    }
    if cli.secure {
        config.secure_mode = true;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

fn build_engine(tree: Option<&Path>) -> Result<Arc<dyn AccessibilityEngine>> {
    match tree {
        Some(path) => {
            let value = read_value(&path.to_string_lossy())?;
            let tree = MemoryTree::from_json(&value)?;
            debug!("Loaded {} nodes from {}", tree.ids().len(), path.display());
            Ok(Arc::new(MemoryEngine::new(tree)))
        }
        None => Ok(create_engine()?),
    }
}

fn print(format: OutputFormat, value: &Value) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn properties(controller: &UIController, element: &UIElement) -> Map<String, Value> {
    get_all_properties(element, controller.resolver().finder().processes())
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(&cli)?;
    uiscout::utils::init_tracing(&config.log_level);
    let engine = build_engine(cli.tree.as_deref())?;
    let controller = UIController::new(engine, config);
    let format = cli.format;

    match &cli.command {
        Commands::Find { target, all } => {
            let target = target.target()?;
            let elements = match (&target, all) {
                (Target::Spec { window, element: Some(element) }, true) => {
                    let window = controller.resolver().find_window(window, controller.timing(None, None))?;
                    controller.resolver().find_all(&window, element)?
                }
                _ => vec![controller.find_element(&target, None)?],
            };
            let listed: Vec<Value> = elements
                .iter()
                .map(|e| Value::Object(properties(&controller, e)))
                .collect();
            print(format, &Value::Array(listed))?;
        }
        Commands::Exists { target } => {
            let exists = controller.check_exists(&target.target()?, None)?;
            println!("{exists}");
            return Ok(if exists { 0 } else { 1 });
        }
        Commands::Action {
            target,
            action,
            auto_activate,
            delay_before,
            delay_after,
        } => {
            let options = ActionOptions::default()
                .auto_activate(*auto_activate)
                .delays(
                    Duration::try_from_secs_f64(*delay_before).context("invalid --delay-before")?,
                    Duration::try_from_secs_f64(*delay_after).context("invalid --delay-after")?,
                );
            let ok = controller.run_action(&target.target()?, action, &options)?;
            return Ok(if ok { 0 } else { 1 });
        }
        Commands::Property { target, name } => {
            let value = controller.get_property(&target.target()?, name, None)?;
            print(format, &value.unwrap_or(Value::Null))?;
        }
        Commands::Wait { target, state } => {
            let state = read_spec(state)?;
            let reached = controller.wait_for_state(&target.target()?, &state, None, None)?;
            println!("{reached}");
            return Ok(if reached { 0 } else { 1 });
        }
        Commands::NextState { cases } => {
            let Value::Object(raw) = read_value(cases)? else {
                bail!("cases must be a map of name to {{window, element}}");
            };
            let mut parsed = Vec::new();
            for (name, case) in raw {
                let case: CaseArgs = serde_json::from_value(case).with_context(|| format!("case '{name}'"))?;
                parsed.push(StateCase {
                    name,
                    window: case.window.as_ref().map(Specification::from_value).transpose()?,
                    element: case.element.as_ref().map(Specification::from_value).transpose()?,
                });
            }
            match controller.get_next_state(&parsed, None, None)? {
                Some(name) => println!("{name}"),
                None => {
                    println!("none");
                    return Ok(1);
                }
            }
        }
        Commands::Windows => {
            let windows: Vec<Value> = controller
                .windows()?
                .iter()
                .map(|w| Value::Object(properties(&controller, w)))
                .collect();
            print(format, &Value::Array(windows))?;
        }
        Commands::Inspect { target } => {
            let element = controller.find_element(&target.target()?, None)?;
            let children: Vec<Value> = element
                .children()?
                .iter()
                .map(|child| {
                    serde_json::json!({
                        "pwa_title": child.name().unwrap_or_default(),
                        "pwa_control_type": child.control_type().unwrap_or_default(),
                    })
                })
                .collect();
            let mut report = properties(&controller, &element);
            report.insert("children".to_string(), Value::Array(children));
            print(format, &Value::Object(report))?;
        }
        Commands::Suggest { target } => {
            let target = target.target()?;
            let Target::Spec { window: window_spec, element } = &target else {
                bail!("suggest needs specifications");
            };
            let window = controller.resolver().find_window(window_spec, controller.timing(None, None))?;
            let window_props = properties(&controller, &window);
            let all_windows: Vec<Map<String, Value>> = controller
                .windows()?
                .iter()
                .map(|w| properties(&controller, w))
                .collect();
            println!("{}", format_spec(&create_optimal_window_spec(&window_props, &all_windows), "window_spec"));

            if let Some(element_spec) = element {
                let selected = controller
                    .resolver()
                    .find_element(&window, element_spec, controller.timing(None, None))?;
                let context: Vec<Map<String, Value>> = controller
                    .engine()
                    .descendants(&window, None, &NativeFilter::default())?
                    .iter()
                    .map(|e| properties(&controller, e))
                    .collect();
                let selected_props = properties(&controller, &selected);
                let optimal = create_optimal_element_spec(&selected_props, &context);
                let cleaned = clean_element_spec(&window_props, &optimal);
                println!("{}", format_spec(&cleaned, "element_spec"));
            }
        }
    }
    Ok(0)
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(2);
        }
    }
}
