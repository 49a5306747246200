//! The `command[:value]` action grammar.

use crate::element::{ScrollDirection, UIElement};
use crate::errors::AutomationError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Pause after bringing an element into view before pointer input.
const SCROLL_INTO_VIEW_SETTLE: Duration = Duration::from_millis(200);
const MASK: &str = "***";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Click,
    DoubleClick,
    RightClick,
    Focus,
    Invoke,
    Toggle,
    SetText,
    TypeKeys,
    PasteText,
    SendMessageText,
    Select,
    Scroll,
    MouseScroll,
}

impl Command {
    pub const ALL: [Command; 13] = [
        Command::Click,
        Command::DoubleClick,
        Command::RightClick,
        Command::Focus,
        Command::Invoke,
        Command::Toggle,
        Command::SetText,
        Command::TypeKeys,
        Command::PasteText,
        Command::SendMessageText,
        Command::Select,
        Command::Scroll,
        Command::MouseScroll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Click => "click",
            Command::DoubleClick => "double_click",
            Command::RightClick => "right_click",
            Command::Focus => "focus",
            Command::Invoke => "invoke",
            Command::Toggle => "toggle",
            Command::SetText => "set_text",
            Command::TypeKeys => "type_keys",
            Command::PasteText => "paste_text",
            Command::SendMessageText => "send_message_text",
            Command::Select => "select",
            Command::Scroll => "scroll",
            Command::MouseScroll => "mouse_scroll",
        }
    }

    pub fn from_name(name: &str) -> Option<Command> {
        let name = name.trim().to_lowercase();
        Command::ALL.into_iter().find(|c| c.as_str() == name)
    }

    pub fn requires_value(&self) -> bool {
        matches!(
            self,
            Command::SetText
                | Command::TypeKeys
                | Command::PasteText
                | Command::SendMessageText
                | Command::Select
                | Command::Scroll
        )
    }

    /// Commands that work on a window in the background.
    pub fn is_background_safe(&self) -> bool {
        matches!(self, Command::SendMessageText)
    }

    /// Commands whose value is masked in secure mode.
    pub fn is_sensitive(&self) -> bool {
        matches!(self, Command::SetText | Command::TypeKeys | Command::PasteText)
    }

    fn brings_into_view(&self) -> bool {
        matches!(
            self,
            Command::Click | Command::DoubleClick | Command::RightClick | Command::Select
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed action string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    command: Command,
    value: Option<String>,
}

impl Action {
    pub fn new(command: Command, value: Option<String>) -> Result<Self, AutomationError> {
        if command.requires_value() && value.is_none() {
            return Err(AutomationError::ActionFailed(format!(
                "Action '{command}' requires a value"
            )));
        }
        let action = Self { command, value };
        if command == Command::Scroll {
            action.scroll_args()?;
        }
        Ok(action)
    }

    /// Parses `command` or `command:value`. Only the first colon separates.
    pub fn parse(text: &str) -> Result<Self, AutomationError> {
        let (name, value) = match text.split_once(':') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (text, None),
        };
        let command = Command::from_name(name).ok_or_else(|| {
            AutomationError::InvalidArgument(format!("Unknown command: '{}'", name.trim()))
        })?;
        Self::new(command, value)
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Text for logs and notifications; sensitive values are masked when `secure`.
    pub fn display(&self, secure: bool) -> String {
        match &self.value {
            None => self.command.to_string(),
            Some(_) if secure && self.command.is_sensitive() => format!("{}:{MASK}", self.command),
            Some(value) => format!("{}:{value}", self.command),
        }
    }

    /// Direction and amount of a `scroll` or `mouse_scroll` action.
    pub fn scroll_args(&self) -> Result<(ScrollDirection, u32), AutomationError> {
        match self.command {
            Command::Scroll => parse_scroll(self.value.as_deref().unwrap_or_default()),
            Command::MouseScroll => match self.value.as_deref().map(str::trim) {
                None | Some("") => Ok((ScrollDirection::Down, 1)),
                Some(direction) => Ok((direction.parse()?, 1)),
            },
            other => Err(AutomationError::InvalidArgument(format!(
                "'{other}' is not a scroll action"
            ))),
        }
    }

    /// Performs the action on `element`.
    pub fn execute(&self, element: &UIElement) -> Result<(), AutomationError> {
        if self.command.brings_into_view() {
            match element.scroll_into_view() {
                Ok(()) => std::thread::sleep(SCROLL_INTO_VIEW_SETTLE),
                Err(e) => debug!("scroll_into_view skipped: {}", e),
            }
        }
        let value = self.value.as_deref().unwrap_or_default();
        match self.command {
            Command::Click => element.click(),
            Command::DoubleClick => element.double_click(),
            Command::RightClick => element.right_click(),
            Command::Focus => element.focus(),
            Command::Invoke => element.invoke(),
            Command::Toggle => element.toggle(),
            Command::SetText => element.set_text(value),
            Command::TypeKeys => element.type_keys(value),
            Command::PasteText => element.paste_text(value),
            Command::SendMessageText => element.send_message_text(value),
            Command::Select => element.select(value),
            Command::Scroll => {
                let (direction, amount) = self.scroll_args()?;
                element.scroll(direction, amount)
            }
            Command::MouseScroll => {
                let (direction, _) = self.scroll_args()?;
                element.mouse_scroll(direction)
            }
        }
    }
}

/// `direction[,amount]`, amount defaulting to 1.
fn parse_scroll(value: &str) -> Result<(ScrollDirection, u32), AutomationError> {
    let (direction, amount) = match value.split_once(',') {
        Some((direction, amount)) => {
            let amount = amount.trim().parse::<u32>().map_err(|_| {
                AutomationError::InvalidArgument(format!("Invalid scroll amount: '{}'", amount.trim()))
            })?;
            (direction, amount)
        }
        None => (value, 1),
    };
    Ok((direction.parse()?, amount))
}

impl FromStr for Action {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::parse(s)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display(false))
    }
}
