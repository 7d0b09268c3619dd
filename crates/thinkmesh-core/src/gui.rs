//! UI interaction: actions, the input driver seam, planning and safety.
//!
//! This module provides:
//! - `GuiAction`, one primitive UI step with its target
//! - The `InputDriver` capability that performs actions on a device
//! - `SimulatedDriver`, a recording driver that can be scripted to fail
//! - Planning a task description into an ordered action sequence
//! - A pre-flight safety check over whole sequences

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thinkmesh_vision::{CapabilityError, CapabilityResult, ElementType, FusedScreenAnalysis, ScreenElement};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Errors from the pre-flight safety check.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SafetyError {
    #[error("Action limit exceeded: {count} actions (max {max})")]
    ActionLimitExceeded { count: usize, max: usize },

    #[error("Blocked key combination: {0}")]
    BlockedKeys(String),
}

pub type SafetyResult<T> = std::result::Result<T, SafetyError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuiActionKind {
    Click,
    DoubleClick,
    RightClick,
    Type,
    KeyPress,
    Drag,
    Scroll,
    Wait,
    Screenshot,
    Verify,
    MoveTo,
    MouseDown,
    MouseUp,
}

impl GuiActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::DoubleClick => "double_click",
            Self::RightClick => "right_click",
            Self::Type => "type",
            Self::KeyPress => "key_press",
            Self::Drag => "drag",
            Self::Scroll => "scroll",
            Self::Wait => "wait",
            Self::Screenshot => "screenshot",
            Self::Verify => "verify",
            Self::MoveTo => "move_to",
            Self::MouseDown => "mouse_down",
            Self::MouseUp => "mouse_up",
        }
    }
}

impl fmt::Display for GuiActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an action lands, plus what we know about the element there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTarget {
    pub x: i32,
    pub y: i32,
    pub element_id: Option<String>,
    pub text: Option<String>,
    pub purpose: Option<String>,
    pub element_type: Option<ElementType>,
}

impl ActionTarget {
    pub fn point(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            element_id: None,
            text: None,
            purpose: None,
            element_type: None,
        }
    }

    pub fn from_element(element: &ScreenElement) -> Self {
        let (x, y) = element.center();
        Self {
            x,
            y,
            element_id: Some(element.id.clone()),
            text: element.text.clone(),
            purpose: element.purpose.clone(),
            element_type: Some(element.element_type),
        }
    }

    /// Lowercased words of text and purpose.
    pub fn keywords(&self) -> Vec<String> {
        self.text
            .iter()
            .chain(self.purpose.iter())
            .flat_map(|s| s.split(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect()
    }
}

/// One primitive UI step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuiAction {
    pub kind: GuiActionKind,
    pub target: Option<ActionTarget>,
    /// End point of a drag
    pub destination: Option<(i32, i32)>,
    /// Text to type, or the key combination to press
    pub text: Option<String>,
    /// Scroll amount, positive is up
    pub amount: Option<i32>,
    pub duration_ms: Option<u64>,
    pub description: String,
}

impl GuiAction {
    fn new(kind: GuiActionKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            target: None,
            destination: None,
            text: None,
            amount: None,
            duration_ms: None,
            description: description.into(),
        }
    }

    pub fn click(target: ActionTarget) -> Self {
        let description = format!("click at ({}, {})", target.x, target.y);
        Self::new(GuiActionKind::Click, description).with_target(target)
    }

    pub fn double_click(target: ActionTarget) -> Self {
        let description = format!("double click at ({}, {})", target.x, target.y);
        Self::new(GuiActionKind::DoubleClick, description).with_target(target)
    }

    pub fn right_click(target: ActionTarget) -> Self {
        let description = format!("right click at ({}, {})", target.x, target.y);
        Self::new(GuiActionKind::RightClick, description).with_target(target)
    }

    pub fn type_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut action = Self::new(GuiActionKind::Type, format!("type '{}'", text));
        action.text = Some(text);
        action
    }

    pub fn key_press(keys: impl Into<String>) -> Self {
        let keys = keys.into();
        let mut action = Self::new(GuiActionKind::KeyPress, format!("press {}", keys));
        action.text = Some(keys);
        action
    }

    pub fn drag(from: ActionTarget, to: (i32, i32)) -> Self {
        let description = format!("drag ({}, {}) to ({}, {})", from.x, from.y, to.0, to.1);
        let mut action = Self::new(GuiActionKind::Drag, description).with_target(from);
        action.destination = Some(to);
        action
    }

    pub fn scroll(amount: i32) -> Self {
        let mut action = Self::new(GuiActionKind::Scroll, format!("scroll {}", amount));
        action.amount = Some(amount);
        action
    }

    pub fn wait(duration_ms: u64) -> Self {
        let mut action = Self::new(GuiActionKind::Wait, format!("wait {}ms", duration_ms));
        action.duration_ms = Some(duration_ms);
        action
    }

    pub fn verify(description: impl Into<String>) -> Self {
        Self::new(GuiActionKind::Verify, description)
    }

    pub fn screenshot() -> Self {
        Self::new(GuiActionKind::Screenshot, "capture screen")
    }

    pub fn move_to(x: i32, y: i32) -> Self {
        Self::new(GuiActionKind::MoveTo, format!("move to ({}, {})", x, y)).with_target(ActionTarget::point(x, y))
    }

    pub fn mouse_down() -> Self {
        Self::new(GuiActionKind::MouseDown, "mouse down")
    }

    pub fn mouse_up() -> Self {
        Self::new(GuiActionKind::MouseUp, "mouse up")
    }

    pub fn with_target(mut self, target: ActionTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Target point, origin when untargeted.
    pub fn point(&self) -> (i32, i32) {
        self.target.as_ref().map(|t| (t.x, t.y)).unwrap_or((0, 0))
    }
}

/// Platform input backend.
#[async_trait]
pub trait InputDriver: Send + Sync {
    fn name(&self) -> &str;

    async fn click(&self, x: i32, y: i32) -> CapabilityResult<()>;

    async fn double_click(&self, x: i32, y: i32) -> CapabilityResult<()>;

    async fn right_click(&self, x: i32, y: i32) -> CapabilityResult<()>;

    async fn move_to(&self, x: i32, y: i32) -> CapabilityResult<()>;

    async fn mouse_down(&self) -> CapabilityResult<()>;

    async fn mouse_up(&self) -> CapabilityResult<()>;

    async fn type_text(&self, text: &str) -> CapabilityResult<()>;

    async fn key_press(&self, keys: &str) -> CapabilityResult<()>;

    async fn scroll(&self, amount: i32) -> CapabilityResult<()>;

    async fn drag(&self, from: (i32, i32), to: (i32, i32)) -> CapabilityResult<()> {
        self.move_to(from.0, from.1).await?;
        self.mouse_down().await?;
        self.move_to(to.0, to.1).await?;
        self.mouse_up().await
    }

    async fn wait(&self, duration: Duration) -> CapabilityResult<()> {
        tokio::time::sleep(duration).await;
        Ok(())
    }
}

/// Dispatch one action to a driver.
pub async fn perform(driver: &dyn InputDriver, action: &GuiAction) -> CapabilityResult<()> {
    let (x, y) = action.point();
    debug!(kind = %action.kind, x, y, driver = driver.name(), "Performing action");
    match action.kind {
        GuiActionKind::Click => driver.click(x, y).await,
        GuiActionKind::DoubleClick => driver.double_click(x, y).await,
        GuiActionKind::RightClick => driver.right_click(x, y).await,
        GuiActionKind::MoveTo => driver.move_to(x, y).await,
        GuiActionKind::MouseDown => driver.mouse_down().await,
        GuiActionKind::MouseUp => driver.mouse_up().await,
        GuiActionKind::Type => driver.type_text(action.text.as_deref().unwrap_or_default()).await,
        GuiActionKind::KeyPress => driver.key_press(action.text.as_deref().unwrap_or_default()).await,
        GuiActionKind::Scroll => driver.scroll(action.amount.unwrap_or(-3)).await,
        GuiActionKind::Drag => {
            let to = action
                .destination
                .ok_or_else(|| CapabilityError::Failed("drag without destination".to_string()))?;
            driver.drag((x, y), to).await
        }
        GuiActionKind::Wait => {
            driver
                .wait(Duration::from_millis(action.duration_ms.unwrap_or(1000)))
                .await
        }
        GuiActionKind::Screenshot | GuiActionKind::Verify => Ok(()),
    }
}

/// An action the simulated driver performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformedAction {
    pub kind: GuiActionKind,
    pub point: Option<(i32, i32)>,
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
struct FailureScript {
    remaining: Option<u32>,
    message: String,
}

/// Recording driver for dry runs and tests.
#[derive(Default)]
pub struct SimulatedDriver {
    performed: Mutex<Vec<PerformedAction>>,
    kind_failures: Mutex<HashMap<GuiActionKind, FailureScript>>,
    point_failures: Mutex<HashMap<(i32, i32), String>>,
    latency: Duration,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` actions of `kind` (every one when `None`).
    pub fn fail_on(mut self, kind: GuiActionKind, times: Option<u32>, message: impl Into<String>) -> Self {
        self.kind_failures.get_mut().insert(
            kind,
            FailureScript {
                remaining: times,
                message: message.into(),
            },
        );
        self
    }

    /// Fail every pointer action aimed at exactly this point.
    pub fn fail_at(mut self, x: i32, y: i32, message: impl Into<String>) -> Self {
        self.point_failures.get_mut().insert((x, y), message.into());
        self
    }

    /// Delay every action by `latency` before it takes effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn performed(&self) -> Vec<PerformedAction> {
        self.performed.lock().await.clone()
    }

    async fn record(&self, kind: GuiActionKind, point: Option<(i32, i32)>, text: Option<&str>) -> CapabilityResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(point) = point {
            if let Some(message) = self.point_failures.lock().await.get(&point) {
                return Err(CapabilityError::Failed(message.clone()));
            }
        }

        {
            let mut failures = self.kind_failures.lock().await;
            if let Some(script) = failures.get_mut(&kind) {
                match script.remaining {
                    None => return Err(CapabilityError::Failed(script.message.clone())),
                    Some(n) if n > 0 => {
                        script.remaining = Some(n - 1);
                        return Err(CapabilityError::Failed(script.message.clone()));
                    }
                    Some(_) => {}
                }
            }
        }

        self.performed.lock().await.push(PerformedAction {
            kind,
            point,
            text: text.map(str::to_string),
        });
        Ok(())
    }
}

#[async_trait]
impl InputDriver for SimulatedDriver {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn click(&self, x: i32, y: i32) -> CapabilityResult<()> {
        self.record(GuiActionKind::Click, Some((x, y)), None).await
    }

    async fn double_click(&self, x: i32, y: i32) -> CapabilityResult<()> {
        self.record(GuiActionKind::DoubleClick, Some((x, y)), None).await
    }

    async fn right_click(&self, x: i32, y: i32) -> CapabilityResult<()> {
        self.record(GuiActionKind::RightClick, Some((x, y)), None).await
    }

    async fn move_to(&self, x: i32, y: i32) -> CapabilityResult<()> {
        self.record(GuiActionKind::MoveTo, Some((x, y)), None).await
    }

    async fn mouse_down(&self) -> CapabilityResult<()> {
        self.record(GuiActionKind::MouseDown, None, None).await
    }

    async fn mouse_up(&self) -> CapabilityResult<()> {
        self.record(GuiActionKind::MouseUp, None, None).await
    }

    async fn type_text(&self, text: &str) -> CapabilityResult<()> {
        self.record(GuiActionKind::Type, None, Some(text)).await
    }

    async fn key_press(&self, keys: &str) -> CapabilityResult<()> {
        self.record(GuiActionKind::KeyPress, None, Some(keys)).await
    }

    async fn scroll(&self, amount: i32) -> CapabilityResult<()> {
        self.record(GuiActionKind::Scroll, None, Some(&amount.to_string())).await
    }

    async fn drag(&self, from: (i32, i32), to: (i32, i32)) -> CapabilityResult<()> {
        self.record(GuiActionKind::Drag, Some(from), Some(&format!("{},{}", to.0, to.1))).await
    }

    async fn wait(&self, duration: Duration) -> CapabilityResult<()> {
        self.record(GuiActionKind::Wait, None, Some(&duration.as_millis().to_string())).await
    }
}

fn normalize_keys(keys: &str) -> String {
    let mut parts: Vec<String> = keys
        .to_lowercase()
        .split('+')
        .map(|p| match p.trim() {
            "delete" => "del".to_string(),
            "control" => "ctrl".to_string(),
            "command" | "meta" => "cmd".to_string(),
            other => other.to_string(),
        })
        .collect();
    parts.sort();
    parts.join("+")
}

/// Rejects dangerous or oversized action sequences.
#[derive(Debug, Clone)]
pub struct SafetyChecker {
    blocked: Vec<String>,
    max_actions: usize,
}

impl SafetyChecker {
    pub fn new(blocked_keys: &[String], max_actions: usize) -> Self {
        Self {
            blocked: blocked_keys.iter().map(|k| normalize_keys(k)).collect(),
            max_actions,
        }
    }

    pub fn check(&self, actions: &[GuiAction]) -> SafetyResult<()> {
        if actions.len() > self.max_actions {
            return Err(SafetyError::ActionLimitExceeded {
                count: actions.len(),
                max: self.max_actions,
            });
        }

        for action in actions.iter().filter(|a| a.kind == GuiActionKind::KeyPress) {
            if let Some(keys) = &action.text {
                if self.blocked.contains(&normalize_keys(keys)) {
                    return Err(SafetyError::BlockedKeys(keys.clone()));
                }
            }
        }

        Ok(())
    }
}

const TARGET_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "on", "in", "at", "to", "button", "link", "icon", "field", "tab", "item", "option",
];

/// Quoted text in a clause, either quote style.
fn quoted(text: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let mut parts = text.splitn(3, quote);
        parts.next();
        if let (Some(inner), Some(_)) = (parts.next(), parts.next()) {
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }
    }
    None
}

/// Word naming the element a clause refers to.
fn target_word(clause: &str) -> Option<String> {
    if let Some(q) = quoted(clause) {
        return Some(q);
    }
    clause
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !TARGET_STOP_WORDS.contains(&w.as_str()))
        .last()
}

/// Best element for a word: keyword match first, then text containment.
pub fn match_element<'a>(screen: &'a FusedScreenAnalysis, word: &str) -> Option<&'a ScreenElement> {
    let word = word.to_lowercase();
    screen
        .elements
        .iter()
        .filter(|e| e.keywords().iter().any(|k| *k == word))
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .or_else(|| screen.find_by_text(&word))
}

pub(crate) fn clauses(task: &str) -> Vec<String> {
    task.split([',', ';'])
        .flat_map(|part| part.split(" then "))
        .map(|s| s.trim().trim_start_matches("and ").trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn has_word(clause: &str, words: &[&str]) -> bool {
    clause
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| words.iter().any(|k| w.eq_ignore_ascii_case(k)))
}

fn key_combo(clause: &str) -> Option<String> {
    clause
        .split_whitespace()
        .find(|w| w.contains('+'))
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '+').to_string())
}

/// Translate a task description into an ordered action sequence.
pub fn plan_actions(task: &str, screen: Option<&FusedScreenAnalysis>, default_target: (i32, i32)) -> Vec<GuiAction> {
    let resolve = |clause: &str| -> ActionTarget {
        target_word(clause)
            .and_then(|word| screen.and_then(|s| match_element(s, &word)))
            .map(ActionTarget::from_element)
            .unwrap_or_else(|| ActionTarget::point(default_target.0, default_target.1))
    };

    let mut actions = Vec::new();
    for clause in clauses(task) {
        let lower = clause.to_lowercase();

        if let Some(keys) = key_combo(&clause) {
            actions.push(GuiAction::key_press(keys));
        } else if lower.contains("double click") || lower.contains("double-click") {
            actions.push(GuiAction::double_click(resolve(&clause)));
        } else if lower.contains("right click") || lower.contains("right-click") {
            actions.push(GuiAction::right_click(resolve(&clause)));
        } else if has_word(&clause, &["drag"]) {
            let from = resolve(&clause);
            let to = (from.x + 100, from.y);
            actions.push(GuiAction::drag(from, to));
        } else if has_word(&clause, &["type", "enter", "input", "write"]) {
            let text = quoted(&clause).unwrap_or_else(|| {
                clause
                    .split_whitespace()
                    .skip_while(|w| !matches!(w.to_lowercase().as_str(), "type" | "enter" | "input" | "write"))
                    .skip(1)
                    .collect::<Vec<_>>()
                    .join(" ")
            });
            actions.push(GuiAction::type_text(text));
        } else if has_word(&clause, &["click", "tap", "press", "open", "select", "choose"]) {
            actions.push(GuiAction::click(resolve(&clause)));
        } else if has_word(&clause, &["scroll", "swipe"]) {
            let amount = if has_word(&clause, &["up"]) { 3 } else { -3 };
            actions.push(GuiAction::scroll(amount));
        } else if has_word(&clause, &["wait"]) {
            actions.push(GuiAction::wait(1000));
        } else if has_word(&clause, &["verify", "check", "confirm"]) {
            actions.push(GuiAction::verify(clause.clone()));
        }
    }

    if actions.is_empty() {
        actions.push(GuiAction::verify(task));
    }
    actions
}
