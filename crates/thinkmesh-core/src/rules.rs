//! Versioned keyword rule tables.
//!
//! Every text classifier in the engine (task complexity, code-vs-UI
//! vocabulary, platform fit, voice intent, reasoning tiers, error classes,
//! task categories) is an ordered list of `(predicate, weight)` rules. Tables
//! are plain data: they serialize, carry a version, and can be tested on
//! their own.

use crate::types::PlatformFamily;
use serde::{Deserialize, Serialize};

/// Version of the built-in tables.
pub const RULES_VERSION: u32 = 1;

/// A condition on task text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Predicate {
    /// Any keyword appears as a word (simple inflections allowed) or any
    /// multi-word phrase appears verbatim
    ContainsAny(Vec<String>),
    /// Any string appears anywhere, no word boundaries
    SubstringAny(Vec<String>),
    WordCountAtMost(usize),
    WordCountAtLeast(usize),
    All(Vec<Predicate>),
}

/// Lowercased text with its word tokens.
#[derive(Debug, Clone)]
pub struct Normalized {
    lower: String,
    tokens: Vec<String>,
}

impl Normalized {
    pub fn new(text: &str) -> Self {
        let lower = text.to_lowercase();
        let tokens = lower
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self { lower, tokens }
    }

    pub fn word_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    fn has_keyword(&self, keyword: &str) -> bool {
        let keyword = keyword.to_lowercase();
        if keyword.contains(|c: char| !c.is_alphanumeric() && c != '_') {
            return self.lower.contains(&keyword);
        }
        self.tokens.iter().any(|t| token_matches(t, &keyword))
    }
}

fn token_matches(token: &str, keyword: &str) -> bool {
    if token == keyword {
        return true;
    }
    if ["s", "es", "ed", "d", "ing"]
        .iter()
        .any(|suffix| token.strip_suffix(suffix) == Some(keyword))
    {
        return true;
    }
    // type -> typing
    keyword
        .strip_suffix('e')
        .map(|stem| token.strip_suffix("ing") == Some(stem))
        .unwrap_or(false)
}

impl Predicate {
    pub fn any(words: &[&str]) -> Self {
        Self::ContainsAny(words.iter().map(|w| w.to_string()).collect())
    }

    pub fn substring(words: &[&str]) -> Self {
        Self::SubstringAny(words.iter().map(|w| w.to_string()).collect())
    }

    pub fn evaluate(&self, text: &Normalized) -> bool {
        match self {
            Self::ContainsAny(words) => words.iter().any(|w| text.has_keyword(w)),
            Self::SubstringAny(words) => words.iter().any(|w| text.lower.contains(&w.to_lowercase())),
            Self::WordCountAtMost(n) => text.word_count() <= *n,
            Self::WordCountAtLeast(n) => text.word_count() >= *n,
            Self::All(predicates) => predicates.iter().all(|p| p.evaluate(text)),
        }
    }
}

/// One weighted rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub predicate: Predicate,
    pub weight: f64,
}

impl Rule {
    pub fn new(name: impl Into<String>, predicate: Predicate, weight: f64) -> Self {
        Self {
            name: name.into(),
            predicate,
            weight,
        }
    }
}

/// An ordered, versioned list of rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    pub name: String,
    pub version: u32,
    pub rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            version: RULES_VERSION,
            rules,
        }
    }

    /// One rule of weight `weight` per keyword, so `score` counts hits.
    pub fn keywords(name: impl Into<String>, words: &[&str], weight: f64) -> Self {
        Self::new(
            name,
            words
                .iter()
                .map(|w| Rule::new(*w, Predicate::any(&[w]), weight))
                .collect(),
        )
    }

    /// Sum of the weights of all matching rules.
    pub fn score(&self, text: &str) -> f64 {
        let text = Normalized::new(text);
        self.rules
            .iter()
            .filter(|r| r.predicate.evaluate(&text))
            .map(|r| r.weight)
            .sum()
    }

    /// Names of all matching rules, in table order.
    pub fn matches(&self, text: &str) -> Vec<&str> {
        let text = Normalized::new(text);
        self.rules
            .iter()
            .filter(|r| r.predicate.evaluate(&text))
            .map(|r| r.name.as_str())
            .collect()
    }

    /// First matching rule, for classifiers.
    pub fn first_match(&self, text: &str) -> Option<&Rule> {
        let text = Normalized::new(text);
        self.rules.iter().find(|r| r.predicate.evaluate(&text))
    }
}

/// Signals of task complexity. Score is clamped to [0, 1] by the caller.
pub fn complexity_rules() -> RuleTable {
    RuleTable::new(
        "complexity",
        vec![
            Rule::new(
                "multi_step",
                Predicate::any(&["then", "after that", "followed by", "multiple", "steps", "workflow", "and also"]),
                0.3,
            ),
            Rule::new(
                "data_work",
                Predicate::any(&["calculate", "analyze", "process", "convert", "parse", "extract", "compare", "report", "summarize"]),
                0.25,
            ),
            Rule::new(
                "cross_app",
                Predicate::any(&["between", "across", "sync", "transfer", "integrate", "export", "import", "migrate"]),
                0.2,
            ),
            Rule::new(
                "conditional",
                Predicate::any(&["if", "unless", "otherwise", "until", "whenever"]),
                0.2,
            ),
            Rule::new("bulk", Predicate::any(&["all", "every", "each", "batch", "bulk"]), 0.15),
            Rule::new("medium_length", Predicate::WordCountAtLeast(6), 0.1),
            Rule::new("long_description", Predicate::WordCountAtLeast(12), 0.2),
            Rule::new(
                "single_primitive",
                Predicate::All(vec![
                    Predicate::WordCountAtMost(5),
                    Predicate::any(&["click", "tap", "open", "press", "select", "type", "close"]),
                ]),
                -0.2,
            ),
        ],
    )
}

/// Vocabulary pointing at a programmatic solution.
pub fn code_vocabulary() -> RuleTable {
    RuleTable::keywords(
        "code_vocabulary",
        &["calculate", "process", "analyze", "convert", "parse", "download", "upload", "file"],
        1.0,
    )
}

/// Vocabulary pointing at UI interaction.
pub fn gui_vocabulary() -> RuleTable {
    RuleTable::keywords(
        "gui_vocabulary",
        &["click", "type", "select", "navigate", "scroll", "button", "menu", "form"],
        1.0,
    )
}

/// Bonuses and penalties for how well a task's vocabulary fits a platform.
pub fn platform_rules(family: PlatformFamily) -> RuleTable {
    let rules = match family {
        PlatformFamily::Mobile => vec![
            Rule::new(
                "touch_vocabulary",
                Predicate::any(&["tap", "swipe", "touch", "gesture", "pinch", "app", "scroll", "notification"]),
                0.1,
            ),
            Rule::new(
                "mobile_ui",
                Predicate::any(&["button", "screen", "settings", "photo", "camera", "contact"]),
                0.05,
            ),
            Rule::new(
                "desktop_only",
                Predicate::any(&["ctrl", "alt", "terminal", "right-click", "right click", "window", "folder", "keyboard shortcut"]),
                -0.1,
            ),
        ],
        PlatformFamily::Desktop => vec![
            Rule::new(
                "keyboard_mouse_file",
                Predicate::any(&["click", "keyboard", "mouse", "file", "folder", "window", "shortcut", "ctrl", "menu", "desktop"]),
                0.1,
            ),
            Rule::new("touch_only", Predicate::any(&["swipe", "pinch", "gesture", "tap"]), -0.1),
        ],
        PlatformFamily::Web => vec![
            Rule::new(
                "browser_dom_form",
                Predicate::any(&["browser", "page", "link", "form", "url", "website", "tab", "submit", "search", "login"]),
                0.1,
            ),
            Rule::new("filesystem", Predicate::any(&["folder", "terminal", "file system"]), -0.05),
        ],
        PlatformFamily::SmartTv => vec![
            Rule::new(
                "remote_vocabulary",
                Predicate::any(&["remote", "channel", "volume", "watch", "stream", "play", "tv", "episode"]),
                0.15,
            ),
            Rule::new(
                "text_heavy",
                Predicate::any(&["type", "keyboard", "file", "download", "spreadsheet"]),
                -0.15,
            ),
        ],
        PlatformFamily::Unknown => vec![],
    };
    RuleTable::new("platform", rules)
}

/// Detects spoken commands.
pub fn voice_rules() -> RuleTable {
    RuleTable::new(
        "voice",
        vec![Rule::new(
            "voice_vocabulary",
            Predicate::any(&["voice", "say", "speak", "hey", "dictate", "voice command"]),
            1.0,
        )],
    )
}

/// Voice intent tiers, first match wins; no match means complex.
pub fn voice_intents() -> RuleTable {
    RuleTable::new(
        "voice_intents",
        vec![
            Rule::new(
                "navigation",
                Predicate::any(&["navigate", "go to", "go back", "home", "settings", "menu"]),
                1.0,
            ),
            Rule::new(
                "simple",
                Predicate::All(vec![
                    Predicate::WordCountAtMost(6),
                    Predicate::any(&["open", "call", "play", "stop", "pause", "start", "turn on", "turn off"]),
                ]),
                1.0,
            ),
        ],
    )
}

/// Confidence tiers parsed from free-text reasoning; weight is the tier value.
pub fn reasoning_tiers() -> RuleTable {
    RuleTable::new(
        "reasoning_tiers",
        vec![
            Rule::new(
                "very_high",
                Predicate::any(&["very high", "very confident", "certain", "definitely"]),
                0.95,
            ),
            Rule::new(
                "very_low",
                Predicate::any(&["very low", "very uncertain", "unlikely", "doubtful"]),
                0.2,
            ),
            Rule::new("high", Predicate::any(&["high", "confident", "likely"]), 0.85),
            Rule::new("low", Predicate::any(&["low", "uncertain", "unsure"]), 0.4),
            Rule::new("medium", Predicate::any(&["medium", "moderate", "possibly", "maybe"]), 0.6),
        ],
    )
}

/// Error classes by phrase, first match wins.
pub fn error_classes() -> RuleTable {
    RuleTable::new(
        "error_classes",
        vec![
            Rule::new(
                "element_not_found",
                Predicate::substring(&["element not found", "no such element", "element not visible"]),
                1.0,
            ),
            Rule::new("timeout", Predicate::substring(&["timeout", "timed out", "time limit"]), 1.0),
            Rule::new(
                "permission_denied",
                Predicate::substring(&["permission denied", "access denied", "unauthorized"]),
                1.0,
            ),
            Rule::new("network_error", Predicate::substring(&["network", "connection", "internet"]), 1.0),
            Rule::new(
                "ui_state_changed",
                Predicate::substring(&["state changed", "ui changed", "layout changed"]),
                1.0,
            ),
        ],
    )
}

/// Task categories for history keys, first match wins; no match is `general`.
pub fn task_categories() -> RuleTable {
    RuleTable::new(
        "task_categories",
        vec![
            Rule::new("navigation", Predicate::any(&["navigate", "go to", "open"]), 1.0),
            Rule::new("text_input", Predicate::any(&["type", "enter", "input"]), 1.0),
            Rule::new("selection", Predicate::any(&["select", "choose", "pick"]), 1.0),
            Rule::new("scrolling", Predicate::any(&["scroll", "swipe"]), 1.0),
        ],
    )
}

/// Category of a task, `general` when nothing matches.
pub fn categorize_task(task: &str) -> String {
    task_categories()
        .first_match(task)
        .map(|r| r.name.clone())
        .unwrap_or_else(|| "general".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_inflections() {
        let text = Normalized::new("Typing names and clicked buttons");
        assert!(Predicate::any(&["type"]).evaluate(&text));
        assert!(Predicate::any(&["click"]).evaluate(&text));
        assert!(Predicate::any(&["button"]).evaluate(&text));
        assert!(!Predicate::any(&["file"]).evaluate(&text));
    }

    #[test]
    fn test_keywords_respect_word_boundaries() {
        let text = Normalized::new("update your profile");
        assert!(!Predicate::any(&["file"]).evaluate(&text));
        assert!(Predicate::substring(&["file"]).evaluate(&text));
    }

    #[test]
    fn test_phrases_match_verbatim() {
        let text = Normalized::new("Go to Settings");
        assert!(Predicate::any(&["go to"]).evaluate(&text));
        assert!(!Predicate::any(&["go back"]).evaluate(&text));
    }

    #[test]
    fn test_word_count_predicates() {
        let text = Normalized::new("click the submit button");
        assert!(Predicate::WordCountAtMost(4).evaluate(&text));
        assert!(!Predicate::WordCountAtLeast(5).evaluate(&text));
        assert!(Predicate::All(vec![]).evaluate(&text));
    }

    #[test]
    fn test_keyword_table_counts_hits() {
        let table = code_vocabulary();
        assert_eq!(table.score("Download the file and parse it"), 3.0);
        assert_eq!(table.score("click the button"), 0.0);
        assert_eq!(table.matches("parse the file"), vec!["parse", "file"]);
    }

    #[test]
    fn test_complexity_scores() {
        let table = complexity_rules();
        assert!(table.score("Click the submit button") < 0.0);
        assert!(table.score("Download all invoices, then calculate totals and export them to the finance system") > 0.8);
    }

    #[test]
    fn test_error_classes_first_match() {
        let table = error_classes();
        assert_eq!(table.first_match("Element not found on screen").map(|r| r.name.as_str()), Some("element_not_found"));
        assert_eq!(table.first_match("Request timed out").map(|r| r.name.as_str()), Some("timeout"));
        assert_eq!(table.first_match("Connection reset").map(|r| r.name.as_str()), Some("network_error"));
        assert!(table.first_match("segfault").is_none());
    }

    #[test]
    fn test_reasoning_tier_order() {
        let table = reasoning_tiers();
        let tier = |s: &str| table.first_match(s).map(|r| r.weight);
        assert_eq!(tier("I am very confident this works"), Some(0.95));
        assert_eq!(tier("confidence is very low"), Some(0.2));
        assert_eq!(tier("this is unlikely to work"), Some(0.2));
        assert_eq!(tier("high confidence"), Some(0.85));
        assert_eq!(tier("I'm unsure"), Some(0.4));
        assert_eq!(tier("maybe"), Some(0.6));
        assert_eq!(tier("no idea"), None);
    }

    #[test]
    fn test_categorize_task() {
        assert_eq!(categorize_task("Open the mail app"), "navigation");
        assert_eq!(categorize_task("Type my address"), "text_input");
        assert_eq!(categorize_task("Pick a color"), "selection");
        assert_eq!(categorize_task("Swipe left"), "scrolling");
        assert_eq!(categorize_task("Calculate totals"), "general");
    }

    #[test]
    fn test_tables_serialize() {
        let json = serde_json::to_value(voice_rules()).unwrap();
        assert_eq!(json["version"], RULES_VERSION);
        assert_eq!(json["rules"][0]["predicate"]["kind"], "contains_any");
    }
}
