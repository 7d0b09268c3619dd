//! Shared vocabulary: execution methods, platforms and user context.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

pub use thinkmesh_vision::ComplexityLevel;

/// How a task is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMethod {
    /// Generated code run in a sandbox
    PureCode,
    /// Simulated UI interaction
    PureGui,
    /// Both paths concurrently, results synthesized
    HybridOptimal,
}

impl ExecutionMethod {
    pub const ALL: [ExecutionMethod; 3] = [Self::PureCode, Self::PureGui, Self::HybridOptimal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PureCode => "pure_code",
            Self::PureGui => "pure_gui",
            Self::HybridOptimal => "hybrid_optimal",
        }
    }

    /// Next method in the fallback rotation.
    pub fn rotate(&self) -> Self {
        match self {
            Self::PureCode => Self::PureGui,
            Self::PureGui => Self::HybridOptimal,
            Self::HybridOptimal => Self::PureCode,
        }
    }
}

impl fmt::Display for ExecutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pure_code" | "code" => Ok(Self::PureCode),
            "pure_gui" | "gui" => Ok(Self::PureGui),
            "hybrid_optimal" | "hybrid" => Ok(Self::HybridOptimal),
            _ => Err(format!("Unknown execution method: {}", s)),
        }
    }
}

/// Target device platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    Desktop,
    Mobile,
    Web,
    SmartTv,
    Android,
    Ios,
    Other(String),
}

/// Platform family used for scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformFamily {
    Desktop,
    Mobile,
    Web,
    SmartTv,
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Web => "web",
            Self::SmartTv => "smart_tv",
            Self::Android => "android",
            Self::Ios => "ios",
            Self::Other(name) => name,
        }
    }

    pub fn family(&self) -> PlatformFamily {
        match self {
            Self::Desktop => PlatformFamily::Desktop,
            Self::Mobile | Self::Android | Self::Ios => PlatformFamily::Mobile,
            Self::Web => PlatformFamily::Web,
            Self::SmartTv => PlatformFamily::SmartTv,
            Self::Other(_) => PlatformFamily::Unknown,
        }
    }

    /// Whether a declared device type describes this platform.
    pub fn matches_device(&self, device_type: &str) -> bool {
        let device = device_type.to_lowercase();
        if device == self.as_str() {
            return true;
        }
        match self.family() {
            PlatformFamily::Mobile => ["mobile", "phone", "tablet", "android", "ios"].contains(&device.as_str()),
            PlatformFamily::Desktop => ["desktop", "laptop", "pc", "computer"].contains(&device.as_str()),
            PlatformFamily::Web => ["web", "browser"].contains(&device.as_str()),
            PlatformFamily::SmartTv => ["tv", "smart_tv", "television"].contains(&device.as_str()),
            PlatformFamily::Unknown => false,
        }
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        match s.to_lowercase().replace('-', "_").as_str() {
            "desktop" => Self::Desktop,
            "mobile" => Self::Mobile,
            "web" => Self::Web,
            "smart_tv" | "tv" | "smarttv" => Self::SmartTv,
            "android" => Self::Android,
            "ios" => Self::Ios,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for Platform {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Platform> for String {
    fn from(p: Platform) -> Self {
        p.as_str().to_string()
    }
}

impl FromStr for Platform {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device the user is working on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub device_type: Option<String>,
    pub os: Option<String>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    /// touch, keyboard, mouse, remote, voice...
    pub input_methods: Vec<String>,
}

/// Who is asking and from where.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserContext {
    pub user_id: String,
    pub preferences: HashMap<String, String>,
    pub session_data: HashMap<String, String>,
    pub device_info: DeviceInfo,
    pub privacy_settings: HashMap<String, bool>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_info.device_type = Some(device_type.into());
        self
    }

    pub fn with_input_method(mut self, method: impl Into<String>) -> Self {
        self.device_info.input_methods.push(method.into());
        self
    }

    pub fn with_preference(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.preferences.insert(key.into(), value.into());
        self
    }

    pub fn with_session_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session_data.insert(key.into(), value.into());
        self
    }

    pub fn has_input_method(&self, method: &str) -> bool {
        self.device_info
            .input_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Stable short hash of the context, independent of map ordering.
    pub fn context_hash(&self) -> String {
        let preferences: BTreeMap<_, _> = self.preferences.iter().collect();
        let session: BTreeMap<_, _> = self.session_data.iter().collect();

        let mut hasher = Sha256::new();
        hasher.update(self.user_id.as_bytes());
        hasher.update(format!("{:?}", preferences).as_bytes());
        hasher.update(format!("{:?}", session).as_bytes());
        hasher.update(format!("{:?}", self.device_info).as_bytes());

        let digest = hasher.finalize();
        digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_round_trip_names() {
        for method in ExecutionMethod::ALL {
            assert_eq!(method.as_str().parse::<ExecutionMethod>().unwrap(), method);
        }
        assert_eq!(
            serde_json::to_string(&ExecutionMethod::PureGui).unwrap(),
            "\"pure_gui\""
        );
    }

    #[test]
    fn test_method_rotation_is_a_cycle() {
        assert_eq!(ExecutionMethod::PureCode.rotate(), ExecutionMethod::PureGui);
        assert_eq!(ExecutionMethod::PureGui.rotate(), ExecutionMethod::HybridOptimal);
        assert_eq!(ExecutionMethod::HybridOptimal.rotate(), ExecutionMethod::PureCode);
    }

    #[test]
    fn test_platform_parsing() {
        assert_eq!(Platform::from("mobile"), Platform::Mobile);
        assert_eq!(Platform::from("TV"), Platform::SmartTv);
        assert_eq!(Platform::from("smart-tv"), Platform::SmartTv);
        assert_eq!(Platform::from("watch"), Platform::Other("watch".into()));
        assert_eq!(Platform::Android.family(), PlatformFamily::Mobile);
    }

    #[test]
    fn test_platform_serde_as_string() {
        let json = serde_json::to_string(&Platform::SmartTv).unwrap();
        assert_eq!(json, "\"smart_tv\"");
        let parsed: Platform = serde_json::from_str("\"android\"").unwrap();
        assert_eq!(parsed, Platform::Android);
    }

    #[test]
    fn test_matches_device() {
        assert!(Platform::Mobile.matches_device("phone"));
        assert!(Platform::Android.matches_device("android"));
        assert!(!Platform::Desktop.matches_device("phone"));
        assert!(!Platform::Other("watch".into()).matches_device("phone"));
    }

    #[test]
    fn test_context_hash_stable_and_sensitive() {
        let a = UserContext::new("u1")
            .with_preference("theme", "dark")
            .with_preference("lang", "en");
        let b = UserContext::new("u1")
            .with_preference("lang", "en")
            .with_preference("theme", "dark");
        assert_eq!(a.context_hash(), b.context_hash());
        assert_eq!(a.context_hash().len(), 16);

        let c = a.clone().with_device_type("mobile");
        assert_ne!(a.context_hash(), c.context_hash());
    }
}
