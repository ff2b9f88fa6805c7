use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How write-back treats a value that cannot be converted to its column's kind.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoercionPolicy {
    /// Keep the raw input and report a warning.
    #[default]
    Lenient,
    /// Refuse to save.
    Strict,
}

impl std::str::FromStr for CoercionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(CoercionPolicy::Lenient),
            "strict" => Ok(CoercionPolicy::Strict),
            other => Err(format!("unknown coercion policy: {}", other)),
        }
    }
}

pub const DEFAULT_FALLBACK_TABLES: &[&str] = &[
    "blog_posts",
    "bookings",
    "clients",
    "jobs",
    "messages",
    "services",
    "settings",
    "testimonials",
];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExplorerConfig {
    pub page_size: u64,
    pub json_policy: CoercionPolicy,
    /// Offered when neither introspection nor the table-name listing is available.
    pub fallback_tables: Vec<String>,
    /// Text columns whose name contains one of these get a multi-line editor.
    pub long_text_markers: Vec<String>,
    pub schema: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            json_policy: CoercionPolicy::Lenient,
            fallback_tables: DEFAULT_FALLBACK_TABLES.iter().map(|t| t.to_string()).collect(),
            long_text_markers: vec!["content".to_string()],
            schema: "public".to_string(),
        }
    }
}

impl ExplorerConfig {
    /// Reads the config file if it exists, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self, String> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
            serde_json::from_str(&content).map_err(|e| e.to_string())?
        } else {
            ExplorerConfig::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, content).map_err(|e| e.to_string())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), String> {
        if let Some(size) = var("EXPLORER_PAGE_SIZE") {
            self.page_size = size
                .trim()
                .parse()
                .map_err(|_| format!("EXPLORER_PAGE_SIZE is not a number: {}", size))?;
        }
        if let Some(policy) = var("EXPLORER_JSON_POLICY") {
            self.json_policy = policy.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("page_size must be greater than zero".to_string());
        }
        Ok(())
    }
}
