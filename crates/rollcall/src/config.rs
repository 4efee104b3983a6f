//! Engine configuration.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RollcallError};

/// Actor recorded in provenance entries when the caller names none.
pub const DEFAULT_ACTOR: &str = "rollcall";

/// How far past the count of numbered records an inferred range may reach.
pub const DEFAULT_GAP_SLACK: u32 = 1000;

/// File name the CLI looks for inside a data directory.
pub const CONFIG_FILE_NAME: &str = "rollcall.json";

/// Identity resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Fields whose disagreement turns an identity match into a conflict.
    pub identity_fields: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            identity_fields: vec!["name".to_string()],
        }
    }
}

impl ResolverConfig {
    /// Create default resolver config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity-bearing fields.
    pub fn with_identity_fields(mut self, fields: Vec<String>) -> Self {
        self.identity_fields = fields;
        self
    }
}

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fields every placeholder carries, blank and tagged missing.
    pub semantic_fields: Vec<String>,

    /// Identity resolution settings.
    pub resolver: ResolverConfig,

    /// Actor for provenance entries when the caller names none.
    pub default_actor: String,

    /// Without a stored range, a section's range ends at its highest declared
    /// sequence no further than this past its count of numbered records.
    /// Anything beyond is reported out of range.
    pub gap_slack: u32,

    /// Section order applied when the engine opens. Known sections it leaves
    /// out follow it in their current order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_order: Option<Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            semantic_fields: ["name", "age", "gender", "relation_name", "address"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            resolver: ResolverConfig::default(),
            default_actor: DEFAULT_ACTOR.to_string(),
            gap_slack: DEFAULT_GAP_SLACK,
            section_order: None,
        }
    }
}

impl EngineConfig {
    /// Create default engine config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| RollcallError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: EngineConfig = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            RollcallError::Config(format!("Failed to parse '{}': {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject configurations the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.default_actor.trim().is_empty() {
            return Err(RollcallError::Config("default_actor must not be blank".to_string()));
        }
        if let Some(order) = &self.section_order {
            let mut seen = std::collections::HashSet::new();
            if let Some(dup) = order.iter().find(|s| !seen.insert(s.as_str())) {
                return Err(RollcallError::Config(format!(
                    "Section '{}' appears twice in section_order",
                    dup
                )));
            }
        }
        Ok(())
    }

    /// Set the placeholder field list.
    pub fn with_semantic_fields(mut self, fields: Vec<String>) -> Self {
        self.semantic_fields = fields;
        self
    }

    /// Set the resolver configuration.
    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the default actor.
    pub fn with_default_actor(mut self, actor: impl Into<String>) -> Self {
        self.default_actor = actor.into();
        self
    }

    /// Set how far an inferred range may reach past the numbered records.
    pub fn with_gap_slack(mut self, slack: u32) -> Self {
        self.gap_slack = slack;
        self
    }

    /// Set an explicit section order.
    pub fn with_section_order(mut self, order: Vec<String>) -> Self {
        self.section_order = Some(order);
        self
    }
}
