//! Engine configuration loading and validation

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::effector::EffectExpr;
use crate::error::{RbacError, Result};

/// Default bound on inheritance hops followed by `has_link`
pub const DEFAULT_MAX_HIERARCHY_LEVEL: usize = 10;

/// Default number of memoized domain-pattern match results
pub const DEFAULT_DOMAIN_CACHE_CAPACITY: usize = 100;

/// Complete engine configuration
///
/// ```toml
/// [role_manager]
/// max_hierarchy_level = 10
/// domain_cache_capacity = 100
///
/// [model]
/// request = ["sub", "dom", "obj", "act"]
/// policy = ["sub", "dom", "obj", "act", "eft"]
/// effect = "some(where (p.eft == allow))"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RbacConfig {
    #[serde(default)]
    pub role_manager: RoleManagerConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoleManagerConfig {
    #[serde(default = "default_max_hierarchy_level")]
    pub max_hierarchy_level: usize,
    #[serde(default = "default_domain_cache_capacity")]
    pub domain_cache_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Request token names, in request field order
    #[serde(default = "default_request_tokens")]
    pub request: Vec<String>,
    /// Policy token names, in rule field order. An `eft` token carries the rule effect.
    #[serde(default = "default_policy_tokens")]
    pub policy: Vec<String>,
    /// Effect combination expression
    #[serde(default = "default_effect")]
    pub effect: String,
}

impl Default for RoleManagerConfig {
    fn default() -> Self {
        Self {
            max_hierarchy_level: default_max_hierarchy_level(),
            domain_cache_capacity: default_domain_cache_capacity(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            request: default_request_tokens(),
            policy: default_policy_tokens(),
            effect: default_effect(),
        }
    }
}

impl RbacConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RbacConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| RbacError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.role_manager.max_hierarchy_level == 0 {
            return Err(RbacError::Config(
                "role_manager.max_hierarchy_level must be greater than 0".to_string(),
            ));
        }
        if self.role_manager.domain_cache_capacity == 0 {
            return Err(RbacError::Config(
                "role_manager.domain_cache_capacity must be greater than 0".to_string(),
            ));
        }
        if self.model.request.is_empty() {
            return Err(RbacError::Config("model.request must name at least one token".to_string()));
        }
        if self.model.policy.is_empty() {
            return Err(RbacError::Config("model.policy must name at least one token".to_string()));
        }
        self.model
            .effect
            .parse::<EffectExpr>()
            .map_err(|e| RbacError::Config(e.to_string()))?;
        Ok(())
    }
}

fn default_max_hierarchy_level() -> usize {
    DEFAULT_MAX_HIERARCHY_LEVEL
}

fn default_domain_cache_capacity() -> usize {
    DEFAULT_DOMAIN_CACHE_CAPACITY
}

fn default_request_tokens() -> Vec<String> {
    vec!["sub".to_string(), "obj".to_string(), "act".to_string()]
}

fn default_policy_tokens() -> Vec<String> {
    vec!["sub".to_string(), "obj".to_string(), "act".to_string()]
}

fn default_effect() -> String {
    "some(where (p.eft == allow))".to_string()
}
