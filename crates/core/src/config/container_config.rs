use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::validation::parse_flag;
use crate::config::{ConfigError, ConfigSource};

pub const ENV_FAILURE_POLICY: &str = "SCOPEWISE_FAILURE_POLICY";
pub const ENV_DISPOSAL_POLICY: &str = "SCOPEWISE_DISPOSAL_POLICY";
pub const ENV_DETECT_CYCLES: &str = "SCOPEWISE_DETECT_CYCLES";
pub const ENV_DISPOSE_ON_DROP: &str = "SCOPEWISE_DISPOSE_ON_DROP";
pub const ENV_MAX_SCOPE_DEPTH: &str = "SCOPEWISE_MAX_SCOPE_DEPTH";

/// What a lazy slot does after its factory failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Leave the slot empty; the next `resolve` runs the factory again
    #[default]
    Retry,
    /// Remember the failure; every later `resolve` of the slot fails without
    /// running the factory
    Poison,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Retry => "retry",
            FailurePolicy::Poison => "poison",
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "retry" => Ok(FailurePolicy::Retry),
            "poison" => Ok(FailurePolicy::Poison),
            _ => Err(ConfigError::invalid_value(
                "failure_policy",
                s,
                "retry or poison",
            )),
        }
    }
}

/// How a container drains its disposal stack when a release routine fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisposalPolicy {
    /// Stop at the first failure; entries below it are never released
    #[default]
    StopOnFirstFailure,
    /// Release every entry and report the first failure afterwards
    Continue,
}

impl DisposalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisposalPolicy::StopOnFirstFailure => "stop_on_first_failure",
            DisposalPolicy::Continue => "continue",
        }
    }
}

impl std::fmt::Display for DisposalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DisposalPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stop" | "stop_on_first_failure" => Ok(DisposalPolicy::StopOnFirstFailure),
            "continue" => Ok(DisposalPolicy::Continue),
            _ => Err(ConfigError::invalid_value(
                "disposal_policy",
                s,
                "stop_on_first_failure or continue",
            )),
        }
    }
}

const FIELDS: [&str; 5] = [
    "failure_policy",
    "disposal_policy",
    "detect_cycles",
    "dispose_on_drop",
    "max_scope_depth",
];

/// Runtime behaviour of every container in a tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerConfig {
    pub failure_policy: FailurePolicy,
    pub disposal_policy: DisposalPolicy,
    /// Fail re-entrant resolution of a key with `CyclicDependency`.
    ///
    /// With detection off, a scoped or singleton factory that resolves its own key
    /// blocks forever on its slot lock, and a transient one overflows the stack.
    pub detect_cycles: bool,
    /// Dispose a container that is dropped without an explicit `dispose`
    pub dispose_on_drop: bool,
    /// Deepest allowed scope nesting below the root, unlimited when `None`
    pub max_scope_depth: Option<usize>,
    /// Where each field was set; fields missing here hold their default
    #[serde(skip)]
    sources: HashMap<String, ConfigSource>,
}

impl PartialEq for ContainerConfig {
    fn eq(&self, other: &Self) -> bool {
        self.failure_policy == other.failure_policy
            && self.disposal_policy == other.disposal_policy
            && self.detect_cycles == other.detect_cycles
            && self.dispose_on_drop == other.dispose_on_drop
            && self.max_scope_depth == other.max_scope_depth
    }
}

impl Eq for ContainerConfig {}

impl ContainerConfig {
    pub fn new() -> Self {
        Self {
            failure_policy: FailurePolicy::Retry,
            disposal_policy: DisposalPolicy::StopOnFirstFailure,
            detect_cycles: true,
            dispose_on_drop: true,
            max_scope_depth: None,
            sources: HashMap::new(),
        }
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Ok(value) = env::var(ENV_FAILURE_POLICY) {
            config.failure_policy = value.parse()?;
            config.record_env("failure_policy", ENV_FAILURE_POLICY);
        }

        if let Ok(value) = env::var(ENV_DISPOSAL_POLICY) {
            config.disposal_policy = value.parse()?;
            config.record_env("disposal_policy", ENV_DISPOSAL_POLICY);
        }

        if let Ok(value) = env::var(ENV_DETECT_CYCLES) {
            config.detect_cycles = parse_flag("detect_cycles", &value)?;
            config.record_env("detect_cycles", ENV_DETECT_CYCLES);
        }

        if let Ok(value) = env::var(ENV_DISPOSE_ON_DROP) {
            config.dispose_on_drop = parse_flag("dispose_on_drop", &value)?;
            config.record_env("dispose_on_drop", ENV_DISPOSE_ON_DROP);
        }

        if let Ok(value) = env::var(ENV_MAX_SCOPE_DEPTH) {
            let depth = value.trim().parse().map_err(|_| {
                ConfigError::invalid_value("max_scope_depth", &value, "a positive integer")
            })?;
            config.max_scope_depth = Some(depth);
            config.record_env("max_scope_depth", ENV_MAX_SCOPE_DEPTH);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let document: serde_yaml::Value = serde_yaml::from_str(source)?;
        let keys: Vec<String> = document
            .as_mapping()
            .map(|mapping| {
                mapping
                    .keys()
                    .filter_map(|key| key.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let mut config: Self = serde_yaml::from_value(document)?;
        config.record_document(keys);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON document
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let document: serde_json::Value = serde_json::from_str(source)?;
        let keys: Vec<String> = document
            .as_object()
            .map(|object| object.keys().cloned().collect())
            .unwrap_or_default();

        let mut config: Self = serde_json::from_value(document)?;
        config.record_document(keys);
        config.validate()?;
        Ok(config)
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self.record_programmatic("failure_policy");
        self
    }

    pub fn with_disposal_policy(mut self, policy: DisposalPolicy) -> Self {
        self.disposal_policy = policy;
        self.record_programmatic("disposal_policy");
        self
    }

    pub fn with_cycle_detection(mut self, enabled: bool) -> Self {
        self.detect_cycles = enabled;
        self.record_programmatic("detect_cycles");
        self
    }

    pub fn with_dispose_on_drop(mut self, enabled: bool) -> Self {
        self.dispose_on_drop = enabled;
        self.record_programmatic("dispose_on_drop");
        self
    }

    pub fn with_max_scope_depth(mut self, depth: usize) -> Self {
        self.max_scope_depth = Some(depth);
        self.record_programmatic("max_scope_depth");
        self
    }

    fn record_env(&mut self, field: &str, var: &str) {
        self.sources
            .insert(field.to_string(), ConfigSource::EnvVar(var.to_string()));
    }

    fn record_programmatic(&mut self, field: &str) {
        self.sources
            .insert(field.to_string(), ConfigSource::Programmatic);
    }

    fn record_document(&mut self, keys: Vec<String>) {
        for key in keys {
            self.sources.insert(key, ConfigSource::Document);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_scope_depth == Some(0) {
            return Err(ConfigError::validation_failed(
                "max_scope_depth must be at least 1; leave it unset for unlimited nesting",
            ));
        }

        Ok(())
    }

    /// Report where each field's value came from.
    ///
    /// Fields assigned directly through their public field are not tracked and
    /// keep the source they had before.
    pub fn config_sources(&self) -> HashMap<String, ConfigSource> {
        FIELDS
            .into_iter()
            .map(|field| {
                let source = self
                    .sources
                    .get(field)
                    .cloned()
                    .unwrap_or_else(|| ConfigSource::Default(default_value(field)));
                (field.to_string(), source)
            })
            .collect()
    }
}

fn default_value(field: &str) -> String {
    match field {
        "failure_policy" => FailurePolicy::default().to_string(),
        "disposal_policy" => DisposalPolicy::default().to_string(),
        "max_scope_depth" => "unlimited".to_string(),
        _ => "true".to_string(),
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            ENV_FAILURE_POLICY,
            ENV_DISPOSAL_POLICY,
            ENV_DETECT_CYCLES,
            ENV_DISPOSE_ON_DROP,
            ENV_MAX_SCOPE_DEPTH,
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Retry".parse::<FailurePolicy>().unwrap(), FailurePolicy::Retry);
        assert_eq!("poison".parse::<FailurePolicy>().unwrap(), FailurePolicy::Poison);
        assert!("never".parse::<FailurePolicy>().is_err());

        assert_eq!(
            "stop".parse::<DisposalPolicy>().unwrap(),
            DisposalPolicy::StopOnFirstFailure
        );
        assert_eq!(
            "continue".parse::<DisposalPolicy>().unwrap(),
            DisposalPolicy::Continue
        );
        assert_eq!(DisposalPolicy::Continue.to_string(), "continue");
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = ContainerConfig::from_env().unwrap();
        assert_eq!(config, ContainerConfig::default());
        assert!(config.config_sources()["detect_cycles"].is_default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var(ENV_FAILURE_POLICY, "poison");
        env::set_var(ENV_DISPOSAL_POLICY, "continue");
        env::set_var(ENV_DETECT_CYCLES, "off");
        env::set_var(ENV_MAX_SCOPE_DEPTH, "4");

        let config = ContainerConfig::from_env().unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::Poison);
        assert_eq!(config.disposal_policy, DisposalPolicy::Continue);
        assert!(!config.detect_cycles);
        assert!(config.dispose_on_drop);
        assert_eq!(config.max_scope_depth, Some(4));
        let sources = config.config_sources();
        assert_eq!(
            sources["failure_policy"],
            ConfigSource::EnvVar(ENV_FAILURE_POLICY.to_string())
        );
        assert!(sources["max_scope_depth"].is_env_var());
        assert!(sources["dispose_on_drop"].is_default());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_values() {
        clear_env();
        env::set_var(ENV_MAX_SCOPE_DEPTH, "deep");
        assert!(matches!(
            ContainerConfig::from_env(),
            Err(ConfigError::InvalidValue { .. })
        ));

        env::set_var(ENV_MAX_SCOPE_DEPTH, "0");
        assert!(matches!(
            ContainerConfig::from_env(),
            Err(ConfigError::ValidationFailed { .. })
        ));

        clear_env();
    }

    #[test]
    fn test_from_yaml() {
        let config = ContainerConfig::from_yaml_str(
            "failure_policy: poison\ndisposal_policy: continue\nmax_scope_depth: 8\n",
        )
        .unwrap();

        assert_eq!(config.failure_policy, FailurePolicy::Poison);
        assert_eq!(config.disposal_policy, DisposalPolicy::Continue);
        assert!(config.detect_cycles);
        assert_eq!(config.max_scope_depth, Some(8));
    }

    #[test]
    fn test_from_json() {
        let config =
            ContainerConfig::from_json_str(r#"{"detect_cycles": false, "dispose_on_drop": false}"#)
                .unwrap();
        assert!(!config.detect_cycles);
        assert!(!config.dispose_on_drop);
        assert_eq!(config.failure_policy, FailurePolicy::Retry);

        assert!(matches!(
            ContainerConfig::from_json_str(r#"{"unknown": 1}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_document_sources() {
        let yaml = ContainerConfig::from_yaml_str("failure_policy: poison\n").unwrap();
        let sources = yaml.config_sources();
        assert_eq!(sources["failure_policy"], ConfigSource::Document);
        assert_eq!(sources["disposal_policy"], ConfigSource::Default("stop_on_first_failure".to_string()));

        let json = ContainerConfig::from_json_str(r#"{"max_scope_depth": 3}"#).unwrap();
        let sources = json.config_sources();
        assert_eq!(sources["max_scope_depth"], ConfigSource::Document);
        assert!(sources["failure_policy"].is_default());
    }

    #[test]
    #[serial]
    fn test_programmatic_sources_ignore_environment() {
        clear_env();
        env::set_var(ENV_DETECT_CYCLES, "off");

        let config = ContainerConfig::new().with_dispose_on_drop(false);
        let sources = config.config_sources();
        assert_eq!(sources["dispose_on_drop"], ConfigSource::Programmatic);
        assert!(sources["detect_cycles"].is_default());
        assert_eq!(config, ContainerConfig::default().with_dispose_on_drop(false));

        clear_env();
    }
}
