//! Manager configuration.
//!
//! The configuration tree deserializes from JSON (or anything serde can
//! read) and validates before any thread starts. Per-UDF configuration is
//! open-shape: everything next to `name` is captured verbatim and handed
//! to that UDF's initializer.

use crate::error::{FramePipeError, Result};
use crate::frame::{verify_encoding_level, EncodeType};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Default bound on the worker pool's pending-job queue.
pub const DEFAULT_MAX_JOBS: i64 = 20;

/// Default worker thread count.
pub const DEFAULT_MAX_WORKERS: usize = 4;

fn default_max_jobs() -> i64 {
    DEFAULT_MAX_JOBS
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

/// One UDF in the chain: its name plus whatever configuration the UDF
/// itself understands.
#[derive(Debug, Clone, Deserialize)]
pub struct UdfEntry {
    /// Loader name: dylib base name or scripted module path.
    pub name: String,
    /// Open-shape configuration forwarded to the UDF's initializer.
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

impl UdfEntry {
    /// The UDF's config as a JSON value.
    pub fn config_value(&self) -> Value {
        Value::Object(self.config.clone())
    }
}

/// Output encoding applied to each frame's primary plane before dispatch.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EncodingPolicy {
    #[serde(rename = "type")]
    pub encode_type: EncodeType,
    #[serde(default)]
    pub level: i64,
}

/// Full manager configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    /// Ordered UDF chain.
    pub udfs: Vec<UdfEntry>,
    /// Bound on pending jobs; negative means unlimited.
    #[serde(default = "default_max_jobs")]
    pub max_jobs: i64,
    /// Worker thread count.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Optional output encoding policy; a `none` policy is a no-op.
    #[serde(default)]
    pub encoding: Option<EncodingPolicy>,
}

impl ManagerConfig {
    /// Deserialize and validate a configuration from JSON.
    pub fn from_json(value: Value) -> Result<Self> {
        let config: Self =
            serde_json::from_value(value).map_err(|e| FramePipeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&contents).map_err(|e| {
            FramePipeError::Config(format!("{}: {e}", path.display()))
        })?;
        Self::from_json(value)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(FramePipeError::Config(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if let Some(policy) = &self.encoding {
            if !verify_encoding_level(policy.encode_type, policy.level) {
                return Err(FramePipeError::Config(format!(
                    "encoding level {} invalid for {}",
                    policy.level, policy.encode_type
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_applied() {
        let config = ManagerConfig::from_json(json!({
            "udfs": [{"name": "dummy"}]
        }))
        .unwrap();
        assert_eq!(config.max_jobs, DEFAULT_MAX_JOBS);
        assert_eq!(config.max_workers, DEFAULT_MAX_WORKERS);
        assert!(config.encoding.is_none());
    }

    #[test]
    fn test_udf_entry_captures_open_config() {
        let config = ManagerConfig::from_json(json!({
            "udfs": [{"name": "resize", "width": 640, "height": 480}]
        }))
        .unwrap();
        let entry = &config.udfs[0];
        assert_eq!(entry.name, "resize");
        assert_eq!(entry.config_value()["width"], json!(640));
        assert!(!entry.config.contains_key("name"));
    }

    #[test]
    fn test_encoding_policy_parsed() {
        let config = ManagerConfig::from_json(json!({
            "udfs": [],
            "encoding": {"type": "jpeg", "level": 85}
        }))
        .unwrap();
        let policy = config.encoding.unwrap();
        assert_eq!(policy.encode_type, EncodeType::Jpeg);
        assert_eq!(policy.level, 85);
    }

    #[test]
    fn test_invalid_encoding_policy_rejected() {
        let err = ManagerConfig::from_json(json!({
            "udfs": [],
            "encoding": {"type": "png", "level": 10}
        }));
        assert!(matches!(err, Err(FramePipeError::Config(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = ManagerConfig::from_json(json!({
            "udfs": [],
            "max_workers": 0
        }));
        assert!(matches!(err, Err(FramePipeError::Config(_))));
    }

    #[test]
    fn test_udfs_required() {
        let err = ManagerConfig::from_json(json!({"max_jobs": 5}));
        assert!(matches!(err, Err(FramePipeError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manager.json");
        std::fs::write(
            &path,
            r#"{"udfs": [{"name": "dummy"}], "max_workers": 2}"#,
        )
        .unwrap();

        let config = ManagerConfig::from_file(&path).unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.udfs[0].name, "dummy");

        let err = ManagerConfig::from_file(dir.path().join("missing.json"));
        assert!(matches!(err, Err(FramePipeError::Io(_))));
    }
}
