//! Shared wizard context
//!
//! The context is the cumulative knowledge gained from executed steps. It is a
//! single ordered map from string keys to JSON values with three rules:
//!
//! - keys are only ever added or overwritten, never removed;
//! - readers must treat a missing key as "not yet established";
//! - [`Context::merge`] is shallow: a key present in the patch replaces the
//!   previous value wholesale, nested objects included.
//!
//! Well-known keys are addressed through [`ContextKey`]; steps that need their
//! own keys use [`Context::insert_extra`] and [`Context::extra`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Keys the built-in steps agree on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    EditorInstalled,
    EditorVersion,
    ToolchainInstalled,
    ToolchainVersion,
    SyncToolInstalled,
    SyncToolVersion,
    ExtensionInstalled,
    ProjectName,
    ProjectPath,
    PluginInstalled,
    ServerPort,
    ServerRunning,
    ServerReachable,
    StudioConnected,
}

impl ContextKey {
    /// Serialized key name
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKey::EditorInstalled => "editorInstalled",
            ContextKey::EditorVersion => "editorVersion",
            ContextKey::ToolchainInstalled => "toolchainInstalled",
            ContextKey::ToolchainVersion => "toolchainVersion",
            ContextKey::SyncToolInstalled => "syncToolInstalled",
            ContextKey::SyncToolVersion => "syncToolVersion",
            ContextKey::ExtensionInstalled => "extensionInstalled",
            ContextKey::ProjectName => "projectName",
            ContextKey::ProjectPath => "projectPath",
            ContextKey::PluginInstalled => "pluginInstalled",
            ContextKey::ServerPort => "serverPort",
            ContextKey::ServerRunning => "serverRunning",
            ContextKey::ServerReachable => "serverReachable",
            ContextKey::StudioConnected => "studioConnected",
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative key/value knowledge threaded through every step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: IndexMap<String, Value>,
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for step result data
    pub fn with(mut self, key: ContextKey, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder-style insert of a step-specific key
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_extra(key, value);
        self
    }

    /// Set a well-known key, replacing any previous value
    pub fn insert(&mut self, key: ContextKey, value: impl Into<Value>) {
        self.values.insert(key.as_str().to_string(), value.into());
    }

    /// Set an arbitrary key, replacing any previous value
    pub fn insert_extra(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Read a well-known key
    pub fn get(&self, key: ContextKey) -> Option<&Value> {
        self.values.get(key.as_str())
    }

    /// Read an arbitrary key
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Boolean flag; absent or non-boolean reads as `false`
    pub fn flag(&self, key: ContextKey) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// String value, if present and a string
    pub fn string(&self, key: ContextKey) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Port value, if present and in range
    pub fn port(&self, key: ContextKey) -> Option<u16> {
        self.get(key)
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
    }

    /// Whether a key has been established
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Shallow merge: every top-level key of `patch` replaces the existing value.
    /// Nested objects are replaced, not merged.
    pub fn merge(&mut self, patch: Context) {
        for (key, value) in patch.values {
            self.values.insert(key, value);
        }
    }

    /// Iterate keys and values in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_keys_read_as_not_established() {
        let ctx = Context::new();
        assert!(!ctx.flag(ContextKey::EditorInstalled));
        assert_eq!(ctx.string(ContextKey::ProjectPath), None);
        assert_eq!(ctx.port(ContextKey::ServerPort), None);
    }

    #[test]
    fn test_merge_replaces_nested_values() {
        let mut ctx = Context::new().with_extra("tool", json!({"name": "rojo", "version": "7.4.0"}));
        ctx.merge(Context::new().with_extra("tool", json!({"name": "rojo"})));

        assert_eq!(ctx.extra("tool"), Some(&json!({"name": "rojo"})));
    }

    #[test]
    fn test_merge_keeps_unrelated_keys() {
        let mut ctx = Context::new()
            .with(ContextKey::EditorInstalled, true)
            .with(ContextKey::ServerPort, 34872);
        ctx.merge(Context::new().with(ContextKey::ServerPort, 34873));

        assert!(ctx.flag(ContextKey::EditorInstalled));
        assert_eq!(ctx.port(ContextKey::ServerPort), Some(34873));
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_port_out_of_range_is_absent() {
        let ctx = Context::new().with(ContextKey::ServerPort, 70000);
        assert_eq!(ctx.port(ContextKey::ServerPort), None);
    }

    #[test]
    fn test_serializes_as_flat_object_in_insertion_order() {
        let ctx = Context::new()
            .with(ContextKey::SyncToolInstalled, true)
            .with_extra("a", 1)
            .with(ContextKey::EditorVersion, "1.90.0");

        let text = serde_json::to_string(&ctx).unwrap();
        assert_eq!(
            text,
            r#"{"syncToolInstalled":true,"a":1,"editorVersion":"1.90.0"}"#
        );

        let back: Context = serde_json::from_str(&text).unwrap();
        assert_eq!(back, ctx);
    }
}
