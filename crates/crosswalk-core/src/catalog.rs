//! Read-only catalog of frameworks and controls.
//!
//! The catalog is an external store as far as the mapping pipeline is
//! concerned: intake validates requests against it and the orchestrator
//! reads source and candidate controls from it. Mutation of the catalog
//! (framework/control CRUD) is a separate service surface and is not part
//! of this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::keys::{ControlKey, FrameworkKey};

/// A single compliance control within a framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    /// Full control key.
    pub control_key: ControlKey,
    /// Owning framework key.
    pub framework_key: FrameworkKey,
    /// Control ID within the framework.
    pub control_id: String,
    /// Short title.
    pub title: String,
    /// Full description text.
    pub description: String,
}

impl Control {
    /// Creates a control record, deriving the key fields from `control_key`.
    #[must_use]
    pub fn new(control_key: ControlKey, title: impl Into<String>, description: impl Into<String>) -> Self {
        let framework_key = control_key.framework_key();
        let control_id = control_key.control_id().to_string();
        Self {
            control_key,
            framework_key,
            control_id,
            title: title.into(),
            description: description.into(),
        }
    }

    /// Returns the text used for embedding and reasoning, preferring the
    /// description and falling back to the title.
    #[must_use]
    pub fn text(&self) -> &str {
        if self.description.is_empty() {
            &self.title
        } else {
            &self.description
        }
    }
}

/// A named, versioned compliance framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Framework {
    /// Full framework key.
    pub framework_key: FrameworkKey,
    /// Framework name segment.
    pub name: String,
    /// Version segment.
    pub version: String,
    /// Human-readable display name.
    pub display_name: String,
}

impl Framework {
    /// Creates a framework record, deriving name and version from the key.
    #[must_use]
    pub fn new(framework_key: FrameworkKey, display_name: impl Into<String>) -> Self {
        let name = framework_key.name().to_string();
        let version = framework_key.version().to_string();
        Self {
            framework_key,
            name,
            version,
            display_name: display_name.into(),
        }
    }
}

/// Read-only lookups over frameworks and controls.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` to support concurrent access from intake
/// handlers and orchestrator runs.
#[async_trait]
pub trait ControlCatalog: Send + Sync {
    /// Gets a control by its full key. Returns `None` when absent.
    async fn get_control(&self, key: &ControlKey) -> Result<Option<Control>>;

    /// Gets a framework by its key. Returns `None` when absent.
    async fn get_framework(&self, key: &FrameworkKey) -> Result<Option<Framework>>;

    /// Lists all controls of a framework. Empty when the framework has no
    /// controls or does not exist.
    async fn list_framework_controls(&self, key: &FrameworkKey) -> Result<Vec<Control>>;

    /// Lists the keys of all known frameworks.
    async fn list_framework_keys(&self) -> Result<Vec<FrameworkKey>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_text_prefers_description() {
        let key = ControlKey::parse("NIST-SP-800-53#R5#AC-1").unwrap();
        let full = Control::new(key.clone(), "Access Control Policy", "Develop and document...");
        assert_eq!(full.text(), "Develop and document...");

        let bare = Control::new(key, "Access Control Policy", "");
        assert_eq!(bare.text(), "Access Control Policy");
    }

    #[test]
    fn control_derives_key_fields() {
        let key = ControlKey::parse("AWS.EC2#1.0#PR.1").unwrap();
        let control = Control::new(key, "t", "d");
        assert_eq!(control.framework_key.as_str(), "AWS.EC2#1.0");
        assert_eq!(control.control_id, "PR.1");
    }

    #[test]
    fn framework_derives_name_and_version() {
        let key = FrameworkKey::parse("SOC2#2017").unwrap();
        let framework = Framework::new(key, "SOC 2 (2017 Trust Services Criteria)");
        assert_eq!(framework.name, "SOC2");
        assert_eq!(framework.version, "2017");
    }
}
