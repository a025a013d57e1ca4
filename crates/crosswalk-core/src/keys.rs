//! Composite keys for frameworks, controls, and mappings.
//!
//! All keys in crosswalk are:
//! - **Validated on construction**: A held key is always well-formed
//! - **Canonical**: The same logical entity always yields the same string
//! - **Plain strings on the wire**: Serialized transparently for storage
//!   and HTTP payloads
//!
//! Key grammar (`#` is the field separator and never appears inside a
//! framework name or version):
//!
//! ```text
//! frameworkKey = <frameworkName> "#" <version>        e.g. NIST-SP-800-53#R5
//! controlKey   = <frameworkKey> "#" <controlId>       e.g. NIST-SP-800-53#R5#AC-1
//! mappingKey   = sort(controlKey, controlKey) "|"-joined
//! ```
//!
//! Framework names and versions are restricted to `[A-Za-z0-9._-]`.
//! Control IDs accept any non-empty UTF-8 except newline and `|`
//! (the mapping-key join character), and may themselves contain `#`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum byte length of a framework key.
pub const MAX_FRAMEWORK_KEY_LEN: usize = 128;

/// Maximum byte length of a control key.
pub const MAX_CONTROL_KEY_LEN: usize = 256;

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn validate_segment(segment: &str, what: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::malformed_key(format!("{what} must not be empty")));
    }
    if let Some(c) = segment.chars().find(|c| !is_segment_char(*c)) {
        return Err(Error::malformed_key(format!(
            "{what} contains invalid character {c:?}; allowed: [A-Za-z0-9._-]"
        )));
    }
    Ok(())
}

fn validate_control_id(control_id: &str) -> Result<()> {
    if control_id.is_empty() {
        return Err(Error::malformed_key("controlId must not be empty"));
    }
    if control_id.contains('\n') {
        return Err(Error::malformed_key("controlId must not contain newline"));
    }
    if control_id.contains('|') {
        return Err(Error::malformed_key("controlId must not contain '|'"));
    }
    Ok(())
}

/// A validated framework key: `frameworkName#version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FrameworkKey(String);

impl FrameworkKey {
    /// Parses and validates a framework key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedKey`] when the input is not
    /// `name#version` with both segments in `[A-Za-z0-9._-]+`.
    pub fn parse(input: &str) -> Result<Self> {
        if input.len() > MAX_FRAMEWORK_KEY_LEN {
            return Err(Error::malformed_key(format!(
                "framework key exceeds {MAX_FRAMEWORK_KEY_LEN} bytes"
            )));
        }
        let Some((name, version)) = input.split_once('#') else {
            return Err(Error::malformed_key(format!(
                "framework key '{input}' must match frameworkName#version"
            )));
        };
        if version.contains('#') {
            return Err(Error::malformed_key(format!(
                "framework key '{input}' has too many '#' separators"
            )));
        }
        validate_segment(name, "framework name")?;
        validate_segment(version, "framework version")?;
        Ok(Self(input.to_string()))
    }

    /// Builds a framework key from its components.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedKey`] when either segment is invalid.
    pub fn build(name: &str, version: &str) -> Result<Self> {
        Self::parse(&format!("{name}#{version}"))
    }

    /// Returns the framework name segment.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.split_once('#').map_or("", |(name, _)| name)
    }

    /// Returns the version segment.
    #[must_use]
    pub fn version(&self) -> &str {
        self.0.split_once('#').map_or("", |(_, version)| version)
    }

    /// Returns the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FrameworkKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FrameworkKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FrameworkKey> for String {
    fn from(key: FrameworkKey) -> Self {
        key.0
    }
}

/// A validated control key: `frameworkName#version#controlId`.
///
/// The control ID may itself contain `#`; parsing splits on the first two
/// separators and treats the remainder as the control ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ControlKey(String);

impl ControlKey {
    /// Parses and validates a control key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedKey`] when the input does not have three
    /// segments or any segment fails validation.
    pub fn parse(input: &str) -> Result<Self> {
        if input.len() > MAX_CONTROL_KEY_LEN {
            return Err(Error::malformed_key(format!(
                "control key exceeds {MAX_CONTROL_KEY_LEN} bytes"
            )));
        }
        let mut parts = input.splitn(3, '#');
        let (Some(name), Some(version), Some(control_id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::malformed_key(format!(
                "control key '{input}' must match frameworkName#version#controlId"
            )));
        };
        validate_segment(name, "framework name")?;
        validate_segment(version, "framework version")?;
        validate_control_id(control_id)?;
        Ok(Self(input.to_string()))
    }

    /// Builds a control key from a framework key and a control ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedKey`] when the control ID is invalid or
    /// the combined key exceeds the length cap.
    pub fn build(framework: &FrameworkKey, control_id: &str) -> Result<Self> {
        validate_control_id(control_id)?;
        let combined = format!("{framework}#{control_id}");
        if combined.len() > MAX_CONTROL_KEY_LEN {
            return Err(Error::malformed_key(format!(
                "control key exceeds {MAX_CONTROL_KEY_LEN} bytes"
            )));
        }
        Ok(Self(combined))
    }

    /// Returns the framework key portion.
    #[must_use]
    pub fn framework_key(&self) -> FrameworkKey {
        let mut parts = self.0.splitn(3, '#');
        let name = parts.next().unwrap_or_default();
        let version = parts.next().unwrap_or_default();
        FrameworkKey(format!("{name}#{version}"))
    }

    /// Returns the control ID portion.
    #[must_use]
    pub fn control_id(&self) -> &str {
        let mut parts = self.0.splitn(3, '#');
        parts.next();
        parts.next();
        parts.next().unwrap_or_default()
    }

    /// Returns the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ControlKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ControlKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ControlKey> for String {
    fn from(key: ControlKey) -> Self {
        key.0
    }
}

/// A canonical key for an unordered pair of controls.
///
/// The two control keys are sorted lexicographically and joined with `|`,
/// so `build(a, b) == build(b, a)` by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingKey(String);

impl MappingKey {
    /// Builds the canonical mapping key for an unordered control pair.
    #[must_use]
    pub fn build(a: &ControlKey, b: &ControlKey) -> Self {
        let (lo, hi) = if a.as_str() <= b.as_str() {
            (a, b)
        } else {
            (b, a)
        };
        Self(format!("{lo}|{hi}"))
    }

    /// Returns the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
