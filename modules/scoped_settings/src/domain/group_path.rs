//! Group paths and flattened keys
//!
//! A [`GroupPath`] is an ordered sequence of group names. A [`FlatKey`] is a
//! group path plus a leaf key; its string form joins every segment with
//! [`SEPARATOR`] and splits back into the same segments.

use crate::contract::SettingsError;
use std::fmt;

/// Separator between segments of a flattened key
pub const SEPARATOR: char = '/';

fn validate_segment(segment: &str, whole: &str) -> Result<(), SettingsError> {
    if segment.is_empty() {
        return Err(SettingsError::InvalidKey {
            key: whole.to_string(),
            reason: "segments must be non-empty".to_string(),
        });
    }
    if segment.contains(SEPARATOR) {
        return Err(SettingsError::InvalidKey {
            key: whole.to_string(),
            reason: format!("segment '{}' contains '{}'", segment, SEPARATOR),
        });
    }
    Ok(())
}

/// Ordered sequence of non-empty group names
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupPath {
    segments: Vec<String>,
}

impl GroupPath {
    /// The root group (no segments)
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a `/`-joined group path. The empty string is the root group.
    pub fn parse(path: &str) -> Result<Self, SettingsError> {
        let mut group = Self::root();
        if path.is_empty() {
            return Ok(group);
        }
        for segment in path.split(SEPARATOR) {
            validate_segment(segment, path)?;
            group.segments.push(segment.to_string());
        }
        Ok(group)
    }

    pub fn push(&mut self, name: &str) -> Result<(), SettingsError> {
        validate_segment(name, name)?;
        self.segments.push(name.to_string());
        Ok(())
    }

    /// Remove the last segment. The path is left untouched on failure.
    pub fn pop(&mut self) -> Result<String, SettingsError> {
        self.segments.pop().ok_or(SettingsError::EmptyStack)
    }

    /// Append every segment of `other`
    pub fn extend(&mut self, other: &GroupPath) {
        self.segments.extend(other.segments.iter().cloned());
    }

    pub fn join(&self, other: &GroupPath) -> GroupPath {
        let mut joined = self.clone();
        joined.extend(other);
        joined
    }

    /// The backend key for `leaf` inside this group
    pub fn flatten(&self, leaf: &str) -> Result<FlatKey, SettingsError> {
        validate_segment(leaf, leaf)?;
        Ok(FlatKey {
            group: self.clone(),
            leaf: leaf.to_string(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether this group is `prefix` or nested inside it
    pub fn starts_with(&self, prefix: &GroupPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for GroupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// Backend-addressable form of a group path plus leaf key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlatKey {
    group: GroupPath,
    leaf: String,
}

impl FlatKey {
    /// Split a flattened key back into its group and leaf
    pub fn unflatten(key: &str) -> Result<Self, SettingsError> {
        match key.rsplit_once(SEPARATOR) {
            Some(("", _)) => Err(SettingsError::InvalidKey {
                key: key.to_string(),
                reason: "segments must be non-empty".to_string(),
            }),
            Some((group, leaf)) => {
                let group = GroupPath::parse(group).map_err(|_| SettingsError::InvalidKey {
                    key: key.to_string(),
                    reason: "segments must be non-empty".to_string(),
                })?;
                validate_segment(leaf, key)?;
                Ok(Self {
                    group,
                    leaf: leaf.to_string(),
                })
            }
            None => GroupPath::root().flatten(key),
        }
    }

    pub fn group(&self) -> &GroupPath {
        &self.group
    }

    pub fn leaf(&self) -> &str {
        &self.leaf
    }

    /// Group segments followed by the leaf
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.group
            .segments
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.leaf.as_str()))
    }

    /// Whether this key lives inside `prefix` (at any depth)
    pub fn is_under(&self, prefix: &GroupPath) -> bool {
        self.group.starts_with(prefix)
    }

    /// This key relative to `prefix`, if it lives inside it
    pub fn relative_to(&self, prefix: &GroupPath) -> Option<FlatKey> {
        if !self.is_under(prefix) {
            return None;
        }
        Some(FlatKey {
            group: GroupPath {
                segments: self.group.segments[prefix.depth()..].to_vec(),
            },
            leaf: self.leaf.clone(),
        })
    }
}

impl fmt::Display for FlatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.group.segments {
            write!(f, "{}{}", segment, SEPARATOR)?;
        }
        f.write_str(&self.leaf)
    }
}
