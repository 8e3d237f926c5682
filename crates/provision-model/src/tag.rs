//! Tag rules
//!
//! A `TagRule` contributes its tag to a node when every one of its
//! `TagMatcher`s holds against the node's attributes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// How a matcher compares an attribute with its value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    /// Exact string equality
    #[default]
    Equal,
    /// Unanchored regular expression search
    Like,
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "equal"),
            Self::Like => write!(f, "like"),
        }
    }
}

impl FromStr for Comparator {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equal" => Ok(Self::Equal),
            "like" => Ok(Self::Like),
            other => Err(ModelError::InputError(format!(
                "Invalid compare '{other}'; must be one of (equal|like)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagMatcher {
    pub uuid: String,

    /// Node attribute name
    pub key: String,

    pub compare: Comparator,

    pub value: String,

    /// Flips the result of this matcher only
    #[serde(default)]
    pub inverse: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagRule {
    pub uuid: String,

    #[serde(default)]
    pub version: u64,

    pub name: String,

    /// Tag contributed when all matchers succeed
    pub tag: String,

    #[serde(default)]
    pub tag_matchers: Vec<TagMatcher>,
}

impl TagRule {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            uuid: crate::new_uuid(),
            name: name.into(),
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Appends a matcher and returns a reference to it
    pub fn add_matcher(
        &mut self,
        key: impl Into<String>,
        compare: Comparator,
        value: impl Into<String>,
        inverse: bool,
    ) -> &TagMatcher {
        self.tag_matchers.push(TagMatcher {
            uuid: crate::new_uuid(),
            key: key.into(),
            compare,
            value: value.into(),
            inverse,
        });
        let last = self.tag_matchers.len() - 1;
        &self.tag_matchers[last]
    }

    pub fn remove_matcher(&mut self, uuid: &str) -> bool {
        let before = self.tag_matchers.len();
        self.tag_matchers.retain(|m| m.uuid != uuid);
        before != self.tag_matchers.len()
    }

    pub fn matcher(&self, uuid: &str) -> Option<&TagMatcher> {
        self.tag_matchers.iter().find(|m| m.uuid == uuid)
    }
}
