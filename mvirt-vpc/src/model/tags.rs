use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use crate::error::{Ec2Error, Result};

/// Maximum tags per resource.
pub const MAX_TAGS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered tag set with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tags(Vec<Tag>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and build a tag set; later duplicates win.
    pub fn try_from_tags(tags: Vec<Tag>) -> Result<Self> {
        let mut set = Tags::new();
        set.apply(tags)?;
        Ok(set)
    }

    /// Add or overwrite tags, enforcing the key rules and the per-resource limit.
    pub fn apply(&mut self, tags: Vec<Tag>) -> Result<()> {
        for tag in &tags {
            validate_tag(tag)?;
        }
        let mut next = self.0.clone();
        for tag in tags {
            match next.iter_mut().find(|t| t.key == tag.key) {
                Some(existing) => existing.value = tag.value,
                None => next.push(tag),
            }
        }
        if next.len() > MAX_TAGS {
            return Err(Ec2Error::conflict(
                "TagLimitExceeded",
                format!("The maximum number of tags per resource is {}", MAX_TAGS),
            ));
        }
        self.0 = next;
        Ok(())
    }

    /// Remove `key`; when `value` is given the tag is only removed if it matches.
    pub fn remove(&mut self, key: &str, value: Option<&str>) {
        self.0
            .retain(|t| !(t.key == key && value.is_none_or(|v| v == t.value)));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn validate_tag(tag: &Tag) -> Result<()> {
    if tag.key.is_empty() || tag.key.chars().count() > 128 {
        return Err(Ec2Error::invalid_value(format!(
            "Tag key '{}' must be between 1 and 128 characters",
            tag.key
        )));
    }
    if tag.key.to_ascii_lowercase().starts_with("aws:") {
        return Err(Ec2Error::invalid_value(
            "Tag keys starting with 'aws:' are reserved for internal use",
        ));
    }
    if tag.value.chars().count() > 256 {
        return Err(Ec2Error::invalid_value(format!(
            "Tag value for key '{}' exceeds 256 characters",
            tag.key
        )));
    }
    Ok(())
}

/// Serialize as `[{"Key": .., "Value": ..}]` for PascalCase resources.
pub fn serialize_pascal<S: Serializer>(tags: &Tags, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    #[serde(rename_all = "PascalCase")]
    struct PascalTag<'a> {
        key: &'a str,
        value: &'a str,
    }

    let mut seq = serializer.serialize_seq(Some(tags.len()))?;
    for tag in tags.iter() {
        seq.serialize_element(&PascalTag {
            key: &tag.key,
            value: &tag.value,
        })?;
    }
    seq.end()
}
