//! Decoder for query-string style parameter maps.
//!
//! Indexed parameters (`Filter.1.Name`, `Filter.1.Value.1`,
//! `TagSpecification.1.Tag.1.Key`) are parsed once into structured values
//! here instead of in every handler.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::error::{Ec2Error, Result};
use crate::filter::Filter;
use crate::model::tags::Tag;

/// Flat string-keyed request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    inner: HashMap<String, String>,
}

/// `TagSpecification.N`: tags to apply to a resource type on creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpecification {
    pub resource_type: String,
    pub tags: Vec<Tag>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy in tests.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    /// Non-empty string value.
    pub fn string(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty()).map(str::to_string)
    }

    pub fn required(&self, key: &str) -> Result<String> {
        self.string(key)
            .ok_or_else(|| Ec2Error::MissingParameter(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// `true`/`false` (case-insensitive).
    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(Some(true)),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(Some(false)),
            Some(v) => Err(Ec2Error::invalid_value(format!(
                "Invalid value '{}' for {}, expected a boolean",
                v, key
            ))),
        }
    }

    pub fn number<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None | Some("") => Ok(None),
            Some(v) => v.trim().parse::<T>().map(Some).map_err(|_| {
                Ec2Error::invalid_value(format!("Invalid value '{}' for {}", v, key))
            }),
        }
    }

    /// Boolean carried as `<key>.Value` (attribute style) or bare `<key>`.
    pub fn attribute_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.bool(&format!("{}.Value", key))? {
            Some(v) => Ok(Some(v)),
            None => self.bool(key),
        }
    }

    /// Values of `prefix.1`, `prefix.2`, ... ordered by index.
    pub fn list(&self, prefix: &str) -> Vec<String> {
        let lead = format!("{}.", prefix);
        let mut indexed: BTreeMap<u32, String> = BTreeMap::new();
        for (key, value) in &self.inner {
            if let Some(rest) = key.strip_prefix(&lead)
                && let Ok(index) = rest.parse::<u32>()
            {
                indexed.insert(index, value.clone());
            }
        }
        indexed.into_values().filter(|v| !v.is_empty()).collect()
    }

    /// Sub-structures `prefix.N.*`, each with its keys relative to `prefix.N.`.
    pub fn members(&self, prefix: &str) -> Vec<Params> {
        let lead = format!("{}.", prefix);
        let mut grouped: BTreeMap<u32, Params> = BTreeMap::new();
        for (key, value) in &self.inner {
            let Some(rest) = key.strip_prefix(&lead) else {
                continue;
            };
            let Some((index, field)) = rest.split_once('.') else {
                continue;
            };
            let Ok(index) = index.parse::<u32>() else {
                continue;
            };
            grouped.entry(index).or_default().insert(field, value.clone());
        }
        grouped.into_values().collect()
    }

    /// Sub-structure `prefix.*` (non-indexed), e.g. `PortRange.From`.
    pub fn nested(&self, prefix: &str) -> Params {
        let lead = format!("{}.", prefix);
        let mut nested = Params::new();
        for (key, value) in &self.inner {
            if let Some(field) = key.strip_prefix(&lead) {
                nested.insert(field, value.clone());
            }
        }
        nested
    }

    /// `Filter.N.Name` + `Filter.N.Value.M`.
    pub fn filters(&self) -> Result<Vec<Filter>> {
        self.members("Filter")
            .into_iter()
            .map(|member| {
                let name = member.required("Name")?;
                Ok(Filter::new(name, member.list("Value")))
            })
            .collect()
    }

    /// `<prefix>.N.Key` + `<prefix>.N.Value`.
    pub fn tags(&self, prefix: &str) -> Result<Vec<Tag>> {
        self.members(prefix)
            .into_iter()
            .map(|member| {
                let key = member.required("Key")?;
                let value = member.get("Value").unwrap_or_default().to_string();
                Ok(Tag::new(key, value))
            })
            .collect()
    }

    /// `TagSpecification.N.ResourceType` + `TagSpecification.N.Tag.M.*`
    /// (the `Tags.M.*` spelling is accepted too).
    pub fn tag_specifications(&self) -> Result<Vec<TagSpecification>> {
        self.members("TagSpecification")
            .into_iter()
            .map(|member| {
                let resource_type = member.required("ResourceType")?;
                let mut tags = member.tags("Tag")?;
                tags.extend(member.tags("Tags")?);
                Ok(TagSpecification {
                    resource_type,
                    tags,
                })
            })
            .collect()
    }

    /// Tags requested for `resource_type` across all specifications.
    pub fn tags_for(&self, resource_type: &str) -> Result<Vec<Tag>> {
        Ok(self
            .tag_specifications()?
            .into_iter()
            .filter(|spec| spec.resource_type == resource_type)
            .flat_map(|spec| spec.tags)
            .collect())
    }
}

impl Params {
    /// Flat JSON object (`{"VpcId": "vpc-1", "MaxResults": 5}`) as params.
    /// Numbers and booleans are stringified; nested values are rejected.
    pub fn from_json(object: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        use serde_json::Value;

        let mut params = Params::new();
        for (key, value) in object {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => continue,
                Value::Array(_) | Value::Object(_) => {
                    return Err(Ec2Error::invalid_value(format!(
                        "Parameter {} must be a scalar value",
                        key
                    )));
                }
            };
            params.insert(key.clone(), value);
        }
        Ok(params)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<HashMap<String, String>> for Params {
    fn from(inner: HashMap<String, String>) -> Self {
        Self { inner }
    }
}
