//! Tagging across every resource kind in the store.

use serde::Serialize;
use tracing::{debug, info};

use super::{Ec2Network, ReturnResponse};
use crate::error::{Ec2Error, Result};
use crate::filter::{self, Filter, Filterable, UnknownFilter, one};
use crate::model::{Tag, Tags};
use crate::pagination::{PageRequest, WIDE, paginate};
use crate::params::Params;
use crate::store::{ResourceKind, ResourceStore};

/// `Tag.N.Key` with an optional `Tag.N.Value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagArg {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TagsRequest {
    pub resource_ids: Vec<String>,
    pub tags: Vec<TagArg>,
}

impl TagsRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        let resource_ids = params.list("ResourceId");
        if resource_ids.is_empty() {
            return Err(Ec2Error::MissingParameter("ResourceId".to_string()));
        }
        let tags = params
            .members("Tag")
            .into_iter()
            .map(|member| {
                Ok(TagArg {
                    key: member.required("Key")?,
                    value: member.get("Value").map(str::to_string),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { resource_ids, tags })
    }
}

#[derive(Debug, Clone, Default)]
pub struct DescribeTagsRequest {
    pub filters: Vec<Filter>,
    pub page: PageRequest,
}

impl DescribeTagsRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            filters: params.filters()?,
            page: PageRequest::from_params(params)?,
        })
    }
}

/// One (resource, tag) row of DescribeTags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDescription {
    pub resource_id: String,
    pub resource_type: String,
    pub key: String,
    pub value: String,
    #[serde(skip)]
    none: Tags,
}

impl Filterable for TagDescription {
    const UNKNOWN_FILTER: UnknownFilter = UnknownFilter::Ignore;

    fn tags(&self) -> &Tags {
        &self.none
    }

    fn filter_values(&self, name: &str) -> Option<Vec<String>> {
        match name {
            "key" => one(&self.key),
            "value" => one(&self.value),
            "resource-id" => one(&self.resource_id),
            "resource-type" => one(&self.resource_type),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeTagsResponse {
    pub tag_set: Vec<TagDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// NotFound for an id the store does not hold.
fn unknown_resource(id: &str) -> Ec2Error {
    match ResourceKind::from_id(id) {
        Some(kind) => kind.not_found(id),
        None => Ec2Error::invalid("InvalidID", format!("The ID '{}' is not valid", id)),
    }
}

fn require_known(store: &ResourceStore, ids: &[String]) -> Result<()> {
    match ids.iter().find(|id| !store.contains(id)) {
        Some(id) => Err(unknown_resource(id)),
        None => Ok(()),
    }
}

impl Ec2Network {
    pub fn create_tags(&mut self, req: TagsRequest) -> Result<ReturnResponse> {
        if req.tags.is_empty() {
            return Err(Ec2Error::MissingParameter("Tag".to_string()));
        }
        require_known(&self.store, &req.resource_ids)?;
        let tags: Vec<Tag> = req
            .tags
            .iter()
            .map(|t| Tag::new(t.key.clone(), t.value.clone().unwrap_or_default()))
            .collect();

        self.store.atomically(|store| {
            for id in &req.resource_ids {
                store
                    .tags_mut(id)
                    .ok_or_else(|| unknown_resource(id))?
                    .apply(tags.clone())?;
            }
            Ok(())
        })?;

        info!(
            resources = req.resource_ids.len(),
            tags = tags.len(),
            "Created tags"
        );
        Ok(ReturnResponse::ok())
    }

    /// Remove tags. A tag given with a value is removed only on a value match;
    /// no tags at all clears every tag of the resources.
    pub fn delete_tags(&mut self, req: TagsRequest) -> Result<ReturnResponse> {
        require_known(&self.store, &req.resource_ids)?;
        self.store.atomically(|store| {
            for id in &req.resource_ids {
                let tags = store.tags_mut(id).ok_or_else(|| unknown_resource(id))?;
                if req.tags.is_empty() {
                    *tags = Tags::new();
                    continue;
                }
                for tag in &req.tags {
                    tags.remove(&tag.key, tag.value.as_deref());
                }
            }
            Ok(())
        })?;

        info!(resources = req.resource_ids.len(), "Deleted tags");
        Ok(ReturnResponse::ok())
    }

    pub fn describe_tags(&self, req: DescribeTagsRequest) -> Result<DescribeTagsResponse> {
        let rows: Vec<TagDescription> = self
            .store
            .tagged()
            .into_iter()
            .flat_map(|(id, kind, tags)| {
                tags.iter().map(move |tag| TagDescription {
                    resource_id: id.to_string(),
                    resource_type: kind.resource_type().to_string(),
                    key: tag.key.clone(),
                    value: tag.value.clone(),
                    none: Tags::new(),
                })
            })
            .collect();
        let matched: Vec<TagDescription> = filter::apply(&rows, &req.filters)
            .into_iter()
            .cloned()
            .collect();
        let page = paginate(matched, &req.page, WIDE)?;
        debug!(count = page.items.len(), "Described tags");
        Ok(DescribeTagsResponse {
            tag_set: page.items,
            next_token: page.next_token,
        })
    }
}
