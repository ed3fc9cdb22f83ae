//! Resources owned by neighbouring services.
//!
//! The networking handlers never create these; they only consult them for
//! dependency checks. Tests and embedding services insert them through the
//! store.

use serde::Serialize;

use super::tags::Tags;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(rename = "instanceId")]
    pub id: String,
    pub subnet_id: String,
    pub vpc_id: String,
    /// `pending`, `running`, ..., `terminated`.
    pub state: String,
    pub security_groups: Vec<String>,
    #[serde(rename = "tagSet")]
    pub tags: Tags,
}

impl Instance {
    pub fn new(id: &str, vpc_id: &str, subnet_id: &str) -> Self {
        Self {
            id: id.to_string(),
            subnet_id: subnet_id.to_string(),
            vpc_id: vpc_id.to_string(),
            state: "running".to_string(),
            security_groups: Vec::new(),
            tags: Tags::new(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.state != "terminated"
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(rename = "networkInterfaceId")]
    pub id: String,
    pub subnet_id: String,
    pub vpc_id: String,
    /// `available` once detached.
    pub status: String,
    pub groups: Vec<String>,
    #[serde(rename = "tagSet")]
    pub tags: Tags,
}

impl NetworkInterface {
    pub fn new(id: &str, vpc_id: &str, subnet_id: &str) -> Self {
        Self {
            id: id.to_string(),
            subnet_id: subnet_id.to_string(),
            vpc_id: vpc_id.to_string(),
            status: "in-use".to_string(),
            groups: Vec::new(),
            tags: Tags::new(),
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.status != "available"
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAttachment {
    pub vpc_id: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternetGateway {
    #[serde(rename = "internetGatewayId")]
    pub id: String,
    pub attachment_set: Vec<GatewayAttachment>,
    #[serde(rename = "tagSet")]
    pub tags: Tags,
}

impl InternetGateway {
    pub fn attached_to(id: &str, vpc_id: &str) -> Self {
        Self {
            id: id.to_string(),
            attachment_set: vec![GatewayAttachment {
                vpc_id: vpc_id.to_string(),
                state: "available".to_string(),
            }],
            tags: Tags::new(),
        }
    }

    pub fn is_attached_to(&self, vpc_id: &str) -> bool {
        self.attachment_set
            .iter()
            .any(|a| a.vpc_id == vpc_id && a.state != "detached")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NatGateway {
    #[serde(rename = "natGatewayId")]
    pub id: String,
    pub vpc_id: String,
    pub subnet_id: String,
    pub state: String,
    #[serde(rename = "tagSet")]
    pub tags: Tags,
}

impl NatGateway {
    pub fn new(id: &str, vpc_id: &str, subnet_id: &str) -> Self {
        Self {
            id: id.to_string(),
            vpc_id: vpc_id.to_string(),
            subnet_id: subnet_id.to_string(),
            state: "available".to_string(),
            tags: Tags::new(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.state != "deleted" && self.state != "failed"
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcEndpoint {
    #[serde(rename = "vpcEndpointId")]
    pub id: String,
    pub vpc_id: String,
    pub state: String,
    #[serde(rename = "tagSet")]
    pub tags: Tags,
}

impl VpcEndpoint {
    pub fn new(id: &str, vpc_id: &str) -> Self {
        Self {
            id: id.to_string(),
            vpc_id: vpc_id.to_string(),
            state: "available".to_string(),
            tags: Tags::new(),
        }
    }

    pub fn is_live(&self) -> bool {
        !self.state.eq_ignore_ascii_case("deleted")
    }
}
