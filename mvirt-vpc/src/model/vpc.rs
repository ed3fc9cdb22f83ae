use ipnet::{Ipv4Net, Ipv6Net};
use serde::Serialize;

use super::tags::Tags;
use super::{AssociationState, BlockState, Ipv6CidrBlockAssociation, ResourceState};
use crate::filter::{Filterable, one};

/// Maximum IPv4 CIDR associations per VPC (primary included).
pub const MAX_IPV4_BLOCKS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CidrBlockAssociation {
    pub association_id: String,
    pub cidr_block: Ipv4Net,
    pub cidr_block_state: BlockState,
}

impl CidrBlockAssociation {
    pub fn is_active(&self) -> bool {
        self.cidr_block_state.state == AssociationState::Associated
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vpc {
    #[serde(rename = "vpcId")]
    pub id: String,
    /// Primary block; never disassociated.
    pub cidr_block: Ipv4Net,
    pub cidr_block_association_set: Vec<CidrBlockAssociation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ipv6_cidr_block_association_set: Vec<Ipv6CidrBlockAssociation>,
    pub state: ResourceState,
    pub instance_tenancy: String,
    pub is_default: bool,
    pub dhcp_options_id: String,
    pub owner_id: String,
    #[serde(skip)]
    pub enable_dns_support: bool,
    #[serde(skip)]
    pub enable_dns_hostnames: bool,
    #[serde(skip)]
    pub enable_network_address_usage_metrics: bool,
    #[serde(rename = "tagSet")]
    pub tags: Tags,
}

impl Vpc {
    /// Associated IPv4 blocks, primary first.
    pub fn ipv4_blocks(&self) -> impl Iterator<Item = Ipv4Net> + '_ {
        self.cidr_block_association_set
            .iter()
            .filter(|a| a.is_active())
            .map(|a| a.cidr_block)
    }

    pub fn ipv6_blocks(&self) -> impl Iterator<Item = Ipv6Net> + '_ {
        self.ipv6_cidr_block_association_set
            .iter()
            .filter(|a| a.is_active())
            .map(|a| a.ipv6_cidr_block)
    }
}

impl Filterable for Vpc {
    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn filter_values(&self, name: &str) -> Option<Vec<String>> {
        let v4 = &self.cidr_block_association_set;
        let v6 = &self.ipv6_cidr_block_association_set;
        match name {
            "vpc-id" => one(&self.id),
            "cidr" | "cidr-block" => one(self.cidr_block),
            "cidr-block-association.cidr-block" => {
                Some(v4.iter().map(|a| a.cidr_block.to_string()).collect())
            }
            "cidr-block-association.association-id" => {
                Some(v4.iter().map(|a| a.association_id.clone()).collect())
            }
            "cidr-block-association.state" => Some(
                v4.iter()
                    .map(|a| a.cidr_block_state.state.as_str().to_string())
                    .collect(),
            ),
            "ipv6-cidr-block-association.ipv6-cidr-block" => {
                Some(v6.iter().map(|a| a.ipv6_cidr_block.to_string()).collect())
            }
            "ipv6-cidr-block-association.association-id" => {
                Some(v6.iter().map(|a| a.association_id.clone()).collect())
            }
            "ipv6-cidr-block-association.state" => Some(
                v6.iter()
                    .map(|a| a.ipv6_cidr_block_state.state.as_str().to_string())
                    .collect(),
            ),
            "dhcp-options-id" => one(&self.dhcp_options_id),
            "is-default" | "isDefault" => one(self.is_default),
            "owner-id" => one(&self.owner_id),
            "state" => one(self.state.as_str()),
            "instance-tenancy" => one(&self.instance_tenancy),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, matches};

    fn vpc() -> Vpc {
        let primary: Ipv4Net = "10.0.0.0/16".parse().unwrap();
        Vpc {
            id: "vpc-1".to_string(),
            cidr_block: primary,
            cidr_block_association_set: vec![
                CidrBlockAssociation {
                    association_id: "vpc-cidr-assoc-1".to_string(),
                    cidr_block: primary,
                    cidr_block_state: BlockState::associated(),
                },
                CidrBlockAssociation {
                    association_id: "vpc-cidr-assoc-2".to_string(),
                    cidr_block: "10.1.0.0/16".parse().unwrap(),
                    cidr_block_state: BlockState::associated(),
                },
            ],
            ipv6_cidr_block_association_set: Vec::new(),
            state: ResourceState::Available,
            instance_tenancy: "default".to_string(),
            is_default: false,
            dhcp_options_id: "default".to_string(),
            owner_id: "000000000000".to_string(),
            enable_dns_support: true,
            enable_dns_hostnames: false,
            enable_network_address_usage_metrics: false,
            tags: Tags::new(),
        }
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(vpc()).unwrap();
        assert_eq!(json["vpcId"], "vpc-1");
        assert_eq!(json["cidrBlock"], "10.0.0.0/16");
        assert_eq!(json["state"], "available");
        assert_eq!(json["isDefault"], false);
        assert_eq!(
            json["cidrBlockAssociationSet"][1]["cidrBlockState"]["state"],
            "associated"
        );
        assert!(json.get("ipv6CidrBlockAssociationSet").is_none());
        assert!(json.get("enableDnsSupport").is_none());
    }

    #[test]
    fn test_cidr_filters() {
        let v = vpc();
        let f = |name: &str, value: &str| Filter::new(name, vec![value.to_string()]);
        assert!(matches(&v, &f("cidr", "10.0.0.0/16")));
        assert!(!matches(&v, &f("cidr", "10.1.0.0/16")));
        assert!(matches(&v, &f("cidr-block-association.cidr-block", "10.1.0.0/16")));
        assert!(matches(&v, &f("is-default", "false")));
        assert!(!matches(&v, &f("unknown-filter", "x")));
    }

    #[test]
    fn test_ipv4_blocks_primary_first() {
        let blocks: Vec<String> = vpc().ipv4_blocks().map(|b| b.to_string()).collect();
        assert_eq!(blocks, vec!["10.0.0.0/16", "10.1.0.0/16"]);
    }
}
