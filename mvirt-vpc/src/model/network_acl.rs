use ipnet::{Ipv4Net, Ipv6Net};
use serde::Serialize;

use super::tags::Tags;
use super::{Protocol, serialize_protocol_number};
use crate::error::{Ec2Error, Result};
use crate::filter::{Filterable, one};

/// Highest rule number a caller may use.
pub const MAX_USER_RULE: u32 = 32766;
/// Catch-all IPv4 deny entry present in every ACL.
pub const RESERVED_IPV4_RULE: u32 = 32767;
/// Catch-all IPv6 deny entry present in every ACL.
pub const RESERVED_IPV6_RULE: u32 = 32768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
}

impl RuleAction {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "allow" => Ok(RuleAction::Allow),
            "deny" => Ok(RuleAction::Deny),
            _ => Err(Ec2Error::invalid_value(format!(
                "Invalid value '{}' for ruleAction. Valid values: allow, deny",
                value
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::Deny => "deny",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortRange {
    pub from: i32,
    pub to: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IcmpTypeCode {
    pub code: i32,
    #[serde(rename = "type")]
    pub kind: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAclEntry {
    pub rule_number: u32,
    #[serde(serialize_with = "serialize_protocol_number")]
    pub protocol: Protocol,
    pub rule_action: RuleAction,
    pub egress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<Ipv4Net>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_cidr_block: Option<Ipv6Net>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icmp_type_code: Option<IcmpTypeCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range: Option<PortRange>,
}

impl NetworkAclEntry {
    /// Allow or deny everything in one direction for one address family.
    pub fn catch_all(rule_number: u32, action: RuleAction, egress: bool, ipv6: bool) -> Self {
        let (cidr_block, ipv6_cidr_block) = if ipv6 {
            (None, Some(Ipv6Net::default()))
        } else {
            (Some(Ipv4Net::default()), None)
        };
        Self {
            rule_number,
            protocol: Protocol::All,
            rule_action: action,
            egress,
            cidr_block,
            ipv6_cidr_block,
            icmp_type_code: None,
            port_range: None,
        }
    }

    pub fn key(&self) -> (u32, bool) {
        (self.rule_number, self.egress)
    }

    pub fn is_reserved(&self) -> bool {
        is_reserved_rule(self.rule_number)
    }
}

pub fn is_reserved_rule(rule_number: u32) -> bool {
    rule_number == RESERVED_IPV4_RULE || rule_number == RESERVED_IPV6_RULE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAclAssociation {
    pub network_acl_association_id: String,
    pub network_acl_id: String,
    pub subnet_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAcl {
    #[serde(rename = "networkAclId")]
    pub id: String,
    pub vpc_id: String,
    #[serde(rename = "default")]
    pub is_default: bool,
    pub entry_set: Vec<NetworkAclEntry>,
    pub association_set: Vec<NetworkAclAssociation>,
    pub owner_id: String,
    #[serde(rename = "tagSet")]
    pub tags: Tags,
}

impl NetworkAcl {
    pub fn entry(&self, rule_number: u32, egress: bool) -> Option<&NetworkAclEntry> {
        self.entry_set.iter().find(|e| e.key() == (rule_number, egress))
    }

    /// Insert or overwrite the entry keyed by (rule number, egress), keeping
    /// entries sorted by rule number with ingress first.
    pub fn put_entry(&mut self, entry: NetworkAclEntry) {
        let mut entries: Vec<NetworkAclEntry> = self
            .entry_set
            .iter()
            .filter(|e| e.key() != entry.key())
            .cloned()
            .collect();
        entries.push(entry);
        entries.sort_by_key(|e| (e.egress, e.rule_number));
        self.entry_set = entries;
    }

    pub fn remove_entry(&mut self, rule_number: u32, egress: bool) -> Option<NetworkAclEntry> {
        let position = self
            .entry_set
            .iter()
            .position(|e| e.key() == (rule_number, egress))?;
        Some(self.entry_set.remove(position))
    }

    pub fn association_for_subnet(&self, subnet_id: &str) -> Option<&NetworkAclAssociation> {
        self.association_set.iter().find(|a| a.subnet_id == subnet_id)
    }
}

impl Filterable for NetworkAcl {
    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn filter_values(&self, name: &str) -> Option<Vec<String>> {
        let entries = |f: fn(&NetworkAclEntry) -> Option<String>| -> Option<Vec<String>> {
            Some(self.entry_set.iter().filter_map(f).collect())
        };
        let assoc = &self.association_set;
        match name {
            "network-acl-id" => one(&self.id),
            "vpc-id" => one(&self.vpc_id),
            "default" => one(self.is_default),
            "owner-id" => one(&self.owner_id),
            "association.association-id" => Some(
                assoc
                    .iter()
                    .map(|a| a.network_acl_association_id.clone())
                    .collect(),
            ),
            "association.network-acl-id" => {
                Some(assoc.iter().map(|a| a.network_acl_id.clone()).collect())
            }
            "association.subnet-id" => Some(assoc.iter().map(|a| a.subnet_id.clone()).collect()),
            "entry.cidr" => entries(|e| e.cidr_block.map(|c| c.to_string())),
            "entry.ipv6-cidr" => entries(|e| e.ipv6_cidr_block.map(|c| c.to_string())),
            "entry.egress" => entries(|e| Some(e.egress.to_string())),
            "entry.protocol" => entries(|e| Some(e.protocol.number())),
            "entry.rule-action" => entries(|e| Some(e.rule_action.as_str().to_string())),
            "entry.rule-number" => entries(|e| Some(e.rule_number.to_string())),
            "entry.port-range.from" => entries(|e| e.port_range.map(|p| p.from.to_string())),
            "entry.port-range.to" => entries(|e| e.port_range.map(|p| p.to.to_string())),
            "entry.icmp.code" => entries(|e| e.icmp_type_code.map(|i| i.code.to_string())),
            "entry.icmp.type" => entries(|e| e.icmp_type_code.map(|i| i.kind.to_string())),
            _ => None,
        }
    }
}
