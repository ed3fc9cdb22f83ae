use ipnet::{Ipv4Net, Ipv6Net};
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use super::Protocol;
use super::tags::Tags;
use crate::filter::{Filterable, maybe, one};

/// Name of the group created with every VPC.
pub const DEFAULT_GROUP_NAME: &str = "default";

/// The single peer a rule allows traffic from (ingress) or to (egress).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RuleSource {
    #[serde(rename = "cidrIpv4")]
    Ipv4(Ipv4Net),
    #[serde(rename = "cidrIpv6")]
    Ipv6(Ipv6Net),
    #[serde(rename = "prefixListId")]
    PrefixList(String),
    #[serde(rename = "referencedGroupInfo", rename_all = "camelCase")]
    Group {
        group_id: String,
        user_id: String,
        #[serde(skip)]
        group_name: Option<String>,
    },
}

impl RuleSource {
    /// Selector equality; referenced groups compare by id only.
    pub fn same_selector(&self, other: &RuleSource) -> bool {
        match (self, other) {
            (RuleSource::Group { group_id: a, .. }, RuleSource::Group { group_id: b, .. }) => a == b,
            (a, b) => a == b,
        }
    }

    pub fn referenced_group(&self) -> Option<&str> {
        match self {
            RuleSource::Group { group_id, .. } => Some(group_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupRule {
    #[serde(rename = "securityGroupRuleId")]
    pub id: String,
    pub group_id: String,
    pub group_owner_id: String,
    pub is_egress: bool,
    #[serde(rename = "ipProtocol")]
    pub protocol: Protocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_port: Option<i32>,
    #[serde(flatten)]
    pub source: RuleSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub security_group_rule_arn: String,
    #[serde(rename = "tagSet")]
    pub tags: Tags,
}

impl Filterable for SecurityGroupRule {
    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn filter_values(&self, name: &str) -> Option<Vec<String>> {
        match name {
            "security-group-rule-id" => one(&self.id),
            "group-id" => one(&self.group_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    #[serde(rename = "groupId")]
    pub id: String,
    pub group_name: String,
    #[serde(rename = "groupDescription")]
    pub description: String,
    /// None for groups outside any VPC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    pub owner_id: String,
    pub security_group_arn: String,
    #[serde(rename = "ipPermissions", serialize_with = "serialize_permissions")]
    pub ingress: Vec<SecurityGroupRule>,
    #[serde(rename = "ipPermissionsEgress", serialize_with = "serialize_permissions")]
    pub egress: Vec<SecurityGroupRule>,
    #[serde(rename = "tagSet")]
    pub tags: Tags,
}

impl SecurityGroup {
    pub fn is_default(&self) -> bool {
        self.vpc_id.is_some() && self.group_name == DEFAULT_GROUP_NAME
    }

    pub fn rules(&self, egress: bool) -> &Vec<SecurityGroupRule> {
        if egress { &self.egress } else { &self.ingress }
    }

    pub fn rules_mut(&mut self, egress: bool) -> &mut Vec<SecurityGroupRule> {
        if egress {
            &mut self.egress
        } else {
            &mut self.ingress
        }
    }

    pub fn all_rules(&self) -> impl Iterator<Item = &SecurityGroupRule> {
        self.ingress.iter().chain(self.egress.iter())
    }

    pub fn rule(&self, rule_id: &str) -> Option<&SecurityGroupRule> {
        self.all_rules().find(|r| r.id == rule_id)
    }

    pub fn rule_mut(&mut self, rule_id: &str) -> Option<&mut SecurityGroupRule> {
        self.ingress
            .iter_mut()
            .chain(self.egress.iter_mut())
            .find(|r| r.id == rule_id)
    }

    pub fn references(&self, group_id: &str) -> bool {
        self.all_rules()
            .any(|r| r.source.referenced_group() == Some(group_id))
    }
}

fn permission_values(
    rules: &[SecurityGroupRule],
    field: &str,
) -> Option<Vec<String>> {
    let values = rules
        .iter()
        .filter_map(|r| match field {
            "protocol" => Some(r.protocol.name()),
            "from-port" => r.from_port.map(|p| p.to_string()),
            "to-port" => r.to_port.map(|p| p.to_string()),
            "cidr" => match &r.source {
                RuleSource::Ipv4(net) => Some(net.to_string()),
                _ => None,
            },
            "ipv6-cidr" => match &r.source {
                RuleSource::Ipv6(net) => Some(net.to_string()),
                _ => None,
            },
            "prefix-list-id" => match &r.source {
                RuleSource::PrefixList(id) => Some(id.clone()),
                _ => None,
            },
            "group-id" => r.source.referenced_group().map(str::to_string),
            "group-name" => match &r.source {
                RuleSource::Group { group_name, .. } => group_name.clone(),
                _ => None,
            },
            _ => None,
        })
        .collect();
    match field {
        "protocol" | "from-port" | "to-port" | "cidr" | "ipv6-cidr" | "prefix-list-id"
        | "group-id" | "group-name" => Some(values),
        _ => None,
    }
}

impl Filterable for SecurityGroup {
    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn filter_values(&self, name: &str) -> Option<Vec<String>> {
        if let Some(field) = name.strip_prefix("egress.ip-permission.") {
            return permission_values(&self.egress, field);
        }
        if let Some(field) = name.strip_prefix("ip-permission.") {
            return permission_values(&self.ingress, field);
        }
        match name {
            "group-id" => one(&self.id),
            "group-name" => one(&self.group_name),
            "description" => one(&self.description),
            "vpc-id" => maybe(self.vpc_id.as_ref()),
            "owner-id" => one(&self.owner_id),
            _ => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserIdGroupPair<'a> {
    group_id: &'a str,
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IpRange<'a> {
    cidr_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Ipv6Range<'a> {
    cidr_ipv6: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrefixListId<'a> {
    prefix_list_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// Rules regrouped by (protocol, fromPort, toPort), as the describe output
/// presents them.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IpPermission<'a> {
    ip_protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_port: Option<i32>,
    groups: Vec<UserIdGroupPair<'a>>,
    ip_ranges: Vec<IpRange<'a>>,
    ipv6_ranges: Vec<Ipv6Range<'a>>,
    prefix_list_ids: Vec<PrefixListId<'a>>,
}

fn serialize_permissions<S: Serializer>(
    rules: &[SecurityGroupRule],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut grouped: Vec<IpPermission<'_>> = Vec::new();
    for rule in rules {
        let name = rule.protocol.name();
        let index = match grouped.iter().position(|p| {
            p.ip_protocol == name && p.from_port == rule.from_port && p.to_port == rule.to_port
        }) {
            Some(index) => index,
            None => {
                grouped.push(IpPermission {
                    ip_protocol: name,
                    from_port: rule.from_port,
                    to_port: rule.to_port,
                    groups: Vec::new(),
                    ip_ranges: Vec::new(),
                    ipv6_ranges: Vec::new(),
                    prefix_list_ids: Vec::new(),
                });
                grouped.len() - 1
            }
        };
        let permission = &mut grouped[index];
        let description = rule.description.as_deref();
        match &rule.source {
            RuleSource::Ipv4(net) => permission.ip_ranges.push(IpRange {
                cidr_ip: net.to_string(),
                description,
            }),
            RuleSource::Ipv6(net) => permission.ipv6_ranges.push(Ipv6Range {
                cidr_ipv6: net.to_string(),
                description,
            }),
            RuleSource::PrefixList(id) => permission.prefix_list_ids.push(PrefixListId {
                prefix_list_id: id,
                description,
            }),
            RuleSource::Group {
                group_id,
                user_id,
                group_name,
            } => permission.groups.push(UserIdGroupPair {
                group_id,
                user_id,
                group_name: group_name.as_deref(),
                description,
            }),
        }
    }

    let mut seq = serializer.serialize_seq(Some(grouped.len()))?;
    for permission in &grouped {
        seq.serialize_element(permission)?;
    }
    seq.end()
}
