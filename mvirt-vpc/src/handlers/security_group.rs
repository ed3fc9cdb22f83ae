//! Security groups and their rules.
//!
//! Permissions arrive as `IpPermissions.N` structures (or the flat legacy
//! form) and are expanded into one [`RuleTuple`] per source selector. A
//! tuple is what duplicate detection, revocation and description updates
//! compare against stored rules.

use ipnet::Ipv4Net;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::defaults;
use super::{Ec2Network, ReturnResponse};
use crate::error::{Ec2Error, Result};
use crate::filter::{self, Filter};
use crate::model::{
    Instance, NetworkInterface, Protocol, RuleSource, SecurityGroup, SecurityGroupRule, Tag, Tags,
    Vpc, arn,
};
use crate::pagination::{PageRequest, WIDE, paginate};
use crate::params::Params;
use crate::store::ResourceKind;
use crate::validation::{parse_ipv4_cidr, parse_ipv6_cidr, validate_group_name, validate_port_range};

/// Longest accepted group description.
const MAX_DESCRIPTION: usize = 255;

#[derive(Debug, Clone, Default)]
pub struct CreateSecurityGroupRequest {
    pub group_name: String,
    pub description: String,
    pub vpc_id: Option<String>,
    pub tags: Vec<Tag>,
}

impl CreateSecurityGroupRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        let description = params
            .string("GroupDescription")
            .or_else(|| params.string("Description"))
            .ok_or_else(|| Ec2Error::MissingParameter("GroupDescription".to_string()))?;
        Ok(Self {
            group_name: params.required("GroupName")?,
            description,
            vpc_id: params.string("VpcId"),
            tags: params.tags_for("security-group")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSecurityGroupResponse {
    pub group_id: String,
    pub security_group_arn: String,
    pub tag_set: Tags,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteSecurityGroupRequest {
    pub group_id: Option<String>,
    pub group_name: Option<String>,
}

impl DeleteSecurityGroupRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        let req = Self {
            group_id: params.string("GroupId"),
            group_name: params.string("GroupName"),
        };
        if req.group_id.is_none() && req.group_name.is_none() {
            return Err(Ec2Error::MissingParameter("GroupId".to_string()));
        }
        Ok(req)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DescribeSecurityGroupsRequest {
    pub group_ids: Vec<String>,
    pub group_names: Vec<String>,
    pub filters: Vec<Filter>,
    pub page: PageRequest,
}

impl DescribeSecurityGroupsRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            group_ids: params.list("GroupId"),
            group_names: params.list("GroupName"),
            filters: params.filters()?,
            page: PageRequest::from_params(params)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeSecurityGroupsResponse {
    pub security_group_info: Vec<SecurityGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Traffic peer named by a permission, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Ipv4(String),
    Ipv6(String),
    PrefixList(String),
    Group {
        group_id: Option<String>,
        group_name: Option<String>,
        user_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub selector: Selector,
    pub description: Option<String>,
}

/// One `IpPermissions.N` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSpec {
    pub protocol: Option<String>,
    pub from_port: Option<i32>,
    pub to_port: Option<i32>,
    pub sources: Vec<SourceSpec>,
}

impl PermissionSpec {
    fn from_member(member: &Params) -> Result<Self> {
        let mut sources = Vec::new();
        for range in member.members("IpRanges") {
            if let Some(cidr) = range.string("CidrIp") {
                sources.push(SourceSpec {
                    selector: Selector::Ipv4(cidr),
                    description: range.string("Description"),
                });
            }
        }
        for range in member.members("Ipv6Ranges") {
            if let Some(cidr) = range.string("CidrIpv6") {
                sources.push(SourceSpec {
                    selector: Selector::Ipv6(cidr),
                    description: range.string("Description"),
                });
            }
        }
        for list in member.members("PrefixListIds") {
            if let Some(id) = list.string("PrefixListId") {
                sources.push(SourceSpec {
                    selector: Selector::PrefixList(id),
                    description: list.string("Description"),
                });
            }
        }
        for pair in member.members("Groups") {
            sources.push(SourceSpec {
                selector: Selector::Group {
                    group_id: pair.string("GroupId"),
                    group_name: pair.string("GroupName"),
                    user_id: pair.string("UserId"),
                },
                description: pair.string("Description"),
            });
        }
        Ok(Self {
            protocol: member.string("IpProtocol"),
            from_port: member.number("FromPort")?,
            to_port: member.number("ToPort")?,
            sources,
        })
    }

    /// `IpProtocol` / `CidrIp` / `SourceSecurityGroupName` at the top level.
    fn from_legacy(params: &Params) -> Result<Option<Self>> {
        let cidr = params.string("CidrIp");
        let group_name = params.string("SourceSecurityGroupName");
        let protocol = params.string("IpProtocol");
        if protocol.is_none() && cidr.is_none() && group_name.is_none() {
            return Ok(None);
        }
        let mut sources = Vec::new();
        if let Some(cidr) = cidr {
            sources.push(SourceSpec {
                selector: Selector::Ipv4(cidr),
                description: None,
            });
        }
        if let Some(name) = group_name {
            sources.push(SourceSpec {
                selector: Selector::Group {
                    group_id: None,
                    group_name: Some(name),
                    user_id: params.string("SourceSecurityGroupOwnerId"),
                },
                description: None,
            });
        }
        Ok(Some(Self {
            protocol: Some(protocol.unwrap_or_else(|| "-1".to_string())),
            from_port: params.number("FromPort")?,
            to_port: params.number("ToPort")?,
            sources,
        }))
    }
}

/// Parameters shared by authorize, revoke and description updates.
#[derive(Debug, Clone, Default)]
pub struct PermissionsRequest {
    pub group_id: Option<String>,
    pub group_name: Option<String>,
    pub permissions: Vec<PermissionSpec>,
    pub rule_ids: Vec<String>,
    /// `SecurityGroupRuleDescriptions.N`: (rule id, description).
    pub rule_descriptions: Vec<(String, Option<String>)>,
    pub tags: Vec<Tag>,
}

impl PermissionsRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        let mut permissions = params
            .members("IpPermissions")
            .iter()
            .map(PermissionSpec::from_member)
            .collect::<Result<Vec<_>>>()?;
        if let Some(legacy) = PermissionSpec::from_legacy(params)? {
            permissions.push(legacy);
        }
        let rule_descriptions = params
            .members("SecurityGroupRuleDescriptions")
            .into_iter()
            .map(|m| Ok((m.required("SecurityGroupRuleId")?, m.string("Description"))))
            .collect::<Result<Vec<_>>>()?;
        let req = Self {
            group_id: params.string("GroupId"),
            group_name: params.string("GroupName"),
            permissions,
            rule_ids: params.list("SecurityGroupRuleId"),
            rule_descriptions,
            tags: params.tags_for("security-group-rule")?,
        };
        if req.group_id.is_none() && req.group_name.is_none() {
            return Err(Ec2Error::MissingParameter("GroupId".to_string()));
        }
        Ok(req)
    }
}

/// A fully resolved permission with a single peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTuple {
    pub protocol: Protocol,
    pub from_port: Option<i32>,
    pub to_port: Option<i32>,
    pub source: RuleSource,
    pub description: Option<String>,
}

/// Protocol, ports and peer of a permission.
type PermissionKey<'a> = (&'a Protocol, Option<i32>, Option<i32>, &'a RuleSource);

/// Two permissions collide when protocol, ports and selector are equal.
fn same_permission(a: PermissionKey<'_>, b: PermissionKey<'_>) -> bool {
    a.0 == b.0 && a.1 == b.1 && a.2 == b.2 && a.3.same_selector(b.3)
}

impl RuleTuple {
    fn key(&self) -> PermissionKey<'_> {
        (&self.protocol, self.from_port, self.to_port, &self.source)
    }

    pub fn matches(&self, rule: &SecurityGroupRule) -> bool {
        same_permission(
            self.key(),
            (&rule.protocol, rule.from_port, rule.to_port, &rule.source),
        )
    }

    pub fn same(&self, other: &RuleTuple) -> bool {
        same_permission(self.key(), other.key())
    }

    fn peer(&self) -> String {
        match &self.source {
            RuleSource::Ipv4(net) => net.to_string(),
            RuleSource::Ipv6(net) => net.to_string(),
            RuleSource::PrefixList(id) => id.clone(),
            RuleSource::Group { group_id, .. } => group_id.clone(),
        }
    }

    fn ports(&self) -> String {
        match (self.from_port, self.to_port) {
            (Some(from), Some(to)) => format!("{}-{}", from, to),
            _ => "ALL".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeSecurityGroupResponse {
    #[serde(rename = "return")]
    pub ok: bool,
    pub security_group_rule_set: Vec<SecurityGroupRule>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CidrIpRef {
    pub cidr_ip: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CidrIpv6Ref {
    pub cidr_ipv6: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixListRef {
    pub prefix_list_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPairRef {
    pub group_id: String,
    pub user_id: String,
}

/// Permission echoed back when a revoke matched no rule.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownIpPermission {
    pub ip_protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_port: Option<i32>,
    pub ip_ranges: Vec<CidrIpRef>,
    pub ipv6_ranges: Vec<CidrIpv6Ref>,
    pub prefix_list_ids: Vec<PrefixListRef>,
    pub groups: Vec<GroupPairRef>,
}

impl From<&RuleTuple> for UnknownIpPermission {
    fn from(tuple: &RuleTuple) -> Self {
        let mut permission = UnknownIpPermission {
            ip_protocol: tuple.protocol.name(),
            from_port: tuple.from_port,
            to_port: tuple.to_port,
            ip_ranges: Vec::new(),
            ipv6_ranges: Vec::new(),
            prefix_list_ids: Vec::new(),
            groups: Vec::new(),
        };
        match &tuple.source {
            RuleSource::Ipv4(net) => permission.ip_ranges.push(CidrIpRef {
                cidr_ip: net.to_string(),
            }),
            RuleSource::Ipv6(net) => permission.ipv6_ranges.push(CidrIpv6Ref {
                cidr_ipv6: net.to_string(),
            }),
            RuleSource::PrefixList(id) => permission.prefix_list_ids.push(PrefixListRef {
                prefix_list_id: id.clone(),
            }),
            RuleSource::Group {
                group_id, user_id, ..
            } => permission.groups.push(GroupPairRef {
                group_id: group_id.clone(),
                user_id: user_id.clone(),
            }),
        }
        permission
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeSecurityGroupResponse {
    #[serde(rename = "return")]
    pub ok: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_ip_permission_set: Vec<UnknownIpPermission>,
}

#[derive(Debug, Clone, Default)]
pub struct DescribeSecurityGroupRulesRequest {
    pub rule_ids: Vec<String>,
    pub filters: Vec<Filter>,
    pub page: PageRequest,
}

impl DescribeSecurityGroupRulesRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            rule_ids: params.list("SecurityGroupRuleId"),
            filters: params.filters()?,
            page: PageRequest::from_params(params)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeSecurityGroupRulesResponse {
    pub security_group_rule_set: Vec<SecurityGroupRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

impl Ec2Network {
    pub fn create_security_group(
        &mut self,
        req: CreateSecurityGroupRequest,
    ) -> Result<CreateSecurityGroupResponse> {
        validate_group_name(&req.group_name)?;
        if req.description.chars().count() > MAX_DESCRIPTION {
            return Err(Ec2Error::invalid_value(format!(
                "Group description must be {} characters or fewer",
                MAX_DESCRIPTION
            )));
        }
        if let Some(vpc_id) = &req.vpc_id {
            self.store.require::<Vpc>(vpc_id)?;
        }
        if self
            .store
            .security_group_by_name(req.vpc_id.as_deref(), &req.group_name)
            .is_some()
        {
            return Err(Ec2Error::duplicate(
                "InvalidGroup.Duplicate",
                format!(
                    "The security group '{}' already exists for VPC '{}'",
                    req.group_name,
                    req.vpc_id.as_deref().unwrap_or("none")
                ),
            ));
        }

        let region = self.config.region.clone();
        let mut group = defaults::security_group(
            self.collab.as_ref(),
            &region,
            req.vpc_id.as_deref(),
            &req.group_name,
            &req.description,
        );
        group.tags = Tags::try_from_tags(req.tags)?;
        if group.vpc_id.is_some() {
            let egress = defaults::allow_all_rule(
                self.collab.as_ref(),
                &region,
                &group,
                true,
                RuleSource::Ipv4(Ipv4Net::default()),
            );
            group.egress.push(egress);
        }
        let response = CreateSecurityGroupResponse {
            group_id: group.id.clone(),
            security_group_arn: group.security_group_arn.clone(),
            tag_set: group.tags.clone(),
        };
        self.store.put(group)?;

        info!(
            group_id = %response.group_id,
            group_name = %req.group_name,
            vpc_id = ?req.vpc_id,
            "Created security group"
        );
        self.audit
            .security_group_created(&response.group_id, &req.group_name);
        Ok(response)
    }

    pub fn delete_security_group(
        &mut self,
        req: DeleteSecurityGroupRequest,
    ) -> Result<ReturnResponse> {
        let group = match (&req.group_id, &req.group_name) {
            (Some(id), _) => self.store.get::<SecurityGroup>(id),
            (None, Some(name)) => self.group_by_name(name),
            (None, None) => return Err(Ec2Error::MissingParameter("GroupId".to_string())),
        };
        let Some(group) = group else {
            debug!(group_id = ?req.group_id, group_name = ?req.group_name, "Security group already absent");
            return Ok(ReturnResponse::ok());
        };
        let group_id = group.id.clone();

        if group.is_default() {
            return Err(Ec2Error::invalid(
                "CannotDelete",
                format!(
                    "the specified group: \"{}\" name: \"{}\" cannot be deleted by a user",
                    group_id, group.group_name
                ),
            ));
        }
        if let Some(referrer) = self
            .store
            .values::<SecurityGroup>()
            .into_iter()
            .find(|g| g.id != group_id && g.references(&group_id))
        {
            warn!(group_id = %group_id, referrer = %referrer.id, "Refusing to delete referenced security group");
            return Err(Ec2Error::dependency(format!(
                "resource {} has a dependent object",
                group_id
            )));
        }
        let attached_instance = self
            .store
            .values::<Instance>()
            .into_iter()
            .any(|i| i.is_live() && i.security_groups.contains(&group_id));
        let attached_interface = self
            .store
            .values::<NetworkInterface>()
            .into_iter()
            .any(|n| n.groups.contains(&group_id));
        if attached_instance || attached_interface {
            warn!(group_id = %group_id, "Refusing to delete security group in use");
            return Err(Ec2Error::dependency(format!(
                "resource {} has a dependent object",
                group_id
            )));
        }

        self.store.remove::<SecurityGroup>(&group_id);
        info!(group_id = %group_id, "Deleted security group");
        self.audit.security_group_deleted(&group_id);
        Ok(ReturnResponse::ok())
    }

    pub fn describe_security_groups(
        &self,
        req: DescribeSecurityGroupsRequest,
    ) -> Result<DescribeSecurityGroupsResponse> {
        let groups = self.store.values::<SecurityGroup>();
        for id in &req.group_ids {
            self.store.require::<SecurityGroup>(id)?;
        }
        for name in &req.group_names {
            if !groups.iter().any(|g| g.group_name.eq_ignore_ascii_case(name)) {
                return Err(Ec2Error::group_not_found(name));
            }
        }
        let candidates = groups.into_iter().filter(|g| {
            (req.group_ids.is_empty() || req.group_ids.contains(&g.id))
                && (req.group_names.is_empty()
                    || req
                        .group_names
                        .iter()
                        .any(|n| g.group_name.eq_ignore_ascii_case(n)))
        });
        let matched: Vec<SecurityGroup> = filter::apply(candidates, &req.filters)
            .into_iter()
            .cloned()
            .collect();
        let page = paginate(matched, &req.page, WIDE)?;
        debug!(count = page.items.len(), "Described security groups");
        Ok(DescribeSecurityGroupsResponse {
            security_group_info: page.items,
            next_token: page.next_token,
        })
    }

    pub fn authorize_security_group(
        &mut self,
        req: PermissionsRequest,
        egress: bool,
    ) -> Result<AuthorizeSecurityGroupResponse> {
        let group = self.resolve_group(&req)?.clone();
        if egress && group.vpc_id.is_none() {
            return Err(Ec2Error::invalid_value(format!(
                "Egress rules require a VPC security group, {} is not in a VPC",
                group.id
            )));
        }
        let tuples = self.resolve_permissions(&group, &req.permissions)?;
        if tuples.is_empty() {
            return Err(Ec2Error::MissingParameter("IpPermissions".to_string()));
        }
        for (i, tuple) in tuples.iter().enumerate() {
            let repeated = tuples[..i].iter().any(|t| t.same(tuple));
            if repeated || group.rules(egress).iter().any(|r| tuple.matches(r)) {
                return Err(Ec2Error::duplicate(
                    "InvalidPermission.Duplicate",
                    format!(
                        "the specified rule \"peer: {}, {}, {}, ALLOW\" already exists",
                        tuple.peer(),
                        tuple.protocol.name(),
                        tuple.ports()
                    ),
                ));
            }
        }
        let tags = Tags::try_from_tags(req.tags)?;

        let region = self.config.region.clone();
        let rules: Vec<SecurityGroupRule> = tuples
            .into_iter()
            .map(|tuple| {
                let id = self.new_id("sgr");
                SecurityGroupRule {
                    security_group_rule_arn: arn(
                        &region,
                        &group.owner_id,
                        "security-group-rule",
                        &id,
                    ),
                    id,
                    group_id: group.id.clone(),
                    group_owner_id: group.owner_id.clone(),
                    is_egress: egress,
                    protocol: tuple.protocol,
                    from_port: tuple.from_port,
                    to_port: tuple.to_port,
                    source: tuple.source,
                    description: tuple.description,
                    tags: tags.clone(),
                }
            })
            .collect();
        self.store
            .require_mut::<SecurityGroup>(&group.id)?
            .rules_mut(egress)
            .extend(rules.iter().cloned());

        info!(
            group_id = %group.id,
            count = rules.len(),
            egress,
            "Authorized security group rules"
        );
        self.audit.rules_authorized(&group.id, rules.len(), egress);
        Ok(AuthorizeSecurityGroupResponse {
            ok: true,
            security_group_rule_set: rules,
        })
    }

    pub fn revoke_security_group(
        &mut self,
        req: PermissionsRequest,
        egress: bool,
    ) -> Result<RevokeSecurityGroupResponse> {
        let group = self.resolve_group(&req)?.clone();
        let tuples = self.resolve_permissions(&group, &req.permissions)?;
        if tuples.is_empty() && req.rule_ids.is_empty() {
            return Err(Ec2Error::MissingParameter("IpPermissions".to_string()));
        }

        let rules = group.rules(egress);
        let mut revoked: Vec<String> = Vec::new();
        for rule_id in &req.rule_ids {
            if !rules.iter().any(|r| &r.id == rule_id) {
                return Err(ResourceKind::SecurityGroupRule.not_found(rule_id));
            }
            if !revoked.contains(rule_id) {
                revoked.push(rule_id.clone());
            }
        }
        let mut unknown = Vec::new();
        for tuple in &tuples {
            match rules.iter().find(|r| tuple.matches(r)) {
                Some(rule) if !revoked.contains(&rule.id) => revoked.push(rule.id.clone()),
                Some(_) => {}
                None => unknown.push(UnknownIpPermission::from(tuple)),
            }
        }

        if !revoked.is_empty() {
            self.store
                .require_mut::<SecurityGroup>(&group.id)?
                .rules_mut(egress)
                .retain(|r| !revoked.contains(&r.id));
            info!(
                group_id = %group.id,
                count = revoked.len(),
                egress,
                "Revoked security group rules"
            );
            self.audit.rules_revoked(&group.id, revoked.len(), egress);
        }
        if !unknown.is_empty() {
            debug!(group_id = %group.id, unmatched = unknown.len(), "Revoke left permissions unmatched");
        }
        Ok(RevokeSecurityGroupResponse {
            ok: !revoked.is_empty(),
            unknown_ip_permission_set: unknown,
        })
    }

    pub fn describe_security_group_rules(
        &self,
        req: DescribeSecurityGroupRulesRequest,
    ) -> Result<DescribeSecurityGroupRulesResponse> {
        let rules: Vec<&SecurityGroupRule> = self
            .store
            .values::<SecurityGroup>()
            .into_iter()
            .flat_map(|g| g.all_rules())
            .collect();
        for id in &req.rule_ids {
            if !rules.iter().any(|r| &r.id == id) {
                return Err(ResourceKind::SecurityGroupRule.not_found(id));
            }
        }
        let candidates = rules
            .into_iter()
            .filter(|r| req.rule_ids.is_empty() || req.rule_ids.contains(&r.id));
        let matched: Vec<SecurityGroupRule> = filter::apply(candidates, &req.filters)
            .into_iter()
            .cloned()
            .collect();
        let page = paginate(matched, &req.page, WIDE)?;
        debug!(count = page.items.len(), "Described security group rules");
        Ok(DescribeSecurityGroupRulesResponse {
            security_group_rule_set: page.items,
            next_token: page.next_token,
        })
    }

    /// Set rule descriptions, matched by rule id or by permission tuple.
    pub fn update_rule_descriptions(
        &mut self,
        req: PermissionsRequest,
        egress: bool,
    ) -> Result<ReturnResponse> {
        let group = self.resolve_group(&req)?.clone();
        let tuples = self.resolve_permissions(&group, &req.permissions)?;
        let rules = group.rules(egress);

        let mut updates: Vec<(String, Option<String>)> = Vec::new();
        for (rule_id, description) in &req.rule_descriptions {
            if !rules.iter().any(|r| &r.id == rule_id) {
                return Err(permission_not_found(rule_id));
            }
            updates.push((rule_id.clone(), description.clone()));
        }
        for tuple in &tuples {
            let rule = rules
                .iter()
                .find(|r| tuple.matches(r))
                .ok_or_else(|| permission_not_found(&tuple.peer()))?;
            updates.push((rule.id.clone(), tuple.description.clone()));
        }
        if updates.is_empty() {
            return Err(Ec2Error::MissingParameter("IpPermissions".to_string()));
        }

        let stored = self.store.require_mut::<SecurityGroup>(&group.id)?;
        for (rule_id, description) in &updates {
            if let Some(rule) = stored.rule_mut(rule_id) {
                rule.description = description.clone();
            }
        }
        info!(
            group_id = %group.id,
            count = updates.len(),
            egress,
            "Updated security group rule descriptions"
        );
        Ok(ReturnResponse::ok())
    }

    /// Group by name outside any VPC, falling back to the default VPC.
    fn group_by_name(&self, name: &str) -> Option<&SecurityGroup> {
        self.store.security_group_by_name(None, name).or_else(|| {
            let default_vpc = self
                .store
                .values::<Vpc>()
                .into_iter()
                .find(|v| v.is_default)?;
            self.store
                .security_group_by_name(Some(&default_vpc.id), name)
        })
    }

    fn resolve_group(&self, req: &PermissionsRequest) -> Result<&SecurityGroup> {
        match (&req.group_id, &req.group_name) {
            (Some(id), _) => self.store.require::<SecurityGroup>(id),
            (None, Some(name)) => self
                .group_by_name(name)
                .ok_or_else(|| Ec2Error::group_not_found(name)),
            (None, None) => Err(Ec2Error::MissingParameter("GroupId".to_string())),
        }
    }

    /// Validate each permission and expand it into one tuple per source.
    fn resolve_permissions(
        &self,
        group: &SecurityGroup,
        permissions: &[PermissionSpec],
    ) -> Result<Vec<RuleTuple>> {
        let mut tuples = Vec::new();
        for permission in permissions {
            let raw = permission
                .protocol
                .as_deref()
                .ok_or_else(|| Ec2Error::MissingParameter("IpProtocol".to_string()))?;
            let protocol = Protocol::parse(raw)?;
            let (from_port, to_port) =
                validate_port_range(&protocol, permission.from_port, permission.to_port)?;
            if permission.sources.is_empty() {
                return Err(Ec2Error::invalid_value(
                    "The request must specify at least one of IpRanges, Ipv6Ranges, PrefixListIds or Groups",
                ));
            }
            for spec in &permission.sources {
                tuples.push(RuleTuple {
                    protocol: protocol.clone(),
                    from_port,
                    to_port,
                    source: self.resolve_source(group, &spec.selector)?,
                    description: spec.description.clone(),
                });
            }
        }
        Ok(tuples)
    }

    fn resolve_source(&self, group: &SecurityGroup, selector: &Selector) -> Result<RuleSource> {
        let source = match selector {
            Selector::Ipv4(cidr) => RuleSource::Ipv4(parse_ipv4_cidr(cidr)?.trunc()),
            Selector::Ipv6(cidr) => RuleSource::Ipv6(parse_ipv6_cidr(cidr)?.trunc()),
            Selector::PrefixList(id) => RuleSource::PrefixList(id.clone()),
            Selector::Group {
                group_id,
                group_name,
                user_id,
            } => {
                let referenced = match (group_id, group_name) {
                    (Some(id), _) => self.store.require::<SecurityGroup>(id)?,
                    (None, Some(name)) => self
                        .store
                        .security_group_by_name(group.vpc_id.as_deref(), name)
                        .ok_or_else(|| Ec2Error::group_not_found(name))?,
                    (None, None) => {
                        return Err(Ec2Error::MissingParameter("Groups.GroupId".to_string()));
                    }
                };
                RuleSource::Group {
                    group_id: referenced.id.clone(),
                    user_id: user_id
                        .clone()
                        .unwrap_or_else(|| referenced.owner_id.clone()),
                    group_name: Some(referenced.group_name.clone()),
                }
            }
        };
        Ok(source)
    }
}

fn permission_not_found(what: &str) -> Ec2Error {
    Ec2Error::NotFound {
        code: "InvalidPermission.NotFound",
        message: format!(
            "The specified rule does not exist in this security group: {}",
            what
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn group(net: &mut Ec2Network, vpc_id: &str, name: &str) -> String {
        let response = net
            .dispatch(
                "CreateSecurityGroup",
                &params(&[
                    ("GroupName", name),
                    ("GroupDescription", "test group"),
                    ("VpcId", vpc_id),
                ]),
            )
            .unwrap();
        response["groupId"].as_str().unwrap().to_string()
    }

    fn ssh_from(group_id: &str, cidr: &str) -> Params {
        params(&[
            ("GroupId", group_id),
            ("IpPermissions.1.IpProtocol", "tcp"),
            ("IpPermissions.1.FromPort", "22"),
            ("IpPermissions.1.ToPort", "22"),
            ("IpPermissions.1.IpRanges.1.CidrIp", cidr),
        ])
    }

    #[test]
    fn test_create_security_group() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let group_id = group(&mut net, &vpc_id, "web");

        let stored = net.store().get::<SecurityGroup>(&group_id).unwrap();
        assert_eq!(stored.egress.len(), 1);
        assert_eq!(stored.egress[0].protocol, Protocol::All);
        assert_eq!(stored.egress[0].source, RuleSource::Ipv4(Ipv4Net::default()));
        assert!(stored.ingress.is_empty());

        let duplicate = params(&[
            ("GroupName", "WEB"),
            ("GroupDescription", "again"),
            ("VpcId", vpc_id.as_str()),
        ]);
        match net.dispatch("CreateSecurityGroup", &duplicate) {
            Err(e) => assert_eq!(e.code(), "InvalidGroup.Duplicate"),
            other => panic!("Unexpected response: {:?}", other),
        }

        let reserved = params(&[
            ("GroupName", "sg-web"),
            ("Description", "bad"),
            ("VpcId", vpc_id.as_str()),
        ]);
        match net.dispatch("CreateSecurityGroup", &reserved) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterValue"),
            other => panic!("Unexpected response: {:?}", other),
        }

        let missing_vpc = params(&[
            ("GroupName", "db"),
            ("GroupDescription", "db"),
            ("VpcId", "vpc-404"),
        ]);
        match net.dispatch("CreateSecurityGroup", &missing_vpc) {
            Err(e) => assert_eq!(e.code(), "InvalidVpcID.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_group_outside_vpc_has_no_egress() {
        let mut net = network();
        let response = net
            .dispatch(
                "CreateSecurityGroup",
                &params(&[("GroupName", "classic"), ("GroupDescription", "x")]),
            )
            .unwrap();
        let group_id = response["groupId"].as_str().unwrap();
        let stored = net.store().get::<SecurityGroup>(group_id).unwrap();
        assert!(stored.vpc_id.is_none());
        assert!(stored.egress.is_empty());

        let egress = params(&[
            ("GroupId", group_id),
            ("IpPermissions.1.IpProtocol", "-1"),
            ("IpPermissions.1.IpRanges.1.CidrIp", "0.0.0.0/0"),
        ]);
        match net.dispatch("AuthorizeSecurityGroupEgress", &egress) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterValue"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_authorize_then_revoke_and_reauthorize() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let group_id = group(&mut net, &vpc_id, "web");
        let request = ssh_from(&group_id, "10.0.0.0/8");

        let response = net
            .dispatch("AuthorizeSecurityGroupIngress", &request)
            .unwrap();
        assert_eq!(response["return"], true);
        let rules = response["securityGroupRuleSet"].as_array().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0]["fromPort"], 22);
        assert_eq!(rules[0]["cidrIpv4"], "10.0.0.0/8");

        match net.dispatch("AuthorizeSecurityGroupIngress", &request) {
            Err(e) => assert_eq!(e.code(), "InvalidPermission.Duplicate"),
            other => panic!("Unexpected response: {:?}", other),
        }

        let response = net.dispatch("RevokeSecurityGroupIngress", &request).unwrap();
        assert_eq!(response["return"], true);
        assert!(response.get("unknownIpPermissionSet").is_none());
        assert!(
            net.store()
                .get::<SecurityGroup>(&group_id)
                .unwrap()
                .ingress
                .is_empty()
        );

        net.dispatch("AuthorizeSecurityGroupIngress", &request)
            .unwrap();
    }

    #[test]
    fn test_authorize_fans_out_over_sources() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let web = group(&mut net, &vpc_id, "web");
        let lb = group(&mut net, &vpc_id, "lb");
        let request = params(&[
            ("GroupId", web.as_str()),
            ("IpPermissions.1.IpProtocol", "tcp"),
            ("IpPermissions.1.FromPort", "443"),
            ("IpPermissions.1.ToPort", "443"),
            ("IpPermissions.1.IpRanges.1.CidrIp", "10.0.0.0/8"),
            ("IpPermissions.1.IpRanges.1.Description", "office"),
            ("IpPermissions.1.IpRanges.2.CidrIp", "192.168.0.0/16"),
            ("IpPermissions.1.Ipv6Ranges.1.CidrIpv6", "2001:db8::/32"),
            ("IpPermissions.1.Groups.1.GroupId", lb.as_str()),
            ("IpPermissions.2.IpProtocol", "icmp"),
            ("IpPermissions.2.FromPort", "8"),
            ("IpPermissions.2.ToPort", "-1"),
            ("IpPermissions.2.PrefixListIds.1.PrefixListId", "pl-123"),
            ("TagSpecification.1.ResourceType", "security-group-rule"),
            ("TagSpecification.1.Tag.1.Key", "team"),
            ("TagSpecification.1.Tag.1.Value", "edge"),
        ]);
        let response = net
            .dispatch("AuthorizeSecurityGroupIngress", &request)
            .unwrap();
        let rules = response["securityGroupRuleSet"].as_array().unwrap();
        assert_eq!(rules.len(), 5);
        assert_eq!(rules[0]["description"], "office");
        assert_eq!(rules[3]["referencedGroupInfo"]["groupId"], lb.as_str());
        assert_eq!(rules[4]["prefixListId"], "pl-123");
        assert!(rules.iter().all(|r| r["tagSet"][0]["key"] == "team"));

        let stored = net.store().get::<SecurityGroup>(&web).unwrap();
        assert_eq!(stored.ingress.len(), 5);
        assert!(stored.references(&lb));

        let json = serde_json::to_value(stored).unwrap();
        assert_eq!(json["ipPermissions"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_within_request_inserts_nothing() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let web = group(&mut net, &vpc_id, "web");
        let request = params(&[
            ("GroupId", web.as_str()),
            ("IpPermissions.1.IpProtocol", "tcp"),
            ("IpPermissions.1.FromPort", "80"),
            ("IpPermissions.1.ToPort", "80"),
            ("IpPermissions.1.IpRanges.1.CidrIp", "10.0.0.0/8"),
            ("IpPermissions.1.IpRanges.2.CidrIp", "172.16.0.0/12"),
            ("IpPermissions.2.IpProtocol", "6"),
            ("IpPermissions.2.FromPort", "80"),
            ("IpPermissions.2.ToPort", "80"),
            ("IpPermissions.2.IpRanges.1.CidrIp", "10.0.0.0/8"),
        ]);
        match net.dispatch("AuthorizeSecurityGroupIngress", &request) {
            Err(e) => assert_eq!(e.code(), "InvalidPermission.Duplicate"),
            other => panic!("Unexpected response: {:?}", other),
        }
        assert!(net.store().get::<SecurityGroup>(&web).unwrap().ingress.is_empty());
    }

    #[test]
    fn test_group_peer_duplicate_compares_by_id() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let web = group(&mut net, &vpc_id, "web");
        let lb = group(&mut net, &vpc_id, "lb");
        let by_id = params(&[
            ("GroupId", web.as_str()),
            ("IpPermissions.1.IpProtocol", "tcp"),
            ("IpPermissions.1.FromPort", "8080"),
            ("IpPermissions.1.ToPort", "8080"),
            ("IpPermissions.1.Groups.1.GroupId", lb.as_str()),
            ("IpPermissions.1.Groups.1.UserId", "111111111111"),
        ]);
        net.dispatch("AuthorizeSecurityGroupIngress", &by_id)
            .unwrap();

        let by_name = params(&[
            ("GroupId", web.as_str()),
            ("IpPermissions.1.IpProtocol", "tcp"),
            ("IpPermissions.1.FromPort", "8080"),
            ("IpPermissions.1.ToPort", "8080"),
            ("IpPermissions.1.Groups.1.GroupName", "lb"),
        ]);
        match net.dispatch("AuthorizeSecurityGroupIngress", &by_name) {
            Err(e) => assert_eq!(e.code(), "InvalidPermission.Duplicate"),
            other => panic!("Unexpected response: {:?}", other),
        }
        assert_eq!(net.store().get::<SecurityGroup>(&web).unwrap().ingress.len(), 1);
    }

    #[test]
    fn test_legacy_form_validation() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let web = group(&mut net, &vpc_id, "web");

        let inverted = params(&[
            ("GroupId", web.as_str()),
            ("IpProtocol", "tcp"),
            ("FromPort", "22"),
            ("ToPort", "21"),
            ("CidrIp", "10.0.0.0/8"),
        ]);
        match net.dispatch("AuthorizeSecurityGroupIngress", &inverted) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterValue"),
            other => panic!("Unexpected response: {:?}", other),
        }

        let bad_cidr = params(&[
            ("GroupId", web.as_str()),
            ("IpProtocol", "tcp"),
            ("FromPort", "22"),
            ("ToPort", "22"),
            ("CidrIp", "10.0.0.300/8"),
        ]);
        match net.dispatch("AuthorizeSecurityGroupIngress", &bad_cidr) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterValue"),
            other => panic!("Unexpected response: {:?}", other),
        }

        // Legacy group-name source within the same VPC.
        group(&mut net, &vpc_id, "db");
        let by_name = params(&[
            ("GroupId", web.as_str()),
            ("SourceSecurityGroupName", "db"),
        ]);
        let response = net
            .dispatch("AuthorizeSecurityGroupIngress", &by_name)
            .unwrap();
        assert_eq!(response["securityGroupRuleSet"][0]["ipProtocol"], "-1");

        let unknown_group = params(&[
            ("GroupId", web.as_str()),
            ("IpPermissions.1.IpProtocol", "tcp"),
            ("IpPermissions.1.FromPort", "5432"),
            ("IpPermissions.1.ToPort", "5432"),
            ("IpPermissions.1.Groups.1.GroupId", "sg-404"),
        ]);
        match net.dispatch("AuthorizeSecurityGroupIngress", &unknown_group) {
            Err(e) => assert_eq!(e.code(), "InvalidGroup.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_revoke_reports_unknown_permissions() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let web = group(&mut net, &vpc_id, "web");

        let response = net
            .dispatch("RevokeSecurityGroupIngress", &ssh_from(&web, "10.0.0.0/8"))
            .unwrap();
        assert_eq!(response["return"], false);
        let unknown = response["unknownIpPermissionSet"].as_array().unwrap();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0]["ipProtocol"], "tcp");
        assert_eq!(unknown[0]["ipRanges"][0]["cidrIp"], "10.0.0.0/8");
    }

    #[test]
    fn test_revoke_by_rule_id() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let web = group(&mut net, &vpc_id, "web");
        let egress_rule = net.store().get::<SecurityGroup>(&web).unwrap().egress[0]
            .id
            .clone();

        match net.dispatch(
            "RevokeSecurityGroupIngress",
            &params(&[("GroupId", web.as_str()), ("SecurityGroupRuleId.1", egress_rule.as_str())]),
        ) {
            Err(e) => assert_eq!(e.code(), "InvalidSecurityGroupRuleId.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }

        let response = net
            .dispatch(
                "RevokeSecurityGroupEgress",
                &params(&[("GroupId", web.as_str()), ("SecurityGroupRuleId.1", egress_rule.as_str())]),
            )
            .unwrap();
        assert_eq!(response["return"], true);
        assert!(net.store().get::<SecurityGroup>(&web).unwrap().egress.is_empty());
    }

    #[test]
    fn test_delete_security_group_dependencies() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let web = group(&mut net, &vpc_id, "web");
        let lb = group(&mut net, &vpc_id, "lb");

        let default_id = net.store().default_security_group(&vpc_id).unwrap().id.clone();
        match net.dispatch("DeleteSecurityGroup", &params(&[("GroupId", default_id.as_str())])) {
            Err(e) => assert_eq!(e.code(), "CannotDelete"),
            other => panic!("Unexpected response: {:?}", other),
        }

        net.dispatch(
            "AuthorizeSecurityGroupIngress",
            &params(&[
                ("GroupId", web.as_str()),
                ("IpPermissions.1.IpProtocol", "tcp"),
                ("IpPermissions.1.FromPort", "80"),
                ("IpPermissions.1.ToPort", "80"),
                ("IpPermissions.1.Groups.1.GroupId", lb.as_str()),
            ]),
        )
        .unwrap();
        match net.dispatch("DeleteSecurityGroup", &params(&[("GroupId", lb.as_str())])) {
            Err(e) => assert_eq!(e.code(), "DependencyViolation"),
            other => panic!("Unexpected response: {:?}", other),
        }

        let subnet_id = subnet(&mut net, &vpc_id, "10.0.1.0/24");
        let mut instance = Instance::new("i-1", &vpc_id, &subnet_id);
        instance.security_groups.push(web.clone());
        net.store_mut().put(instance).unwrap();
        match net.dispatch("DeleteSecurityGroup", &params(&[("GroupId", web.as_str())])) {
            Err(e) => assert_eq!(e.code(), "DependencyViolation"),
            other => panic!("Unexpected response: {:?}", other),
        }
        net.store_mut()
            .get_mut::<Instance>("i-1")
            .unwrap()
            .state = "terminated".to_string();

        let mut eni = NetworkInterface::new("eni-1", &vpc_id, &subnet_id);
        eni.groups.push(web.clone());
        net.store_mut().put(eni).unwrap();
        match net.dispatch("DeleteSecurityGroup", &params(&[("GroupId", web.as_str())])) {
            Err(e) => assert_eq!(e.code(), "DependencyViolation"),
            other => panic!("Unexpected response: {:?}", other),
        }
        net.store_mut().remove::<NetworkInterface>("eni-1");

        net.dispatch("DeleteSecurityGroup", &params(&[("GroupId", web.as_str())]))
            .unwrap();
        net.dispatch("DeleteSecurityGroup", &params(&[("GroupId", lb.as_str())]))
            .unwrap();
        net.dispatch("DeleteSecurityGroup", &params(&[("GroupId", lb.as_str())]))
            .unwrap();
    }

    #[test]
    fn test_delete_by_name_outside_vpc() {
        let mut net = network();
        net.dispatch(
            "CreateSecurityGroup",
            &params(&[("GroupName", "legacy"), ("GroupDescription", "x")]),
        )
        .unwrap();
        net.dispatch("DeleteSecurityGroup", &params(&[("GroupName", "legacy")]))
            .unwrap();
        assert_eq!(net.store().count::<SecurityGroup>(), 0);
    }

    #[test]
    fn test_describe_security_groups() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let web = group(&mut net, &vpc_id, "web");
        group(&mut net, &vpc_id, "db");

        let response = net
            .dispatch("DescribeSecurityGroups", &params(&[("GroupName.1", "web")]))
            .unwrap();
        let groups = response["securityGroupInfo"].as_array().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0]["groupId"], web.as_str());

        let response = net
            .dispatch(
                "DescribeSecurityGroups",
                &params(&[("Filter.1.Name", "vpc-id"), ("Filter.1.Value.1", vpc_id.as_str())]),
            )
            .unwrap();
        assert_eq!(response["securityGroupInfo"].as_array().unwrap().len(), 3);

        match net.dispatch("DescribeSecurityGroups", &params(&[("GroupName.1", "nope")])) {
            Err(e) => assert_eq!(e.code(), "InvalidGroup.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }
        match net.dispatch("DescribeSecurityGroups", &params(&[("GroupId.1", "sg-404")])) {
            Err(e) => assert_eq!(e.code(), "InvalidGroup.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_describe_security_group_rules() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let web = group(&mut net, &vpc_id, "web");
        net.dispatch("AuthorizeSecurityGroupIngress", &ssh_from(&web, "10.0.0.0/8"))
            .unwrap();

        let response = net
            .dispatch(
                "DescribeSecurityGroupRules",
                &params(&[("Filter.1.Name", "group-id"), ("Filter.1.Value.1", web.as_str())]),
            )
            .unwrap();
        let rules = response["securityGroupRuleSet"].as_array().unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().any(|r| r["isEgress"] == true));

        let rule_id = rules[0]["securityGroupRuleId"].as_str().unwrap().to_string();
        let response = net
            .dispatch(
                "DescribeSecurityGroupRules",
                &params(&[("SecurityGroupRuleId.1", rule_id.as_str())]),
            )
            .unwrap();
        assert_eq!(response["securityGroupRuleSet"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_update_rule_descriptions() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let web = group(&mut net, &vpc_id, "web");
        net.dispatch("AuthorizeSecurityGroupIngress", &ssh_from(&web, "10.0.0.0/8"))
            .unwrap();

        let mut request = ssh_from(&web, "10.0.0.0/8");
        request.insert("IpPermissions.1.IpRanges.1.Description", "bastion");
        net.dispatch("UpdateSecurityGroupRuleDescriptionsIngress", &request)
            .unwrap();
        let stored = net.store().get::<SecurityGroup>(&web).unwrap();
        assert_eq!(stored.ingress[0].description.as_deref(), Some("bastion"));
        let egress_rule = stored.egress[0].id.clone();

        match net.dispatch(
            "UpdateSecurityGroupRuleDescriptionsIngress",
            &ssh_from(&web, "172.16.0.0/12"),
        ) {
            Err(e) => assert_eq!(e.code(), "InvalidPermission.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }

        net.dispatch(
            "UpdateSecurityGroupRuleDescriptionsEgress",
            &params(&[
                ("GroupId", web.as_str()),
                ("SecurityGroupRuleDescriptions.1.SecurityGroupRuleId", egress_rule.as_str()),
                ("SecurityGroupRuleDescriptions.1.Description", "anywhere"),
            ]),
        )
        .unwrap();
        let stored = net.store().get::<SecurityGroup>(&web).unwrap();
        assert_eq!(stored.egress[0].description.as_deref(), Some("anywhere"));
    }
}
