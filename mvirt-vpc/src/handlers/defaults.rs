//! Factories for the resources every VPC starts with.
//!
//! Each factory builds one entity without touching the store, so it can be
//! exercised on its own; [`install_vpc_defaults`] writes the three of them
//! for a new VPC.

use ipnet::Ipv4Net;

use crate::collab::Collaborators;
use crate::error::Result;
use crate::model::network_acl::{RESERVED_IPV4_RULE, RESERVED_IPV6_RULE};
use crate::model::security_group::DEFAULT_GROUP_NAME;
use crate::model::{
    NetworkAcl, NetworkAclEntry, Protocol, Route, RouteDestination, RouteTable,
    RouteTableAssociation, RuleAction, RuleSource, SecurityGroup, SecurityGroupRule, Tags, Vpc,
    arn,
};
use crate::store::ResourceStore;

/// Rule number of the allow-all entries in a VPC's default ACL.
pub const DEFAULT_ALLOW_RULE: u32 = 100;

/// Ids of the resources created alongside a VPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcDefaults {
    pub security_group_id: String,
    pub network_acl_id: String,
    pub route_table_id: String,
}

/// Deny-all IPv4 and IPv6 entries in both directions.
pub fn reserved_entries() -> Vec<NetworkAclEntry> {
    vec![
        NetworkAclEntry::catch_all(RESERVED_IPV4_RULE, RuleAction::Deny, false, false),
        NetworkAclEntry::catch_all(RESERVED_IPV6_RULE, RuleAction::Deny, false, true),
        NetworkAclEntry::catch_all(RESERVED_IPV4_RULE, RuleAction::Deny, true, false),
        NetworkAclEntry::catch_all(RESERVED_IPV6_RULE, RuleAction::Deny, true, true),
    ]
}

/// ACL with only the reserved entries.
pub fn network_acl(collab: &dyn Collaborators, vpc_id: &str) -> NetworkAcl {
    let mut acl = NetworkAcl {
        id: collab.generate_unique_id("acl"),
        vpc_id: vpc_id.to_string(),
        is_default: false,
        entry_set: Vec::new(),
        association_set: Vec::new(),
        owner_id: collab.get_owner_id(),
        tags: Tags::new(),
    };
    for entry in reserved_entries() {
        acl.put_entry(entry);
    }
    acl
}

/// The VPC's default ACL: reserved entries plus allow-all at rule 100.
pub fn default_network_acl(collab: &dyn Collaborators, vpc_id: &str) -> NetworkAcl {
    let mut acl = network_acl(collab, vpc_id);
    acl.is_default = true;
    for egress in [false, true] {
        acl.put_entry(NetworkAclEntry::catch_all(
            DEFAULT_ALLOW_RULE,
            RuleAction::Allow,
            egress,
            false,
        ));
    }
    acl
}

/// Local routes for every associated CIDR block of `vpc`.
pub fn local_routes(vpc: &Vpc) -> Vec<Route> {
    vpc.ipv4_blocks()
        .map(RouteDestination::Ipv4)
        .chain(vpc.ipv6_blocks().map(RouteDestination::Ipv6))
        .map(Route::local)
        .collect()
}

/// Route table with the local routes and no associations.
pub fn route_table(collab: &dyn Collaborators, vpc: &Vpc) -> RouteTable {
    RouteTable {
        id: collab.generate_unique_id("rtb"),
        vpc_id: vpc.id.clone(),
        owner_id: collab.get_owner_id(),
        routes: local_routes(vpc),
        associations: Vec::new(),
        propagating_vgws: Vec::new(),
        tags: Tags::new(),
    }
}

/// Route table holding the VPC's main association.
pub fn main_route_table(collab: &dyn Collaborators, vpc: &Vpc) -> RouteTable {
    let mut table = route_table(collab, vpc);
    let association = RouteTableAssociation::main(collab.generate_unique_id("rtbassoc"), &table.id);
    table.associations.push(association);
    table
}

/// A new rule of `group` allowing all protocols to or from `cidr`.
pub fn allow_all_rule(
    collab: &dyn Collaborators,
    region: &str,
    group: &SecurityGroup,
    egress: bool,
    source: RuleSource,
) -> SecurityGroupRule {
    let id = collab.generate_unique_id("sgr");
    SecurityGroupRule {
        security_group_rule_arn: arn(region, &group.owner_id, "security-group-rule", &id),
        id,
        group_id: group.id.clone(),
        group_owner_id: group.owner_id.clone(),
        is_egress: egress,
        protocol: Protocol::All,
        from_port: None,
        to_port: None,
        source,
        description: None,
        tags: Tags::new(),
    }
}

/// Empty security group in `vpc_id` (or outside any VPC).
pub fn security_group(
    collab: &dyn Collaborators,
    region: &str,
    vpc_id: Option<&str>,
    name: &str,
    description: &str,
) -> SecurityGroup {
    let id = collab.generate_unique_id("sg");
    let owner_id = collab.get_owner_id();
    SecurityGroup {
        security_group_arn: arn(region, &owner_id, "security-group", &id),
        id,
        group_name: name.to_string(),
        description: description.to_string(),
        vpc_id: vpc_id.map(str::to_string),
        owner_id,
        ingress: Vec::new(),
        egress: Vec::new(),
        tags: Tags::new(),
    }
}

/// Group named `default`: ingress from itself, all egress.
pub fn default_security_group(collab: &dyn Collaborators, region: &str, vpc_id: &str) -> SecurityGroup {
    let mut group = security_group(
        collab,
        region,
        Some(vpc_id),
        DEFAULT_GROUP_NAME,
        "default VPC security group",
    );
    let self_source = RuleSource::Group {
        group_id: group.id.clone(),
        user_id: group.owner_id.clone(),
        group_name: Some(DEFAULT_GROUP_NAME.to_string()),
    };
    let ingress = allow_all_rule(collab, region, &group, false, self_source);
    let egress = allow_all_rule(collab, region, &group, true, RuleSource::Ipv4(Ipv4Net::default()));
    group.ingress.push(ingress);
    group.egress.push(egress);
    group
}

/// Store the default group, default ACL and main route table for `vpc`.
pub fn install_vpc_defaults(
    store: &mut ResourceStore,
    collab: &dyn Collaborators,
    region: &str,
    vpc: &Vpc,
) -> Result<VpcDefaults> {
    let group = default_security_group(collab, region, &vpc.id);
    let acl = default_network_acl(collab, &vpc.id);
    let table = main_route_table(collab, vpc);
    let defaults = VpcDefaults {
        security_group_id: group.id.clone(),
        network_acl_id: acl.id.clone(),
        route_table_id: table.id.clone(),
    };
    store.put(group)?;
    store.put(acl)?;
    store.put(table)?;
    Ok(defaults)
}
