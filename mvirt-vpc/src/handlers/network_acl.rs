//! Network ACLs, their entries and subnet associations.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::defaults;
use super::{Ec2Network, ReturnResponse, describe};
use crate::error::{Ec2Error, Result};
use crate::filter::Filter;
use crate::model::network_acl::{IcmpTypeCode, MAX_USER_RULE, PortRange, is_reserved_rule};
use crate::model::{
    NetworkAcl, NetworkAclAssociation, NetworkAclEntry, Protocol, RuleAction, Tag, Tags, Vpc,
};
use crate::pagination::{NARROW, PageRequest};
use crate::params::Params;
use crate::validation::{parse_ipv4_cidr, parse_ipv6_cidr, validate_port_range};

#[derive(Debug, Clone, Default)]
pub struct CreateNetworkAclRequest {
    pub vpc_id: String,
    pub tags: Vec<Tag>,
}

impl CreateNetworkAclRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            vpc_id: params.required("VpcId")?,
            tags: params.tags_for("network-acl")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNetworkAclResponse {
    pub network_acl: NetworkAcl,
}

#[derive(Debug, Clone, Default)]
pub struct DescribeNetworkAclsRequest {
    pub network_acl_ids: Vec<String>,
    pub filters: Vec<Filter>,
    pub page: PageRequest,
}

impl DescribeNetworkAclsRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            network_acl_ids: params.list("NetworkAclId"),
            filters: params.filters()?,
            page: PageRequest::from_params(params)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeNetworkAclsResponse {
    pub network_acl_set: Vec<NetworkAcl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Parameters shared by CreateNetworkAclEntry and ReplaceNetworkAclEntry.
#[derive(Debug, Clone)]
pub struct NetworkAclEntryRequest {
    pub network_acl_id: String,
    pub rule_number: u32,
    pub protocol: Protocol,
    pub rule_action: RuleAction,
    pub egress: bool,
    pub cidr_block: Option<String>,
    pub ipv6_cidr_block: Option<String>,
    pub port_from: Option<i32>,
    pub port_to: Option<i32>,
    pub icmp_type: Option<i32>,
    pub icmp_code: Option<i32>,
}

impl NetworkAclEntryRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            network_acl_id: params.required("NetworkAclId")?,
            rule_number: params
                .number("RuleNumber")?
                .ok_or_else(|| Ec2Error::MissingParameter("RuleNumber".to_string()))?,
            protocol: Protocol::parse(&params.required("Protocol")?)?,
            rule_action: RuleAction::parse(&params.required("RuleAction")?)?,
            egress: params.bool("Egress")?.unwrap_or(false),
            cidr_block: params.string("CidrBlock"),
            ipv6_cidr_block: params.string("Ipv6CidrBlock"),
            port_from: params.number("PortRange.From")?,
            port_to: params.number("PortRange.To")?,
            icmp_type: params.number("Icmp.Type")?,
            icmp_code: params.number("Icmp.Code")?,
        })
    }

    /// Validate and build the entry.
    pub fn to_entry(&self) -> Result<NetworkAclEntry> {
        if self.rule_number < 1 || self.rule_number > MAX_USER_RULE {
            return Err(Ec2Error::invalid_value(format!(
                "Invalid network ACL entry rule number {}: must be between 1 and {}",
                self.rule_number, MAX_USER_RULE
            )));
        }

        let (cidr_block, ipv6_cidr_block) = match (&self.cidr_block, &self.ipv6_cidr_block) {
            (Some(_), Some(_)) => {
                return Err(Ec2Error::invalid_combination(
                    "Exactly one of CidrBlock and Ipv6CidrBlock must be specified",
                ));
            }
            (None, None) => return Err(Ec2Error::MissingParameter("CidrBlock".to_string())),
            (Some(cidr), None) => (Some(parse_ipv4_cidr(cidr)?.trunc()), None),
            (None, Some(cidr)) => (None, Some(parse_ipv6_cidr(cidr)?.trunc())),
        };

        let mut port_range = None;
        let mut icmp_type_code = None;
        match self.protocol {
            Protocol::Tcp | Protocol::Udp => {
                if let (Some(from), Some(to)) =
                    validate_port_range(&self.protocol, self.port_from, self.port_to)?
                {
                    port_range = Some(PortRange { from, to });
                }
            }
            Protocol::Icmpv6 if ipv6_cidr_block.is_some() => {
                let kind = self
                    .icmp_type
                    .ok_or_else(|| Ec2Error::MissingParameter("Icmp.Type".to_string()))?;
                let code = self
                    .icmp_code
                    .ok_or_else(|| Ec2Error::MissingParameter("Icmp.Code".to_string()))?;
                if let (Some(kind), Some(code)) =
                    validate_port_range(&self.protocol, Some(kind), Some(code))?
                {
                    icmp_type_code = Some(IcmpTypeCode { code, kind });
                }
            }
            Protocol::Icmp | Protocol::Icmpv6 => {
                if let (Some(kind), Some(code)) =
                    validate_port_range(&self.protocol, self.icmp_type, self.icmp_code)?
                {
                    icmp_type_code = Some(IcmpTypeCode { code, kind });
                }
            }
            Protocol::All | Protocol::Number(_) => {}
        }

        Ok(NetworkAclEntry {
            rule_number: self.rule_number,
            protocol: self.protocol.clone(),
            rule_action: self.rule_action,
            egress: self.egress,
            cidr_block,
            ipv6_cidr_block,
            icmp_type_code,
            port_range,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceNetworkAclAssociationResponse {
    pub new_association_id: String,
}

impl Ec2Network {
    pub fn create_network_acl(
        &mut self,
        req: CreateNetworkAclRequest,
    ) -> Result<CreateNetworkAclResponse> {
        self.store.require::<Vpc>(&req.vpc_id)?;
        let mut acl = defaults::network_acl(self.collab.as_ref(), &req.vpc_id);
        acl.tags = Tags::try_from_tags(req.tags)?;
        self.store.put(acl.clone())?;

        info!(network_acl_id = %acl.id, vpc_id = %acl.vpc_id, "Created network ACL");
        self.audit.network_acl_created(&acl.id, &acl.vpc_id);
        Ok(CreateNetworkAclResponse { network_acl: acl })
    }

    pub fn delete_network_acl(&mut self, network_acl_id: &str) -> Result<ReturnResponse> {
        let Some(acl) = self.store.get::<NetworkAcl>(network_acl_id) else {
            debug!(network_acl_id, "Network ACL already absent");
            return Ok(ReturnResponse::ok());
        };
        if acl.is_default {
            return Err(Ec2Error::invalid_value(format!(
                "cannot delete default network ACL {}",
                network_acl_id
            )));
        }
        if !acl.association_set.is_empty() {
            warn!(
                network_acl_id,
                associations = acl.association_set.len(),
                "Refusing to delete associated network ACL"
            );
            return Err(Ec2Error::dependency(format!(
                "The networkAcl '{}' has dependencies and cannot be deleted.",
                network_acl_id
            )));
        }
        self.store.remove::<NetworkAcl>(network_acl_id);

        info!(network_acl_id, "Deleted network ACL");
        self.audit.network_acl_deleted(network_acl_id);
        Ok(ReturnResponse::ok())
    }

    pub fn describe_network_acls(
        &self,
        req: DescribeNetworkAclsRequest,
    ) -> Result<DescribeNetworkAclsResponse> {
        let page = describe::<NetworkAcl>(
            &self.store,
            &req.network_acl_ids,
            &req.filters,
            &req.page,
            NARROW,
        )?;
        debug!(count = page.items.len(), "Described network ACLs");
        Ok(DescribeNetworkAclsResponse {
            network_acl_set: page.items,
            next_token: page.next_token,
        })
    }

    pub fn create_network_acl_entry(
        &mut self,
        req: NetworkAclEntryRequest,
    ) -> Result<ReturnResponse> {
        let entry = req.to_entry()?;
        let acl = self.store.require_mut::<NetworkAcl>(&req.network_acl_id)?;
        if acl.entry(entry.rule_number, entry.egress).is_some() {
            return Err(Ec2Error::duplicate(
                "NetworkAclEntryAlreadyExists",
                format!(
                    "The network acl entry identified by {} already exists.",
                    entry.rule_number
                ),
            ));
        }
        acl.put_entry(entry);

        info!(
            network_acl_id = %req.network_acl_id,
            rule_number = req.rule_number,
            egress = req.egress,
            "Created network ACL entry"
        );
        self.audit
            .network_acl_entry_changed(&req.network_acl_id, req.rule_number, req.egress, "created");
        Ok(ReturnResponse::ok())
    }

    pub fn replace_network_acl_entry(
        &mut self,
        req: NetworkAclEntryRequest,
    ) -> Result<ReturnResponse> {
        let entry = req.to_entry()?;
        let acl = self.store.require_mut::<NetworkAcl>(&req.network_acl_id)?;
        if acl.entry(entry.rule_number, entry.egress).is_none() {
            return Err(entry_not_found(&req.network_acl_id, req.rule_number, req.egress));
        }
        acl.put_entry(entry);

        info!(
            network_acl_id = %req.network_acl_id,
            rule_number = req.rule_number,
            egress = req.egress,
            "Replaced network ACL entry"
        );
        self.audit
            .network_acl_entry_changed(&req.network_acl_id, req.rule_number, req.egress, "replaced");
        Ok(ReturnResponse::ok())
    }

    pub fn delete_network_acl_entry(
        &mut self,
        network_acl_id: &str,
        rule_number: u32,
        egress: bool,
    ) -> Result<ReturnResponse> {
        if is_reserved_rule(rule_number) {
            return Err(Ec2Error::invalid_value(format!(
                "Rule number {} is reserved and cannot be deleted",
                rule_number
            )));
        }
        self.store
            .require_mut::<NetworkAcl>(network_acl_id)?
            .remove_entry(rule_number, egress)
            .ok_or_else(|| entry_not_found(network_acl_id, rule_number, egress))?;

        info!(network_acl_id, rule_number, egress, "Deleted network ACL entry");
        self.audit
            .network_acl_entry_changed(network_acl_id, rule_number, egress, "deleted");
        Ok(ReturnResponse::ok())
    }

    pub fn replace_network_acl_association(
        &mut self,
        association_id: &str,
        network_acl_id: &str,
    ) -> Result<ReplaceNetworkAclAssociationResponse> {
        let (source_id, subnet_id, source_vpc) = self
            .store
            .values::<NetworkAcl>()
            .into_iter()
            .find_map(|acl| {
                acl.association_set
                    .iter()
                    .find(|a| a.network_acl_association_id == association_id)
                    .map(|a| (acl.id.clone(), a.subnet_id.clone(), acl.vpc_id.clone()))
            })
            .ok_or_else(|| {
                Ec2Error::not_found("InvalidAssociationID.NotFound", "association", association_id)
            })?;
        let target = self.store.require::<NetworkAcl>(network_acl_id)?;
        if target.vpc_id != source_vpc {
            return Err(Ec2Error::invalid_value(format!(
                "Network ACL {} is not in the same VPC as association {}",
                network_acl_id, association_id
            )));
        }

        let new_association_id = self.new_id("aclassoc");
        let association = NetworkAclAssociation {
            network_acl_association_id: new_association_id.clone(),
            network_acl_id: network_acl_id.to_string(),
            subnet_id: subnet_id.clone(),
        };
        self.store.atomically(|store| {
            store
                .require_mut::<NetworkAcl>(&source_id)?
                .association_set
                .retain(|a| a.network_acl_association_id != association_id);
            store
                .require_mut::<NetworkAcl>(network_acl_id)?
                .association_set
                .push(association);
            Ok(())
        })?;

        info!(
            association_id,
            new_association_id = %new_association_id,
            subnet_id = %subnet_id,
            from = %source_id,
            to = network_acl_id,
            "Replaced network ACL association"
        );
        self.audit
            .network_acl_associated(network_acl_id, &subnet_id, &new_association_id);
        Ok(ReplaceNetworkAclAssociationResponse { new_association_id })
    }
}

fn entry_not_found(network_acl_id: &str, rule_number: u32, egress: bool) -> Ec2Error {
    Ec2Error::NotFound {
        code: "InvalidNetworkAclEntry.NotFound",
        message: format!(
            "The network acl entry identified by {} ({}) does not exist in {}",
            rule_number,
            if egress { "egress" } else { "ingress" },
            network_acl_id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn network_acl(net: &mut Ec2Network, vpc_id: &str) -> String {
        let response = net
            .dispatch("CreateNetworkAcl", &params(&[("VpcId", vpc_id)]))
            .unwrap();
        response["networkAcl"]["networkAclId"]
            .as_str()
            .unwrap()
            .to_string()
    }

    fn entry<'a>(acl: &'a str, rule: &'a str, extra: &[(&'a str, &'a str)]) -> Params {
        let mut pairs = vec![
            ("NetworkAclId", acl),
            ("RuleNumber", rule),
            ("Protocol", "6"),
            ("RuleAction", "allow"),
            ("CidrBlock", "10.0.0.0/16"),
            ("PortRange.From", "443"),
            ("PortRange.To", "443"),
        ];
        for (k, v) in extra {
            pairs.retain(|(key, _)| key != k);
            pairs.push((*k, *v));
        }
        params(&pairs)
    }

    #[test]
    fn test_create_network_acl() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let response = net
            .dispatch("CreateNetworkAcl", &params(&[("VpcId", vpc_id.as_str())]))
            .unwrap();
        let acl = &response["networkAcl"];
        assert_eq!(acl["default"], false);
        assert_eq!(acl["entrySet"].as_array().unwrap().len(), 4);
        assert!(acl["associationSet"].as_array().unwrap().is_empty());
        assert_eq!(acl["entrySet"][0]["protocol"], "-1");
        assert_eq!(acl["entrySet"][0]["ruleAction"], "deny");
    }

    #[test]
    fn test_entry_lifecycle() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let acl = network_acl(&mut net, &vpc_id);

        net.dispatch("CreateNetworkAclEntry", &entry(&acl, "100", &[]))
            .unwrap();
        match net.dispatch("CreateNetworkAclEntry", &entry(&acl, "100", &[])) {
            Err(e) => assert_eq!(e.code(), "NetworkAclEntryAlreadyExists"),
            other => panic!("Unexpected response: {:?}", other),
        }
        // Same number in the other direction is a different entry.
        net.dispatch(
            "CreateNetworkAclEntry",
            &entry(&acl, "100", &[("Egress", "true")]),
        )
        .unwrap();

        net.dispatch(
            "ReplaceNetworkAclEntry",
            &entry(&acl, "100", &[("RuleAction", "deny")]),
        )
        .unwrap();
        let stored = net.store().get::<NetworkAcl>(&acl).unwrap();
        assert_eq!(stored.entry(100, false).unwrap().rule_action, RuleAction::Deny);
        assert_eq!(stored.entry(100, true).unwrap().rule_action, RuleAction::Allow);
        assert_eq!(
            stored.entry(100, false).unwrap().port_range,
            Some(PortRange { from: 443, to: 443 })
        );

        match net.dispatch("ReplaceNetworkAclEntry", &entry(&acl, "200", &[])) {
            Err(e) => assert_eq!(e.code(), "InvalidNetworkAclEntry.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }

        net.delete_network_acl_entry(&acl, 100, false).unwrap();
        match net.delete_network_acl_entry(&acl, 100, false) {
            Err(e) => assert_eq!(e.code(), "InvalidNetworkAclEntry.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }
        match net.delete_network_acl_entry(&acl, 32767, false) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterValue"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_entry_validation() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let acl = network_acl(&mut net, &vpc_id);

        let cases: Vec<(Params, &str)> = vec![
            (entry(&acl, "0", &[]), "InvalidParameterValue"),
            (entry(&acl, "32767", &[]), "InvalidParameterValue"),
            (entry(&acl, "40000", &[]), "InvalidParameterValue"),
            (
                entry(&acl, "10", &[("Ipv6CidrBlock", "::/0")]),
                "InvalidParameterCombination",
            ),
            (
                entry(&acl, "10", &[("PortRange.From", "500"), ("PortRange.To", "400")]),
                "InvalidParameterValue",
            ),
            (
                entry(&acl, "10", &[("PortRange.To", "70000")]),
                "InvalidParameterValue",
            ),
            (
                entry(&acl, "10", &[("RuleAction", "maybe")]),
                "InvalidParameterValue",
            ),
            (
                entry(&acl, "10", &[("CidrBlock", "10.0.0.256/16")]),
                "InvalidParameterValue",
            ),
        ];
        for (request, code) in cases {
            match net.dispatch("CreateNetworkAclEntry", &request) {
                Err(e) => assert_eq!(e.code(), code, "{:?}", request),
                other => panic!("Unexpected response: {:?}", other),
            }
        }
        assert_eq!(net.store().get::<NetworkAcl>(&acl).unwrap().entry_set.len(), 4);
    }

    #[test]
    fn test_icmpv6_entry_requires_type_and_code() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let acl = network_acl(&mut net, &vpc_id);
        let mut request = params(&[
            ("NetworkAclId", acl.as_str()),
            ("RuleNumber", "50"),
            ("Protocol", "58"),
            ("RuleAction", "allow"),
            ("Ipv6CidrBlock", "::/0"),
        ]);
        match net.dispatch("CreateNetworkAclEntry", &request) {
            Err(Ec2Error::MissingParameter(name)) => assert_eq!(name, "Icmp.Type"),
            other => panic!("Unexpected response: {:?}", other),
        }
        request.insert("Icmp.Type", "-1");
        request.insert("Icmp.Code", "-1");
        net.dispatch("CreateNetworkAclEntry", &request).unwrap();
        let stored = net.store().get::<NetworkAcl>(&acl).unwrap();
        assert_eq!(
            stored.entry(50, false).unwrap().icmp_type_code,
            Some(IcmpTypeCode { code: -1, kind: -1 })
        );
    }

    #[test]
    fn test_delete_network_acl_rules() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let default_acl = net.store().default_network_acl(&vpc_id).unwrap().id.clone();
        match net.delete_network_acl(&default_acl) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterValue"),
            other => panic!("Unexpected response: {:?}", other),
        }

        let acl = network_acl(&mut net, &vpc_id);
        let subnet_id = subnet(&mut net, &vpc_id, "10.0.1.0/24");
        let assoc = net
            .store()
            .network_acl_for_subnet(&subnet_id)
            .and_then(|a| a.association_for_subnet(&subnet_id))
            .unwrap()
            .network_acl_association_id
            .clone();
        net.replace_network_acl_association(&assoc, &acl).unwrap();
        match net.delete_network_acl(&acl) {
            Err(e) => assert_eq!(e.code(), "DependencyViolation"),
            other => panic!("Unexpected response: {:?}", other),
        }

        net.dispatch("DeleteSubnet", &params(&[("SubnetId", subnet_id.as_str())]))
            .unwrap();
        let response = net
            .dispatch("DeleteNetworkAcl", &params(&[("NetworkAclId", acl.as_str())]))
            .unwrap();
        assert_eq!(response["return"], true);
        assert!(net.delete_network_acl(&acl).is_ok());
    }

    #[test]
    fn test_replace_network_acl_association() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let other_vpc = vpc(&mut net, "10.1.0.0/16");
        let acl = network_acl(&mut net, &vpc_id);
        let foreign_acl = network_acl(&mut net, &other_vpc);
        let subnet_id = subnet(&mut net, &vpc_id, "10.0.1.0/24");
        let old = net
            .store()
            .default_network_acl(&vpc_id)
            .and_then(|a| a.association_for_subnet(&subnet_id))
            .unwrap()
            .network_acl_association_id
            .clone();

        match net.replace_network_acl_association(&old, &foreign_acl) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterValue"),
            other => panic!("Unexpected response: {:?}", other),
        }

        let response = net
            .dispatch(
                "ReplaceNetworkAclAssociation",
                &params(&[("AssociationId", old.as_str()), ("NetworkAclId", acl.as_str())]),
            )
            .unwrap();
        let new_id = response["newAssociationId"].as_str().unwrap();
        assert_ne!(new_id, old);
        assert_eq!(net.store().network_acl_for_subnet(&subnet_id).unwrap().id, acl);
        assert!(
            net.store()
                .default_network_acl(&vpc_id)
                .unwrap()
                .association_set
                .is_empty()
        );

        // The retired id is gone.
        match net.replace_network_acl_association(&old, &acl) {
            Err(e) => assert_eq!(e.code(), "InvalidAssociationID.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_describe_network_acls_filters() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        network_acl(&mut net, &vpc_id);

        let response = net
            .dispatch(
                "DescribeNetworkAcls",
                &params(&[("Filter.1.Name", "default"), ("Filter.1.Value.1", "true")]),
            )
            .unwrap();
        assert_eq!(response["networkAclSet"].as_array().unwrap().len(), 1);

        let response = net
            .dispatch(
                "DescribeNetworkAcls",
                &params(&[("Filter.1.Name", "vpc-id"), ("Filter.1.Value.1", vpc_id.as_str())]),
            )
            .unwrap();
        assert_eq!(response["networkAclSet"].as_array().unwrap().len(), 2);
    }
}
