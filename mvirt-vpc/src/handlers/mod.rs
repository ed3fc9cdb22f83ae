//! Action handlers.
//!
//! [`Ec2Network`] owns the resource store and routes each action to a
//! handler method. Handlers take a typed request decoded from [`Params`],
//! validate before mutating, and return a typed response that is shaped
//! into JSON at the dispatch boundary.

pub mod defaults;
pub mod network_acl;
pub mod route_table;
pub mod security_group;
pub mod subnet;
pub mod tags;
pub mod vpc;

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audit::VpcAuditLogger;
use crate::collab::{Collaborators, DefaultCollaborators};
use crate::config::EmulatorConfig;
use crate::error::{Ec2Error, Result};
use crate::filter::{self, Filter, Filterable};
use crate::idempotency::IdempotencyCache;
use crate::pagination::{Page, PageLimits, PageRequest, paginate};
use crate::params::Params;
use crate::store::{Resource, ResourceStore};

/// Actions that honour `ClientToken`.
const IDEMPOTENT_ACTIONS: [&str; 5] = [
    "CreateVpc",
    "CreateSubnet",
    "CreateRouteTable",
    "CreateNetworkAcl",
    "CreateSecurityGroup",
];

/// `{"return": true}`.
#[derive(Debug, Clone, Serialize)]
pub struct ReturnResponse {
    #[serde(rename = "return")]
    pub ok: bool,
}

impl ReturnResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// `{"Return": true}` for the PascalCase route table family.
#[derive(Debug, Clone, Serialize)]
pub struct PascalReturnResponse {
    #[serde(rename = "Return")]
    pub ok: bool,
}

impl PascalReturnResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// The emulated networking control plane.
pub struct Ec2Network {
    store: ResourceStore,
    collab: Arc<dyn Collaborators>,
    config: EmulatorConfig,
    idempotency: IdempotencyCache,
    audit: VpcAuditLogger,
}

impl Ec2Network {
    pub fn new(config: EmulatorConfig) -> Result<Self> {
        let collab = Arc::new(DefaultCollaborators::new(config.account_id.clone()));
        Self::with_collaborators(config, collab)
    }

    pub fn with_collaborators(
        config: EmulatorConfig,
        collab: Arc<dyn Collaborators>,
    ) -> Result<Self> {
        let mut network = Self {
            store: ResourceStore::new(),
            collab,
            idempotency: IdempotencyCache::new(config.idempotency_cache_size),
            audit: VpcAuditLogger::new(),
            config,
        };
        if network.config.create_default_vpc {
            network.bootstrap_default_vpc()?;
        }
        Ok(network)
    }

    pub fn with_audit(mut self, audit: VpcAuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    /// Mutable store access, used to seed resources owned by other services.
    pub fn store_mut(&mut self) -> &mut ResourceStore {
        &mut self.store
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Run one action and return its response with a `requestId`.
    pub fn dispatch(&mut self, action: &str, params: &Params) -> Result<Value> {
        let token = params
            .string("ClientToken")
            .filter(|_| IDEMPOTENT_ACTIONS.contains(&action));
        if let Some(token) = &token
            && let Some(cached) = self.idempotency.lookup(action, token, params)?
        {
            debug!(action, token = %token, "Replaying idempotent request");
            return Ok(cached);
        }

        let mut response = self.route(action, params)?;
        if let Value::Object(map) = &mut response {
            map.insert(
                "requestId".to_string(),
                Value::String(self.collab.generate_request_id()),
            );
        }

        if let Some(token) = &token {
            self.idempotency.record(action, token, params, &response);
        }
        Ok(response)
    }

    /// Like [`dispatch`](Self::dispatch) but renders failures as the error
    /// envelope.
    pub fn handle(&mut self, action: &str, params: &Params) -> Value {
        match self.dispatch(action, params) {
            Ok(response) => response,
            Err(e) => {
                warn!(action, code = e.code(), "Request failed: {}", e);
                let request_id = self.collab.generate_request_id();
                serde_json::to_value(e.to_response(&request_id)).unwrap_or_default()
            }
        }
    }

    fn route(&mut self, action: &str, params: &Params) -> Result<Value> {
        use network_acl::*;
        use route_table::*;
        use security_group::*;
        use subnet::*;
        use tags::*;
        use vpc::*;

        match action {
            // VPCs
            "CreateVpc" => respond(self.create_vpc(CreateVpcRequest::from_params(params)?)?),
            "DeleteVpc" => respond(self.delete_vpc(&params.required("VpcId")?)?),
            "DescribeVpcs" => {
                respond(self.describe_vpcs(DescribeVpcsRequest::from_params(params)?)?)
            }
            "AssociateVpcCidrBlock" => respond(
                self.associate_vpc_cidr_block(AssociateVpcCidrBlockRequest::from_params(params)?)?,
            ),
            "DisassociateVpcCidrBlock" => respond(
                self.disassociate_vpc_cidr_block(&params.required("AssociationId")?)?,
            ),
            "ModifyVpcAttribute" => respond(
                self.modify_vpc_attribute(ModifyVpcAttributeRequest::from_params(params)?)?,
            ),
            "DescribeVpcAttribute" => respond(self.describe_vpc_attribute(
                &params.required("VpcId")?,
                &params.required("Attribute")?,
            )?),

            // Subnets
            "CreateSubnet" => {
                respond(self.create_subnet(CreateSubnetRequest::from_params(params)?)?)
            }
            "DeleteSubnet" => respond(self.delete_subnet(&params.required("SubnetId")?)?),
            "DescribeSubnets" => {
                respond(self.describe_subnets(DescribeSubnetsRequest::from_params(params)?)?)
            }
            "ModifySubnetAttribute" => respond(
                self.modify_subnet_attribute(ModifySubnetAttributeRequest::from_params(params)?)?,
            ),
            "AssociateSubnetCidrBlock" => respond(self.associate_subnet_cidr_block(
                &params.required("SubnetId")?,
                &params.required("Ipv6CidrBlock")?,
            )?),
            "DisassociateSubnetCidrBlock" => respond(
                self.disassociate_subnet_cidr_block(&params.required("AssociationId")?)?,
            ),
            "CreateSubnetCidrReservation" => respond(self.create_subnet_cidr_reservation(
                CreateSubnetCidrReservationRequest::from_params(params)?,
            )?),
            "DeleteSubnetCidrReservation" => respond(
                self.delete_subnet_cidr_reservation(&params.required("SubnetCidrReservationId")?)?,
            ),
            "GetSubnetCidrReservations" => respond(self.get_subnet_cidr_reservations(
                GetSubnetCidrReservationsRequest::from_params(params)?,
            )?),

            // Route tables
            "CreateRouteTable" => respond(
                self.create_route_table(CreateRouteTableRequest::from_params(params)?)?,
            ),
            "DeleteRouteTable" => {
                respond(self.delete_route_table(&params.required("RouteTableId")?)?)
            }
            "DescribeRouteTables" => respond(
                self.describe_route_tables(DescribeRouteTablesRequest::from_params(params)?)?,
            ),
            "CreateRoute" => respond(self.create_route(RouteRequest::from_params(params)?)?),
            "ReplaceRoute" => respond(self.replace_route(RouteRequest::from_params(params)?)?),
            "DeleteRoute" => {
                respond(self.delete_route(DeleteRouteRequest::from_params(params)?)?)
            }
            "AssociateRouteTable" => respond(
                self.associate_route_table(AssociateRouteTableRequest::from_params(params)?)?,
            ),
            "ReplaceRouteTableAssociation" => respond(self.replace_route_table_association(
                &params.required("AssociationId")?,
                &params.required("RouteTableId")?,
            )?),
            "DisassociateRouteTable" => {
                respond(self.disassociate_route_table(&params.required("AssociationId")?)?)
            }
            "EnableVgwRoutePropagation" => respond(self.enable_vgw_route_propagation(
                &params.required("RouteTableId")?,
                &params.required("GatewayId")?,
            )?),
            "DisableVgwRoutePropagation" => respond(self.disable_vgw_route_propagation(
                &params.required("RouteTableId")?,
                &params.required("GatewayId")?,
            )?),

            // Network ACLs
            "CreateNetworkAcl" => respond(
                self.create_network_acl(CreateNetworkAclRequest::from_params(params)?)?,
            ),
            "DeleteNetworkAcl" => {
                respond(self.delete_network_acl(&params.required("NetworkAclId")?)?)
            }
            "DescribeNetworkAcls" => respond(
                self.describe_network_acls(DescribeNetworkAclsRequest::from_params(params)?)?,
            ),
            "CreateNetworkAclEntry" => respond(
                self.create_network_acl_entry(NetworkAclEntryRequest::from_params(params)?)?,
            ),
            "ReplaceNetworkAclEntry" => respond(
                self.replace_network_acl_entry(NetworkAclEntryRequest::from_params(params)?)?,
            ),
            "DeleteNetworkAclEntry" => respond(self.delete_network_acl_entry(
                &params.required("NetworkAclId")?,
                params
                    .number("RuleNumber")?
                    .ok_or_else(|| Ec2Error::MissingParameter("RuleNumber".to_string()))?,
                params.bool("Egress")?.unwrap_or(false),
            )?),
            "ReplaceNetworkAclAssociation" => respond(self.replace_network_acl_association(
                &params.required("AssociationId")?,
                &params.required("NetworkAclId")?,
            )?),

            // Security groups
            "CreateSecurityGroup" => respond(
                self.create_security_group(CreateSecurityGroupRequest::from_params(params)?)?,
            ),
            "DeleteSecurityGroup" => respond(
                self.delete_security_group(DeleteSecurityGroupRequest::from_params(params)?)?,
            ),
            "DescribeSecurityGroups" => respond(self.describe_security_groups(
                DescribeSecurityGroupsRequest::from_params(params)?,
            )?),
            "AuthorizeSecurityGroupIngress" => respond(
                self.authorize_security_group(PermissionsRequest::from_params(params)?, false)?,
            ),
            "AuthorizeSecurityGroupEgress" => respond(
                self.authorize_security_group(PermissionsRequest::from_params(params)?, true)?,
            ),
            "RevokeSecurityGroupIngress" => respond(
                self.revoke_security_group(PermissionsRequest::from_params(params)?, false)?,
            ),
            "RevokeSecurityGroupEgress" => respond(
                self.revoke_security_group(PermissionsRequest::from_params(params)?, true)?,
            ),
            "DescribeSecurityGroupRules" => respond(self.describe_security_group_rules(
                DescribeSecurityGroupRulesRequest::from_params(params)?,
            )?),
            "UpdateSecurityGroupRuleDescriptionsIngress" => {
                respond(self.update_rule_descriptions(
                    PermissionsRequest::from_params(params)?,
                    false,
                )?)
            }
            "UpdateSecurityGroupRuleDescriptionsEgress" => respond(
                self.update_rule_descriptions(PermissionsRequest::from_params(params)?, true)?,
            ),

            // Tags
            "CreateTags" => respond(self.create_tags(TagsRequest::from_params(params)?)?),
            "DeleteTags" => respond(self.delete_tags(TagsRequest::from_params(params)?)?),
            "DescribeTags" => {
                respond(self.describe_tags(DescribeTagsRequest::from_params(params)?)?)
            }

            other => Err(Ec2Error::InvalidAction(other.to_string())),
        }
    }

    fn new_id(&self, prefix: &str) -> String {
        self.collab.generate_unique_id(prefix)
    }

    fn owner_id(&self) -> String {
        self.collab.get_owner_id()
    }
}

fn respond<T: Serialize>(response: T) -> Result<Value> {
    Ok(serde_json::to_value(response)?)
}

/// Common describe pipeline: explicit ids (each must exist), filters, then
/// one page of clones.
pub(crate) fn describe<T>(
    store: &ResourceStore,
    ids: &[String],
    filters: &[Filter],
    page: &PageRequest,
    limits: PageLimits,
) -> Result<Page<T>>
where
    T: Resource + Filterable,
{
    for id in ids {
        store.require::<T>(id)?;
    }
    let candidates: Vec<&T> = store
        .values::<T>()
        .into_iter()
        .filter(|e| ids.is_empty() || ids.iter().any(|id| id == e.id()))
        .collect();
    let matched: Vec<T> = filter::apply(candidates, filters)
        .into_iter()
        .cloned()
        .collect();
    paginate(matched, page, limits)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::collab::SequentialCollaborators;

    pub fn network() -> Ec2Network {
        Ec2Network::with_collaborators(
            EmulatorConfig::default(),
            Arc::new(SequentialCollaborators::new("123456789012")),
        )
        .unwrap()
        .with_audit(VpcAuditLogger::new_noop())
    }

    pub fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    /// Create a VPC and return its id.
    pub fn vpc(net: &mut Ec2Network, cidr: &str) -> String {
        let response = net
            .dispatch("CreateVpc", &params(&[("CidrBlock", cidr)]))
            .unwrap();
        response["vpc"]["vpcId"].as_str().unwrap().to_string()
    }

    /// Create a subnet and return its id.
    pub fn subnet(net: &mut Ec2Network, vpc_id: &str, cidr: &str) -> String {
        let response = net
            .dispatch(
                "CreateSubnet",
                &params(&[("VpcId", vpc_id), ("CidrBlock", cidr)]),
            )
            .unwrap();
        response["subnet"]["subnetId"].as_str().unwrap().to_string()
    }
}
