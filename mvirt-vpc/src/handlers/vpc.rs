//! VPC lifecycle, CIDR associations and attributes.

use ipnet::{Ipv4Net, Ipv6Net};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::defaults::install_vpc_defaults;
use super::subnet::CreateSubnetRequest;
use super::{Ec2Network, ReturnResponse, describe};
use crate::error::{Ec2Error, Result};
use crate::filter::Filter;
use crate::model::vpc::MAX_IPV4_BLOCKS;
use crate::model::{
    AssociationState, BlockState, CidrBlockAssociation, InternetGateway, Ipv6CidrBlockAssociation,
    NatGateway, NetworkAcl, ResourceState, Route, RouteDestination, RouteTable, SecurityGroup,
    Subnet, Tag, Tags, Vpc, VpcEndpoint,
};
use crate::pagination::{PageRequest, WIDE};
use crate::params::Params;
use crate::store::ResourceStore;
use crate::validation::{
    ipv4_subnets_overlap, ipv6_prefixes_overlap, parse_ipv6_cidr, parse_network_cidr,
    validate_block_size,
};

/// Pool IPAM allocations are carved from.
const IPAM_POOL_CIDR: &str = "10.0.0.0/8";
/// Block Amazon-provided IPv6 /56s are carved from.
const AMAZON_IPV6_POOL: &str = "2600:1f18::/32";
const AMAZON_IPV6_PREFIX: u8 = 56;
const DEFAULT_VPC_CIDR: &str = "172.31.0.0/16";
const DEFAULT_SUBNET_PREFIX: u8 = 20;
const TENANCIES: [&str; 3] = ["default", "dedicated", "host"];

#[derive(Debug, Clone, Default)]
pub struct CreateVpcRequest {
    pub cidr_block: Option<String>,
    pub ipv4_ipam_pool_id: Option<String>,
    pub ipv4_netmask_length: Option<u8>,
    pub amazon_provided_ipv6_cidr_block: bool,
    pub ipv6_network_border_group: Option<String>,
    pub instance_tenancy: Option<String>,
    pub tags: Vec<Tag>,
}

impl CreateVpcRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            cidr_block: params.string("CidrBlock"),
            ipv4_ipam_pool_id: params.string("Ipv4IpamPoolId"),
            ipv4_netmask_length: params.number("Ipv4NetmaskLength")?,
            amazon_provided_ipv6_cidr_block: params
                .bool("AmazonProvidedIpv6CidrBlock")?
                .unwrap_or(false),
            ipv6_network_border_group: params.string("Ipv6CidrBlockNetworkBorderGroup"),
            instance_tenancy: params.string("InstanceTenancy"),
            tags: params.tags_for("vpc")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateVpcResponse {
    pub vpc: Vpc,
}

#[derive(Debug, Clone, Default)]
pub struct DescribeVpcsRequest {
    pub vpc_ids: Vec<String>,
    pub filters: Vec<Filter>,
    pub page: PageRequest,
}

impl DescribeVpcsRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            vpc_ids: params.list("VpcId"),
            filters: params.filters()?,
            page: PageRequest::from_params(params)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeVpcsResponse {
    pub vpc_set: Vec<Vpc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AssociateVpcCidrBlockRequest {
    pub vpc_id: String,
    pub cidr_block: Option<String>,
    pub amazon_provided_ipv6_cidr_block: bool,
    pub ipv6_cidr_block: Option<String>,
    pub ipv6_network_border_group: Option<String>,
}

impl AssociateVpcCidrBlockRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            vpc_id: params.required("VpcId")?,
            cidr_block: params.string("CidrBlock"),
            amazon_provided_ipv6_cidr_block: params
                .bool("AmazonProvidedIpv6CidrBlock")?
                .unwrap_or(false),
            ipv6_cidr_block: params.string("Ipv6CidrBlock"),
            ipv6_network_border_group: params.string("Ipv6CidrBlockNetworkBorderGroup"),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcCidrBlockResponse {
    pub vpc_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_block_association: Option<CidrBlockAssociation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_cidr_block_association: Option<Ipv6CidrBlockAssociation>,
}

#[derive(Debug, Clone, Default)]
pub struct ModifyVpcAttributeRequest {
    pub vpc_id: String,
    pub enable_dns_support: Option<bool>,
    pub enable_dns_hostnames: Option<bool>,
    pub enable_network_address_usage_metrics: Option<bool>,
}

impl ModifyVpcAttributeRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            vpc_id: params.required("VpcId")?,
            enable_dns_support: params.attribute_bool("EnableDnsSupport")?,
            enable_dns_hostnames: params.attribute_bool("EnableDnsHostnames")?,
            enable_network_address_usage_metrics: params
                .attribute_bool("EnableNetworkAddressUsageMetrics")?,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AttributeValue {
    pub value: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub enum VpcAttribute {
    #[serde(rename = "enableDnsSupport")]
    DnsSupport(AttributeValue),
    #[serde(rename = "enableDnsHostnames")]
    DnsHostnames(AttributeValue),
    #[serde(rename = "enableNetworkAddressUsageMetrics")]
    NetworkAddressUsageMetrics(AttributeValue),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeVpcAttributeResponse {
    pub vpc_id: String,
    #[serde(flatten)]
    pub attribute: VpcAttribute,
}

impl Ec2Network {
    pub fn create_vpc(&mut self, req: CreateVpcRequest) -> Result<CreateVpcResponse> {
        let cidr = self.resolve_vpc_cidr(&req)?;
        let tenancy = req
            .instance_tenancy
            .unwrap_or_else(|| "default".to_string());
        if !TENANCIES.contains(&tenancy.as_str()) {
            return Err(Ec2Error::invalid_value(format!(
                "Value ({}) for parameter instanceTenancy is invalid.",
                tenancy
            )));
        }
        let tags = Tags::try_from_tags(req.tags)?;

        let mut vpc = Vpc {
            id: self.new_id("vpc"),
            cidr_block: cidr,
            cidr_block_association_set: vec![CidrBlockAssociation {
                association_id: self.new_id("vpc-cidr-assoc"),
                cidr_block: cidr,
                cidr_block_state: BlockState::associated(),
            }],
            ipv6_cidr_block_association_set: Vec::new(),
            state: ResourceState::Available,
            instance_tenancy: tenancy,
            is_default: false,
            dhcp_options_id: "default".to_string(),
            owner_id: self.owner_id(),
            enable_dns_support: true,
            enable_dns_hostnames: false,
            enable_network_address_usage_metrics: false,
            tags,
        };
        if req.amazon_provided_ipv6_cidr_block {
            let block = self.allocate_amazon_ipv6()?;
            vpc.ipv6_cidr_block_association_set
                .push(self.ipv6_association(block, req.ipv6_network_border_group));
        }

        let collab = self.collab.as_ref();
        let region = &self.config.region;
        let defaults = self.store.atomically(|store| {
            store.put(vpc.clone())?;
            install_vpc_defaults(store, collab, region, &vpc)
        })?;

        info!(
            vpc_id = %vpc.id,
            cidr = %cidr,
            route_table_id = %defaults.route_table_id,
            network_acl_id = %defaults.network_acl_id,
            security_group_id = %defaults.security_group_id,
            "Created VPC"
        );
        self.audit.vpc_created(&vpc.id, &cidr.to_string());
        Ok(CreateVpcResponse { vpc })
    }

    fn resolve_vpc_cidr(&self, req: &CreateVpcRequest) -> Result<Ipv4Net> {
        if let Some(cidr) = &req.cidr_block {
            let net = parse_network_cidr(cidr)?;
            validate_block_size(&net, "InvalidVpc.Range")?;
            return Ok(net);
        }
        if req.ipv4_ipam_pool_id.is_none() {
            return Err(Ec2Error::MissingParameter("CidrBlock".to_string()));
        }
        let prefix = req.ipv4_netmask_length.unwrap_or(16);
        let pool = parse_network_cidr(IPAM_POOL_CIDR)?;
        let mut candidates = pool
            .subnets(prefix)
            .map_err(|_| Ec2Error::invalid("InvalidVpc.Range", format!("Invalid netmask length {}", prefix)))?;
        let probe = Ipv4Net::new(pool.network(), prefix)
            .map_err(|_| Ec2Error::invalid("InvalidVpc.Range", format!("Invalid netmask length {}", prefix)))?;
        validate_block_size(&probe, "InvalidVpc.Range")?;

        let used: Vec<Ipv4Net> = self
            .store
            .values::<Vpc>()
            .into_iter()
            .flat_map(|v| v.ipv4_blocks().collect::<Vec<_>>())
            .collect();
        candidates
            .find(|c| !used.iter().any(|u| ipv4_subnets_overlap(c, u)))
            .ok_or_else(|| {
                Ec2Error::conflict(
                    "IpamPoolAllocationFailed",
                    format!("No free /{} left in IPAM pool", prefix),
                )
            })
    }

    fn allocate_amazon_ipv6(&self) -> Result<Ipv6Net> {
        let pool = parse_ipv6_cidr(AMAZON_IPV6_POOL)?;
        let used: Vec<Ipv6Net> = self
            .store
            .values::<Vpc>()
            .into_iter()
            .flat_map(|v| v.ipv6_blocks().collect::<Vec<_>>())
            .collect();
        pool.subnets(AMAZON_IPV6_PREFIX)
            .map_err(|e| Ec2Error::Internal(e.to_string()))?
            .find(|c| !used.iter().any(|u| ipv6_prefixes_overlap(c, u)))
            .ok_or_else(|| {
                Ec2Error::conflict("InsufficientCidrBlocks", "No IPv6 CIDR blocks are available")
            })
    }

    fn ipv6_association(&self, block: Ipv6Net, border_group: Option<String>) -> Ipv6CidrBlockAssociation {
        Ipv6CidrBlockAssociation {
            association_id: self.new_id("vpc-cidr-assoc"),
            ipv6_cidr_block: block,
            ipv6_cidr_block_state: BlockState::associated(),
            network_border_group: Some(border_group.unwrap_or_else(|| self.config.region.clone())),
            ipv6_pool: Some("Amazon".to_string()),
        }
    }

    pub fn delete_vpc(&mut self, vpc_id: &str) -> Result<ReturnResponse> {
        if self.store.get::<Vpc>(vpc_id).is_none() {
            debug!(vpc_id, "VPC already absent");
            return Ok(ReturnResponse::ok());
        }
        if let Err(e) = self.check_vpc_dependencies(vpc_id) {
            warn!(vpc_id, "Refusing to delete VPC: {}", e);
            return Err(e);
        }

        self.store.atomically(|store| {
            let tables: Vec<String> = store
                .route_tables_in(vpc_id)
                .into_iter()
                .map(|t| t.id.clone())
                .collect();
            for id in tables {
                store.remove::<RouteTable>(&id);
            }
            let acls: Vec<String> = store
                .network_acls_in(vpc_id)
                .into_iter()
                .map(|a| a.id.clone())
                .collect();
            for id in acls {
                store.remove::<NetworkAcl>(&id);
            }
            let groups: Vec<String> = store
                .security_groups_in(vpc_id)
                .into_iter()
                .map(|g| g.id.clone())
                .collect();
            for id in groups {
                store.remove::<SecurityGroup>(&id);
            }
            store.remove::<Vpc>(vpc_id);
            Ok(())
        })?;

        info!(vpc_id, "Deleted VPC");
        self.audit.vpc_deleted(vpc_id);
        Ok(ReturnResponse::ok())
    }

    fn check_vpc_dependencies(&self, vpc_id: &str) -> Result<()> {
        let blocked = |what: &str, id: &str| {
            Ec2Error::dependency(format!(
                "The vpc '{}' has dependencies and cannot be deleted: {} {}",
                vpc_id, what, id
            ))
        };
        if let Some(subnet) = self.store.subnets_in(vpc_id).first() {
            return Err(blocked("subnet", &subnet.id));
        }
        if let Some(group) = self
            .store
            .security_groups_in(vpc_id)
            .into_iter()
            .find(|g| !g.is_default())
        {
            return Err(blocked("security group", &group.id));
        }
        if let Some(igw) = self
            .store
            .values::<InternetGateway>()
            .into_iter()
            .find(|g| g.is_attached_to(vpc_id))
        {
            return Err(blocked("internet gateway", &igw.id));
        }
        if let Some(nat) = self
            .store
            .values::<NatGateway>()
            .into_iter()
            .find(|n| n.vpc_id == vpc_id && n.is_live())
        {
            return Err(blocked("nat gateway", &nat.id));
        }
        if let Some(endpoint) = self
            .store
            .values::<VpcEndpoint>()
            .into_iter()
            .find(|e| e.vpc_id == vpc_id && e.is_live())
        {
            return Err(blocked("vpc endpoint", &endpoint.id));
        }
        Ok(())
    }

    pub fn describe_vpcs(&self, req: DescribeVpcsRequest) -> Result<DescribeVpcsResponse> {
        let page = describe::<Vpc>(&self.store, &req.vpc_ids, &req.filters, &req.page, WIDE)?;
        debug!(count = page.items.len(), "Described VPCs");
        Ok(DescribeVpcsResponse {
            vpc_set: page.items,
            next_token: page.next_token,
        })
    }

    pub fn associate_vpc_cidr_block(
        &mut self,
        req: AssociateVpcCidrBlockRequest,
    ) -> Result<VpcCidrBlockResponse> {
        let wants_ipv6 = req.amazon_provided_ipv6_cidr_block || req.ipv6_cidr_block.is_some();
        match (&req.cidr_block, wants_ipv6) {
            (Some(_), true) => {
                return Err(Ec2Error::invalid_combination(
                    "Exactly one of CidrBlock and an IPv6 CIDR block must be specified",
                ));
            }
            (None, false) => return Err(Ec2Error::MissingParameter("CidrBlock".to_string())),
            _ => {}
        }
        let vpc = self.store.require::<Vpc>(&req.vpc_id)?;

        if let Some(cidr) = &req.cidr_block {
            let net = parse_network_cidr(cidr)?;
            validate_block_size(&net, "InvalidVpc.Range")?;
            if vpc.ipv4_blocks().count() >= MAX_IPV4_BLOCKS {
                return Err(Ec2Error::conflict(
                    "CidrLimitExceeded",
                    format!(
                        "This network '{}' has met its maximum number of allowed CIDRs: {}",
                        vpc.id, MAX_IPV4_BLOCKS
                    ),
                ));
            }
            if let Some(existing) = vpc.ipv4_blocks().find(|b| ipv4_subnets_overlap(b, &net)) {
                return Err(Ec2Error::conflict(
                    "CidrConflict",
                    format!(
                        "The CIDR '{}' conflicts with another CIDR '{}' of this VPC",
                        net, existing
                    ),
                ));
            }

            let association = CidrBlockAssociation {
                association_id: self.new_id("vpc-cidr-assoc"),
                cidr_block: net,
                cidr_block_state: BlockState {
                    state: AssociationState::Associating.settle(),
                },
            };
            let vpc_id = req.vpc_id.clone();
            let stored = association.clone();
            self.store.atomically(|store| {
                store
                    .require_mut::<Vpc>(&vpc_id)?
                    .cidr_block_association_set
                    .push(stored);
                add_local_route(store, &vpc_id, RouteDestination::Ipv4(net));
                Ok(())
            })?;

            info!(vpc_id = %req.vpc_id, cidr = %net, "Associated VPC CIDR block");
            self.audit
                .vpc_cidr_associated(&req.vpc_id, &association.association_id, &net.to_string());
            return Ok(VpcCidrBlockResponse {
                vpc_id: req.vpc_id,
                cidr_block_association: Some(association),
                ipv6_cidr_block_association: None,
            });
        }

        let block = match &req.ipv6_cidr_block {
            Some(cidr) => {
                let net = parse_ipv6_cidr(cidr)?;
                if net.prefix_len() != AMAZON_IPV6_PREFIX {
                    return Err(Ec2Error::invalid_value(format!(
                        "The IPv6 CIDR '{}' must be a /{}",
                        cidr, AMAZON_IPV6_PREFIX
                    )));
                }
                if self
                    .store
                    .values::<Vpc>()
                    .into_iter()
                    .flat_map(|v| v.ipv6_blocks().collect::<Vec<_>>())
                    .any(|b| ipv6_prefixes_overlap(&b, &net))
                {
                    return Err(Ec2Error::conflict(
                        "CidrConflict",
                        format!("The IPv6 CIDR '{}' is already in use", cidr),
                    ));
                }
                net
            }
            None => self.allocate_amazon_ipv6()?,
        };
        if vpc.ipv6_blocks().count() >= MAX_IPV4_BLOCKS {
            return Err(Ec2Error::conflict(
                "CidrLimitExceeded",
                format!("This network '{}' has met its maximum number of IPv6 CIDRs", vpc.id),
            ));
        }

        let association = self.ipv6_association(block, req.ipv6_network_border_group.clone());
        let vpc_id = req.vpc_id.clone();
        let stored = association.clone();
        self.store.atomically(|store| {
            store
                .require_mut::<Vpc>(&vpc_id)?
                .ipv6_cidr_block_association_set
                .push(stored);
            add_local_route(store, &vpc_id, RouteDestination::Ipv6(block));
            Ok(())
        })?;

        info!(vpc_id = %req.vpc_id, cidr = %block, "Associated VPC IPv6 CIDR block");
        self.audit
            .vpc_cidr_associated(&req.vpc_id, &association.association_id, &block.to_string());
        Ok(VpcCidrBlockResponse {
            vpc_id: req.vpc_id,
            cidr_block_association: None,
            ipv6_cidr_block_association: Some(association),
        })
    }

    pub fn disassociate_vpc_cidr_block(&mut self, association_id: &str) -> Result<VpcCidrBlockResponse> {
        let not_found = || {
            Ec2Error::not_found(
                "InvalidVpcCidrBlockAssociationID.NotFound",
                "vpc cidr block association",
                association_id,
            )
        };
        let vpc = self
            .store
            .values::<Vpc>()
            .into_iter()
            .find(|v| {
                v.cidr_block_association_set
                    .iter()
                    .any(|a| a.association_id == association_id)
                    || v.ipv6_cidr_block_association_set
                        .iter()
                        .any(|a| a.association_id == association_id)
            })
            .ok_or_else(not_found)?;
        let vpc_id = vpc.id.clone();

        if let Some(assoc) = vpc
            .cidr_block_association_set
            .iter()
            .find(|a| a.association_id == association_id)
        {
            let block = assoc.cidr_block;
            if block == vpc.cidr_block {
                return Err(Ec2Error::invalid(
                    "OperationNotPermitted",
                    format!(
                        "The vpc CIDR block with association ID {} may not be disassociated. It is the primary IPv4 CIDR block of the VPC",
                        association_id
                    ),
                ));
            }
            if let Some(subnet) = self
                .store
                .subnets_in(&vpc_id)
                .into_iter()
                .find(|s| s.cidr_block.is_some_and(|c| block.contains(&c)))
            {
                return Err(Ec2Error::dependency(format!(
                    "The vpc CIDR block '{}' is in use by subnet {}",
                    block, subnet.id
                )));
            }

            let mut released = assoc.clone();
            released.cidr_block_state.state = AssociationState::Disassociating.settle();
            self.store.atomically(|store| {
                store
                    .require_mut::<Vpc>(&vpc_id)?
                    .cidr_block_association_set
                    .retain(|a| a.association_id != association_id);
                remove_local_route(store, &vpc_id, &RouteDestination::Ipv4(block));
                Ok(())
            })?;

            info!(vpc_id = %vpc_id, cidr = %block, "Disassociated VPC CIDR block");
            self.audit.vpc_cidr_disassociated(&vpc_id, association_id);
            return Ok(VpcCidrBlockResponse {
                vpc_id,
                cidr_block_association: Some(released),
                ipv6_cidr_block_association: None,
            });
        }

        let assoc = vpc
            .ipv6_cidr_block_association_set
            .iter()
            .find(|a| a.association_id == association_id)
            .ok_or_else(not_found)?;
        let block = assoc.ipv6_cidr_block;
        if let Some(subnet) = self.store.subnets_in(&vpc_id).into_iter().find(|s| {
            s.ipv6_cidr_block_association_set
                .iter()
                .any(|a| a.is_active() && block.contains(&a.ipv6_cidr_block))
        }) {
            return Err(Ec2Error::dependency(format!(
                "The vpc IPv6 CIDR block '{}' is in use by subnet {}",
                block, subnet.id
            )));
        }

        let mut released = assoc.clone();
        released.ipv6_cidr_block_state.state = AssociationState::Disassociating.settle();
        self.store.atomically(|store| {
            store
                .require_mut::<Vpc>(&vpc_id)?
                .ipv6_cidr_block_association_set
                .retain(|a| a.association_id != association_id);
            remove_local_route(store, &vpc_id, &RouteDestination::Ipv6(block));
            Ok(())
        })?;

        info!(vpc_id = %vpc_id, cidr = %block, "Disassociated VPC IPv6 CIDR block");
        self.audit.vpc_cidr_disassociated(&vpc_id, association_id);
        Ok(VpcCidrBlockResponse {
            vpc_id,
            cidr_block_association: None,
            ipv6_cidr_block_association: Some(released),
        })
    }

    pub fn modify_vpc_attribute(&mut self, req: ModifyVpcAttributeRequest) -> Result<ReturnResponse> {
        let given = [
            req.enable_dns_support.is_some(),
            req.enable_dns_hostnames.is_some(),
            req.enable_network_address_usage_metrics.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if given != 1 {
            return Err(Ec2Error::invalid_combination(
                "Exactly one attribute must be specified per ModifyVpcAttribute call",
            ));
        }

        let vpc = self.store.require_mut::<Vpc>(&req.vpc_id)?;
        let (attribute, value) = if let Some(enabled) = req.enable_dns_support {
            vpc.enable_dns_support = enabled;
            if !enabled {
                vpc.enable_dns_hostnames = false;
            }
            ("enableDnsSupport", enabled)
        } else if let Some(enabled) = req.enable_dns_hostnames {
            if enabled && !vpc.enable_dns_support {
                return Err(Ec2Error::invalid_value(
                    "DNS hostnames cannot be enabled while DNS support is disabled",
                ));
            }
            vpc.enable_dns_hostnames = enabled;
            ("enableDnsHostnames", enabled)
        } else {
            let enabled = req.enable_network_address_usage_metrics.unwrap_or(false);
            vpc.enable_network_address_usage_metrics = enabled;
            ("enableNetworkAddressUsageMetrics", enabled)
        };

        info!(vpc_id = %req.vpc_id, attribute, value, "Modified VPC attribute");
        self.audit.vpc_attribute_modified(&req.vpc_id, attribute, value);
        Ok(ReturnResponse::ok())
    }

    pub fn describe_vpc_attribute(
        &self,
        vpc_id: &str,
        attribute: &str,
    ) -> Result<DescribeVpcAttributeResponse> {
        let vpc = self.store.require::<Vpc>(vpc_id)?;
        let attribute = match attribute {
            "enableDnsSupport" => VpcAttribute::DnsSupport(AttributeValue {
                value: vpc.enable_dns_support,
            }),
            "enableDnsHostnames" => VpcAttribute::DnsHostnames(AttributeValue {
                value: vpc.enable_dns_hostnames,
            }),
            "enableNetworkAddressUsageMetrics" => {
                VpcAttribute::NetworkAddressUsageMetrics(AttributeValue {
                    value: vpc.enable_network_address_usage_metrics,
                })
            }
            other => {
                return Err(Ec2Error::invalid_value(format!(
                    "Value ({}) for parameter attribute is invalid.",
                    other
                )));
            }
        };
        Ok(DescribeVpcAttributeResponse {
            vpc_id: vpc.id.clone(),
            attribute,
        })
    }

    /// Create the account's default VPC with one default subnet per zone.
    pub(crate) fn bootstrap_default_vpc(&mut self) -> Result<()> {
        let vpc_id = self
            .create_vpc(CreateVpcRequest {
                cidr_block: Some(DEFAULT_VPC_CIDR.to_string()),
                ..Default::default()
            })?
            .vpc
            .id;
        let vpc = self.store.require_mut::<Vpc>(&vpc_id)?;
        vpc.is_default = true;
        vpc.enable_dns_hostnames = true;

        let base = parse_network_cidr(DEFAULT_VPC_CIDR)?;
        let mut blocks = base
            .subnets(DEFAULT_SUBNET_PREFIX)
            .map_err(|e| Ec2Error::Internal(e.to_string()))?;
        for zone in self.config.zones() {
            let Some(block) = blocks.next() else {
                break;
            };
            let subnet_id = self
                .create_subnet(CreateSubnetRequest {
                    vpc_id: vpc_id.clone(),
                    cidr_block: Some(block.to_string()),
                    availability_zone: Some(zone),
                    ..Default::default()
                })?
                .subnet
                .id;
            let subnet = self.store.require_mut::<Subnet>(&subnet_id)?;
            subnet.default_for_az = true;
            subnet.map_public_ip_on_launch = true;
        }

        info!(vpc_id = %vpc_id, "Created default VPC");
        Ok(())
    }
}

/// Add a local route for `destination` to every table of the VPC.
fn add_local_route(store: &mut ResourceStore, vpc_id: &str, destination: RouteDestination) {
    let tables: Vec<String> = store
        .route_tables_in(vpc_id)
        .into_iter()
        .map(|t| t.id.clone())
        .collect();
    for id in tables {
        if let Some(table) = store.get_mut::<RouteTable>(&id) {
            table.upsert_route(Route::local(destination.clone()));
        }
    }
}

fn remove_local_route(
    store: &mut ResourceStore,
    vpc_id: &str,
    destination: &RouteDestination,
) {
    let tables: Vec<String> = store
        .route_tables_in(vpc_id)
        .into_iter()
        .map(|t| t.id.clone())
        .collect();
    for id in tables {
        if let Some(table) = store.get_mut::<RouteTable>(&id)
            && table.find_route(destination).is_some_and(Route::is_local)
        {
            table.remove_route(destination);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::model::Instance;

    #[test]
    fn test_create_vpc_with_defaults() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");

        let vpc = net.store().get::<Vpc>(&vpc_id).unwrap();
        assert_eq!(vpc.state, ResourceState::Available);
        assert!(vpc.enable_dns_support);
        assert!(!vpc.enable_dns_hostnames);
        assert_eq!(vpc.cidr_block_association_set.len(), 1);

        let main = net.store().main_route_table(&vpc_id).unwrap();
        assert_eq!(main.routes.len(), 1);
        assert!(main.routes[0].is_local());
        assert!(net.store().default_network_acl(&vpc_id).is_some());
        assert!(net.store().default_security_group(&vpc_id).is_some());
    }

    #[test]
    fn test_create_vpc_invalid_cidr() {
        let mut net = network();
        for (cidr, code) in [
            ("10.0.0.0/8", "InvalidVpc.Range"),
            ("10.0.0.0/29", "InvalidVpc.Range"),
            ("10.0.0.300/16", "InvalidParameterValue"),
            ("not-a-cidr", "InvalidParameterValue"),
        ] {
            match net.dispatch("CreateVpc", &params(&[("CidrBlock", cidr)])) {
                Err(e) => assert_eq!(e.code(), code, "cidr {}", cidr),
                other => panic!("Unexpected response: {:?}", other),
            }
        }
        assert!(net.store().values::<Vpc>().is_empty());
        assert!(net.store().values::<RouteTable>().is_empty());
    }

    #[test]
    fn test_create_vpc_requires_cidr_or_pool() {
        let mut net = network();
        match net.dispatch("CreateVpc", &Params::new()) {
            Err(Ec2Error::MissingParameter(name)) => assert_eq!(name, "CidrBlock"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_ipam_allocation_skips_used_blocks() {
        let mut net = network();
        vpc(&mut net, "10.0.0.0/16");
        let response = net
            .dispatch(
                "CreateVpc",
                &params(&[("Ipv4IpamPoolId", "ipam-pool-1"), ("Ipv4NetmaskLength", "16")]),
            )
            .unwrap();
        assert_eq!(response["vpc"]["cidrBlock"], "10.1.0.0/16");
    }

    #[test]
    fn test_create_vpc_with_ipv6_and_tags() {
        let mut net = network();
        let response = net
            .dispatch(
                "CreateVpc",
                &params(&[
                    ("CidrBlock", "10.0.0.0/16"),
                    ("AmazonProvidedIpv6CidrBlock", "true"),
                    ("TagSpecification.1.ResourceType", "vpc"),
                    ("TagSpecification.1.Tag.1.Key", "Name"),
                    ("TagSpecification.1.Tag.1.Value", "prod"),
                ]),
            )
            .unwrap();
        let vpc = &response["vpc"];
        assert_eq!(vpc["tagSet"][0]["key"], "Name");
        let block = vpc["ipv6CidrBlockAssociationSet"][0]["ipv6CidrBlock"]
            .as_str()
            .unwrap();
        assert!(block.ends_with("/56"));

        let vpc_id = vpc["vpcId"].as_str().unwrap();
        let main = net.store().main_route_table(vpc_id).unwrap();
        assert_eq!(main.routes.len(), 2);
    }

    #[test]
    fn test_delete_vpc_is_idempotent() {
        let mut net = network();
        let response = net
            .dispatch("DeleteVpc", &params(&[("VpcId", "vpc-missing")]))
            .unwrap();
        assert_eq!(response["return"], true);
    }

    #[test]
    fn test_delete_vpc_cascades_defaults() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        net.dispatch("CreateRouteTable", &params(&[("VpcId", vpc_id.as_str())]))
            .unwrap();
        net.dispatch("CreateNetworkAcl", &params(&[("VpcId", vpc_id.as_str())]))
            .unwrap();
        net.dispatch("DeleteVpc", &params(&[("VpcId", vpc_id.as_str())]))
            .unwrap();

        assert!(net.store().values::<Vpc>().is_empty());
        assert!(net.store().values::<RouteTable>().is_empty());
        assert!(net.store().values::<NetworkAcl>().is_empty());
        assert!(net.store().values::<SecurityGroup>().is_empty());
    }

    #[test]
    fn test_delete_vpc_with_subnet_fails() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        subnet(&mut net, &vpc_id, "10.0.1.0/24");
        match net.dispatch("DeleteVpc", &params(&[("VpcId", vpc_id.as_str())])) {
            Err(e) => assert_eq!(e.code(), "DependencyViolation"),
            other => panic!("Unexpected response: {:?}", other),
        }
        assert!(net.store().get::<Vpc>(&vpc_id).is_some());
        assert!(net.store().main_route_table(&vpc_id).is_some());
    }

    #[test]
    fn test_delete_vpc_blocked_by_gateways_and_endpoints() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        net.store_mut()
            .put(InternetGateway::attached_to("igw-1", &vpc_id))
            .unwrap();
        assert!(net.delete_vpc(&vpc_id).is_err());
        net.store_mut().remove::<InternetGateway>("igw-1");

        let mut nat = NatGateway::new("nat-1", &vpc_id, "subnet-x");
        net.store_mut().put(nat.clone()).unwrap();
        assert!(net.delete_vpc(&vpc_id).is_err());
        nat.state = "deleted".to_string();
        net.store_mut().put(nat).unwrap();

        let mut endpoint = VpcEndpoint::new("vpce-1", &vpc_id);
        net.store_mut().put(endpoint.clone()).unwrap();
        assert!(net.delete_vpc(&vpc_id).is_err());
        endpoint.state = "deleted".to_string();
        net.store_mut().put(endpoint).unwrap();

        assert!(net.delete_vpc(&vpc_id).is_ok());
    }

    #[test]
    fn test_describe_vpcs_by_id_and_filter() {
        let mut net = network();
        let a = vpc(&mut net, "10.0.0.0/16");
        let _b = vpc(&mut net, "10.1.0.0/16");

        let response = net
            .dispatch("DescribeVpcs", &params(&[("VpcId.1", a.as_str())]))
            .unwrap();
        assert_eq!(response["vpcSet"].as_array().unwrap().len(), 1);

        let response = net
            .dispatch(
                "DescribeVpcs",
                &params(&[("Filter.1.Name", "cidr"), ("Filter.1.Value.1", "10.1.0.0/16")]),
            )
            .unwrap();
        assert_eq!(response["vpcSet"].as_array().unwrap().len(), 1);
        assert_eq!(response["vpcSet"][0]["cidrBlock"], "10.1.0.0/16");

        match net.dispatch("DescribeVpcs", &params(&[("VpcId.1", "vpc-nope")])) {
            Err(e) => assert_eq!(e.code(), "InvalidVpcID.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_associate_and_disassociate_cidr() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let response = net
            .dispatch(
                "AssociateVpcCidrBlock",
                &params(&[("VpcId", vpc_id.as_str()), ("CidrBlock", "10.1.0.0/16")]),
            )
            .unwrap();
        let assoc_id = response["cidrBlockAssociation"]["associationId"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(
            response["cidrBlockAssociation"]["cidrBlockState"]["state"],
            "associated"
        );
        assert_eq!(net.store().main_route_table(&vpc_id).unwrap().routes.len(), 2);

        // A subnet in the secondary block pins it.
        let subnet_id = subnet(&mut net, &vpc_id, "10.1.0.0/24");
        match net.dispatch(
            "DisassociateVpcCidrBlock",
            &params(&[("AssociationId", assoc_id.as_str())]),
        ) {
            Err(e) => assert_eq!(e.code(), "DependencyViolation"),
            other => panic!("Unexpected response: {:?}", other),
        }
        net.dispatch("DeleteSubnet", &params(&[("SubnetId", subnet_id.as_str())]))
            .unwrap();

        let response = net
            .dispatch(
                "DisassociateVpcCidrBlock",
                &params(&[("AssociationId", assoc_id.as_str())]),
            )
            .unwrap();
        assert_eq!(
            response["cidrBlockAssociation"]["cidrBlockState"]["state"],
            "disassociated"
        );
        assert_eq!(net.store().main_route_table(&vpc_id).unwrap().routes.len(), 1);
        assert_eq!(
            net.store().get::<Vpc>(&vpc_id).unwrap().cidr_block_association_set.len(),
            1
        );
    }

    #[test]
    fn test_associate_cidr_conflicts() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        match net.dispatch(
            "AssociateVpcCidrBlock",
            &params(&[("VpcId", vpc_id.as_str()), ("CidrBlock", "10.0.128.0/17")]),
        ) {
            Err(e) => assert_eq!(e.code(), "CidrConflict"),
            other => panic!("Unexpected response: {:?}", other),
        }
        match net.dispatch(
            "AssociateVpcCidrBlock",
            &params(&[
                ("VpcId", vpc_id.as_str()),
                ("CidrBlock", "10.1.0.0/16"),
                ("AmazonProvidedIpv6CidrBlock", "true"),
            ]),
        ) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterCombination"),
            other => panic!("Unexpected response: {:?}", other),
        }
        for i in 1..5 {
            let cidr = format!("10.{}.0.0/16", i);
            net.dispatch(
                "AssociateVpcCidrBlock",
                &params(&[("VpcId", vpc_id.as_str()), ("CidrBlock", cidr.as_str())]),
            )
            .unwrap();
        }
        match net.dispatch(
            "AssociateVpcCidrBlock",
            &params(&[("VpcId", vpc_id.as_str()), ("CidrBlock", "10.9.0.0/16")]),
        ) {
            Err(e) => assert_eq!(e.code(), "CidrLimitExceeded"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_primary_cidr_cannot_be_disassociated() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let primary = net.store().get::<Vpc>(&vpc_id).unwrap().cidr_block_association_set[0]
            .association_id
            .clone();
        match net.disassociate_vpc_cidr_block(&primary) {
            Err(e) => assert_eq!(e.code(), "OperationNotPermitted"),
            other => panic!("Unexpected response: {:?}", other),
        }
        match net.disassociate_vpc_cidr_block("vpc-cidr-assoc-missing") {
            Err(e) => assert_eq!(e.code(), "InvalidVpcCidrBlockAssociationID.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_modify_vpc_attribute_rules() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let id = vpc_id.as_str();

        net.dispatch(
            "ModifyVpcAttribute",
            &params(&[("VpcId", id), ("EnableDnsHostnames.Value", "true")]),
        )
        .unwrap();
        assert!(net.store().get::<Vpc>(id).unwrap().enable_dns_hostnames);

        // Disabling DNS support forces hostnames off.
        net.dispatch(
            "ModifyVpcAttribute",
            &params(&[("VpcId", id), ("EnableDnsSupport.Value", "false")]),
        )
        .unwrap();
        let vpc = net.store().get::<Vpc>(id).unwrap();
        assert!(!vpc.enable_dns_support);
        assert!(!vpc.enable_dns_hostnames);

        match net.dispatch(
            "ModifyVpcAttribute",
            &params(&[("VpcId", id), ("EnableDnsHostnames.Value", "true")]),
        ) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterValue"),
            other => panic!("Unexpected response: {:?}", other),
        }

        match net.dispatch(
            "ModifyVpcAttribute",
            &params(&[
                ("VpcId", id),
                ("EnableDnsSupport.Value", "true"),
                ("EnableDnsHostnames.Value", "true"),
            ]),
        ) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterCombination"),
            other => panic!("Unexpected response: {:?}", other),
        }

        let response = net
            .dispatch(
                "DescribeVpcAttribute",
                &params(&[("VpcId", id), ("Attribute", "enableDnsSupport")]),
            )
            .unwrap();
        assert_eq!(response["enableDnsSupport"]["value"], false);
        assert_eq!(response["vpcId"], vpc_id);
    }

    #[test]
    fn test_instance_in_other_vpc_does_not_block() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        net.store_mut()
            .put(Instance::new("i-1", "vpc-other", "subnet-other"))
            .unwrap();
        assert!(net.delete_vpc(&vpc_id).is_ok());
    }
}
