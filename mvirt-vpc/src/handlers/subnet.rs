//! Subnets, their IPv6 associations and CIDR reservations.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Ec2Network, ReturnResponse, describe};
use crate::error::{Ec2Error, Result};
use crate::filter::{self, Filter};
use crate::model::{
    AssociationState, BlockState, Instance, Ipv6CidrBlockAssociation, NetworkAcl,
    NetworkAclAssociation, NetworkInterface, ReservationType, ResourceState, RouteTable, Subnet,
    SubnetCidrReservation, Tag, Tags, Vpc, arn,
};
use crate::pagination::{NARROW, PageRequest, WIDE, paginate};
use crate::params::Params;
use crate::validation::{
    available_ip_count, ipv4_subnets_overlap, ipv4_within, ipv6_prefixes_overlap,
    parse_ipv6_cidr, parse_network_cidr, validate_block_size,
};

const SUBNET_IPV6_PREFIX: u8 = 64;

#[derive(Debug, Clone, Default)]
pub struct CreateSubnetRequest {
    pub vpc_id: String,
    pub cidr_block: Option<String>,
    pub ipv6_cidr_block: Option<String>,
    pub availability_zone: Option<String>,
    pub availability_zone_id: Option<String>,
    pub ipv6_native: bool,
    pub tags: Vec<Tag>,
}

impl CreateSubnetRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            vpc_id: params.required("VpcId")?,
            cidr_block: params.string("CidrBlock"),
            ipv6_cidr_block: params.string("Ipv6CidrBlock"),
            availability_zone: params.string("AvailabilityZone"),
            availability_zone_id: params.string("AvailabilityZoneId"),
            ipv6_native: params.bool("Ipv6Native")?.unwrap_or(false),
            tags: params.tags_for("subnet")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSubnetResponse {
    pub subnet: Subnet,
}

#[derive(Debug, Clone, Default)]
pub struct DescribeSubnetsRequest {
    pub subnet_ids: Vec<String>,
    pub filters: Vec<Filter>,
    pub page: PageRequest,
}

impl DescribeSubnetsRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            subnet_ids: params.list("SubnetId"),
            filters: params.filters()?,
            page: PageRequest::from_params(params)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeSubnetsResponse {
    pub subnet_set: Vec<Subnet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModifySubnetAttributeRequest {
    pub subnet_id: String,
    pub map_public_ip_on_launch: Option<bool>,
    pub assign_ipv6_address_on_creation: Option<bool>,
    pub enable_dns64: Option<bool>,
}

impl ModifySubnetAttributeRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            subnet_id: params.required("SubnetId")?,
            map_public_ip_on_launch: params.attribute_bool("MapPublicIpOnLaunch")?,
            assign_ipv6_address_on_creation: params
                .attribute_bool("AssignIpv6AddressOnCreation")?,
            enable_dns64: params.attribute_bool("EnableDns64")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetCidrBlockResponse {
    pub subnet_id: String,
    pub ipv6_cidr_block_association: Ipv6CidrBlockAssociation,
}

#[derive(Debug, Clone, Default)]
pub struct CreateSubnetCidrReservationRequest {
    pub subnet_id: String,
    pub cidr: String,
    pub reservation_type: String,
    pub description: Option<String>,
    pub tags: Vec<Tag>,
}

impl CreateSubnetCidrReservationRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            subnet_id: params.required("SubnetId")?,
            cidr: params.required("Cidr")?,
            reservation_type: params.required("ReservationType")?,
            description: params.string("Description"),
            tags: params.tags_for("subnet-cidr-reservation")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubnetCidrReservationResponse {
    pub subnet_cidr_reservation: SubnetCidrReservation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSubnetCidrReservationResponse {
    pub deleted_subnet_cidr_reservation: SubnetCidrReservation,
}

#[derive(Debug, Clone, Default)]
pub struct GetSubnetCidrReservationsRequest {
    pub subnet_id: String,
    pub filters: Vec<Filter>,
    pub page: PageRequest,
}

impl GetSubnetCidrReservationsRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            subnet_id: params.required("SubnetId")?,
            filters: params.filters()?,
            page: PageRequest::from_params(params)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSubnetCidrReservationsResponse {
    pub subnet_ipv4_cidr_reservation_set: Vec<SubnetCidrReservation>,
    pub subnet_ipv6_cidr_reservation_set: Vec<SubnetCidrReservation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

impl Ec2Network {
    pub fn create_subnet(&mut self, req: CreateSubnetRequest) -> Result<CreateSubnetResponse> {
        let vpc = self.store.require::<Vpc>(&req.vpc_id)?;
        let zone = self.resolve_zone(req.availability_zone, req.availability_zone_id)?;

        let cidr = match (&req.cidr_block, req.ipv6_native) {
            (Some(_), true) => {
                return Err(Ec2Error::invalid_combination(
                    "CidrBlock cannot be specified for an IPv6-only subnet",
                ));
            }
            (None, true) => None,
            (None, false) => return Err(Ec2Error::MissingParameter("CidrBlock".to_string())),
            (Some(cidr), false) => Some(self.validate_subnet_cidr(vpc, cidr)?),
        };
        let ipv6 = match &req.ipv6_cidr_block {
            Some(cidr) => Some(self.validate_subnet_ipv6(vpc, None, cidr)?),
            None if req.ipv6_native => {
                return Err(Ec2Error::MissingParameter("Ipv6CidrBlock".to_string()));
            }
            None => None,
        };
        let tags = Tags::try_from_tags(req.tags)?;

        let id = self.new_id("subnet");
        let owner_id = self.owner_id();
        let subnet = Subnet {
            subnet_arn: arn(&self.config.region, &owner_id, "subnet", &id),
            id,
            vpc_id: vpc.id.clone(),
            cidr_block: cidr,
            availability_zone_id: self.config.zone_id(&zone),
            availability_zone: zone,
            available_ip_address_count: cidr.as_ref().map(available_ip_count).unwrap_or(0),
            default_for_az: false,
            map_public_ip_on_launch: false,
            assign_ipv6_address_on_creation: false,
            ipv6_cidr_block_association_set: ipv6
                .map(|block| vec![self.subnet_ipv6_association(block)])
                .unwrap_or_default(),
            ipv6_native: req.ipv6_native,
            enable_dns64: false,
            state: ResourceState::Available,
            owner_id,
            tags,
        };

        let association_id = self.new_id("aclassoc");
        let stored = subnet.clone();
        self.store.atomically(|store| {
            let acl_id = store
                .default_network_acl(&stored.vpc_id)
                .map(|a| a.id.clone())
                .ok_or_else(|| {
                    Ec2Error::Internal(format!("VPC {} has no default network ACL", stored.vpc_id))
                })?;
            store
                .require_mut::<NetworkAcl>(&acl_id)?
                .association_set
                .push(NetworkAclAssociation {
                    network_acl_association_id: association_id,
                    network_acl_id: acl_id.clone(),
                    subnet_id: stored.id.clone(),
                });
            store.put(stored)
        })?;

        let block = subnet
            .cidr_block
            .map(|c| c.to_string())
            .or_else(|| subnet.active_ipv6().map(|a| a.ipv6_cidr_block.to_string()))
            .unwrap_or_default();
        info!(
            subnet_id = %subnet.id,
            vpc_id = %subnet.vpc_id,
            cidr = %block,
            zone = %subnet.availability_zone,
            "Created subnet"
        );
        self.audit.subnet_created(&subnet.id, &subnet.vpc_id, &block);
        Ok(CreateSubnetResponse { subnet })
    }

    fn resolve_zone(&self, zone: Option<String>, zone_id: Option<String>) -> Result<String> {
        let zones = self.config.zones();
        match (zone, zone_id) {
            (Some(zone), _) => {
                if zones.contains(&zone) {
                    Ok(zone)
                } else {
                    Err(Ec2Error::invalid_value(format!(
                        "Value ({}) for parameter availabilityZone is invalid. Subnets can currently only be created in the following availability zones: {}.",
                        zone,
                        zones.join(", ")
                    )))
                }
            }
            (None, Some(zone_id)) => zones
                .into_iter()
                .find(|z| self.config.zone_id(z) == zone_id)
                .ok_or_else(|| {
                    Ec2Error::invalid_value(format!(
                        "Value ({}) for parameter availabilityZoneId is invalid.",
                        zone_id
                    ))
                }),
            (None, None) => zones.into_iter().next().ok_or_else(|| {
                Ec2Error::Internal("No availability zones configured".to_string())
            }),
        }
    }

    fn validate_subnet_cidr(&self, vpc: &Vpc, cidr: &str) -> Result<Ipv4Net> {
        let net = parse_network_cidr(cidr)?;
        validate_block_size(&net, "InvalidSubnet.Range")?;
        if !vpc.ipv4_blocks().any(|block| ipv4_within(&block, &net)) {
            return Err(Ec2Error::invalid(
                "InvalidSubnet.Range",
                format!("The CIDR '{}' is invalid.", cidr),
            ));
        }
        if self
            .store
            .subnets_in(&vpc.id)
            .into_iter()
            .filter_map(|s| s.cidr_block)
            .any(|sibling| ipv4_subnets_overlap(&sibling, &net))
        {
            return Err(Ec2Error::conflict(
                "InvalidSubnet.Conflict",
                format!("The CIDR '{}' conflicts with another subnet", cidr),
            ));
        }
        Ok(net)
    }

    /// IPv6 /64 inside an active VPC association, not used by another
    /// subnet (`skip` excludes the subnet being changed).
    fn validate_subnet_ipv6(&self, vpc: &Vpc, skip: Option<&str>, cidr: &str) -> Result<Ipv6Net> {
        let net = parse_ipv6_cidr(cidr)?;
        if net.prefix_len() != SUBNET_IPV6_PREFIX || net.addr() != net.network() {
            return Err(Ec2Error::invalid(
                "InvalidSubnet.Range",
                format!("The IPv6 CIDR '{}' must be a /{} network", cidr, SUBNET_IPV6_PREFIX),
            ));
        }
        if !vpc.ipv6_blocks().any(|block| block.contains(&net)) {
            return Err(Ec2Error::invalid(
                "InvalidSubnet.Range",
                format!("The IPv6 CIDR '{}' is not within the VPC's IPv6 CIDR blocks", cidr),
            ));
        }
        let taken = self
            .store
            .subnets_in(&vpc.id)
            .into_iter()
            .filter(|s| Some(s.id.as_str()) != skip)
            .flat_map(|s| s.ipv6_cidr_block_association_set.iter())
            .filter(|a| a.is_active())
            .any(|a| ipv6_prefixes_overlap(&a.ipv6_cidr_block, &net));
        if taken {
            return Err(Ec2Error::conflict(
                "InvalidSubnet.Conflict",
                format!("The IPv6 CIDR '{}' conflicts with another subnet", cidr),
            ));
        }
        Ok(net)
    }

    fn subnet_ipv6_association(&self, block: Ipv6Net) -> Ipv6CidrBlockAssociation {
        Ipv6CidrBlockAssociation {
            association_id: self.new_id("subnet-cidr-assoc"),
            ipv6_cidr_block: block,
            ipv6_cidr_block_state: BlockState::associated(),
            network_border_group: None,
            ipv6_pool: None,
        }
    }

    pub fn delete_subnet(&mut self, subnet_id: &str) -> Result<ReturnResponse> {
        if self.store.get::<Subnet>(subnet_id).is_none() {
            debug!(subnet_id, "Subnet already absent");
            return Ok(ReturnResponse::ok());
        }
        if let Some(instance) = self
            .store
            .values::<Instance>()
            .into_iter()
            .find(|i| i.subnet_id == subnet_id && i.is_live())
        {
            warn!(subnet_id, instance_id = %instance.id, "Subnet still has instances");
            return Err(Ec2Error::dependency(format!(
                "The subnet '{}' has dependencies and cannot be deleted.",
                subnet_id
            )));
        }
        if let Some(eni) = self
            .store
            .values::<NetworkInterface>()
            .into_iter()
            .find(|n| n.subnet_id == subnet_id && n.is_in_use())
        {
            warn!(subnet_id, eni_id = %eni.id, "Subnet still has network interfaces");
            return Err(Ec2Error::dependency(format!(
                "The subnet '{}' has dependencies and cannot be deleted.",
                subnet_id
            )));
        }

        self.store.atomically(|store| {
            let acl_ids: Vec<String> = store
                .values::<NetworkAcl>()
                .into_iter()
                .filter(|a| a.association_for_subnet(subnet_id).is_some())
                .map(|a| a.id.clone())
                .collect();
            for id in acl_ids {
                if let Some(acl) = store.get_mut::<NetworkAcl>(&id) {
                    acl.association_set.retain(|a| a.subnet_id != subnet_id);
                }
            }
            let table_ids: Vec<String> = store
                .values::<RouteTable>()
                .into_iter()
                .filter(|t| {
                    t.associations
                        .iter()
                        .any(|a| a.subnet_id.as_deref() == Some(subnet_id))
                })
                .map(|t| t.id.clone())
                .collect();
            for id in table_ids {
                if let Some(table) = store.get_mut::<RouteTable>(&id) {
                    table
                        .associations
                        .retain(|a| a.subnet_id.as_deref() != Some(subnet_id));
                }
            }
            let reservations: Vec<String> = store
                .reservations_for(subnet_id)
                .into_iter()
                .map(|r| r.id.clone())
                .collect();
            for id in reservations {
                store.remove::<SubnetCidrReservation>(&id);
            }
            store.remove::<Subnet>(subnet_id);
            Ok(())
        })?;

        info!(subnet_id, "Deleted subnet");
        self.audit.subnet_deleted(subnet_id);
        Ok(ReturnResponse::ok())
    }

    pub fn describe_subnets(&self, req: DescribeSubnetsRequest) -> Result<DescribeSubnetsResponse> {
        let page =
            describe::<Subnet>(&self.store, &req.subnet_ids, &req.filters, &req.page, NARROW)?;
        debug!(count = page.items.len(), "Described subnets");
        Ok(DescribeSubnetsResponse {
            subnet_set: page.items,
            next_token: page.next_token,
        })
    }

    pub fn modify_subnet_attribute(
        &mut self,
        req: ModifySubnetAttributeRequest,
    ) -> Result<ReturnResponse> {
        let given = [
            req.map_public_ip_on_launch,
            req.assign_ipv6_address_on_creation,
            req.enable_dns64,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count();
        if given != 1 {
            return Err(Ec2Error::invalid_combination(
                "Exactly one attribute must be specified per ModifySubnetAttribute call",
            ));
        }

        let subnet = self.store.require_mut::<Subnet>(&req.subnet_id)?;
        let (attribute, value) = if let Some(enabled) = req.map_public_ip_on_launch {
            subnet.map_public_ip_on_launch = enabled;
            ("mapPublicIpOnLaunch", enabled)
        } else if let Some(enabled) = req.assign_ipv6_address_on_creation {
            if enabled && subnet.active_ipv6().is_none() {
                return Err(Ec2Error::invalid_value(format!(
                    "The subnet '{}' has no IPv6 CIDR block",
                    req.subnet_id
                )));
            }
            subnet.assign_ipv6_address_on_creation = enabled;
            ("assignIpv6AddressOnCreation", enabled)
        } else {
            let enabled = req.enable_dns64.unwrap_or(false);
            subnet.enable_dns64 = enabled;
            ("enableDns64", enabled)
        };

        info!(subnet_id = %req.subnet_id, attribute, value, "Modified subnet attribute");
        Ok(ReturnResponse::ok())
    }

    pub fn associate_subnet_cidr_block(
        &mut self,
        subnet_id: &str,
        ipv6_cidr_block: &str,
    ) -> Result<SubnetCidrBlockResponse> {
        let subnet = self.store.require::<Subnet>(subnet_id)?;
        if let Some(active) = subnet.active_ipv6() {
            return Err(Ec2Error::invalid_value(format!(
                "The subnet '{}' already has the IPv6 CIDR block {}",
                subnet_id, active.ipv6_cidr_block
            )));
        }
        let vpc = self.store.require::<Vpc>(&subnet.vpc_id)?;
        let block = self.validate_subnet_ipv6(vpc, Some(subnet_id), ipv6_cidr_block)?;

        let association = self.subnet_ipv6_association(block);
        self.store
            .require_mut::<Subnet>(subnet_id)?
            .ipv6_cidr_block_association_set
            .push(association.clone());

        info!(subnet_id, cidr = %block, "Associated subnet IPv6 CIDR block");
        Ok(SubnetCidrBlockResponse {
            subnet_id: subnet_id.to_string(),
            ipv6_cidr_block_association: association,
        })
    }

    pub fn disassociate_subnet_cidr_block(
        &mut self,
        association_id: &str,
    ) -> Result<SubnetCidrBlockResponse> {
        let subnet = self
            .store
            .values::<Subnet>()
            .into_iter()
            .find(|s| {
                s.ipv6_cidr_block_association_set
                    .iter()
                    .any(|a| a.association_id == association_id)
            })
            .ok_or_else(|| {
                Ec2Error::not_found(
                    "InvalidSubnetCidrBlockAssociationID.NotFound",
                    "subnet cidr block association",
                    association_id,
                )
            })?;
        if subnet.ipv6_native {
            return Err(Ec2Error::invalid(
                "OperationNotPermitted",
                format!(
                    "The IPv6 CIDR block of IPv6-only subnet '{}' cannot be disassociated",
                    subnet.id
                ),
            ));
        }
        let subnet_id = subnet.id.clone();

        let subnet = self.store.require_mut::<Subnet>(&subnet_id)?;
        let position = subnet
            .ipv6_cidr_block_association_set
            .iter()
            .position(|a| a.association_id == association_id)
            .ok_or_else(|| Ec2Error::Internal("association vanished".to_string()))?;
        let mut released = subnet.ipv6_cidr_block_association_set.remove(position);
        released.ipv6_cidr_block_state.state = AssociationState::Disassociating.settle();
        if subnet.active_ipv6().is_none() {
            subnet.assign_ipv6_address_on_creation = false;
        }

        info!(subnet_id = %subnet_id, cidr = %released.ipv6_cidr_block, "Disassociated subnet IPv6 CIDR block");
        Ok(SubnetCidrBlockResponse {
            subnet_id,
            ipv6_cidr_block_association: released,
        })
    }

    pub fn create_subnet_cidr_reservation(
        &mut self,
        req: CreateSubnetCidrReservationRequest,
    ) -> Result<CreateSubnetCidrReservationResponse> {
        let subnet = self.store.require::<Subnet>(&req.subnet_id)?;
        let reservation_type = ReservationType::parse(&req.reservation_type)?;
        let outside = || {
            Ec2Error::invalid_value(format!(
                "The CIDR '{}' is not within subnet {}",
                req.cidr, req.subnet_id
            ))
        };
        let cidr = if req.cidr.contains(':') {
            let net = parse_ipv6_cidr(&req.cidr)?;
            let within = subnet
                .ipv6_cidr_block_association_set
                .iter()
                .filter(|a| a.is_active())
                .any(|a| a.ipv6_cidr_block.contains(&net));
            if !within {
                return Err(outside());
            }
            IpNet::V6(net)
        } else {
            let net = parse_network_cidr(&req.cidr)?;
            if !subnet.cidr_block.is_some_and(|block| ipv4_within(&block, &net)) {
                return Err(outside());
            }
            IpNet::V4(net)
        };
        if let Some(existing) = self
            .store
            .reservations_for(&req.subnet_id)
            .into_iter()
            .find(|r| r.cidr.contains(&cidr) || cidr.contains(&r.cidr))
        {
            return Err(Ec2Error::invalid_value(format!(
                "The CIDR '{}' overlaps reservation {}",
                cidr, existing.id
            )));
        }

        let reservation = SubnetCidrReservation {
            id: self.new_id("scr"),
            subnet_id: req.subnet_id,
            cidr,
            reservation_type,
            description: req.description,
            owner_id: self.owner_id(),
            tags: Tags::try_from_tags(req.tags)?,
        };
        self.store.put(reservation.clone())?;

        info!(
            reservation_id = %reservation.id,
            subnet_id = %reservation.subnet_id,
            cidr = %cidr,
            "Created subnet CIDR reservation"
        );
        self.audit
            .cidr_reservation_created(&reservation.id, &reservation.subnet_id, &cidr.to_string());
        Ok(CreateSubnetCidrReservationResponse {
            subnet_cidr_reservation: reservation,
        })
    }

    pub fn delete_subnet_cidr_reservation(
        &mut self,
        reservation_id: &str,
    ) -> Result<DeleteSubnetCidrReservationResponse> {
        self.store.require::<SubnetCidrReservation>(reservation_id)?;
        let reservation = self
            .store
            .remove::<SubnetCidrReservation>(reservation_id)
            .ok_or_else(|| Ec2Error::Internal(format!("reservation {} vanished", reservation_id)))?;

        info!(reservation_id, "Deleted subnet CIDR reservation");
        self.audit.cidr_reservation_deleted(reservation_id);
        Ok(DeleteSubnetCidrReservationResponse {
            deleted_subnet_cidr_reservation: reservation,
        })
    }

    pub fn get_subnet_cidr_reservations(
        &self,
        req: GetSubnetCidrReservationsRequest,
    ) -> Result<GetSubnetCidrReservationsResponse> {
        self.store.require::<Subnet>(&req.subnet_id)?;
        let matched: Vec<SubnetCidrReservation> =
            filter::apply(self.store.reservations_for(&req.subnet_id), &req.filters)
                .into_iter()
                .cloned()
                .collect();
        let page = paginate(matched, &req.page, WIDE)?;
        let (ipv6, ipv4): (Vec<_>, Vec<_>) = page.items.into_iter().partition(|r| r.is_ipv6());

        debug!(subnet_id = %req.subnet_id, ipv4 = ipv4.len(), ipv6 = ipv6.len(), "Listed subnet CIDR reservations");
        Ok(GetSubnetCidrReservationsResponse {
            subnet_ipv4_cidr_reservation_set: ipv4,
            subnet_ipv6_cidr_reservation_set: ipv6,
            next_token: page.next_token,
        })
    }
}
