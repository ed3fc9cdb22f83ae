//! Route tables, routes, associations and VGW propagation.
//!
//! Responses in this family use PascalCase field names.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::defaults;
use super::{Ec2Network, PascalReturnResponse, describe};
use crate::error::{Ec2Error, Result};
use crate::filter::Filter;
use crate::model::route_table::{AssociationStatus, PropagatingVgw, RouteOrigin, RouteState};
use crate::model::{
    Route, RouteDestination, RouteTable, RouteTableAssociation, RouteTarget, Subnet, Tag, Tags,
    Vpc,
};
use crate::pagination::{NARROW, PageRequest};
use crate::params::Params;
use crate::validation::{parse_ipv4_cidr, parse_ipv6_cidr};

#[derive(Debug, Clone, Default)]
pub struct CreateRouteTableRequest {
    pub vpc_id: String,
    pub tags: Vec<Tag>,
}

impl CreateRouteTableRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            vpc_id: params.required("VpcId")?,
            tags: params.tags_for("route-table")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRouteTableResponse {
    pub route_table: RouteTable,
}

#[derive(Debug, Clone, Default)]
pub struct DescribeRouteTablesRequest {
    pub route_table_ids: Vec<String>,
    pub filters: Vec<Filter>,
    pub page: PageRequest,
}

impl DescribeRouteTablesRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            route_table_ids: params.list("RouteTableId"),
            filters: params.filters()?,
            page: PageRequest::from_params(params)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeRouteTablesResponse {
    pub route_tables: Vec<RouteTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

const DESTINATION_PARAMS: [&str; 3] = [
    "DestinationCidrBlock",
    "DestinationIpv6CidrBlock",
    "DestinationPrefixListId",
];

/// Exactly one destination selector.
fn destination_from_params(params: &Params) -> Result<RouteDestination> {
    let given: Vec<(&str, String)> = DESTINATION_PARAMS
        .iter()
        .filter_map(|name| params.string(name).map(|v| (*name, v)))
        .collect();
    let (name, value) = match given.as_slice() {
        [] => return Err(Ec2Error::MissingParameter("DestinationCidrBlock".to_string())),
        [one] => one.clone(),
        _ => {
            return Err(Ec2Error::invalid_combination(
                "Exactly one of DestinationCidrBlock, DestinationIpv6CidrBlock and DestinationPrefixListId must be specified",
            ));
        }
    };
    match name {
        "DestinationCidrBlock" => Ok(RouteDestination::Ipv4(parse_ipv4_cidr(&value)?.trunc())),
        "DestinationIpv6CidrBlock" => Ok(RouteDestination::Ipv6(parse_ipv6_cidr(&value)?.trunc())),
        _ => Ok(RouteDestination::PrefixList(value)),
    }
}

/// Exactly one target id.
fn target_from_params(params: &Params) -> Result<RouteTarget> {
    let mut given = RouteTarget::PARAMS
        .iter()
        .filter_map(|name| params.string(name).and_then(|v| RouteTarget::from_param(name, v)));
    let target = given.next().ok_or_else(|| {
        Ec2Error::MissingParameter(format!("one of {}", RouteTarget::PARAMS.join(", ")))
    })?;
    if given.next().is_some() {
        return Err(Ec2Error::invalid_combination(
            "A route must specify exactly one target",
        ));
    }
    if target.is_local() {
        return Err(Ec2Error::invalid_value(
            "Local routes are managed by the VPC and cannot be created or replaced",
        ));
    }
    Ok(target)
}

#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub route_table_id: String,
    pub destination: RouteDestination,
    pub target: RouteTarget,
}

impl RouteRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            route_table_id: params.required("RouteTableId")?,
            destination: destination_from_params(params)?,
            target: target_from_params(params)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DeleteRouteRequest {
    pub route_table_id: String,
    pub destination: RouteDestination,
}

impl DeleteRouteRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            route_table_id: params.required("RouteTableId")?,
            destination: destination_from_params(params)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssociateRouteTableRequest {
    pub route_table_id: String,
    pub subnet_id: Option<String>,
    pub gateway_id: Option<String>,
    pub public_ipv4_pool: Option<String>,
}

impl AssociateRouteTableRequest {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            route_table_id: params.required("RouteTableId")?,
            subnet_id: params.string("SubnetId"),
            gateway_id: params.string("GatewayId"),
            public_ipv4_pool: params.string("PublicIpv4Pool"),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssociateRouteTableResponse {
    pub association_id: String,
    pub association_state: AssociationStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplaceRouteTableAssociationResponse {
    pub new_association_id: String,
    pub association_state: AssociationStatus,
}

impl Ec2Network {
    pub fn create_route_table(
        &mut self,
        req: CreateRouteTableRequest,
    ) -> Result<CreateRouteTableResponse> {
        let vpc = self.store.require::<Vpc>(&req.vpc_id)?;
        let mut table = defaults::route_table(self.collab.as_ref(), vpc);
        table.tags = Tags::try_from_tags(req.tags)?;
        self.store.put(table.clone())?;

        info!(route_table_id = %table.id, vpc_id = %table.vpc_id, "Created route table");
        self.audit.route_table_created(&table.id, &table.vpc_id);
        Ok(CreateRouteTableResponse { route_table: table })
    }

    pub fn delete_route_table(&mut self, route_table_id: &str) -> Result<PascalReturnResponse> {
        let Some(table) = self.store.get::<RouteTable>(route_table_id) else {
            debug!(route_table_id, "Route table already absent");
            return Ok(PascalReturnResponse::ok());
        };
        if !table.associations.is_empty() {
            warn!(
                route_table_id,
                main = table.is_main(),
                associations = table.associations.len(),
                "Refusing to delete associated route table"
            );
            return Err(Ec2Error::dependency(format!(
                "The routeTable '{}' has dependencies and cannot be deleted.",
                route_table_id
            )));
        }
        self.store.remove::<RouteTable>(route_table_id);

        info!(route_table_id, "Deleted route table");
        self.audit.route_table_deleted(route_table_id);
        Ok(PascalReturnResponse::ok())
    }

    pub fn describe_route_tables(
        &self,
        req: DescribeRouteTablesRequest,
    ) -> Result<DescribeRouteTablesResponse> {
        let page = describe::<RouteTable>(
            &self.store,
            &req.route_table_ids,
            &req.filters,
            &req.page,
            NARROW,
        )?;
        debug!(count = page.items.len(), "Described route tables");
        Ok(DescribeRouteTablesResponse {
            route_tables: page.items,
            next_token: page.next_token,
        })
    }

    pub fn create_route(&mut self, req: RouteRequest) -> Result<PascalReturnResponse> {
        self.put_route(req, false)
    }

    pub fn replace_route(&mut self, req: RouteRequest) -> Result<PascalReturnResponse> {
        self.put_route(req, true)
    }

    fn put_route(&mut self, req: RouteRequest, replace: bool) -> Result<PascalReturnResponse> {
        let table = self.store.require_mut::<RouteTable>(&req.route_table_id)?;
        match table.find_route(&req.destination) {
            Some(existing) if existing.is_local() => {
                return Err(Ec2Error::invalid_value(format!(
                    "Cannot modify the local route {} in route table {}",
                    req.destination, req.route_table_id
                )));
            }
            None if replace => {
                return Err(route_not_found(&req.route_table_id, &req.destination));
            }
            _ => {}
        }
        table.upsert_route(Route {
            destination: req.destination.clone(),
            target: req.target,
            origin: RouteOrigin::CreateRoute,
            state: RouteState::Active,
        });

        let change = if replace { "replaced" } else { "created" };
        info!(
            route_table_id = %req.route_table_id,
            destination = %req.destination,
            change,
            "Route updated"
        );
        self.audit
            .route_changed(&req.route_table_id, &req.destination.to_string(), change);
        Ok(PascalReturnResponse::ok())
    }

    pub fn delete_route(&mut self, req: DeleteRouteRequest) -> Result<PascalReturnResponse> {
        let table = self.store.require_mut::<RouteTable>(&req.route_table_id)?;
        match table.find_route(&req.destination) {
            None => return Err(route_not_found(&req.route_table_id, &req.destination)),
            Some(route) if route.is_local() => {
                return Err(Ec2Error::invalid_value(format!(
                    "Cannot delete the local route {} from route table {}",
                    req.destination, req.route_table_id
                )));
            }
            Some(_) => {}
        }
        table.remove_route(&req.destination);

        info!(route_table_id = %req.route_table_id, destination = %req.destination, "Deleted route");
        self.audit
            .route_changed(&req.route_table_id, &req.destination.to_string(), "deleted");
        Ok(PascalReturnResponse::ok())
    }

    pub fn associate_route_table(
        &mut self,
        req: AssociateRouteTableRequest,
    ) -> Result<AssociateRouteTableResponse> {
        let targets = [&req.subnet_id, &req.gateway_id, &req.public_ipv4_pool];
        match targets.iter().filter(|t| t.is_some()).count() {
            0 => return Err(Ec2Error::MissingParameter("SubnetId".to_string())),
            1 => {}
            _ => {
                return Err(Ec2Error::invalid_combination(
                    "Exactly one of SubnetId, GatewayId and PublicIpv4Pool must be specified",
                ));
            }
        }
        let table = self.store.require::<RouteTable>(&req.route_table_id)?;
        if let Some(subnet_id) = &req.subnet_id {
            let subnet = self.store.require::<Subnet>(subnet_id)?;
            if subnet.vpc_id != table.vpc_id {
                return Err(Ec2Error::invalid_value(format!(
                    "Route table {} and subnet {} belong to different networks",
                    table.id, subnet_id
                )));
            }
        }
        let target = req
            .subnet_id
            .as_deref()
            .or(req.gateway_id.as_deref())
            .or(req.public_ipv4_pool.as_deref())
            .unwrap_or_default()
            .to_string();
        if let Some(current) = self.store.route_table_for_target(&target) {
            return Err(Ec2Error::conflict(
                "Resource.AlreadyAssociated",
                format!(
                    "the specified association for route table {} conflicts with an existing association",
                    current.id
                ),
            ));
        }

        let id = self.new_id("rtbassoc");
        let association = if req.subnet_id.is_some() {
            RouteTableAssociation::subnet(id, &req.route_table_id, &target)
        } else if req.gateway_id.is_some() {
            RouteTableAssociation::gateway(id, &req.route_table_id, &target)
        } else {
            RouteTableAssociation::public_pool(id, &req.route_table_id, &target)
        };
        let response = AssociateRouteTableResponse {
            association_id: association.route_table_association_id.clone(),
            association_state: association.association_state,
        };
        self.store
            .require_mut::<RouteTable>(&req.route_table_id)?
            .associations
            .push(association);

        info!(
            route_table_id = %req.route_table_id,
            association_id = %response.association_id,
            target = %target,
            "Associated route table"
        );
        self.audit
            .route_table_associated(&req.route_table_id, &response.association_id, &target);
        Ok(response)
    }

    pub fn replace_route_table_association(
        &mut self,
        association_id: &str,
        route_table_id: &str,
    ) -> Result<ReplaceRouteTableAssociationResponse> {
        let source = self
            .store
            .route_table_by_association(association_id)
            .ok_or_else(|| association_not_found(association_id))?;
        let target = self.store.require::<RouteTable>(route_table_id)?;
        if source.vpc_id != target.vpc_id {
            return Err(Ec2Error::invalid_value(format!(
                "Route table {} is not in the same VPC as association {}",
                route_table_id, association_id
            )));
        }
        let source_id = source.id.clone();
        let new_id = self.new_id("rtbassoc");

        let association = self.store.atomically(|store| {
            let old = store
                .require_mut::<RouteTable>(&source_id)?
                .remove_association(association_id)
                .ok_or_else(|| association_not_found(association_id))?;
            let moved = old.moved(new_id, route_table_id);
            store
                .require_mut::<RouteTable>(route_table_id)?
                .associations
                .push(moved.clone());
            Ok(moved)
        })?;

        let target_label = association.target().unwrap_or("main").to_string();
        info!(
            association_id,
            new_association_id = %association.route_table_association_id,
            from = %source_id,
            to = route_table_id,
            main = association.main,
            "Replaced route table association"
        );
        self.audit.route_table_disassociated(association_id);
        self.audit.route_table_associated(
            route_table_id,
            &association.route_table_association_id,
            &target_label,
        );
        Ok(ReplaceRouteTableAssociationResponse {
            new_association_id: association.route_table_association_id,
            association_state: association.association_state,
        })
    }

    pub fn disassociate_route_table(&mut self, association_id: &str) -> Result<PascalReturnResponse> {
        let table = self
            .store
            .route_table_by_association(association_id)
            .ok_or_else(|| association_not_found(association_id))?;
        if table.association(association_id).is_some_and(|a| a.main) {
            return Err(Ec2Error::invalid_value(format!(
                "Cannot disassociate the main route table association {}",
                association_id
            )));
        }
        let table_id = table.id.clone();
        self.store
            .require_mut::<RouteTable>(&table_id)?
            .remove_association(association_id);

        info!(association_id, route_table_id = %table_id, "Disassociated route table");
        self.audit.route_table_disassociated(association_id);
        Ok(PascalReturnResponse::ok())
    }

    pub fn enable_vgw_route_propagation(
        &mut self,
        route_table_id: &str,
        gateway_id: &str,
    ) -> Result<PascalReturnResponse> {
        let table = self.store.require_mut::<RouteTable>(route_table_id)?;
        if !table.propagating_vgws.iter().any(|v| v.gateway_id == gateway_id) {
            table.propagating_vgws.push(PropagatingVgw {
                gateway_id: gateway_id.to_string(),
            });
        }
        info!(route_table_id, gateway_id, "Enabled VGW route propagation");
        Ok(PascalReturnResponse::ok())
    }

    pub fn disable_vgw_route_propagation(
        &mut self,
        route_table_id: &str,
        gateway_id: &str,
    ) -> Result<PascalReturnResponse> {
        let table = self.store.require_mut::<RouteTable>(route_table_id)?;
        table.propagating_vgws.retain(|v| v.gateway_id != gateway_id);
        info!(route_table_id, gateway_id, "Disabled VGW route propagation");
        Ok(PascalReturnResponse::ok())
    }
}

fn route_not_found(route_table_id: &str, destination: &RouteDestination) -> Ec2Error {
    Ec2Error::NotFound {
        code: "InvalidRoute.NotFound",
        message: format!(
            "no route with destination-cidr-block {} in route table {}",
            destination, route_table_id
        ),
    }
}

fn association_not_found(association_id: &str) -> Ec2Error {
    Ec2Error::not_found("InvalidAssociationID.NotFound", "association", association_id)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn route_table(net: &mut Ec2Network, vpc_id: &str) -> String {
        let response = net
            .dispatch("CreateRouteTable", &params(&[("VpcId", vpc_id)]))
            .unwrap();
        response["RouteTable"]["RouteTableId"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_create_route_table_has_local_route() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let response = net
            .dispatch("CreateRouteTable", &params(&[("VpcId", vpc_id.as_str())]))
            .unwrap();
        let table = &response["RouteTable"];
        assert_eq!(table["VpcId"], vpc_id);
        assert_eq!(table["Routes"].as_array().unwrap().len(), 1);
        assert_eq!(table["Routes"][0]["GatewayId"], "local");
        assert_eq!(table["Routes"][0]["State"], "active");
        assert_eq!(table["Routes"][0]["DestinationCidrBlock"], "10.0.0.0/16");
        assert_eq!(table["Routes"][0]["Origin"], "CreateRouteTable");
        assert!(table["Associations"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_create_route_table_unknown_vpc() {
        let mut net = network();
        match net.dispatch("CreateRouteTable", &params(&[("VpcId", "vpc-nope")])) {
            Err(e) => assert_eq!(e.code(), "InvalidVpcID.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_routes_crud() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let rtb = route_table(&mut net, &vpc_id);
        let id = rtb.as_str();

        net.dispatch(
            "CreateRoute",
            &params(&[
                ("RouteTableId", id),
                ("DestinationCidrBlock", "0.0.0.0/0"),
                ("GatewayId", "igw-1"),
            ]),
        )
        .unwrap();
        // Same destination again replaces.
        net.dispatch(
            "CreateRoute",
            &params(&[
                ("RouteTableId", id),
                ("DestinationCidrBlock", "0.0.0.0/0"),
                ("NatGatewayId", "nat-1"),
            ]),
        )
        .unwrap();
        let table = net.store().get::<RouteTable>(id).unwrap();
        assert_eq!(table.routes.len(), 2);
        let dest = RouteDestination::Ipv4("0.0.0.0/0".parse().unwrap());
        assert_eq!(
            table.find_route(&dest).unwrap().target,
            RouteTarget::NatGatewayId("nat-1".to_string())
        );

        net.dispatch(
            "ReplaceRoute",
            &params(&[
                ("RouteTableId", id),
                ("DestinationCidrBlock", "0.0.0.0/0"),
                ("TransitGatewayId", "tgw-1"),
            ]),
        )
        .unwrap();
        match net.dispatch(
            "ReplaceRoute",
            &params(&[
                ("RouteTableId", id),
                ("DestinationCidrBlock", "192.168.0.0/16"),
                ("GatewayId", "igw-1"),
            ]),
        ) {
            Err(e) => assert_eq!(e.code(), "InvalidRoute.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }

        net.dispatch(
            "DeleteRoute",
            &params(&[("RouteTableId", id), ("DestinationCidrBlock", "0.0.0.0/0")]),
        )
        .unwrap();
        match net.dispatch(
            "DeleteRoute",
            &params(&[("RouteTableId", id), ("DestinationCidrBlock", "0.0.0.0/0")]),
        ) {
            Err(e) => assert_eq!(e.code(), "InvalidRoute.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_route_selector_validation() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let rtb = route_table(&mut net, &vpc_id);
        let id = rtb.as_str();

        match net.dispatch(
            "CreateRoute",
            &params(&[
                ("RouteTableId", id),
                ("DestinationCidrBlock", "0.0.0.0/0"),
                ("DestinationIpv6CidrBlock", "::/0"),
                ("GatewayId", "igw-1"),
            ]),
        ) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterCombination"),
            other => panic!("Unexpected response: {:?}", other),
        }
        match net.dispatch(
            "CreateRoute",
            &params(&[
                ("RouteTableId", id),
                ("DestinationCidrBlock", "0.0.0.0/0"),
                ("GatewayId", "igw-1"),
                ("NatGatewayId", "nat-1"),
            ]),
        ) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterCombination"),
            other => panic!("Unexpected response: {:?}", other),
        }
        match net.dispatch(
            "CreateRoute",
            &params(&[("RouteTableId", id), ("DestinationCidrBlock", "0.0.0.0/0")]),
        ) {
            Err(e) => assert_eq!(e.code(), "MissingParameter"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_local_route_is_immutable() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let rtb = route_table(&mut net, &vpc_id);
        let id = rtb.as_str();

        match net.dispatch(
            "CreateRoute",
            &params(&[
                ("RouteTableId", id),
                ("DestinationCidrBlock", "10.0.0.0/16"),
                ("GatewayId", "igw-1"),
            ]),
        ) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterValue"),
            other => panic!("Unexpected response: {:?}", other),
        }
        match net.dispatch(
            "DeleteRoute",
            &params(&[("RouteTableId", id), ("DestinationCidrBlock", "10.0.0.0/16")]),
        ) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterValue"),
            other => panic!("Unexpected response: {:?}", other),
        }
        assert_eq!(net.store().get::<RouteTable>(id).unwrap().routes.len(), 1);
    }

    #[test]
    fn test_delete_route_table_rules() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let main_id = net.store().main_route_table(&vpc_id).unwrap().id.clone();
        match net.delete_route_table(&main_id) {
            Err(e) => assert_eq!(e.code(), "DependencyViolation"),
            other => panic!("Unexpected response: {:?}", other),
        }

        let rtb = route_table(&mut net, &vpc_id);
        let subnet_id = subnet(&mut net, &vpc_id, "10.0.1.0/24");
        let assoc = net
            .dispatch(
                "AssociateRouteTable",
                &params(&[("RouteTableId", rtb.as_str()), ("SubnetId", subnet_id.as_str())]),
            )
            .unwrap()["AssociationId"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(net.delete_route_table(&rtb).is_err());

        net.dispatch(
            "DisassociateRouteTable",
            &params(&[("AssociationId", assoc.as_str())]),
        )
        .unwrap();
        let response = net
            .dispatch("DeleteRouteTable", &params(&[("RouteTableId", rtb.as_str())]))
            .unwrap();
        assert_eq!(response["Return"], true);
        // Absent ids succeed.
        assert!(net.delete_route_table(&rtb).is_ok());
    }

    #[test]
    fn test_associate_route_table_rules() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let other_vpc = vpc(&mut net, "10.1.0.0/16");
        let rtb = route_table(&mut net, &vpc_id);
        let rtb2 = route_table(&mut net, &vpc_id);
        let subnet_id = subnet(&mut net, &vpc_id, "10.0.1.0/24");
        let foreign = subnet(&mut net, &other_vpc, "10.1.1.0/24");

        let response = net
            .dispatch(
                "AssociateRouteTable",
                &params(&[("RouteTableId", rtb.as_str()), ("SubnetId", subnet_id.as_str())]),
            )
            .unwrap();
        assert_eq!(response["AssociationState"]["State"], "associated");

        match net.dispatch(
            "AssociateRouteTable",
            &params(&[("RouteTableId", rtb2.as_str()), ("SubnetId", subnet_id.as_str())]),
        ) {
            Err(e) => assert_eq!(e.code(), "Resource.AlreadyAssociated"),
            other => panic!("Unexpected response: {:?}", other),
        }
        match net.dispatch(
            "AssociateRouteTable",
            &params(&[("RouteTableId", rtb2.as_str()), ("SubnetId", foreign.as_str())]),
        ) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterValue"),
            other => panic!("Unexpected response: {:?}", other),
        }
        match net.dispatch(
            "AssociateRouteTable",
            &params(&[
                ("RouteTableId", rtb2.as_str()),
                ("SubnetId", subnet_id.as_str()),
                ("GatewayId", "igw-1"),
            ]),
        ) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterCombination"),
            other => panic!("Unexpected response: {:?}", other),
        }

        let response = net
            .dispatch(
                "AssociateRouteTable",
                &params(&[("RouteTableId", rtb2.as_str()), ("GatewayId", "igw-1")]),
            )
            .unwrap();
        assert!(response["AssociationId"].as_str().unwrap().starts_with("rtbassoc-"));
    }

    #[test]
    fn test_replace_main_association() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let main = net.store().main_route_table(&vpc_id).unwrap().clone();
        let main_assoc = main.associations[0].route_table_association_id.clone();
        let rtb = route_table(&mut net, &vpc_id);

        let response = net
            .dispatch(
                "ReplaceRouteTableAssociation",
                &params(&[("AssociationId", main_assoc.as_str()), ("RouteTableId", rtb.as_str())]),
            )
            .unwrap();
        let new_id = response["NewAssociationId"].as_str().unwrap();
        assert_ne!(new_id, main_assoc);

        assert_eq!(net.store().main_route_table(&vpc_id).unwrap().id, rtb);
        assert!(!net.store().get::<RouteTable>(&main.id).unwrap().is_main());
        let mains = net
            .store()
            .route_tables_in(&vpc_id)
            .into_iter()
            .filter(|t| t.is_main())
            .count();
        assert_eq!(mains, 1);

        // The old main table is free to go now.
        assert!(net.delete_route_table(&main.id).is_ok());
        match net.disassociate_route_table(new_id) {
            Err(e) => assert_eq!(e.code(), "InvalidParameterValue"),
            other => panic!("Unexpected response: {:?}", other),
        }
        match net.disassociate_route_table(&main_assoc) {
            Err(e) => assert_eq!(e.code(), "InvalidAssociationID.NotFound"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_describe_route_tables_filters() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        route_table(&mut net, &vpc_id);

        let response = net
            .dispatch(
                "DescribeRouteTables",
                &params(&[("Filter.1.Name", "association.main"), ("Filter.1.Value.1", "true")]),
            )
            .unwrap();
        assert_eq!(response["RouteTables"].as_array().unwrap().len(), 1);

        let response = net
            .dispatch(
                "DescribeRouteTables",
                &params(&[("Filter.1.Name", "vpc-id"), ("Filter.1.Value.1", vpc_id.as_str())]),
            )
            .unwrap();
        assert_eq!(response["RouteTables"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_vgw_propagation() {
        let mut net = network();
        let vpc_id = vpc(&mut net, "10.0.0.0/16");
        let rtb = route_table(&mut net, &vpc_id);
        net.enable_vgw_route_propagation(&rtb, "vgw-1").unwrap();
        net.enable_vgw_route_propagation(&rtb, "vgw-1").unwrap();
        assert_eq!(
            net.store().get::<RouteTable>(&rtb).unwrap().propagating_vgws.len(),
            1
        );
        net.disable_vgw_route_propagation(&rtb, "vgw-1").unwrap();
        assert!(
            net.store()
                .get::<RouteTable>(&rtb)
                .unwrap()
                .propagating_vgws
                .is_empty()
        );
    }
}
