use ipnet::{Ipv4Net, Ipv6Net};
use serde::Serialize;

use super::AssociationState;
use super::tags::{Tags, serialize_pascal};
use crate::filter::{Filterable, one};

/// Route destination; unique within a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RouteDestination {
    #[serde(rename = "DestinationCidrBlock")]
    Ipv4(Ipv4Net),
    #[serde(rename = "DestinationIpv6CidrBlock")]
    Ipv6(Ipv6Net),
    #[serde(rename = "DestinationPrefixListId")]
    PrefixList(String),
}

impl std::fmt::Display for RouteDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteDestination::Ipv4(net) => write!(f, "{}", net),
            RouteDestination::Ipv6(net) => write!(f, "{}", net),
            RouteDestination::PrefixList(id) => write!(f, "{}", id),
        }
    }
}

/// Route target, serialized as its provider field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RouteTarget {
    GatewayId(String),
    NatGatewayId(String),
    InstanceId(String),
    NetworkInterfaceId(String),
    VpcPeeringConnectionId(String),
    TransitGatewayId(String),
    EgressOnlyInternetGatewayId(String),
    LocalGatewayId(String),
    CarrierGatewayId(String),
    CoreNetworkArn(String),
    VpcEndpointId(String),
}

impl RouteTarget {
    /// Parameter names accepted as targets, in precedence order.
    pub const PARAMS: [&'static str; 11] = [
        "GatewayId",
        "NatGatewayId",
        "InstanceId",
        "NetworkInterfaceId",
        "VpcPeeringConnectionId",
        "TransitGatewayId",
        "EgressOnlyInternetGatewayId",
        "LocalGatewayId",
        "CarrierGatewayId",
        "CoreNetworkArn",
        "VpcEndpointId",
    ];

    pub fn from_param(name: &str, value: String) -> Option<Self> {
        let target = match name {
            "GatewayId" => RouteTarget::GatewayId(value),
            "NatGatewayId" => RouteTarget::NatGatewayId(value),
            "InstanceId" => RouteTarget::InstanceId(value),
            "NetworkInterfaceId" => RouteTarget::NetworkInterfaceId(value),
            "VpcPeeringConnectionId" => RouteTarget::VpcPeeringConnectionId(value),
            "TransitGatewayId" => RouteTarget::TransitGatewayId(value),
            "EgressOnlyInternetGatewayId" => RouteTarget::EgressOnlyInternetGatewayId(value),
            "LocalGatewayId" => RouteTarget::LocalGatewayId(value),
            "CarrierGatewayId" => RouteTarget::CarrierGatewayId(value),
            "CoreNetworkArn" => RouteTarget::CoreNetworkArn(value),
            "VpcEndpointId" => RouteTarget::VpcEndpointId(value),
            _ => return None,
        };
        Some(target)
    }

    pub fn local() -> Self {
        RouteTarget::GatewayId("local".to_string())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, RouteTarget::GatewayId(id) if id == "local")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RouteOrigin {
    CreateRouteTable,
    CreateRoute,
    EnableVgwRoutePropagation,
}

impl RouteOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteOrigin::CreateRouteTable => "CreateRouteTable",
            RouteOrigin::CreateRoute => "CreateRoute",
            RouteOrigin::EnableVgwRoutePropagation => "EnableVgwRoutePropagation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteState {
    Active,
    Blackhole,
}

impl RouteState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteState::Active => "active",
            RouteState::Blackhole => "blackhole",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Route {
    #[serde(flatten)]
    pub destination: RouteDestination,
    #[serde(flatten)]
    pub target: RouteTarget,
    pub origin: RouteOrigin,
    pub state: RouteState,
}

impl Route {
    /// `local` route for one of the VPC's CIDR blocks.
    pub fn local(destination: RouteDestination) -> Self {
        Self {
            destination,
            target: RouteTarget::local(),
            origin: RouteOrigin::CreateRouteTable,
            state: RouteState::Active,
        }
    }

    pub fn is_local(&self) -> bool {
        self.target.is_local()
    }
}

/// `{"State": ...}` of a route table association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssociationStatus {
    pub state: AssociationState,
}

/// Association of a table with a subnet, a gateway, a public IPv4 pool, or
/// the VPC (main).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteTableAssociation {
    pub route_table_association_id: String,
    pub route_table_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,
    #[serde(rename = "PublicIpv4Pool", skip_serializing_if = "Option::is_none")]
    pub public_ipv4_pool: Option<String>,
    pub main: bool,
    pub association_state: AssociationStatus,
}

impl RouteTableAssociation {
    fn build(id: String, table: &str, main: bool) -> Self {
        Self {
            route_table_association_id: id,
            route_table_id: table.to_string(),
            subnet_id: None,
            gateway_id: None,
            public_ipv4_pool: None,
            main,
            association_state: AssociationStatus {
                state: AssociationState::Associating.settle(),
            },
        }
    }

    pub fn main(id: String, table: &str) -> Self {
        Self::build(id, table, true)
    }

    pub fn subnet(id: String, table: &str, subnet_id: &str) -> Self {
        Self {
            subnet_id: Some(subnet_id.to_string()),
            ..Self::build(id, table, false)
        }
    }

    pub fn gateway(id: String, table: &str, gateway_id: &str) -> Self {
        Self {
            gateway_id: Some(gateway_id.to_string()),
            ..Self::build(id, table, false)
        }
    }

    pub fn public_pool(id: String, table: &str, pool_id: &str) -> Self {
        Self {
            public_ipv4_pool: Some(pool_id.to_string()),
            ..Self::build(id, table, false)
        }
    }

    /// Subnet, gateway or pool id this association targets; None for main.
    pub fn target(&self) -> Option<&str> {
        self.subnet_id
            .as_deref()
            .or(self.gateway_id.as_deref())
            .or(self.public_ipv4_pool.as_deref())
    }

    /// Same association target moved to another table under a new id.
    pub fn moved(&self, id: String, table: &str) -> Self {
        Self {
            route_table_association_id: id,
            route_table_id: table.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PropagatingVgw {
    pub gateway_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteTable {
    #[serde(rename = "RouteTableId")]
    pub id: String,
    pub vpc_id: String,
    pub owner_id: String,
    pub routes: Vec<Route>,
    pub associations: Vec<RouteTableAssociation>,
    pub propagating_vgws: Vec<PropagatingVgw>,
    #[serde(serialize_with = "serialize_pascal")]
    pub tags: Tags,
}

impl RouteTable {
    pub fn is_main(&self) -> bool {
        self.associations.iter().any(|a| a.main)
    }

    pub fn find_route(&self, destination: &RouteDestination) -> Option<&Route> {
        self.routes.iter().find(|r| &r.destination == destination)
    }

    /// Insert `route`, replacing any route with the same destination.
    pub fn upsert_route(&mut self, route: Route) {
        let mut routes: Vec<Route> = self
            .routes
            .iter()
            .filter(|r| r.destination != route.destination)
            .cloned()
            .collect();
        routes.push(route);
        self.routes = routes;
    }

    pub fn remove_route(&mut self, destination: &RouteDestination) -> Option<Route> {
        let position = self.routes.iter().position(|r| &r.destination == destination)?;
        Some(self.routes.remove(position))
    }

    pub fn association(&self, association_id: &str) -> Option<&RouteTableAssociation> {
        self.associations
            .iter()
            .find(|a| a.route_table_association_id == association_id)
    }

    pub fn remove_association(&mut self, association_id: &str) -> Option<RouteTableAssociation> {
        let position = self
            .associations
            .iter()
            .position(|a| a.route_table_association_id == association_id)?;
        Some(self.associations.remove(position))
    }
}

impl Filterable for RouteTable {
    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn filter_values(&self, name: &str) -> Option<Vec<String>> {
        let assoc = &self.associations;
        let route_values = |f: fn(&Route) -> Option<String>| -> Option<Vec<String>> {
            Some(self.routes.iter().filter_map(f).collect())
        };
        match name {
            "route-table-id" => one(&self.id),
            "vpc-id" => one(&self.vpc_id),
            "owner-id" => one(&self.owner_id),
            "association.route-table-association-id" => Some(
                assoc
                    .iter()
                    .map(|a| a.route_table_association_id.clone())
                    .collect(),
            ),
            "association.route-table-id" => {
                Some(assoc.iter().map(|a| a.route_table_id.clone()).collect())
            }
            "association.subnet-id" => {
                Some(assoc.iter().filter_map(|a| a.subnet_id.clone()).collect())
            }
            "association.gateway-id" => {
                Some(assoc.iter().filter_map(|a| a.gateway_id.clone()).collect())
            }
            "association.main" => Some(assoc.iter().map(|a| a.main.to_string()).collect()),
            "route.destination-cidr-block" => route_values(|r| match &r.destination {
                RouteDestination::Ipv4(net) => Some(net.to_string()),
                _ => None,
            }),
            "route.destination-ipv6-cidr-block" => route_values(|r| match &r.destination {
                RouteDestination::Ipv6(net) => Some(net.to_string()),
                _ => None,
            }),
            "route.destination-prefix-list-id" => route_values(|r| match &r.destination {
                RouteDestination::PrefixList(id) => Some(id.clone()),
                _ => None,
            }),
            "route.gateway-id" => route_values(|r| match &r.target {
                RouteTarget::GatewayId(id) => Some(id.clone()),
                _ => None,
            }),
            "route.nat-gateway-id" => route_values(|r| match &r.target {
                RouteTarget::NatGatewayId(id) => Some(id.clone()),
                _ => None,
            }),
            "route.transit-gateway-id" => route_values(|r| match &r.target {
                RouteTarget::TransitGatewayId(id) => Some(id.clone()),
                _ => None,
            }),
            "route.vpc-peering-connection-id" => route_values(|r| match &r.target {
                RouteTarget::VpcPeeringConnectionId(id) => Some(id.clone()),
                _ => None,
            }),
            "route.origin" => route_values(|r| Some(r.origin.as_str().to_string())),
            "route.state" => route_values(|r| Some(r.state.as_str().to_string())),
            _ => None,
        }
    }
}
