//! In-memory resource store.
//!
//! One typed table per resource kind plus a flat index from id to kind.
//! Handlers reach entities through the [`Resource`] trait:
//!
//! ```ignore
//! let vpc = store.get::<Vpc>("vpc-...")?;
//! store.put(subnet)?;
//! for acl in store.values::<NetworkAcl>() { ... }
//! ```
//!
//! Multi-entity writes go through [`ResourceStore::atomically`], which
//! restores the previous state when the closure fails.

mod table;

use std::collections::HashMap;

pub use table::Table;

use crate::error::{Ec2Error, Result};
use crate::model::{
    Instance, InternetGateway, NatGateway, NetworkAcl, NetworkInterface, RouteTable,
    SecurityGroup, SecurityGroupRule, Subnet, SubnetCidrReservation, Tags, Vpc, VpcEndpoint,
};

/// Resource kinds known to the flat index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Vpc,
    Subnet,
    SubnetCidrReservation,
    RouteTable,
    NetworkAcl,
    SecurityGroup,
    SecurityGroupRule,
    Instance,
    NetworkInterface,
    InternetGateway,
    NatGateway,
    VpcEndpoint,
}

impl ResourceKind {
    /// `resource-type` value reported by DescribeTags.
    pub fn resource_type(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::SubnetCidrReservation => "subnet-cidr-reservation",
            ResourceKind::RouteTable => "route-table",
            ResourceKind::NetworkAcl => "network-acl",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::SecurityGroupRule => "security-group-rule",
            ResourceKind::Instance => "instance",
            ResourceKind::NetworkInterface => "network-interface",
            ResourceKind::InternetGateway => "internet-gateway",
            ResourceKind::NatGateway => "natgateway",
            ResourceKind::VpcEndpoint => "vpc-endpoint",
        }
    }

    /// Kind implied by an id prefix, used to pick the NotFound code for
    /// ids that are not in the store.
    pub fn from_id(id: &str) -> Option<Self> {
        let prefix = id.rsplit_once('-').map(|(p, _)| p)?;
        let kind = match prefix {
            "vpc" => ResourceKind::Vpc,
            "subnet" => ResourceKind::Subnet,
            "scr" => ResourceKind::SubnetCidrReservation,
            "rtb" => ResourceKind::RouteTable,
            "acl" => ResourceKind::NetworkAcl,
            "sg" => ResourceKind::SecurityGroup,
            "sgr" => ResourceKind::SecurityGroupRule,
            "i" => ResourceKind::Instance,
            "eni" => ResourceKind::NetworkInterface,
            "igw" => ResourceKind::InternetGateway,
            "nat" => ResourceKind::NatGateway,
            "vpce" => ResourceKind::VpcEndpoint,
            _ => return None,
        };
        Some(kind)
    }

    pub fn not_found(&self, id: &str) -> Ec2Error {
        match self {
            ResourceKind::Vpc => Ec2Error::vpc_not_found(id),
            ResourceKind::Subnet => Ec2Error::subnet_not_found(id),
            ResourceKind::SubnetCidrReservation => Ec2Error::not_found(
                "InvalidSubnetCidrReservationID.NotFound",
                "subnet cidr reservation",
                id,
            ),
            ResourceKind::RouteTable => Ec2Error::route_table_not_found(id),
            ResourceKind::NetworkAcl => Ec2Error::network_acl_not_found(id),
            ResourceKind::SecurityGroup => Ec2Error::group_not_found(id),
            ResourceKind::SecurityGroupRule => Ec2Error::not_found(
                "InvalidSecurityGroupRuleId.NotFound",
                "security group rule",
                id,
            ),
            ResourceKind::Instance => {
                Ec2Error::not_found("InvalidInstanceID.NotFound", "instance", id)
            }
            ResourceKind::NetworkInterface => Ec2Error::not_found(
                "InvalidNetworkInterfaceID.NotFound",
                "network interface",
                id,
            ),
            ResourceKind::InternetGateway => Ec2Error::not_found(
                "InvalidInternetGatewayID.NotFound",
                "internet gateway",
                id,
            ),
            ResourceKind::NatGateway => {
                Ec2Error::not_found("NatGatewayNotFound", "nat gateway", id)
            }
            ResourceKind::VpcEndpoint => Ec2Error::not_found(
                "InvalidVpcEndpointId.NotFound",
                "vpc endpoint",
                id,
            ),
        }
    }
}

/// An entity stored in its own table.
pub trait Resource: Clone + Sized {
    const KIND: ResourceKind;

    fn id(&self) -> &str;
    fn tag_set(&self) -> &Tags;
    fn tag_set_mut(&mut self) -> &mut Tags;
    fn table(store: &ResourceStore) -> &Table<Self>;
    fn table_mut(store: &mut ResourceStore) -> &mut Table<Self>;
}

macro_rules! resource {
    ($ty:ty, $kind:ident, $field:ident) => {
        impl Resource for $ty {
            const KIND: ResourceKind = ResourceKind::$kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn tag_set(&self) -> &Tags {
                &self.tags
            }

            fn tag_set_mut(&mut self) -> &mut Tags {
                &mut self.tags
            }

            fn table(store: &ResourceStore) -> &Table<Self> {
                &store.$field
            }

            fn table_mut(store: &mut ResourceStore) -> &mut Table<Self> {
                &mut store.$field
            }
        }
    };
}

resource!(Vpc, Vpc, vpcs);
resource!(Subnet, Subnet, subnets);
resource!(SubnetCidrReservation, SubnetCidrReservation, cidr_reservations);
resource!(RouteTable, RouteTable, route_tables);
resource!(NetworkAcl, NetworkAcl, network_acls);
resource!(SecurityGroup, SecurityGroup, security_groups);
resource!(Instance, Instance, instances);
resource!(NetworkInterface, NetworkInterface, network_interfaces);
resource!(InternetGateway, InternetGateway, internet_gateways);
resource!(NatGateway, NatGateway, nat_gateways);
resource!(VpcEndpoint, VpcEndpoint, vpc_endpoints);

/// Owner of every entity in the emulator.
#[derive(Debug, Clone, Default)]
pub struct ResourceStore {
    vpcs: Table<Vpc>,
    subnets: Table<Subnet>,
    cidr_reservations: Table<SubnetCidrReservation>,
    route_tables: Table<RouteTable>,
    network_acls: Table<NetworkAcl>,
    security_groups: Table<SecurityGroup>,
    instances: Table<Instance>,
    network_interfaces: Table<NetworkInterface>,
    internet_gateways: Table<InternetGateway>,
    nat_gateways: Table<NatGateway>,
    vpc_endpoints: Table<VpcEndpoint>,
    /// Flat id -> kind index over every table.
    index: HashMap<String, ResourceKind>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Resource>(&self, id: &str) -> Option<&T> {
        T::table(self).get(id)
    }

    pub fn get_mut<T: Resource>(&mut self, id: &str) -> Option<&mut T> {
        T::table_mut(self).get_mut(id)
    }

    /// Fetch or fail with the kind's NotFound error.
    pub fn require<T: Resource>(&self, id: &str) -> Result<&T> {
        self.get::<T>(id).ok_or_else(|| T::KIND.not_found(id))
    }

    pub fn require_mut<T: Resource>(&mut self, id: &str) -> Result<&mut T> {
        T::table_mut(self)
            .get_mut(id)
            .ok_or_else(|| T::KIND.not_found(id))
    }

    /// Insert or replace. An id owned by another kind is rejected.
    pub fn put<T: Resource>(&mut self, entity: T) -> Result<()> {
        let id = entity.id().to_string();
        match self.index.get(&id) {
            Some(kind) if *kind != T::KIND => {
                return Err(Ec2Error::Internal(format!(
                    "id {} already in use by a {}",
                    id,
                    kind.resource_type()
                )));
            }
            Some(_) => {}
            None => {
                self.index.insert(id.clone(), T::KIND);
            }
        }
        T::table_mut(self).insert(id, entity);
        Ok(())
    }

    pub fn remove<T: Resource>(&mut self, id: &str) -> Option<T> {
        let removed = T::table_mut(self).remove(id)?;
        self.index.remove(id);
        Some(removed)
    }

    /// Entities of one kind in insertion order.
    pub fn values<T: Resource>(&self) -> Vec<&T> {
        T::table(self).values()
    }

    pub fn count<T: Resource>(&self) -> usize {
        T::table(self).len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.kind_of(id).is_some()
    }

    /// Kind of a stored id. Security group rules live inside their group
    /// and are found by scanning.
    pub fn kind_of(&self, id: &str) -> Option<ResourceKind> {
        if let Some(kind) = self.index.get(id) {
            return Some(*kind);
        }
        self.find_rule(id).map(|_| ResourceKind::SecurityGroupRule)
    }

    /// Run a multi-entity write; on error the store is left untouched.
    pub fn atomically<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }

    pub fn tags_of(&self, id: &str) -> Option<&Tags> {
        match self.kind_of(id)? {
            ResourceKind::Vpc => self.get::<Vpc>(id).map(Resource::tag_set),
            ResourceKind::Subnet => self.get::<Subnet>(id).map(Resource::tag_set),
            ResourceKind::SubnetCidrReservation => self
                .get::<SubnetCidrReservation>(id)
                .map(Resource::tag_set),
            ResourceKind::RouteTable => self.get::<RouteTable>(id).map(Resource::tag_set),
            ResourceKind::NetworkAcl => self.get::<NetworkAcl>(id).map(Resource::tag_set),
            ResourceKind::SecurityGroup => self.get::<SecurityGroup>(id).map(Resource::tag_set),
            ResourceKind::SecurityGroupRule => self.find_rule(id).map(|r| &r.tags),
            ResourceKind::Instance => self.get::<Instance>(id).map(Resource::tag_set),
            ResourceKind::NetworkInterface => {
                self.get::<NetworkInterface>(id).map(Resource::tag_set)
            }
            ResourceKind::InternetGateway => {
                self.get::<InternetGateway>(id).map(Resource::tag_set)
            }
            ResourceKind::NatGateway => self.get::<NatGateway>(id).map(Resource::tag_set),
            ResourceKind::VpcEndpoint => self.get::<VpcEndpoint>(id).map(Resource::tag_set),
        }
    }

    pub fn tags_mut(&mut self, id: &str) -> Option<&mut Tags> {
        match self.kind_of(id)? {
            ResourceKind::Vpc => self.get_mut::<Vpc>(id).map(Resource::tag_set_mut),
            ResourceKind::Subnet => self.get_mut::<Subnet>(id).map(Resource::tag_set_mut),
            ResourceKind::SubnetCidrReservation => self
                .get_mut::<SubnetCidrReservation>(id)
                .map(Resource::tag_set_mut),
            ResourceKind::RouteTable => self.get_mut::<RouteTable>(id).map(Resource::tag_set_mut),
            ResourceKind::NetworkAcl => self.get_mut::<NetworkAcl>(id).map(Resource::tag_set_mut),
            ResourceKind::SecurityGroup => self
                .get_mut::<SecurityGroup>(id)
                .map(Resource::tag_set_mut),
            ResourceKind::SecurityGroupRule => self
                .security_groups
                .values_mut_unordered()
                .find_map(|g| g.rule_mut(id))
                .map(|r| &mut r.tags),
            ResourceKind::Instance => self.get_mut::<Instance>(id).map(Resource::tag_set_mut),
            ResourceKind::NetworkInterface => self
                .get_mut::<NetworkInterface>(id)
                .map(Resource::tag_set_mut),
            ResourceKind::InternetGateway => self
                .get_mut::<InternetGateway>(id)
                .map(Resource::tag_set_mut),
            ResourceKind::NatGateway => self.get_mut::<NatGateway>(id).map(Resource::tag_set_mut),
            ResourceKind::VpcEndpoint => {
                self.get_mut::<VpcEndpoint>(id).map(Resource::tag_set_mut)
            }
        }
    }

    /// Every tagged entity as (id, kind, tags), kinds in a fixed order and
    /// each kind in insertion order.
    pub fn tagged(&self) -> Vec<(&str, ResourceKind, &Tags)> {
        fn rows<'a, T: Resource + 'a>(
            store: &'a ResourceStore,
        ) -> impl Iterator<Item = (&'a str, ResourceKind, &'a Tags)> {
            store
                .values::<T>()
                .into_iter()
                .map(|e| (e.id(), T::KIND, e.tag_set()))
        }

        let mut out: Vec<(&str, ResourceKind, &Tags)> = Vec::new();
        out.extend(rows::<Vpc>(self));
        out.extend(rows::<Subnet>(self));
        out.extend(rows::<SubnetCidrReservation>(self));
        out.extend(rows::<RouteTable>(self));
        out.extend(rows::<NetworkAcl>(self));
        out.extend(rows::<SecurityGroup>(self));
        for group in self.values::<SecurityGroup>() {
            out.extend(
                group
                    .all_rules()
                    .map(|r| (r.id.as_str(), ResourceKind::SecurityGroupRule, &r.tags)),
            );
        }
        out.extend(rows::<Instance>(self));
        out.extend(rows::<NetworkInterface>(self));
        out.extend(rows::<InternetGateway>(self));
        out.extend(rows::<NatGateway>(self));
        out.extend(rows::<VpcEndpoint>(self));
        out.into_iter().filter(|(_, _, tags)| !tags.is_empty()).collect()
    }

    // Queries

    pub fn subnets_in(&self, vpc_id: &str) -> Vec<&Subnet> {
        self.subnets
            .values()
            .into_iter()
            .filter(|s| s.vpc_id == vpc_id)
            .collect()
    }

    pub fn route_tables_in(&self, vpc_id: &str) -> Vec<&RouteTable> {
        self.route_tables
            .values()
            .into_iter()
            .filter(|t| t.vpc_id == vpc_id)
            .collect()
    }

    pub fn network_acls_in(&self, vpc_id: &str) -> Vec<&NetworkAcl> {
        self.network_acls
            .values()
            .into_iter()
            .filter(|a| a.vpc_id == vpc_id)
            .collect()
    }

    pub fn security_groups_in(&self, vpc_id: &str) -> Vec<&SecurityGroup> {
        self.security_groups
            .values()
            .into_iter()
            .filter(|g| g.vpc_id.as_deref() == Some(vpc_id))
            .collect()
    }

    pub fn main_route_table(&self, vpc_id: &str) -> Option<&RouteTable> {
        self.route_tables_in(vpc_id).into_iter().find(|t| t.is_main())
    }

    pub fn default_network_acl(&self, vpc_id: &str) -> Option<&NetworkAcl> {
        self.network_acls_in(vpc_id)
            .into_iter()
            .find(|a| a.is_default)
    }

    pub fn default_security_group(&self, vpc_id: &str) -> Option<&SecurityGroup> {
        self.security_groups_in(vpc_id)
            .into_iter()
            .find(|g| g.is_default())
    }

    /// ACL currently associated with a subnet.
    pub fn network_acl_for_subnet(&self, subnet_id: &str) -> Option<&NetworkAcl> {
        self.network_acls
            .values()
            .into_iter()
            .find(|a| a.association_for_subnet(subnet_id).is_some())
    }

    /// Table explicitly associated with a subnet, gateway or pool.
    pub fn route_table_for_target(&self, target_id: &str) -> Option<&RouteTable> {
        self.route_tables.values().into_iter().find(|t| {
            t.associations
                .iter()
                .any(|a| a.target() == Some(target_id))
        })
    }

    /// Route table holding an association id.
    pub fn route_table_by_association(&self, association_id: &str) -> Option<&RouteTable> {
        self.route_tables
            .values()
            .into_iter()
            .find(|t| t.association(association_id).is_some())
    }

    pub fn reservations_for(&self, subnet_id: &str) -> Vec<&SubnetCidrReservation> {
        self.cidr_reservations
            .values()
            .into_iter()
            .filter(|r| r.subnet_id == subnet_id)
            .collect()
    }

    pub fn find_rule(&self, rule_id: &str) -> Option<&SecurityGroupRule> {
        self.security_groups
            .values_unordered()
            .find_map(|g| g.rule(rule_id))
    }

    /// Security group by name within a VPC (or outside any VPC when `vpc_id`
    /// is None), compared case-insensitively.
    pub fn security_group_by_name(
        &self,
        vpc_id: Option<&str>,
        name: &str,
    ) -> Option<&SecurityGroup> {
        self.security_groups.values().into_iter().find(|g| {
            g.vpc_id.as_deref() == vpc_id && g.group_name.eq_ignore_ascii_case(name)
        })
    }
}
