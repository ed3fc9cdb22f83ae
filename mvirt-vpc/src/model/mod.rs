//! Entity records and their wire serialization.
//!
//! Fields are snake_case internally; serde renames apply the provider's
//! names at the boundary. Route tables use PascalCase on the wire, the other
//! resource families camelCase.

pub mod attachments;
pub mod network_acl;
pub mod route_table;
pub mod security_group;
pub mod subnet;
pub mod tags;
pub mod vpc;

use ipnet::Ipv6Net;
use serde::{Serialize, Serializer};

use crate::error::{Ec2Error, Result};

pub use attachments::{Instance, InternetGateway, NatGateway, NetworkInterface, VpcEndpoint};
pub use network_acl::{NetworkAcl, NetworkAclAssociation, NetworkAclEntry, RuleAction};
pub use route_table::{Route, RouteDestination, RouteTable, RouteTableAssociation, RouteTarget};
pub use security_group::{RuleSource, SecurityGroup, SecurityGroupRule};
pub use subnet::{ReservationType, Subnet, SubnetCidrReservation};
pub use tags::{Tag, Tags};
pub use vpc::{CidrBlockAssociation, Vpc};

/// CIDR / route-table association state machine.
///
/// Transitions resolve synchronously: `associating -> associated` and
/// `disassociating -> disassociated` happen inside the initiating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationState {
    Associating,
    Associated,
    Disassociating,
    Disassociated,
    Failing,
    Failed,
}

impl AssociationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationState::Associating => "associating",
            AssociationState::Associated => "associated",
            AssociationState::Disassociating => "disassociating",
            AssociationState::Disassociated => "disassociated",
            AssociationState::Failing => "failing",
            AssociationState::Failed => "failed",
        }
    }

    /// Terminal state reached by a successful transition from `self`.
    pub fn settle(self) -> Self {
        match self {
            AssociationState::Associating => AssociationState::Associated,
            AssociationState::Disassociating => AssociationState::Disassociated,
            AssociationState::Failing => AssociationState::Failed,
            other => other,
        }
    }
}

/// `{"state": ...}` as used by CIDR block associations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockState {
    pub state: AssociationState,
}

impl BlockState {
    pub fn associated() -> Self {
        Self {
            state: AssociationState::Associated,
        }
    }
}

/// Lifecycle state of VPCs and subnets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    Pending,
    Available,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Pending => "pending",
            ResourceState::Available => "available",
        }
    }
}

/// IPv6 CIDR association, shared by VPCs and subnets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ipv6CidrBlockAssociation {
    pub association_id: String,
    pub ipv6_cidr_block: Ipv6Net,
    pub ipv6_cidr_block_state: BlockState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_border_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_pool: Option<String>,
}

impl Ipv6CidrBlockAssociation {
    pub fn is_active(&self) -> bool {
        self.ipv6_cidr_block_state.state == AssociationState::Associated
    }
}

/// IP protocol of an ACL entry or security group rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// `-1`: all protocols.
    All,
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    Number(u8),
}

impl Protocol {
    /// Accepts names (`tcp`) and numbers (`6`); `-1` and `all` mean any.
    pub fn parse(value: &str) -> Result<Self> {
        let lower = value.trim().to_ascii_lowercase();
        let protocol = match lower.as_str() {
            "-1" | "all" => Protocol::All,
            "tcp" | "6" => Protocol::Tcp,
            "udp" | "17" => Protocol::Udp,
            "icmp" | "1" => Protocol::Icmp,
            "icmpv6" | "58" => Protocol::Icmpv6,
            other => other.parse::<u8>().map(Protocol::Number).map_err(|_| {
                Ec2Error::invalid_value(format!(
                    "Invalid value '{}' for IP protocol. Unknown protocol.",
                    value
                ))
            })?,
        };
        Ok(protocol)
    }

    /// Name form used by security groups.
    pub fn name(&self) -> String {
        match self {
            Protocol::All => "-1".to_string(),
            Protocol::Tcp => "tcp".to_string(),
            Protocol::Udp => "udp".to_string(),
            Protocol::Icmp => "icmp".to_string(),
            Protocol::Icmpv6 => "icmpv6".to_string(),
            Protocol::Number(n) => n.to_string(),
        }
    }

    /// Number form used by network ACL entries.
    pub fn number(&self) -> String {
        match self {
            Protocol::All => "-1".to_string(),
            Protocol::Tcp => "6".to_string(),
            Protocol::Udp => "17".to_string(),
            Protocol::Icmp => "1".to_string(),
            Protocol::Icmpv6 => "58".to_string(),
            Protocol::Number(n) => n.to_string(),
        }
    }

    pub fn has_ports(&self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

/// Serialize a protocol in number form.
pub fn serialize_protocol_number<S: Serializer>(
    protocol: &Protocol,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&protocol.number())
}

/// `arn:aws:ec2:<region>:<account>:<type>/<id>`.
pub fn arn(region: &str, owner_id: &str, resource_type: &str, id: &str) -> String {
    format!("arn:aws:ec2:{}:{}:{}/{}", region, owner_id, resource_type, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!(Protocol::parse("tcp").unwrap(), Protocol::Tcp);
        assert_eq!(Protocol::parse("6").unwrap(), Protocol::Tcp);
        assert_eq!(Protocol::parse("-1").unwrap(), Protocol::All);
        assert_eq!(Protocol::parse("ICMPv6").unwrap(), Protocol::Icmpv6);
        assert_eq!(Protocol::parse("47").unwrap(), Protocol::Number(47));
        assert!(Protocol::parse("bogus").is_err());
        assert!(Protocol::parse("300").is_err());
    }

    #[test]
    fn test_protocol_forms() {
        assert_eq!(Protocol::Udp.name(), "udp");
        assert_eq!(Protocol::Udp.number(), "17");
        assert_eq!(Protocol::All.number(), "-1");
    }

    #[test]
    fn test_association_state_settles() {
        assert_eq!(
            AssociationState::Associating.settle(),
            AssociationState::Associated
        );
        assert_eq!(
            AssociationState::Disassociating.settle(),
            AssociationState::Disassociated
        );
        assert_eq!(
            AssociationState::Associated.settle(),
            AssociationState::Associated
        );
    }
}
