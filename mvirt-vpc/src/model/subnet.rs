use ipnet::{IpNet, Ipv4Net};
use serde::Serialize;

use super::tags::Tags;
use super::{Ipv6CidrBlockAssociation, ResourceState};
use crate::error::{Ec2Error, Result};
use crate::filter::{Filterable, UnknownFilter, maybe, one};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    #[serde(rename = "subnetId")]
    pub id: String,
    pub vpc_id: String,
    /// None for IPv6-only subnets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<Ipv4Net>,
    pub availability_zone: String,
    pub availability_zone_id: String,
    pub available_ip_address_count: u64,
    pub default_for_az: bool,
    pub map_public_ip_on_launch: bool,
    pub assign_ipv6_address_on_creation: bool,
    pub ipv6_cidr_block_association_set: Vec<Ipv6CidrBlockAssociation>,
    pub ipv6_native: bool,
    pub enable_dns64: bool,
    pub state: ResourceState,
    pub owner_id: String,
    pub subnet_arn: String,
    #[serde(rename = "tagSet")]
    pub tags: Tags,
}

impl Subnet {
    pub fn active_ipv6(&self) -> Option<&Ipv6CidrBlockAssociation> {
        self.ipv6_cidr_block_association_set
            .iter()
            .find(|a| a.is_active())
    }
}

impl Filterable for Subnet {
    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn filter_values(&self, name: &str) -> Option<Vec<String>> {
        let v6 = &self.ipv6_cidr_block_association_set;
        match name {
            "subnet-id" => one(&self.id),
            "vpc-id" => one(&self.vpc_id),
            "cidr-block" | "cidr" | "cidrBlock" => maybe(self.cidr_block),
            "availability-zone" | "availabilityZone" => one(&self.availability_zone),
            "availability-zone-id" => one(&self.availability_zone_id),
            "available-ip-address-count" => one(self.available_ip_address_count),
            "default-for-az" | "defaultForAz" => one(self.default_for_az),
            "map-public-ip-on-launch" => one(self.map_public_ip_on_launch),
            "ipv6-cidr-block-association.ipv6-cidr-block" => {
                Some(v6.iter().map(|a| a.ipv6_cidr_block.to_string()).collect())
            }
            "ipv6-cidr-block-association.association-id" => {
                Some(v6.iter().map(|a| a.association_id.clone()).collect())
            }
            "ipv6-cidr-block-association.state" => Some(
                v6.iter()
                    .map(|a| a.ipv6_cidr_block_state.state.as_str().to_string())
                    .collect(),
            ),
            "ipv6-native" => one(self.ipv6_native),
            "owner-id" => one(&self.owner_id),
            "state" => one(self.state.as_str()),
            "subnet-arn" => one(&self.subnet_arn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationType {
    Prefix,
    Explicit,
}

impl ReservationType {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "prefix" => Ok(ReservationType::Prefix),
            "explicit" => Ok(ReservationType::Explicit),
            other => Err(Ec2Error::invalid_value(format!(
                "Invalid value '{}' for reservationType. Valid values: prefix, explicit",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationType::Prefix => "prefix",
            ReservationType::Explicit => "explicit",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetCidrReservation {
    #[serde(rename = "subnetCidrReservationId")]
    pub id: String,
    pub subnet_id: String,
    pub cidr: IpNet,
    pub reservation_type: ReservationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner_id: String,
    #[serde(rename = "tagSet")]
    pub tags: Tags,
}

impl SubnetCidrReservation {
    pub fn is_ipv6(&self) -> bool {
        matches!(self.cidr, IpNet::V6(_))
    }
}

impl Filterable for SubnetCidrReservation {
    const UNKNOWN_FILTER: UnknownFilter = UnknownFilter::Ignore;

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn filter_values(&self, name: &str) -> Option<Vec<String>> {
        match name {
            "reservation-id" => one(&self.id),
            "reservation-type" => one(self.reservation_type.as_str()),
            "subnet-id" => one(&self.subnet_id),
            "owner-id" => one(&self.owner_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, matches};

    fn reservation(cidr: &str) -> SubnetCidrReservation {
        SubnetCidrReservation {
            id: "scr-1".to_string(),
            subnet_id: "subnet-1".to_string(),
            cidr: cidr.parse().unwrap(),
            reservation_type: ReservationType::Prefix,
            description: None,
            owner_id: "000000000000".to_string(),
            tags: Tags::new(),
        }
    }

    #[test]
    fn test_reservation_family() {
        assert!(!reservation("10.0.1.0/28").is_ipv6());
        assert!(reservation("2600:1f18::/80").is_ipv6());
    }

    #[test]
    fn test_reservation_ignores_unknown_filters() {
        let r = reservation("10.0.1.0/28");
        assert!(matches(&r, &Filter::new("bogus", vec!["x".to_string()])));
        assert!(matches(
            &r,
            &Filter::new("reservation-type", vec!["prefix".to_string()])
        ));
        assert!(!matches(
            &r,
            &Filter::new("reservation-type", vec!["explicit".to_string()])
        ));
    }

    #[test]
    fn test_reservation_type_parse() {
        assert_eq!(
            ReservationType::parse("explicit").unwrap(),
            ReservationType::Explicit
        );
        assert!(ReservationType::parse("other").is_err());
    }

    #[test]
    fn test_reservation_wire() {
        let json = serde_json::to_value(reservation("10.0.1.0/28")).unwrap();
        assert_eq!(json["subnetCidrReservationId"], "scr-1");
        assert_eq!(json["cidr"], "10.0.1.0/28");
        assert_eq!(json["reservationType"], "prefix");
    }
}
