//! Input validation shared by the handlers.

use ipnet::{Ipv4Net, Ipv6Net};
use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use crate::error::{Ec2Error, Result};
use crate::model::Protocol;

/// Smallest VPC / subnet prefix length.
pub const MIN_PREFIX: u8 = 16;
/// Largest VPC / subnet prefix length.
pub const MAX_PREFIX: u8 = 28;

static GROUP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9 ._\-]+$").expect("static regex"));

/// Check if two IPv4 subnets overlap.
pub fn ipv4_subnets_overlap(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network())
        || a.contains(&b.broadcast())
        || b.contains(&a.network())
        || b.contains(&a.broadcast())
}

/// Check if two IPv6 prefixes overlap.
pub fn ipv6_prefixes_overlap(a: &Ipv6Net, b: &Ipv6Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// Whether `inner` lies entirely inside `outer`.
pub fn ipv4_within(outer: &Ipv4Net, inner: &Ipv4Net) -> bool {
    outer.contains(inner)
}

/// Strict dotted-quad IPv4 CIDR: four octets <= 255 and a prefix <= 32.
pub fn parse_ipv4_cidr(cidr: &str) -> Result<Ipv4Net> {
    let invalid = || {
        Ec2Error::invalid_value(format!(
            "Value ({}) for parameter cidrBlock is invalid. This is not a valid CIDR block.",
            cidr
        ))
    };
    let (addr, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    let octets: Vec<&str> = addr.split('.').collect();
    if octets.len() != 4
        || octets
            .iter()
            .any(|o| o.is_empty() || o.len() > 3 || o.parse::<u8>().is_err())
    {
        return Err(invalid());
    }
    let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    Ipv4Net::new(addr, prefix).map_err(|_| invalid())
}

/// IPv4 CIDR whose address is the network address of the block.
pub fn parse_network_cidr(cidr: &str) -> Result<Ipv4Net> {
    let net = parse_ipv4_cidr(cidr)?;
    if net.addr() != net.network() {
        return Err(Ec2Error::invalid_value(format!("The CIDR '{}' is invalid.", cidr)));
    }
    Ok(net)
}

pub fn parse_ipv6_cidr(cidr: &str) -> Result<Ipv6Net> {
    cidr.parse::<Ipv6Net>().map_err(|_| {
        Ec2Error::invalid_value(format!(
            "Value ({}) for parameter ipv6CidrBlock is invalid. This is not a valid IPv6 CIDR block.",
            cidr
        ))
    })
}

/// Enforce the /16 - /28 size window for VPC and subnet blocks.
pub fn validate_block_size(net: &Ipv4Net, code: &'static str) -> Result<()> {
    if net.prefix_len() < MIN_PREFIX || net.prefix_len() > MAX_PREFIX {
        return Err(Ec2Error::invalid(code, format!("The CIDR '{}' is invalid.", net)));
    }
    Ok(())
}

/// Usable addresses in a subnet: the provider reserves five per block.
pub fn available_ip_count(net: &Ipv4Net) -> u64 {
    let size = 1u64 << (32 - u32::from(net.prefix_len()));
    size.saturating_sub(5)
}

/// Security group names: <= 255 chars of `[A-Za-z0-9 ._-]`, no `sg-` prefix.
pub fn validate_group_name(name: &str) -> Result<()> {
    if name.chars().count() > 255 {
        return Err(Ec2Error::invalid_value(
            "Group name must be 255 characters or fewer",
        ));
    }
    if !GROUP_NAME.is_match(name) {
        return Err(Ec2Error::invalid_value(format!(
            "Invalid security group name '{}': only a-z, A-Z, 0-9, spaces, and ._- are allowed",
            name
        )));
    }
    if name.to_ascii_lowercase().starts_with("sg-") {
        return Err(Ec2Error::invalid_value(
            "Group names may not be in the format sg-*",
        ));
    }
    Ok(())
}

/// Validate a rule's port range for its protocol.
///
/// TCP/UDP need both ports in 0-65535 with from <= to. ICMP/ICMPv6 take a
/// type/code pair in -1..=255. Other protocols ignore ports.
pub fn validate_port_range(
    protocol: &Protocol,
    from: Option<i32>,
    to: Option<i32>,
) -> Result<(Option<i32>, Option<i32>)> {
    match protocol {
        p if p.has_ports() => {
            let (Some(from), Some(to)) = (from, to) else {
                return Err(Ec2Error::invalid_value(format!(
                    "Invalid value for portRange. Must specify both from and to ports with {}.",
                    protocol.name()
                )));
            };
            for port in [from, to] {
                if !(0..=65535).contains(&port) {
                    return Err(Ec2Error::invalid_value(format!(
                        "Invalid {} port {} (must be 0-65535)",
                        protocol.name(),
                        port
                    )));
                }
            }
            if from > to {
                return Err(Ec2Error::invalid_value(format!(
                    "Invalid port range: fromPort ({}) must not be greater than toPort ({})",
                    from, to
                )));
            }
            Ok((Some(from), Some(to)))
        }
        Protocol::Icmp | Protocol::Icmpv6 => {
            let from = from.unwrap_or(-1);
            let to = to.unwrap_or(-1);
            for value in [from, to] {
                if !(-1..=255).contains(&value) {
                    return Err(Ec2Error::invalid_value(format!(
                        "Invalid ICMP type or code {} (must be -1-255)",
                        value
                    )));
                }
            }
            Ok((Some(from), Some(to)))
        }
        _ => Ok((None, None)),
    }
}
