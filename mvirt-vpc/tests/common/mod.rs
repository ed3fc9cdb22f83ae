//! Shared test utilities for mvirt-vpc integration tests.

#![allow(dead_code)]

use mvirt_vpc::{Ec2Network, EmulatorConfig, Params, SequentialCollaborators, VpcAuditLogger};
use serde_json::Value;
use std::sync::Arc;

/// Emulator with deterministic ids and auditing switched off.
pub fn network() -> Ec2Network {
    network_with(EmulatorConfig::default())
}

pub fn network_with(config: EmulatorConfig) -> Ec2Network {
    Ec2Network::with_collaborators(config, Arc::new(SequentialCollaborators::new("123456789012")))
        .expect("Failed to create emulator")
        .with_audit(VpcAuditLogger::new_noop())
}

pub fn params(pairs: &[(&str, &str)]) -> Params {
    pairs.iter().map(|(k, v)| (*k, *v)).collect()
}

/// Run an action that must succeed.
pub fn call(net: &mut Ec2Network, action: &str, pairs: &[(&str, &str)]) -> Value {
    match net.dispatch(action, &params(pairs)) {
        Ok(response) => response,
        Err(e) => panic!("{} failed: {} ({})", action, e, e.code()),
    }
}

/// Run an action that must fail and return its error code.
pub fn error_code(net: &mut Ec2Network, action: &str, pairs: &[(&str, &str)]) -> String {
    match net.dispatch(action, &params(pairs)) {
        Err(e) => e.code().to_string(),
        Ok(response) => panic!("Unexpected response: {:?}", response),
    }
}

pub fn create_vpc(net: &mut Ec2Network, cidr: &str) -> String {
    let response = call(net, "CreateVpc", &[("CidrBlock", cidr)]);
    response["vpc"]["vpcId"].as_str().expect("vpcId").to_string()
}

pub fn create_subnet(net: &mut Ec2Network, vpc_id: &str, cidr: &str) -> String {
    let response = call(net, "CreateSubnet", &[("VpcId", vpc_id), ("CidrBlock", cidr)]);
    response["subnet"]["subnetId"]
        .as_str()
        .expect("subnetId")
        .to_string()
}
