use tracing::{Level, event};

/// Audit trail of networking lifecycle events.
///
/// Events go to the `audit` tracing target so subscribers can route them
/// separately from operational logs.
#[derive(Debug, Clone)]
pub struct VpcAuditLogger {
    enabled: bool,
}

impl Default for VpcAuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl VpcAuditLogger {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    pub fn new_noop() -> Self {
        Self { enabled: false }
    }

    fn log(&self, message: String, object_ids: &[&str]) {
        if !self.enabled {
            return;
        }
        event!(
            target: "audit",
            Level::INFO,
            objects = %object_ids.join(","),
            "{}",
            message
        );
    }

    // VPC events
    pub fn vpc_created(&self, vpc_id: &str, cidr: &str) {
        self.log(format!("VPC created: {} ({})", vpc_id, cidr), &[vpc_id]);
    }

    pub fn vpc_deleted(&self, vpc_id: &str) {
        self.log(format!("VPC deleted: {}", vpc_id), &[vpc_id]);
    }

    pub fn vpc_cidr_associated(&self, vpc_id: &str, association_id: &str, cidr: &str) {
        self.log(
            format!("VPC CIDR associated: {} -> {} ({})", cidr, vpc_id, association_id),
            &[vpc_id, association_id],
        );
    }

    pub fn vpc_cidr_disassociated(&self, vpc_id: &str, association_id: &str) {
        self.log(
            format!("VPC CIDR disassociated: {} from {}", association_id, vpc_id),
            &[vpc_id, association_id],
        );
    }

    pub fn vpc_attribute_modified(&self, vpc_id: &str, attribute: &str, value: bool) {
        self.log(
            format!("VPC attribute modified: {} {}={}", vpc_id, attribute, value),
            &[vpc_id],
        );
    }

    // Subnet events
    pub fn subnet_created(&self, subnet_id: &str, vpc_id: &str, cidr: &str) {
        self.log(
            format!("Subnet created: {} ({}) in {}", subnet_id, cidr, vpc_id),
            &[subnet_id, vpc_id],
        );
    }

    pub fn subnet_deleted(&self, subnet_id: &str) {
        self.log(format!("Subnet deleted: {}", subnet_id), &[subnet_id]);
    }

    pub fn cidr_reservation_created(&self, reservation_id: &str, subnet_id: &str, cidr: &str) {
        self.log(
            format!("CIDR reservation created: {} ({}) in {}", reservation_id, cidr, subnet_id),
            &[reservation_id, subnet_id],
        );
    }

    pub fn cidr_reservation_deleted(&self, reservation_id: &str) {
        self.log(
            format!("CIDR reservation deleted: {}", reservation_id),
            &[reservation_id],
        );
    }

    // Route table events
    pub fn route_table_created(&self, table_id: &str, vpc_id: &str) {
        self.log(
            format!("Route table created: {} in {}", table_id, vpc_id),
            &[table_id, vpc_id],
        );
    }

    pub fn route_table_deleted(&self, table_id: &str) {
        self.log(format!("Route table deleted: {}", table_id), &[table_id]);
    }

    pub fn route_changed(&self, table_id: &str, destination: &str, change: &str) {
        self.log(
            format!("Route {}: {} in {}", change, destination, table_id),
            &[table_id],
        );
    }

    pub fn route_table_associated(&self, table_id: &str, association_id: &str, target: &str) {
        self.log(
            format!("Route table associated: {} -> {} ({})", table_id, target, association_id),
            &[table_id, association_id],
        );
    }

    pub fn route_table_disassociated(&self, association_id: &str) {
        self.log(
            format!("Route table disassociated: {}", association_id),
            &[association_id],
        );
    }

    // Network ACL events
    pub fn network_acl_created(&self, acl_id: &str, vpc_id: &str) {
        self.log(
            format!("Network ACL created: {} in {}", acl_id, vpc_id),
            &[acl_id, vpc_id],
        );
    }

    pub fn network_acl_deleted(&self, acl_id: &str) {
        self.log(format!("Network ACL deleted: {}", acl_id), &[acl_id]);
    }

    pub fn network_acl_entry_changed(&self, acl_id: &str, rule_number: u32, egress: bool, change: &str) {
        let direction = if egress { "egress" } else { "ingress" };
        self.log(
            format!("Network ACL entry {}: {} rule {} ({})", change, acl_id, rule_number, direction),
            &[acl_id],
        );
    }

    pub fn network_acl_associated(&self, acl_id: &str, subnet_id: &str, association_id: &str) {
        self.log(
            format!("Network ACL associated: {} -> {} ({})", acl_id, subnet_id, association_id),
            &[acl_id, subnet_id],
        );
    }

    // Security group events
    pub fn security_group_created(&self, group_id: &str, group_name: &str) {
        self.log(
            format!("Security group created: {} ({})", group_name, group_id),
            &[group_id],
        );
    }

    pub fn security_group_deleted(&self, group_id: &str) {
        self.log(format!("Security group deleted: {}", group_id), &[group_id]);
    }

    pub fn rules_authorized(&self, group_id: &str, count: usize, egress: bool) {
        let direction = if egress { "egress" } else { "ingress" };
        self.log(
            format!("Security group rules authorized: {} {} rule(s) on {}", count, direction, group_id),
            &[group_id],
        );
    }

    pub fn rules_revoked(&self, group_id: &str, count: usize, egress: bool) {
        let direction = if egress { "egress" } else { "ingress" };
        self.log(
            format!("Security group rules revoked: {} {} rule(s) on {}", count, direction, group_id),
            &[group_id],
        );
    }
}
