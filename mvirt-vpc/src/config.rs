use serde::Deserialize;
use std::path::Path;

/// Emulator configuration.
///
/// Every field has a default so a partial JSON file is enough.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Account id reported as `ownerId`.
    pub account_id: String,
    pub region: String,
    /// Availability zones subnets may be placed in. Empty means
    /// `<region>a`, `<region>b`, `<region>c`.
    pub availability_zones: Vec<String>,
    /// Number of ClientToken responses kept for replay.
    pub idempotency_cache_size: usize,
    /// Create the default VPC and its default subnets at startup.
    pub create_default_vpc: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            account_id: "000000000000".to_string(),
            region: "us-east-1".to_string(),
            availability_zones: Vec::new(),
            idempotency_cache_size: 1000,
            create_default_vpc: false,
        }
    }
}

impl EmulatorConfig {
    /// Load a JSON config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Configured zones, or the three conventional zones of the region.
    pub fn zones(&self) -> Vec<String> {
        if self.availability_zones.is_empty() {
            ["a", "b", "c"]
                .iter()
                .map(|s| format!("{}{}", self.region, s))
                .collect()
        } else {
            self.availability_zones.clone()
        }
    }

    /// Zone id for a zone name (`us-east-1b` -> `use1-az2`).
    pub fn zone_id(&self, zone: &str) -> String {
        let index = self.zones().iter().position(|z| z == zone).unwrap_or(0) + 1;
        let mut parts = self.region.split('-');
        let mut short = parts.next().unwrap_or_default().to_string();
        for part in parts {
            match part {
                "northeast" => short.push_str("ne"),
                "southeast" => short.push_str("se"),
                "northwest" => short.push_str("nw"),
                "southwest" => short.push_str("sw"),
                p if p.chars().all(|c| c.is_ascii_digit()) => short.push_str(p),
                p => short.extend(p.chars().next()),
            }
        }
        format!("{}-az{}", short, index)
    }
}
