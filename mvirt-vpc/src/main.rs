use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use mvirt_vpc::{Ec2Error, Ec2Network, EmulatorConfig, Params};

#[derive(Parser)]
#[command(name = "mvirt-vpc")]
#[command(about = "mvirt VPC emulator - in-memory virtual networking control plane")]
struct Args {
    /// Read requests from this file instead of stdin (one JSON object per line)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Account id reported as the owner of every resource
    #[arg(long)]
    account_id: Option<String>,

    /// Region used for ARNs and availability zones
    #[arg(long)]
    region: Option<String>,

    /// Start with a default VPC and one default subnet per zone
    #[arg(long)]
    default_vpc: bool,
}

fn main() -> Result<()> {
    // Logs go to stderr, responses to stdout
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("mvirt_vpc=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EmulatorConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EmulatorConfig::default(),
    };
    if let Some(account_id) = args.account_id {
        config.account_id = account_id;
    }
    if let Some(region) = args.region {
        config.region = region;
    }
    if args.default_vpc {
        config.create_default_vpc = true;
    }

    info!(
        account_id = %config.account_id,
        region = %config.region,
        default_vpc = config.create_default_vpc,
        "Starting mvirt-vpc"
    );
    let mut network = Ec2Network::new(config).context("Failed to initialize emulator")?;

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut handled = 0usize;
    for line in reader.lines() {
        let line = line.context("Failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match parse_request(&line) {
            Ok((action, params)) => network.handle(&action, &params),
            Err(e) => {
                warn!(code = e.code(), "Rejected request line: {}", e);
                serde_json::to_value(e.to_response(&Uuid::new_v4().to_string()))?
            }
        };
        writeln!(out, "{}", response).context("Failed to write response")?;
        handled += 1;
    }
    out.flush()?;

    info!(requests = handled, "Input exhausted, exiting");
    Ok(())
}

/// `{"Action": "...", ...params}` into the action name and its parameters.
fn parse_request(line: &str) -> std::result::Result<(String, Params), Ec2Error> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| Ec2Error::invalid("MalformedQueryString", e.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(Ec2Error::invalid(
            "MalformedQueryString",
            "Each request must be a JSON object",
        ));
    };
    let action = match object.remove("Action") {
        Some(Value::String(action)) => action,
        _ => return Err(Ec2Error::MissingParameter("Action".to_string())),
    };
    Ok((action, Params::from_json(&object)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let (action, params) =
            parse_request(r#"{"Action": "CreateVpc", "CidrBlock": "10.0.0.0/16"}"#).unwrap();
        assert_eq!(action, "CreateVpc");
        assert_eq!(params.get("CidrBlock"), Some("10.0.0.0/16"));
        assert!(!params.contains("Action"));
    }

    #[test]
    fn test_parse_request_errors() {
        match parse_request("not json") {
            Err(e) => assert_eq!(e.code(), "MalformedQueryString"),
            other => panic!("Unexpected response: {:?}", other),
        }
        match parse_request(r#"{"CidrBlock": "10.0.0.0/16"}"#) {
            Err(Ec2Error::MissingParameter(name)) => assert_eq!(name, "Action"),
            other => panic!("Unexpected response: {:?}", other),
        }
    }
}
