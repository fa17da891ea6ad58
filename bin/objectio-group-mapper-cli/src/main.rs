//! ObjectIO Group Mapper CLI - offline placement trial runner
//!
//! Loads a TOML snapshot of a PDisk inventory and a group geometry, runs a
//! single `AllocateGroup` call against it, and prints the resulting layout
//! or the diagnostic error string. Useful for reproducing a placement
//! decision observed in a cluster without standing up the cluster itself.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use objectio_placement::{GroupGeometry, GroupMapper, Location, PDiskId, PDiskRecord};

#[derive(Parser, Debug)]
#[command(name = "objectio-group-mapper-cli")]
#[command(about = "Trial-run group placement against a PDisk inventory snapshot")]
#[command(version)]
struct Args {
    /// TOML inventory snapshot (geometry + pdisks)
    #[arg(short, long)]
    config: PathBuf,

    /// Group id to allocate under
    #[arg(long, default_value_t = 1)]
    group_id: u32,

    /// Minimum free space (bytes) a disk must report to be eligible
    #[arg(long, default_value_t = 0)]
    required_space: i64,

    /// Only place onto disks marked operational
    #[arg(long)]
    require_operational: bool,

    /// PDiskIds to exclude, as "node:disk" (repeatable)
    #[arg(long = "forbid", value_name = "NODE:DISK")]
    forbidden: Vec<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct Inventory {
    geometry: GeometryConfig,
    #[serde(default)]
    pdisk: Vec<PDiskConfig>,
}

#[derive(Debug, Deserialize)]
struct GeometryConfig {
    num_fail_realms: u32,
    num_fail_domains_per_realm: u32,
    num_vdisks_per_domain: u32,
}

#[derive(Debug, Deserialize)]
struct PDiskConfig {
    node_id: u32,
    #[serde(default)]
    disk_id: u32,
    realm_group: String,
    realm: String,
    domain: String,
    #[serde(default = "default_true")]
    usable: bool,
    #[serde(default)]
    decommitted: bool,
    #[serde(default = "default_true")]
    operational: bool,
    #[serde(default)]
    num_slots: u32,
    max_slots: u32,
    space_available: i64,
    #[serde(default)]
    groups: Vec<u32>,
}

const fn default_true() -> bool {
    true
}

fn parse_pdisk_id(s: &str) -> Result<PDiskId> {
    let (node, disk) = s.split_once(':').with_context(|| format!("expected \"node:disk\", got {s:?}"))?;
    Ok(PDiskId::new(node.parse()?, disk.parse()?))
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_str = std::fs::read_to_string(&args.config).with_context(|| format!("reading {}", args.config.display()))?;
    let inventory: Inventory = toml::from_str(&config_str).context("parsing inventory TOML")?;

    if inventory.pdisk.is_empty() {
        bail!("inventory at {} declares no [[pdisk]] entries", args.config.display());
    }

    let geometry = GroupGeometry::new(
        inventory.geometry.num_fail_realms,
        inventory.geometry.num_fail_domains_per_realm,
        inventory.geometry.num_vdisks_per_domain,
    );
    info!(
        realms = geometry.num_fail_realms,
        domains_per_realm = geometry.num_fail_domains_per_realm,
        vdisks_per_domain = geometry.num_vdisks_per_domain,
        "loaded geometry"
    );

    let mut mapper = GroupMapper::new(geometry);
    for disk in inventory.pdisk {
        let pdisk_id = PDiskId::new(disk.node_id, disk.disk_id);
        let record = PDiskRecord {
            pdisk_id,
            location: Location { realm_group: disk.realm_group, realm: disk.realm, domain: disk.domain },
            usable: disk.usable,
            decommitted: disk.decommitted,
            operational: disk.operational,
            num_slots: disk.num_slots,
            max_slots: disk.max_slots,
            space_available: disk.space_available,
            groups: disk.groups,
        };
        if !mapper.register_pdisk(record) {
            bail!("duplicate pdisk id {pdisk_id} in inventory");
        }
    }
    info!("registered pdisks");

    let forbidden: HashSet<PDiskId> = args.forbidden.iter().map(|s| parse_pdisk_id(s)).collect::<Result<_>>()?;

    let mut group = Vec::new();
    match mapper.allocate_group(args.group_id, &mut group, &HashMap::new(), &forbidden, args.required_space, args.require_operational) {
        Ok(()) => {
            println!("group {} allocated:", args.group_id);
            for (realm_idx, realm) in group.iter().enumerate() {
                for (domain_idx, domain) in realm.iter().enumerate() {
                    for (vdisk_idx, occupant) in domain.iter().enumerate() {
                        let pdisk_id = occupant.expect("allocate_group fills every slot on success");
                        println!("  realm {realm_idx} domain {domain_idx} vdisk {vdisk_idx} -> {pdisk_id}");
                    }
                }
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("allocation failed: {err}");
            Err(err.into())
        }
    }
}
