/*
 * SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::Arc;

use forge_network::ip::IpRange;
use ipnet::{IpNet, Ipv6Net};
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};

use crate::allocator::AllocatorKind;
use crate::cfg_hosts::CfgHosts;
use crate::host::Host;
use crate::lease::{ClientId, Duid, LeaseType, SubnetId};
use crate::subnet::{Pool, ReservationMode, Subnet, Timers};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    #[serde(default)]
    pub allocator: AllocatorKind,
    /// Upper bound on candidates tried per allocation. 0 means the capacity
    /// of the subnet's pools.
    #[serde(default)]
    pub attempts: u64,
    #[serde(default)]
    pub allow_new_leases_in_renewals: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allocator: AllocatorKind::default(),
            attempts: 0,
            allow_new_leases_in_renewals: false,
        }
    }
}

pub struct Defaults;

impl Defaults {
    pub fn t1() -> u32 {
        Timers::default().t1
    }
    pub fn t2() -> u32 {
        Timers::default().t2
    }
    pub fn preferred() -> u32 {
        Timers::default().preferred
    }
    pub fn valid() -> u32 {
        Timers::default().valid
    }
    pub fn lease_type6() -> LeaseType {
        LeaseType::Na
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file: {path}: {error}")]
    CouldNotRead { path: String, error: std::io::Error },
    #[error("Invalid TOML in config file: {path}: {error}")]
    InvalidToml {
        path: String,
        error: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A scripted run of the engine: the topology it serves and the client
/// exchanges to feed it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimulationConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default, rename = "subnet")]
    pub subnets: Vec<SubnetConfig>,
    #[serde(default, rename = "host")]
    pub hosts: Vec<Host>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubnetConfig {
    pub id: SubnetId,
    pub prefix: IpNet,
    #[serde(default = "Defaults::t1")]
    pub t1: u32,
    #[serde(default = "Defaults::t2")]
    pub t2: u32,
    #[serde(default = "Defaults::preferred")]
    pub preferred: u32,
    #[serde(default = "Defaults::valid")]
    pub valid: u32,
    #[serde(default)]
    pub reservation_mode: ReservationMode,
    #[serde(default, rename = "pool")]
    pub pools: Vec<PoolConfig>,
}

/// Either an address `range` or, for prefix delegation, a `prefix` split
/// into `delegated_len` long prefixes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    #[serde(default)]
    pub lease_type: Option<LeaseType>,
    #[serde(default)]
    pub range: Option<IpRange>,
    #[serde(default)]
    pub prefix: Option<Ipv6Net>,
    #[serde(default)]
    pub delegated_len: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Step {
    Discover(Client4Step),
    Request(Client4Step),
    Solicit(Client6Step),
    Request6(Client6Step),
    Renew6(Client6Step),
    Rebind6(Client6Step),
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Discover(_) => "discover",
            Step::Request(_) => "request",
            Step::Solicit(_) => "solicit",
            Step::Request6(_) => "request6",
            Step::Renew6(_) => "renew6",
            Step::Rebind6(_) => "rebind6",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Client4Step {
    pub subnet_id: SubnetId,
    pub hwaddr: MacAddress,
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub requested_address: Option<Ipv4Addr>,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub fwd_dns_update: bool,
    #[serde(default)]
    pub rev_dns_update: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Client6Step {
    pub subnet_id: SubnetId,
    pub duid: Duid,
    pub iaid: u32,
    #[serde(default = "Defaults::lease_type6")]
    pub lease_type: LeaseType,
    #[serde(default)]
    pub hwaddr: Option<MacAddress>,
    #[serde(default)]
    pub hint: Option<Ipv6Addr>,
    #[serde(default)]
    pub hint_len: Option<u8>,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub fwd_dns_update: bool,
    #[serde(default)]
    pub rev_dns_update: bool,
    #[serde(default)]
    pub transaction_id: u32,
}

/// Subnets and reservations built from a [`SimulationConfig`].
#[derive(Debug)]
pub struct Topology {
    pub subnets: BTreeMap<SubnetId, Arc<Subnet>>,
    pub hosts: CfgHosts,
}

impl PoolConfig {
    fn build(&self, subnet: &SubnetConfig) -> Result<Pool, ConfigError> {
        let v6 = matches!(subnet.prefix, IpNet::V6(_));
        let lease_type = match (self.lease_type, self.prefix, v6) {
            (Some(lease_type), _, _) => lease_type,
            (None, Some(_), _) => LeaseType::Pd,
            (None, None, true) => LeaseType::Na,
            (None, None, false) => LeaseType::V4,
        };
        let invalid = |reason: String| {
            ConfigError::Invalid(format!("subnet {}: {reason}", subnet.id))
        };

        if lease_type == LeaseType::Pd {
            let (Some(prefix), Some(delegated_len)) = (self.prefix, self.delegated_len) else {
                return Err(invalid(
                    "prefix pools need both prefix and delegated_len".to_string(),
                ));
            };
            return Pool::new_pd(prefix, delegated_len).map_err(|e| invalid(e.to_string()));
        }
        let Some(range) = self.range else {
            return Err(invalid(format!("{lease_type} pool is missing its range")));
        };
        Pool::new(lease_type, range).map_err(|e| invalid(e.to_string()))
    }
}

impl SimulationConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let cfg = std::fs::read_to_string(path).map_err(|error| ConfigError::CouldNotRead {
            path: path.to_string_lossy().to_string(),
            error,
        })?;
        toml::from_str::<Self>(&cfg).map_err(|error| ConfigError::InvalidToml {
            path: path.to_string_lossy().to_string(),
            error,
        })
    }

    pub fn topology(&self) -> Result<Topology, ConfigError> {
        let mut subnets = BTreeMap::new();
        for cfg in &self.subnets {
            let timers = Timers {
                t1: cfg.t1,
                t2: cfg.t2,
                preferred: cfg.preferred,
                valid: cfg.valid,
            };
            let mut subnet = Subnet::new(cfg.id, cfg.prefix)
                .with_timers(timers)
                .with_reservation_mode(cfg.reservation_mode);
            for pool in &cfg.pools {
                subnet
                    .add_pool(pool.build(cfg)?)
                    .map_err(|e| ConfigError::Invalid(format!("subnet {}: {e}", cfg.id)))?;
            }
            if subnets.insert(cfg.id, Arc::new(subnet)).is_some() {
                return Err(ConfigError::Invalid(format!("duplicate subnet id {}", cfg.id)));
            }
        }

        let mut hosts = CfgHosts::new();
        for host in &self.hosts {
            hosts
                .add(host.clone())
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        Ok(Topology { subnets, hosts })
    }
}
