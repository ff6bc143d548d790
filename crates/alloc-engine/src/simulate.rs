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

//! Drives the engines through a scripted list of client exchanges, using
//! in-memory lease and reservation stores.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{Client4Step, Client6Step, ConfigError, SimulationConfig, Step};
use crate::context::{ClientContext4Builder, IaResponse, Message6Type, Query6};
use crate::engine::{AddressFamily, AllocEngine};
use crate::errors::AllocError;
use crate::hooks::Hooks;
use crate::lease::{Lease4, Lease6, SubnetId};
use crate::lease_store::MemoryLeaseStore;
use crate::subnet::Subnet;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not build allocation engine: {0}")]
    Engine(#[from] AllocError),

    #[error("Step {step} refers to unknown subnet {subnet_id}")]
    UnknownSubnet { step: usize, subnet_id: SubnetId },

    #[error("Step {step} has an invalid client context: {reason}")]
    Context { step: usize, reason: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LeaseRecord {
    V4(Lease4),
    V6(Lease6),
}

/// Result of one step, printed as one JSON line by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub action: &'static str,
    pub leases: Vec<LeaseRecord>,
    pub old_leases: Vec<LeaseRecord>,
}

pub struct Simulation {
    subnets: BTreeMap<SubnetId, Arc<Subnet>>,
    lease_store: Arc<MemoryLeaseStore>,
    v4: AllocEngine,
    v6: AllocEngine,
}

impl Simulation {
    pub fn new(config: &SimulationConfig) -> Result<Self, SimulationError> {
        let topology = config.topology()?;
        let lease_store = Arc::new(MemoryLeaseStore::new());
        let hosts = Arc::new(topology.hosts);

        let v4 = AllocEngine::new(
            AddressFamily::Ipv4,
            &config.engine,
            lease_store.clone(),
            hosts.clone(),
            Hooks::new(),
        )?;
        let v6 = AllocEngine::new(
            AddressFamily::Ipv6,
            &config.engine,
            lease_store.clone(),
            hosts,
            Hooks::new(),
        )?;

        Ok(Self {
            subnets: topology.subnets,
            lease_store,
            v4,
            v6,
        })
    }

    pub fn lease_store(&self) -> &MemoryLeaseStore {
        &self.lease_store
    }

    pub fn run_step(&self, index: usize, step: &Step) -> Result<StepOutcome, SimulationError> {
        let (leases, old_leases) = match step {
            Step::Discover(client) => self.run4(index, client, true)?,
            Step::Request(client) => self.run4(index, client, false)?,
            Step::Solicit(client) => self.run6(index, client, Message6Type::Solicit)?,
            Step::Request6(client) => self.run6(index, client, Message6Type::Request)?,
            Step::Renew6(client) => self.run6(index, client, Message6Type::Renew)?,
            Step::Rebind6(client) => self.run6(index, client, Message6Type::Rebind)?,
        };
        Ok(StepOutcome {
            step: index,
            action: step.action(),
            leases,
            old_leases,
        })
    }

    fn subnet(&self, step: usize, subnet_id: SubnetId) -> Result<Arc<Subnet>, SimulationError> {
        self.subnets
            .get(&subnet_id)
            .cloned()
            .ok_or(SimulationError::UnknownSubnet { step, subnet_id })
    }

    fn run4(
        &self,
        index: usize,
        client: &Client4Step,
        fake_allocation: bool,
    ) -> Result<(Vec<LeaseRecord>, Vec<LeaseRecord>), SimulationError> {
        let subnet = self.subnet(index, client.subnet_id)?;
        let mut builder = ClientContext4Builder::default();
        builder
            .subnet(subnet)
            .hwaddr(client.hwaddr)
            .hostname(client.hostname.clone())
            .fwd_dns_update(client.fwd_dns_update)
            .rev_dns_update(client.rev_dns_update)
            .fake_allocation(fake_allocation);
        if let Some(client_id) = &client.client_id {
            builder.client_id(client_id.clone());
        }
        if let Some(requested) = client.requested_address {
            builder.requested_address(requested);
        }
        let mut ctx = builder.build().map_err(|e| SimulationError::Context {
            step: index,
            reason: e.to_string(),
        })?;

        let leases = self.v4.allocate_lease4(&mut ctx);
        Ok((
            leases.into_iter().map(LeaseRecord::V4).collect(),
            ctx.old_lease.into_iter().map(LeaseRecord::V4).collect(),
        ))
    }

    fn run6(
        &self,
        index: usize,
        client: &Client6Step,
        message_type: Message6Type,
    ) -> Result<(Vec<LeaseRecord>, Vec<LeaseRecord>), SimulationError> {
        let subnet = self.subnet(index, client.subnet_id)?;
        let timers = subnet.timers();
        let mut builder = self.v6.context6_builder();
        builder
            .subnet(subnet)
            .duid(client.duid.clone())
            .iaid(client.iaid)
            .lease_type(client.lease_type)
            .hostname(client.hostname.clone())
            .fwd_dns_update(client.fwd_dns_update)
            .rev_dns_update(client.rev_dns_update)
            .fake_allocation(message_type == Message6Type::Solicit)
            .query(Query6 {
                message_type,
                transaction_id: client.transaction_id,
            })
            .ia_rsp(IaResponse {
                iaid: client.iaid,
                lease_type: client.lease_type,
                t1: timers.t1,
                t2: timers.t2,
                status: None,
            });
        if let Some(hwaddr) = client.hwaddr {
            builder.hwaddr(hwaddr);
        }
        if let Some(hint) = client.hint {
            builder.hint((hint, client.hint_len.unwrap_or(128)));
        }
        let mut ctx = builder.build().map_err(|e| SimulationError::Context {
            step: index,
            reason: e.to_string(),
        })?;

        let leases = match message_type {
            Message6Type::Solicit | Message6Type::Request => self.v6.allocate_leases6(&mut ctx),
            Message6Type::Renew | Message6Type::Rebind => self.v6.renew_leases6(&mut ctx),
        };
        Ok((
            leases.into_iter().map(LeaseRecord::V6).collect(),
            ctx.old_leases.into_iter().map(LeaseRecord::V6).collect(),
        ))
    }
}

/// Run every step of `config` against a fresh lease store.
pub fn run(config: &SimulationConfig) -> Result<Vec<StepOutcome>, SimulationError> {
    let simulation = Simulation::new(config)?;
    config
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| simulation.run_step(index, step))
        .collect()
}
