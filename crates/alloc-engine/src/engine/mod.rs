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

//! The allocation engine: decides which address or prefix a client gets.
//!
//! The engine holds no locks of its own. Candidates are proposed by the
//! allocator and claimed by adding them to the shared lease store; a failed
//! add means another engine claimed the candidate first and the next one is
//! tried, up to the capacity of the subnet's pools.

mod v4;
mod v6;

use std::collections::HashMap;
use std::sync::Arc;

use crate::allocator::Allocator;
use crate::config::EngineConfig;
use crate::context::ClientContext6Builder;
use crate::errors::AllocError;
use crate::hooks::Hooks;
use crate::host::HostStore;
use crate::lease::LeaseType;
use crate::lease_store::LeaseStore;
use crate::subnet::Subnet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    fn lease_types(self) -> &'static [LeaseType] {
        match self {
            AddressFamily::Ipv4 => &[LeaseType::V4],
            AddressFamily::Ipv6 => &[LeaseType::Na, LeaseType::Ta, LeaseType::Pd],
        }
    }
}

pub struct AllocEngine {
    family: AddressFamily,
    allocators: HashMap<LeaseType, Allocator>,
    attempts: u64,
    allow_new_leases_in_renewals: bool,
    lease_store: Arc<dyn LeaseStore>,
    host_store: Arc<dyn HostStore>,
    hooks: Hooks,
}

impl std::fmt::Debug for AllocEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocEngine")
            .field("family", &self.family)
            .field("allocators", &self.allocators)
            .field("attempts", &self.attempts)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl AllocEngine {
    /// Build an engine serving one address family. Fails if the configured
    /// allocator strategy is not available.
    pub fn new(
        family: AddressFamily,
        config: &EngineConfig,
        lease_store: Arc<dyn LeaseStore>,
        host_store: Arc<dyn HostStore>,
        hooks: Hooks,
    ) -> Result<Self, AllocError> {
        let allocators = family
            .lease_types()
            .iter()
            .map(|lease_type| {
                Allocator::new(config.allocator, *lease_type).map(|allocator| (*lease_type, allocator))
            })
            .collect::<Result<HashMap<_, _>, AllocError>>()?;

        Ok(Self {
            family,
            allocators,
            attempts: config.attempts,
            allow_new_leases_in_renewals: config.allow_new_leases_in_renewals,
            lease_store,
            host_store,
            hooks,
        })
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn allocator(&self, lease_type: LeaseType) -> Result<&Allocator, AllocError> {
        self.allocators.get(&lease_type).ok_or_else(|| {
            AllocError::InvalidArgument(format!(
                "No allocator for {lease_type} leases in an {:?} engine",
                self.family
            ))
        })
    }

    /// A context builder carrying the engine wide defaults.
    pub fn context6_builder(&self) -> ClientContext6Builder {
        let mut builder = ClientContext6Builder::default();
        builder.allow_new_leases_in_renewals(self.allow_new_leases_in_renewals);
        builder
    }

    // The scan is bounded by the pool capacity, and by the configured
    // attempt count when there is one.
    fn max_attempts(&self, subnet: &Subnet, lease_type: LeaseType) -> u64 {
        let capacity = subnet.pool_capacity(lease_type);
        if self.attempts == 0 {
            capacity
        } else {
            capacity.min(self.attempts)
        }
    }
}
