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

//! Strategies for proposing the next candidate address from a subnet's
//! dynamic pools.
//!
//! An allocator only proposes. Whether the candidate is free is decided by
//! the engine against the lease store, so two callers may be handed the same
//! candidate and one of them will lose the race when persisting.

use std::fmt::{self, Display};
use std::net::IpAddr;

use clap::ValueEnum;
use forge_network::ip::{increase_address, increase_prefix};
use serde::{Deserialize, Serialize};

use crate::errors::AllocError;
use crate::lease::LeaseType;
use crate::subnet::Subnet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorKind {
    #[default]
    Iterative,
    Hashed,
    Random,
}

impl Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AllocatorKind::Iterative => "iterative",
            AllocatorKind::Hashed => "hashed",
            AllocatorKind::Random => "random",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum Allocator {
    Iterative(IterativeAllocator),
    Hashed(HashedAllocator),
    Random(RandomAllocator),
}

impl Allocator {
    pub fn new(kind: AllocatorKind, lease_type: LeaseType) -> Result<Self, AllocError> {
        match kind {
            AllocatorKind::Iterative => Ok(Allocator::Iterative(IterativeAllocator::new(lease_type))),
            AllocatorKind::Hashed => HashedAllocator::new(lease_type).map(Allocator::Hashed),
            AllocatorKind::Random => RandomAllocator::new(lease_type).map(Allocator::Random),
        }
    }

    pub fn kind(&self) -> AllocatorKind {
        match self {
            Allocator::Iterative(_) => AllocatorKind::Iterative,
            Allocator::Hashed(_) => AllocatorKind::Hashed,
            Allocator::Random(_) => AllocatorKind::Random,
        }
    }

    pub fn lease_type(&self) -> LeaseType {
        match self {
            Allocator::Iterative(a) => a.lease_type,
            Allocator::Hashed(a) => a.lease_type,
            Allocator::Random(a) => a.lease_type,
        }
    }

    /// Propose the next candidate. `identifier` is the client's DUID or
    /// client id bytes, `hint` the address the client asked for.
    pub fn pick_address(
        &self,
        subnet: &Subnet,
        identifier: Option<&[u8]>,
        hint: IpAddr,
    ) -> Result<IpAddr, AllocError> {
        match self {
            Allocator::Iterative(a) => a.pick_address(subnet),
            Allocator::Hashed(a) => a.pick_address(subnet, identifier, hint),
            Allocator::Random(a) => a.pick_address(subnet, identifier, hint),
        }
    }
}

/// Walks every pool of the subnet in order, one address (or delegated
/// prefix) at a time, wrapping from the last pool back to the first.
#[derive(Debug)]
pub struct IterativeAllocator {
    lease_type: LeaseType,
}

impl IterativeAllocator {
    pub fn new(lease_type: LeaseType) -> Self {
        Self { lease_type }
    }

    /// The subnet watermark is moved on every call, whether or not the
    /// caller ends up using the candidate.
    pub fn pick_address(&self, subnet: &Subnet) -> Result<IpAddr, AllocError> {
        let pools: Vec<_> = subnet.pools(self.lease_type).collect();
        let Some(first_pool) = pools.first().copied() else {
            return Err(AllocError::AllocationExhausted(
                "No pools defined in selected subnet".to_string(),
            ));
        };

        let current = subnet.last_allocated(self.lease_type).and_then(|last| {
            pools
                .iter()
                .position(|pool| pool.in_range(last))
                .map(|idx| (last, idx))
        });

        // No watermark yet, or the pools changed under it.
        let Some((last, idx)) = current else {
            let first = first_pool.first_address();
            subnet.set_last_allocated(self.lease_type, first);
            return Ok(first);
        };

        let pool = pools[idx];
        let next = if self.lease_type == LeaseType::Pd {
            if !pool.first_address().is_ipv6() {
                return Err(AllocError::Internal(format!(
                    "Wrong type of pool {} for prefix delegation",
                    pool.range()
                )));
            }
            increase_prefix(last, pool.prefix_len())?
        } else {
            increase_address(last)
        };

        if pool.in_range(next) {
            subnet.set_last_allocated(self.lease_type, next);
            return Ok(next);
        }

        let next_pool = pools.get(idx + 1).copied().unwrap_or(first_pool);
        let next = next_pool.first_address();
        subnet.set_last_allocated(self.lease_type, next);
        Ok(next)
    }
}

/// Picks by hashing the client identifier. Not implemented yet.
#[derive(Debug)]
pub struct HashedAllocator {
    lease_type: LeaseType,
}

impl HashedAllocator {
    pub fn new(_lease_type: LeaseType) -> Result<Self, AllocError> {
        Err(AllocError::NotImplemented(AllocatorKind::Hashed))
    }

    pub fn pick_address(
        &self,
        _subnet: &Subnet,
        _identifier: Option<&[u8]>,
        _hint: IpAddr,
    ) -> Result<IpAddr, AllocError> {
        Err(AllocError::NotImplemented(AllocatorKind::Hashed))
    }
}

/// Picks at random from the pools. Not implemented yet.
#[derive(Debug)]
pub struct RandomAllocator {
    lease_type: LeaseType,
}

impl RandomAllocator {
    pub fn new(_lease_type: LeaseType) -> Result<Self, AllocError> {
        Err(AllocError::NotImplemented(AllocatorKind::Random))
    }

    pub fn pick_address(
        &self,
        _subnet: &Subnet,
        _identifier: Option<&[u8]>,
        _hint: IpAddr,
    ) -> Result<IpAddr, AllocError> {
        Err(AllocError::NotImplemented(AllocatorKind::Random))
    }
}
