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

//! Subnets and the dynamic pools carved out of them.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};

use forge_network::ip::IpRange;
use ipnet::{IpNet, Ipv6Net};
use serde::{Deserialize, Serialize};

use crate::lease::{LeaseType, SubnetId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubnetError {
    #[error("Pool {range} of type {lease_type} does not match the address family of subnet {prefix}")]
    FamilyMismatch {
        range: IpRange,
        lease_type: LeaseType,
        prefix: IpNet,
    },

    #[error("Pool {range} is not contained in subnet {prefix}")]
    OutsideSubnet { range: IpRange, prefix: IpNet },

    #[error("Delegated length {delegated_len} is invalid for prefix pool {prefix}")]
    DelegatedLength { prefix: Ipv6Net, delegated_len: u8 },

    #[error("Pools of type {0} cannot be built from an address range")]
    WrongPoolType(LeaseType),
}

/// How strictly host reservations are taken into account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReservationMode {
    /// No reservation lookups at all.
    Disabled,
    /// Only the client's own reservations are resolved.
    OutOfPool,
    /// Hints and existing in-pool leases are also checked against the
    /// reservations of other clients.
    InPool,
    /// Every candidate from the dynamic pool is checked as well.
    #[default]
    All,
}

impl ReservationMode {
    pub fn enabled(self) -> bool {
        self != ReservationMode::Disabled
    }

    pub fn checks_in_pool(self) -> bool {
        matches!(self, ReservationMode::InPool | ReservationMode::All)
    }

    pub fn checks_candidates(self) -> bool {
        self == ReservationMode::All
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    lease_type: LeaseType,
    range: IpRange,
    prefix_len: u8,
}

impl Pool {
    /// An address pool. The prefix length is the full width of the family.
    pub fn new(lease_type: LeaseType, range: IpRange) -> Result<Self, SubnetError> {
        if lease_type == LeaseType::Pd {
            return Err(SubnetError::WrongPoolType(lease_type));
        }
        let prefix_len = if range.first().is_ipv4() { 32 } else { 128 };
        Ok(Self {
            lease_type,
            range,
            prefix_len,
        })
    }

    /// A prefix delegation pool handing out `delegated_len` long prefixes
    /// taken from `prefix`.
    pub fn new_pd(prefix: Ipv6Net, delegated_len: u8) -> Result<Self, SubnetError> {
        if delegated_len == 0 || delegated_len < prefix.prefix_len() || delegated_len > 128 {
            return Err(SubnetError::DelegatedLength {
                prefix,
                delegated_len,
            });
        }
        Ok(Self {
            lease_type: LeaseType::Pd,
            range: IpRange::from(IpNet::V6(prefix)),
            prefix_len: delegated_len,
        })
    }

    pub fn lease_type(&self) -> LeaseType {
        self.lease_type
    }

    pub fn range(&self) -> &IpRange {
        &self.range
    }

    pub fn first_address(&self) -> IpAddr {
        self.range.first()
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn in_range(&self, addr: IpAddr) -> bool {
        self.range.contains(addr)
    }

    /// Number of leases the pool can hold. For prefix pools that is the
    /// number of delegated prefixes.
    pub fn capacity(&self) -> u128 {
        if self.lease_type != LeaseType::Pd {
            return self.range.capacity();
        }
        self.range.capacity() >> (128 - u32::from(self.prefix_len))
    }
}

/// Address timers handed out with leases from a subnet, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timers {
    pub t1: u32,
    pub t2: u32,
    pub preferred: u32,
    pub valid: u32,
}

impl Default for Timers {
    fn default() -> Self {
        Self {
            t1: 900,
            t2: 1800,
            preferred: 3000,
            valid: 3600,
        }
    }
}

#[derive(Debug)]
pub struct Subnet {
    id: SubnetId,
    prefix: IpNet,
    pools: Vec<Pool>,
    timers: Timers,
    reservation_mode: ReservationMode,
    // Allocator watermark per lease type. Read and written under separate
    // short locks; concurrent callers may observe the same value.
    last_allocated: RwLock<HashMap<LeaseType, IpAddr>>,
}

impl Subnet {
    pub fn new(id: SubnetId, prefix: IpNet) -> Self {
        Self {
            id,
            prefix,
            pools: Vec::new(),
            timers: Timers::default(),
            reservation_mode: ReservationMode::default(),
            last_allocated: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_timers(mut self, timers: Timers) -> Self {
        self.timers = timers;
        self
    }

    pub fn with_reservation_mode(mut self, mode: ReservationMode) -> Self {
        self.reservation_mode = mode;
        self
    }

    pub fn add_pool(&mut self, pool: Pool) -> Result<(), SubnetError> {
        let family_ok = if self.is_ipv6() {
            pool.lease_type.is_v6() && pool.first_address().is_ipv6()
        } else {
            pool.lease_type == LeaseType::V4 && pool.first_address().is_ipv4()
        };
        if !family_ok {
            return Err(SubnetError::FamilyMismatch {
                range: pool.range,
                lease_type: pool.lease_type,
                prefix: self.prefix,
            });
        }
        // Delegated prefixes are routed to the client, not taken from the
        // on-link prefix.
        if pool.lease_type != LeaseType::Pd
            && (!self.in_range(pool.range.first()) || !self.in_range(pool.range.last()))
        {
            return Err(SubnetError::OutsideSubnet {
                range: pool.range,
                prefix: self.prefix,
            });
        }
        self.pools.push(pool);
        Ok(())
    }

    pub fn id(&self) -> SubnetId {
        self.id
    }

    pub fn prefix(&self) -> IpNet {
        self.prefix
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self.prefix, IpNet::V6(_))
    }

    pub fn timers(&self) -> Timers {
        self.timers
    }

    pub fn reservation_mode(&self) -> ReservationMode {
        self.reservation_mode
    }

    pub fn in_range(&self, addr: IpAddr) -> bool {
        self.prefix.contains(&addr)
    }

    pub fn pools(&self, lease_type: LeaseType) -> impl Iterator<Item = &Pool> {
        self.pools
            .iter()
            .filter(move |pool| pool.lease_type == lease_type)
    }

    pub fn pool(&self, lease_type: LeaseType, addr: IpAddr) -> Option<&Pool> {
        self.pools(lease_type).find(|pool| pool.in_range(addr))
    }

    pub fn in_pool(&self, lease_type: LeaseType, addr: IpAddr) -> bool {
        self.pool(lease_type, addr).is_some()
    }

    pub fn pool_capacity(&self, lease_type: LeaseType) -> u64 {
        let total = self
            .pools(lease_type)
            .fold(0u128, |acc, pool| acc.saturating_add(pool.capacity()));
        u64::try_from(total).unwrap_or(u64::MAX)
    }

    pub fn last_allocated(&self, lease_type: LeaseType) -> Option<IpAddr> {
        self.last_allocated
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&lease_type)
            .copied()
    }

    pub fn set_last_allocated(&self, lease_type: LeaseType, addr: IpAddr) {
        self.last_allocated
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(lease_type, addr);
    }
}
