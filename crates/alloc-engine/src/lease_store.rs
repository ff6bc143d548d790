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
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Mutex, MutexGuard, PoisonError};

use mac_address::MacAddress;

use crate::lease::{ClientId, Duid, Lease4, Lease6, LeaseType, SubnetId};

#[derive(Debug, thiserror::Error)]
pub enum LeaseStoreError {
    #[error("No lease for address {0} in the lease store")]
    NoSuchLease(IpAddr),

    #[error("Lease store backend failure: {0}")]
    Backend(String),
}

/// The lease database shared by every engine serving the same addresses.
///
/// `add_*` returns `Ok(false)` when a lease for the address already exists.
/// Callers treat that the same way as an error: somebody else got there
/// first.
pub trait LeaseStore: Send + Sync {
    fn get_lease4(&self, addr: Ipv4Addr) -> Result<Option<Lease4>, LeaseStoreError>;

    fn get_lease4_by_hwaddr(
        &self,
        hwaddr: &MacAddress,
        subnet_id: SubnetId,
    ) -> Result<Option<Lease4>, LeaseStoreError>;

    fn get_lease4_by_client_id(
        &self,
        client_id: &ClientId,
        subnet_id: SubnetId,
    ) -> Result<Option<Lease4>, LeaseStoreError>;

    /// The lease of `lease_type` at `addr`. A lease of another type at the
    /// same address is not returned, but it still makes `add_lease6` fail.
    fn get_lease6(
        &self,
        lease_type: LeaseType,
        addr: Ipv6Addr,
    ) -> Result<Option<Lease6>, LeaseStoreError>;

    fn get_leases6(
        &self,
        lease_type: LeaseType,
        duid: &Duid,
        iaid: u32,
        subnet_id: SubnetId,
    ) -> Result<Vec<Lease6>, LeaseStoreError>;

    fn add_lease4(&self, lease: &Lease4) -> Result<bool, LeaseStoreError>;

    fn add_lease6(&self, lease: &Lease6) -> Result<bool, LeaseStoreError>;

    fn update_lease4(&self, lease: &Lease4) -> Result<(), LeaseStoreError>;

    fn update_lease6(&self, lease: &Lease6) -> Result<(), LeaseStoreError>;

    fn delete_lease(&self, addr: IpAddr) -> Result<bool, LeaseStoreError>;
}

#[derive(Debug, Clone)]
enum StoredLease {
    V4(Lease4),
    V6(Lease6),
}

#[derive(Debug, Default)]
pub struct MemoryLeaseStore {
    leases: Mutex<BTreeMap<IpAddr, StoredLease>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn leases(&self) -> MutexGuard<'_, BTreeMap<IpAddr, StoredLease>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.leases().len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases().is_empty()
    }

    /// Every IPv4 lease, ordered by address.
    pub fn leases4(&self) -> Vec<Lease4> {
        self.leases()
            .values()
            .filter_map(|stored| match stored {
                StoredLease::V4(lease) => Some(lease.clone()),
                StoredLease::V6(_) => None,
            })
            .collect()
    }

    /// Every IPv6 lease, ordered by address.
    pub fn leases6(&self) -> Vec<Lease6> {
        self.leases()
            .values()
            .filter_map(|stored| match stored {
                StoredLease::V6(lease) => Some(lease.clone()),
                StoredLease::V4(_) => None,
            })
            .collect()
    }

    fn find4(&self, pred: impl Fn(&Lease4) -> bool) -> Option<Lease4> {
        self.leases().values().find_map(|stored| match stored {
            StoredLease::V4(lease) if pred(lease) => Some(lease.clone()),
            _ => None,
        })
    }
}

impl LeaseStore for MemoryLeaseStore {
    fn get_lease4(&self, addr: Ipv4Addr) -> Result<Option<Lease4>, LeaseStoreError> {
        Ok(match self.leases().get(&IpAddr::V4(addr)) {
            Some(StoredLease::V4(lease)) => Some(lease.clone()),
            _ => None,
        })
    }

    fn get_lease4_by_hwaddr(
        &self,
        hwaddr: &MacAddress,
        subnet_id: SubnetId,
    ) -> Result<Option<Lease4>, LeaseStoreError> {
        Ok(self.find4(|lease| lease.subnet_id == subnet_id && lease.hwaddr.as_ref() == Some(hwaddr)))
    }

    fn get_lease4_by_client_id(
        &self,
        client_id: &ClientId,
        subnet_id: SubnetId,
    ) -> Result<Option<Lease4>, LeaseStoreError> {
        Ok(self.find4(|lease| {
            lease.subnet_id == subnet_id && lease.client_id.as_ref() == Some(client_id)
        }))
    }

    fn get_lease6(
        &self,
        lease_type: LeaseType,
        addr: Ipv6Addr,
    ) -> Result<Option<Lease6>, LeaseStoreError> {
        Ok(match self.leases().get(&IpAddr::V6(addr)) {
            Some(StoredLease::V6(lease)) if lease.lease_type == lease_type => Some(lease.clone()),
            _ => None,
        })
    }

    fn get_leases6(
        &self,
        lease_type: LeaseType,
        duid: &Duid,
        iaid: u32,
        subnet_id: SubnetId,
    ) -> Result<Vec<Lease6>, LeaseStoreError> {
        Ok(self
            .leases()
            .values()
            .filter_map(|stored| match stored {
                StoredLease::V6(lease)
                    if lease.lease_type == lease_type
                        && &lease.duid == duid
                        && lease.iaid == iaid
                        && lease.subnet_id == subnet_id =>
                {
                    Some(lease.clone())
                }
                _ => None,
            })
            .collect())
    }

    fn add_lease4(&self, lease: &Lease4) -> Result<bool, LeaseStoreError> {
        let mut leases = self.leases();
        let key = IpAddr::V4(lease.addr);
        if leases.contains_key(&key) {
            return Ok(false);
        }
        leases.insert(key, StoredLease::V4(lease.clone()));
        Ok(true)
    }

    fn add_lease6(&self, lease: &Lease6) -> Result<bool, LeaseStoreError> {
        let mut leases = self.leases();
        let key = IpAddr::V6(lease.addr);
        if leases.contains_key(&key) {
            return Ok(false);
        }
        leases.insert(key, StoredLease::V6(lease.clone()));
        Ok(true)
    }

    fn update_lease4(&self, lease: &Lease4) -> Result<(), LeaseStoreError> {
        match self.leases().get_mut(&IpAddr::V4(lease.addr)) {
            Some(StoredLease::V4(stored)) => {
                *stored = lease.clone();
                Ok(())
            }
            _ => Err(LeaseStoreError::NoSuchLease(IpAddr::V4(lease.addr))),
        }
    }

    fn update_lease6(&self, lease: &Lease6) -> Result<(), LeaseStoreError> {
        match self.leases().get_mut(&IpAddr::V6(lease.addr)) {
            Some(StoredLease::V6(stored)) => {
                *stored = lease.clone();
                Ok(())
            }
            _ => Err(LeaseStoreError::NoSuchLease(IpAddr::V6(lease.addr))),
        }
    }

    fn delete_lease(&self, addr: IpAddr) -> Result<bool, LeaseStoreError> {
        Ok(self.leases().remove(&addr).is_some())
    }
}
