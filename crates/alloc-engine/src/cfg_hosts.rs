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

//! Reservations loaded from configuration, held in memory.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use mac_address::MacAddress;

use crate::host::{Host, HostError, HostIdentifier, HostStore};
use crate::lease::{ClientId, Duid, SubnetId};

#[derive(Debug, Default)]
pub struct CfgHosts {
    hosts: Vec<Arc<Host>>,
}

impl CfgHosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Add a reservation. Each identifier may be reserved once per subnet,
    /// and each address or prefix once per subnet.
    pub fn add(&mut self, host: Host) -> Result<(), HostError> {
        if host.ipv4_subnet_id.is_none() && host.ipv6_subnet_id.is_none() {
            return Err(HostError::InvalidHost(format!(
                "host {} must be associated with an IPv4 or IPv6 subnet",
                host.identifier
            )));
        }
        if host.hostname.is_empty() && !host.has_ipv4_reservation() && !host.has_ipv6_reservation()
        {
            return Err(HostError::InvalidHost(format!(
                "host {} reserves neither a hostname nor an address",
                host.identifier
            )));
        }
        self.check_v4(&host)?;
        self.check_v6(&host)?;

        tracing::debug!(identifier = %host.identifier, "Added host reservation");
        self.hosts.push(Arc::new(host));
        Ok(())
    }

    fn check_v4(&self, host: &Host) -> Result<(), HostError> {
        let Some(subnet_id) = host.ipv4_subnet_id else {
            return Ok(());
        };
        if self
            .by_identifier(&host.identifier)
            .any(|existing| existing.ipv4_subnet_id == Some(subnet_id))
        {
            return Err(HostError::Duplicate(format!(
                "{} already has a reservation in subnet {subnet_id}",
                host.identifier
            )));
        }
        if host.has_ipv4_reservation()
            && self.all4(subnet_id, host.ipv4_reservation).next().is_some()
        {
            return Err(HostError::Duplicate(format!(
                "address {} is already reserved in subnet {subnet_id}",
                host.ipv4_reservation
            )));
        }
        Ok(())
    }

    fn check_v6(&self, host: &Host) -> Result<(), HostError> {
        let Some(subnet_id) = host.ipv6_subnet_id else {
            if host.has_ipv6_reservation() {
                return Err(HostError::InvalidHost(format!(
                    "host {} reserves IPv6 resources without an IPv6 subnet",
                    host.identifier
                )));
            }
            return Ok(());
        };
        if self
            .by_identifier(&host.identifier)
            .any(|existing| existing.ipv6_subnet_id == Some(subnet_id))
        {
            return Err(HostError::Duplicate(format!(
                "{} already has a reservation in subnet {subnet_id}",
                host.identifier
            )));
        }
        for resrv in &host.ipv6_reservations {
            if self.all6(subnet_id, resrv.prefix).next().is_some() {
                return Err(HostError::Duplicate(format!(
                    "{resrv} is already reserved in subnet {subnet_id}"
                )));
            }
        }
        Ok(())
    }

    fn by_identifier<'a>(
        &'a self,
        identifier: &'a HostIdentifier,
    ) -> impl Iterator<Item = &'a Arc<Host>> {
        self.hosts
            .iter()
            .filter(move |host| &host.identifier == identifier)
    }

    fn all4(&self, subnet_id: SubnetId, address: Ipv4Addr) -> impl Iterator<Item = &Arc<Host>> {
        self.hosts.iter().filter(move |host| {
            host.ipv4_subnet_id == Some(subnet_id)
                && host.has_ipv4_reservation()
                && host.ipv4_reservation == address
        })
    }

    fn all6(&self, subnet_id: SubnetId, address: Ipv6Addr) -> impl Iterator<Item = &Arc<Host>> {
        self.hosts.iter().filter(move |host| {
            host.ipv6_subnet_id == Some(subnet_id)
                && host.ipv6_reservations.iter().any(|r| r.prefix == address)
        })
    }

    /// All hosts keyed on either identifier, across subnets.
    pub fn get_all(&self, hwaddr: Option<&MacAddress>, duid: Option<&Duid>) -> Vec<Arc<Host>> {
        self.hosts
            .iter()
            .filter(|host| match &host.identifier {
                HostIdentifier::HwAddress(mac) => hwaddr == Some(mac),
                HostIdentifier::Duid(id) => duid == Some(id),
                HostIdentifier::ClientId(_) => false,
            })
            .cloned()
            .collect()
    }

    /// All hosts reserving `address`, across subnets.
    pub fn get_all4(&self, address: Ipv4Addr) -> Vec<Arc<Host>> {
        self.hosts
            .iter()
            .filter(|host| host.has_ipv4_reservation() && host.ipv4_reservation == address)
            .cloned()
            .collect()
    }

    /// All hosts reserving `address` as an IPv6 address or prefix, across
    /// subnets.
    pub fn get_all6(&self, address: Ipv6Addr) -> Vec<Arc<Host>> {
        self.hosts
            .iter()
            .filter(|host| host.ipv6_reservations.iter().any(|r| r.prefix == address))
            .cloned()
            .collect()
    }

    // At most one host may match the identifier pair within a subnet.
    fn single_match<'a>(
        subnet_id: SubnetId,
        mut matches: impl Iterator<Item = &'a Arc<Host>>,
    ) -> Result<Option<Arc<Host>>, HostError> {
        let Some(first) = matches.next() else {
            return Ok(None);
        };
        if let Some(second) = matches.find(|host| !Arc::ptr_eq(host, first)) {
            return Err(HostError::Ambiguous {
                subnet_id,
                first: first.identifier.clone(),
                second: second.identifier.clone(),
            });
        }
        Ok(Some(first.clone()))
    }
}

impl HostStore for CfgHosts {
    fn get4(
        &self,
        subnet_id: SubnetId,
        hwaddr: Option<&MacAddress>,
        client_id: Option<&ClientId>,
    ) -> Result<Option<Arc<Host>>, HostError> {
        let matches = self.hosts.iter().filter(|host| {
            host.ipv4_subnet_id == Some(subnet_id) && host.matches_client4(hwaddr, client_id)
        });
        Self::single_match(subnet_id, matches)
    }

    fn get4_by_address(
        &self,
        subnet_id: SubnetId,
        address: Ipv4Addr,
    ) -> Result<Option<Arc<Host>>, HostError> {
        let mut matches = self.all4(subnet_id, address);
        let first = matches.next().cloned();
        if matches.next().is_some() {
            return Err(HostError::AmbiguousAddress {
                subnet_id,
                address: IpAddr::V4(address),
            });
        }
        Ok(first)
    }

    fn get6(
        &self,
        subnet_id: SubnetId,
        duid: Option<&Duid>,
        hwaddr: Option<&MacAddress>,
    ) -> Result<Option<Arc<Host>>, HostError> {
        let matches = self.hosts.iter().filter(|host| {
            host.ipv6_subnet_id == Some(subnet_id)
                && match &host.identifier {
                    HostIdentifier::Duid(id) => duid == Some(id),
                    HostIdentifier::HwAddress(mac) => hwaddr == Some(mac),
                    HostIdentifier::ClientId(_) => false,
                }
        });
        Self::single_match(subnet_id, matches)
    }

    fn get6_by_address(
        &self,
        subnet_id: SubnetId,
        address: Ipv6Addr,
    ) -> Result<Option<Arc<Host>>, HostError> {
        let mut matches = self.all6(subnet_id, address);
        let first = matches.next().cloned();
        if matches.next().is_some() {
            return Err(HostError::AmbiguousAddress {
                subnet_id,
                address: IpAddr::V6(address),
            });
        }
        Ok(first)
    }
}
