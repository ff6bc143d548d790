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

//! Static host reservations and the contract used to look them up.

use std::fmt::{self, Display};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use mac_address::MacAddress;
use serde::{Deserialize, Serialize};

use crate::lease::{ClientId, Duid, SubnetId};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Duplicate host: {0}")]
    Duplicate(String),

    #[error("More than one reservation found in subnet {subnet_id} for {first} and {second}")]
    Ambiguous {
        subnet_id: SubnetId,
        first: HostIdentifier,
        second: HostIdentifier,
    },

    #[error("More than one reservation found in subnet {subnet_id} for address {address}")]
    AmbiguousAddress {
        subnet_id: SubnetId,
        address: IpAddr,
    },

    #[error("Invalid host: {0}")]
    InvalidHost(String),
}

/// What a reservation is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum HostIdentifier {
    HwAddress(MacAddress),
    Duid(Duid),
    ClientId(ClientId),
}

impl Display for HostIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostIdentifier::HwAddress(mac) => write!(f, "hwaddr={mac}"),
            HostIdentifier::Duid(duid) => write!(f, "duid={duid}"),
            HostIdentifier::ClientId(client_id) => write!(f, "client-id={client_id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IPv6ResrvType {
    Na,
    Pd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IPv6Resrv {
    pub kind: IPv6ResrvType,
    pub prefix: Ipv6Addr,
    #[serde(default = "full_prefix_len")]
    pub prefix_len: u8,
}

fn full_prefix_len() -> u8 {
    128
}

impl IPv6Resrv {
    pub fn address(prefix: Ipv6Addr) -> Self {
        Self {
            kind: IPv6ResrvType::Na,
            prefix,
            prefix_len: 128,
        }
    }

    pub fn prefix(prefix: Ipv6Addr, prefix_len: u8) -> Self {
        Self {
            kind: IPv6ResrvType::Pd,
            prefix,
            prefix_len,
        }
    }
}

impl Display for IPv6Resrv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            IPv6ResrvType::Na => write!(f, "{}", self.prefix),
            IPv6ResrvType::Pd => write!(f, "{}/{}", self.prefix, self.prefix_len),
        }
    }
}

fn unspecified_v4() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

/// A static binding of a client to addresses, prefixes and a hostname.
///
/// `ipv4_reservation` uses the unspecified address to mean "no address".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub identifier: HostIdentifier,
    #[serde(default)]
    pub ipv4_subnet_id: Option<SubnetId>,
    #[serde(default)]
    pub ipv6_subnet_id: Option<SubnetId>,
    #[serde(default = "unspecified_v4")]
    pub ipv4_reservation: Ipv4Addr,
    #[serde(default)]
    pub ipv6_reservations: Vec<IPv6Resrv>,
    #[serde(default)]
    pub hostname: String,
}

impl Host {
    pub fn new(identifier: HostIdentifier) -> Self {
        Self {
            identifier,
            ipv4_subnet_id: None,
            ipv6_subnet_id: None,
            ipv4_reservation: Ipv4Addr::UNSPECIFIED,
            ipv6_reservations: Vec::new(),
            hostname: String::new(),
        }
    }

    pub fn has_ipv4_reservation(&self) -> bool {
        !self.ipv4_reservation.is_unspecified()
    }

    pub fn has_ipv6_reservation(&self) -> bool {
        !self.ipv6_reservations.is_empty()
    }

    pub fn has_reservation(&self, resrv: &IPv6Resrv) -> bool {
        self.ipv6_reservations.contains(resrv)
    }

    pub fn ipv6_reservations_of(&self, kind: IPv6ResrvType) -> impl Iterator<Item = &IPv6Resrv> {
        self.ipv6_reservations
            .iter()
            .filter(move |resrv| resrv.kind == kind)
    }

    /// True when the host is keyed on one of the given DHCPv4 identifiers.
    pub fn matches_client4(&self, hwaddr: Option<&MacAddress>, client_id: Option<&ClientId>) -> bool {
        match &self.identifier {
            HostIdentifier::HwAddress(mac) => hwaddr == Some(mac),
            HostIdentifier::ClientId(id) => client_id == Some(id),
            HostIdentifier::Duid(_) => false,
        }
    }
}

/// Read side of the reservation store consulted by the engine.
///
/// Lookups by identifier fail with [`HostError::Ambiguous`] when the two
/// identifiers resolve to different hosts in the same subnet.
pub trait HostStore: Send + Sync {
    fn get4(
        &self,
        subnet_id: SubnetId,
        hwaddr: Option<&MacAddress>,
        client_id: Option<&ClientId>,
    ) -> Result<Option<Arc<Host>>, HostError>;

    fn get4_by_address(
        &self,
        subnet_id: SubnetId,
        address: Ipv4Addr,
    ) -> Result<Option<Arc<Host>>, HostError>;

    fn get6(
        &self,
        subnet_id: SubnetId,
        duid: Option<&Duid>,
        hwaddr: Option<&MacAddress>,
    ) -> Result<Option<Arc<Host>>, HostError>;

    fn get6_by_address(
        &self,
        subnet_id: SubnetId,
        address: Ipv6Addr,
    ) -> Result<Option<Arc<Host>>, HostError>;
}
