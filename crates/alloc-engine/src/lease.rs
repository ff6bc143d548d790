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
use std::fmt::{self, Display};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use mac_address::MacAddress;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type SubnetId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseType {
    /// Plain IPv4 address.
    V4,
    /// IPv6 non-temporary address.
    Na,
    /// IPv6 temporary address.
    Ta,
    /// IPv6 delegated prefix.
    Pd,
}

impl LeaseType {
    pub fn is_v6(self) -> bool {
        !matches!(self, LeaseType::V4)
    }
}

impl Display for LeaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LeaseType::V4 => "V4",
            LeaseType::Na => "IA_NA",
            LeaseType::Ta => "IA_TA",
            LeaseType::Pd => "IA_PD",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid identifier '{0}': expected hex octets such as 01:02:03")]
pub struct IdentifierParseError(String);

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            f.write_str(":")?;
        }
        write!(f, "{byte:02x}")?;
    }
    Ok(())
}

fn parse_hex(s: &str) -> Result<Vec<u8>, IdentifierParseError> {
    let digits: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
    match hex::decode(digits) {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        _ => Err(IdentifierParseError(s.to_string())),
    }
}

// Opaque client identifiers share the same textual and serde form.
macro_rules! opaque_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Vec<u8>);

        impl $name {
            pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
                Self(bytes.into())
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write_hex(f, &self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({self})", stringify!($name))
            }
        }

        impl FromStr for $name {
            type Err = IdentifierParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hex(s).map(Self)
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(value: Vec<u8>) -> Self {
                Self(value)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s: String = Deserialize::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

opaque_identifier!(
    /// DHCPv4 client identifier option contents.
    ClientId
);

opaque_identifier!(
    /// DHCPv6 DHCP Unique Identifier.
    Duid
);

fn expires_before(cltt: DateTime<Utc>, valid_lft: u32, now: DateTime<Utc>) -> bool {
    now > cltt + TimeDelta::seconds(i64::from(valid_lft))
}

/// An IPv4 address bound to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease4 {
    pub addr: Ipv4Addr,
    pub hwaddr: Option<MacAddress>,
    pub client_id: Option<ClientId>,
    pub valid_lft: u32,
    pub t1: u32,
    pub t2: u32,
    /// Client last transmission time.
    pub cltt: DateTime<Utc>,
    pub subnet_id: SubnetId,
    /// Lease was created from a host reservation.
    pub fixed: bool,
    pub hostname: String,
    pub fqdn_fwd: bool,
    pub fqdn_rev: bool,
}

impl Lease4 {
    pub fn expired(&self) -> bool {
        self.expired_at(Utc::now())
    }

    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        expires_before(self.cltt, self.valid_lft, now)
    }
}

/// An IPv6 address or delegated prefix bound to one identity association of
/// a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease6 {
    pub addr: Ipv6Addr,
    /// Delegated length for prefixes, 128 for addresses.
    pub prefix_len: u8,
    pub lease_type: LeaseType,
    pub duid: Duid,
    pub iaid: u32,
    pub preferred_lft: u32,
    pub valid_lft: u32,
    pub t1: u32,
    pub t2: u32,
    pub cltt: DateTime<Utc>,
    pub subnet_id: SubnetId,
    pub hwaddr: Option<MacAddress>,
    pub fixed: bool,
    pub hostname: String,
    pub fqdn_fwd: bool,
    pub fqdn_rev: bool,
}

impl Lease6 {
    pub fn expired(&self) -> bool {
        self.expired_at(Utc::now())
    }

    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        expires_before(self.cltt, self.valid_lft, now)
    }

    /// True when the DNS related fields differ between the two leases.
    pub fn fqdn_differs(&self, other: &Lease6) -> bool {
        self.hostname != other.hostname
            || self.fqdn_fwd != other.fqdn_fwd
            || self.fqdn_rev != other.fqdn_rev
    }
}
