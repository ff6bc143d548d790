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
use std::fmt::Display;
use std::net::{AddrParseError, IpAddr};
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::arith::to_bits;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("Range bounds {0} and {1} belong to different address families")]
    FamilyMismatch(IpAddr, IpAddr),

    #[error("Range start {0} is after range end {1}")]
    Inverted(IpAddr, IpAddr),

    #[error("Could not parse range '{0}'")]
    Parse(String),
}

/// An inclusive range of addresses of a single family, e.g. the bounds of a
/// dynamic pool. The textual form is either `first-last` or a prefix in CIDR
/// notation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IpRange {
    first: IpAddr,
    last: IpAddr,
}

impl IpRange {
    pub fn new(first: IpAddr, last: IpAddr) -> Result<Self, RangeError> {
        if first.is_ipv4() != last.is_ipv4() {
            return Err(RangeError::FamilyMismatch(first, last));
        }
        if to_bits(first) > to_bits(last) {
            return Err(RangeError::Inverted(first, last));
        }
        Ok(Self { first, last })
    }

    pub fn first(&self) -> IpAddr {
        self.first
    }

    pub fn last(&self) -> IpAddr {
        self.last
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        if addr.is_ipv4() != self.first.is_ipv4() {
            return false;
        }
        let bits = to_bits(addr);
        to_bits(self.first) <= bits && bits <= to_bits(self.last)
    }

    /// Number of addresses in the range. A range covering the whole IPv6
    /// space saturates at `u128::MAX`.
    pub fn capacity(&self) -> u128 {
        (to_bits(self.last) - to_bits(self.first)).saturating_add(1)
    }
}

impl From<IpNet> for IpRange {
    fn from(value: IpNet) -> Self {
        Self {
            first: value.network(),
            last: value.broadcast(),
        }
    }
}

impl Display for IpRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

impl FromStr for IpRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = |_: AddrParseError| RangeError::Parse(s.to_string());
        match s.split_once('-') {
            Some((first, last)) => {
                let first = IpAddr::from_str(first.trim()).map_err(parse_err)?;
                let last = IpAddr::from_str(last.trim()).map_err(parse_err)?;
                Self::new(first, last)
            }
            None => IpNet::from_str(s.trim())
                .map(Self::from)
                .map_err(|_| RangeError::Parse(s.to_string())),
        }
    }
}

impl Serialize for IpRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for IpRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let range_str: String = Deserialize::deserialize(deserializer)?;
        range_str.parse().map_err(serde::de::Error::custom)
    }
}
