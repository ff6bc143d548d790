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
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PrefixError {
    #[error("Prefix operations are for IPv6 only (attempted to increase prefix {0})")]
    NotIpv6(IpAddr),

    #[error("Cannot increase prefix: invalid prefix length: {0}")]
    InvalidLength(u8),
}

/// Return the address that directly follows `addr`. The top of the address
/// space wraps around to the all-zeros address of the same family.
pub fn increase_address(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from_bits(v4.to_bits().wrapping_add(1))),
        IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from_bits(v6.to_bits().wrapping_add(1))),
    }
}

/// Return the prefix that follows `prefix` when both are `prefix_len` long.
///
/// Only the bit at position `prefix_len` (counting from the most significant
/// bit, starting at 1) is incremented, with the carry moving towards the most
/// significant bit. Anything after the prefix length is left untouched, and a
/// carry out of the top bit is dropped, so the last /1 wraps to `::`.
pub fn increase_prefix(prefix: IpAddr, prefix_len: u8) -> Result<IpAddr, PrefixError> {
    let IpAddr::V6(v6) = prefix else {
        return Err(PrefixError::NotIpv6(prefix));
    };

    if !(1..=128).contains(&prefix_len) {
        return Err(PrefixError::InvalidLength(prefix_len));
    }

    let step = 1u128 << (128 - u32::from(prefix_len));
    Ok(IpAddr::V6(Ipv6Addr::from_bits(v6.to_bits().wrapping_add(step))))
}

/// Integer form of an address, used for range arithmetic. IPv4 addresses map
/// to the low 32 bits.
pub(crate) fn to_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(v4.to_bits()),
        IpAddr::V6(v6) => v6.to_bits(),
    }
}
