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
use forge_network::ip::PrefixError;

use crate::allocator::AllocatorKind;
use crate::host::HostError;
use crate::lease_store::LeaseStoreError;

/// Faults raised while making an allocation decision. The public allocate
/// and renew entry points log these and report "no lease" instead.
#[derive(thiserror::Error, Debug)]
pub enum AllocError {
    #[error("Missing Argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid Argument: {0}")]
    InvalidArgument(String),

    #[error("Allocation failed: {0}")]
    AllocationExhausted(String),

    #[error("The {0} allocator is not implemented")]
    NotImplemented(AllocatorKind),

    #[error("Invalid prefix: {0}")]
    Prefix(#[from] PrefixError),

    #[error("Reservation lookup failed: {0}")]
    Reservation(#[from] HostError),

    #[error("Lease store error: {0}")]
    LeaseStore(#[from] LeaseStoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AllocError {
    pub fn is_ambiguous_reservation(&self) -> bool {
        matches!(
            self,
            AllocError::Reservation(HostError::Ambiguous { .. } | HostError::AmbiguousAddress { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv6Addr;

    use super::*;

    #[test]
    fn test_is_ambiguous_reservation() {
        let err = AllocError::from(HostError::AmbiguousAddress {
            subnet_id: 1,
            address: Ipv6Addr::LOCALHOST.into(),
        });
        assert!(err.is_ambiguous_reservation());

        let err = AllocError::from(HostError::Duplicate("hwaddr=00:01:02:03:04:05".to_string()));
        assert!(!err.is_ambiguous_reservation());
        assert!(!AllocError::NotImplemented(AllocatorKind::Hashed).is_ambiguous_reservation());
    }
}
