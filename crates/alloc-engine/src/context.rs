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

//! Per-exchange request state handed to the engine. A context is built for
//! one client message and dropped once the answer is sent.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use derive_builder::Builder;
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};

use crate::host::Host;
use crate::lease::{ClientId, Duid, Lease4, Lease6, LeaseType};
use crate::subnet::Subnet;

#[derive(Debug, Clone, Builder)]
pub struct ClientContext4 {
    #[builder(setter(into, strip_option), default)]
    pub subnet: Option<Arc<Subnet>>,

    #[builder(setter(into, strip_option), default)]
    pub client_id: Option<ClientId>,

    #[builder(setter(into, strip_option), default)]
    pub hwaddr: Option<MacAddress>,

    /// `0.0.0.0` when the client did not ask for a specific address.
    #[builder(default = "Ipv4Addr::UNSPECIFIED")]
    pub requested_address: Ipv4Addr,

    #[builder(default)]
    pub fwd_dns_update: bool,

    #[builder(default)]
    pub rev_dns_update: bool,

    #[builder(setter(into), default)]
    pub hostname: String,

    /// Discover rather than request: decide, but do not persist.
    #[builder(default)]
    pub fake_allocation: bool,

    #[builder(setter(skip))]
    pub host: Option<Arc<Host>>,

    /// The lease this decision replaced, if any.
    #[builder(setter(skip))]
    pub old_lease: Option<Lease4>,

    /// Unexpired lease held by someone else that blocked the last candidate.
    #[builder(setter(skip))]
    pub conflicting_lease: Option<Lease4>,
}

impl ClientContext4 {
    /// Both identifiers match the lease. Absent on both sides counts as a
    /// match.
    pub fn my_lease(&self, lease: &Lease4) -> bool {
        self.hwaddr == lease.hwaddr && self.client_id == lease.client_id
    }

    /// One identifier matches the lease while the other cannot tell the two
    /// clients apart because one side does not have it.
    pub fn is_in_conflict(&self, lease: &Lease4) -> bool {
        let both_hw = self.hwaddr.is_some() && lease.hwaddr.is_some();
        let both_id = self.client_id.is_some() && lease.client_id.is_some();
        (!both_hw && both_id && self.client_id == lease.client_id)
            || (!both_id && both_hw && self.hwaddr == lease.hwaddr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Message6Type {
    Solicit,
    Request,
    Renew,
    Rebind,
}

/// The parts of the inbound DHCPv6 message relevant to allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query6 {
    pub message_type: Message6Type,
    pub transaction_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IaStatus {
    pub code: u16,
    pub message: String,
}

/// The identity association being assembled for the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IaResponse {
    pub iaid: u32,
    pub lease_type: LeaseType,
    pub t1: u32,
    pub t2: u32,
    pub status: Option<IaStatus>,
}

#[derive(Debug, Clone, Builder)]
pub struct ClientContext6 {
    #[builder(setter(into, strip_option), default)]
    pub subnet: Option<Arc<Subnet>>,

    #[builder(setter(into, strip_option), default)]
    pub duid: Option<Duid>,

    #[builder(default)]
    pub iaid: u32,

    #[builder(default = "LeaseType::Na")]
    pub lease_type: LeaseType,

    #[builder(setter(into, strip_option), default)]
    pub hwaddr: Option<MacAddress>,

    /// Requested addresses or prefixes with their lengths, in the order the
    /// client sent them.
    #[builder(setter(each(name = "hint")), default)]
    pub hints: Vec<(Ipv6Addr, u8)>,

    #[builder(default)]
    pub fwd_dns_update: bool,

    #[builder(default)]
    pub rev_dns_update: bool,

    #[builder(setter(into), default)]
    pub hostname: String,

    #[builder(default)]
    pub fake_allocation: bool,

    /// Renewals may hand out a fresh lease when the client has none left.
    #[builder(default)]
    pub allow_new_leases_in_renewals: bool,

    #[builder(setter(strip_option), default)]
    pub query: Option<Query6>,

    #[builder(setter(strip_option), default)]
    pub ia_rsp: Option<IaResponse>,

    #[builder(setter(skip))]
    pub host: Option<Arc<Host>>,

    /// Leases revoked or reclaimed while serving this exchange.
    #[builder(setter(skip))]
    pub old_leases: Vec<Lease6>,

    /// Previous state of leases whose DNS data was updated.
    #[builder(setter(skip))]
    pub changed_leases: Vec<Lease6>,
}

impl ClientContext6 {
    pub(crate) fn is_rebind(&self) -> bool {
        self.query
            .is_some_and(|query| query.message_type == Message6Type::Rebind)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn lease(hwaddr: Option<MacAddress>, client_id: Option<ClientId>) -> Lease4 {
        Lease4 {
            addr: Ipv4Addr::new(10, 0, 0, 1),
            hwaddr,
            client_id,
            valid_lft: 60,
            t1: 0,
            t2: 0,
            cltt: Utc::now(),
            subnet_id: 1,
            fixed: false,
            hostname: String::new(),
            fqdn_fwd: false,
            fqdn_rev: false,
        }
    }

    fn ctx(hwaddr: Option<MacAddress>, client_id: Option<ClientId>) -> ClientContext4 {
        let mut builder = ClientContext4Builder::default();
        if let Some(hwaddr) = hwaddr {
            builder.hwaddr(hwaddr);
        }
        if let Some(client_id) = client_id {
            builder.client_id(client_id);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_my_lease() {
        let mac = MacAddress::new([1, 1, 1, 1, 1, 1]);
        let other_mac = MacAddress::new([2, 2, 2, 2, 2, 2]);
        let id = ClientId::new(vec![1]);

        assert!(ctx(Some(mac), None).my_lease(&lease(Some(mac), None)));
        assert!(ctx(Some(mac), Some(id.clone())).my_lease(&lease(Some(mac), Some(id.clone()))));
        assert!(!ctx(Some(mac), Some(id.clone())).my_lease(&lease(Some(mac), None)));
        assert!(!ctx(Some(other_mac), None).my_lease(&lease(Some(mac), None)));
    }

    #[test]
    fn test_is_in_conflict() {
        let mac = MacAddress::new([1, 1, 1, 1, 1, 1]);
        let other_mac = MacAddress::new([2, 2, 2, 2, 2, 2]);
        let id = ClientId::new(vec![1]);
        let other_id = ClientId::new(vec![2]);

        // Same hardware address, lease lacks the client id we present.
        assert!(ctx(Some(mac), Some(id.clone())).is_in_conflict(&lease(Some(mac), None)));
        // Same client id, we have no hardware address to compare.
        assert!(ctx(None, Some(id.clone())).is_in_conflict(&lease(Some(mac), Some(id.clone()))));
        // Both identifiers present on both sides tell the clients apart.
        assert!(
            !ctx(Some(mac), Some(id.clone())).is_in_conflict(&lease(Some(mac), Some(other_id)))
        );
        assert!(!ctx(Some(other_mac), None).is_in_conflict(&lease(Some(mac), None)));
    }

    #[test]
    fn test_context6_defaults() {
        let ctx = ClientContext6Builder::default()
            .duid(Duid::new(vec![1, 2]))
            .iaid(5)
            .hint(("2001:db8::1".parse().unwrap(), 128))
            .build()
            .unwrap();
        assert_eq!(ctx.lease_type, LeaseType::Na);
        assert_eq!(ctx.hints.len(), 1);
        assert!(!ctx.fake_allocation);
        assert!(!ctx.is_rebind());
        assert!(ctx.old_leases.is_empty());
    }
}
