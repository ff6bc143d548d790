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
#![allow(dead_code)]

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use alloc_engine::cfg_hosts::CfgHosts;
use alloc_engine::config::EngineConfig;
use alloc_engine::hooks::Hooks;
use alloc_engine::lease::{Duid, Lease4, Lease6, LeaseType, SubnetId};
use alloc_engine::lease_store::MemoryLeaseStore;
use alloc_engine::subnet::{Pool, ReservationMode, Subnet};
use alloc_engine::{AddressFamily, AllocEngine};
use chrono::{TimeDelta, Utc};
use mac_address::MacAddress;

pub const SUBNET_ID: SubnetId = 1;

/// An engine wired to its own in-memory lease store.
pub struct Fixture {
    pub leases: Arc<MemoryLeaseStore>,
    pub engine: AllocEngine,
}

impl Fixture {
    pub fn new(family: AddressFamily, hosts: CfgHosts, hooks: Hooks) -> Self {
        Self::with_config(family, hosts, hooks, &EngineConfig::default())
    }

    pub fn with_config(
        family: AddressFamily,
        hosts: CfgHosts,
        hooks: Hooks,
        config: &EngineConfig,
    ) -> Self {
        let leases = Arc::new(MemoryLeaseStore::new());
        let engine = AllocEngine::new(family, config, leases.clone(), Arc::new(hosts), hooks)
            .expect("iterative engine");
        Self { leases, engine }
    }
}

pub fn mac(last: u8) -> MacAddress {
    MacAddress::new([0x02, 0, 0, 0, 0, last])
}

pub fn duid(last: u8) -> Duid {
    Duid::new(vec![0x00, 0x03, 0x00, 0x01, last])
}

pub fn v4(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

pub fn v6(addr: &str) -> Ipv6Addr {
    addr.parse().expect("valid IPv6 address")
}

/// `prefix` with one dynamic pool spanning `range`.
pub fn subnet(prefix: &str, lease_type: LeaseType, range: &str) -> Arc<Subnet> {
    subnet_with_mode(prefix, lease_type, range, ReservationMode::default())
}

pub fn subnet_with_mode(
    prefix: &str,
    lease_type: LeaseType,
    range: &str,
    mode: ReservationMode,
) -> Arc<Subnet> {
    let mut subnet = Subnet::new(SUBNET_ID, prefix.parse().expect("valid prefix"))
        .with_reservation_mode(mode);
    let pool = Pool::new(lease_type, range.parse().expect("valid range")).expect("valid pool");
    subnet.add_pool(pool).expect("pool inside subnet");
    Arc::new(subnet)
}

pub fn subnet4() -> Arc<Subnet> {
    subnet("10.0.0.0/24", LeaseType::V4, "10.0.0.10-10.0.0.19")
}

pub fn subnet4_with_mode(mode: ReservationMode) -> Arc<Subnet> {
    subnet_with_mode("10.0.0.0/24", LeaseType::V4, "10.0.0.10-10.0.0.19", mode)
}

pub fn subnet6() -> Arc<Subnet> {
    subnet("2001:db8:1::/64", LeaseType::Na, "2001:db8:1::10-2001:db8:1::1f")
}

/// A lease that ran out `age_secs` after it was last touched.
pub fn lease4(addr: Ipv4Addr, hwaddr: MacAddress, valid_lft: u32, age_secs: i64) -> Lease4 {
    Lease4 {
        addr,
        hwaddr: Some(hwaddr),
        client_id: None,
        valid_lft,
        t1: 0,
        t2: 0,
        cltt: Utc::now() - TimeDelta::seconds(age_secs),
        subnet_id: SUBNET_ID,
        fixed: false,
        hostname: String::new(),
        fqdn_fwd: false,
        fqdn_rev: false,
    }
}

pub fn lease6(addr: Ipv6Addr, duid: Duid, iaid: u32, valid_lft: u32, age_secs: i64) -> Lease6 {
    Lease6 {
        addr,
        prefix_len: 128,
        lease_type: LeaseType::Na,
        duid,
        iaid,
        preferred_lft: valid_lft,
        valid_lft,
        t1: 0,
        t2: 0,
        cltt: Utc::now() - TimeDelta::seconds(age_secs),
        subnet_id: SUBNET_ID,
        hwaddr: None,
        fixed: false,
        hostname: String::new(),
        fqdn_fwd: false,
        fqdn_rev: false,
    }
}
