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
use std::sync::Arc;

use alloc_engine::AddressFamily;
use alloc_engine::cfg_hosts::CfgHosts;
use alloc_engine::config::EngineConfig;
use alloc_engine::context::{ClientContext6, ClientContext6Builder, IaResponse, Message6Type, Query6};
use alloc_engine::hooks::{HookAction, Hooks};
use alloc_engine::host::{Host, HostIdentifier, IPv6Resrv};
use alloc_engine::lease::{Duid, LeaseType};
use alloc_engine::lease_store::LeaseStore;
use alloc_engine::subnet::{Pool, ReservationMode, Subnet};

mod common;

use common::{Fixture, SUBNET_ID, duid, lease6, mac, subnet_with_mode, subnet6, v6};

fn ctx(subnet: &Arc<Subnet>, duid: Duid, fake_allocation: bool) -> ClientContext6 {
    ClientContext6Builder::default()
        .subnet(subnet.clone())
        .duid(duid)
        .iaid(1)
        .fake_allocation(fake_allocation)
        .build()
        .unwrap()
}

fn renew_ctx(
    fixture: &Fixture,
    subnet: &Arc<Subnet>,
    duid: Duid,
    message_type: Message6Type,
) -> ClientContext6 {
    fixture
        .engine
        .context6_builder()
        .subnet(subnet.clone())
        .duid(duid)
        .iaid(1)
        .query(Query6 {
            message_type,
            transaction_id: 42,
        })
        .ia_rsp(IaResponse {
            iaid: 1,
            lease_type: LeaseType::Na,
            t1: 900,
            t2: 1800,
            status: None,
        })
        .build()
        .unwrap()
}

fn reservation(identifier: HostIdentifier, resrv: IPv6Resrv) -> Host {
    let mut host = Host::new(identifier);
    host.ipv6_subnet_id = Some(SUBNET_ID);
    host.ipv6_reservations.push(resrv);
    host
}

// `subnet6()` plus a temporary address pool.
fn subnet6_with_ta(ta_range: &str) -> Arc<Subnet> {
    let mut subnet = Subnet::new(SUBNET_ID, "2001:db8:1::/64".parse().unwrap());
    subnet
        .add_pool(Pool::new(LeaseType::Na, "2001:db8:1::10-2001:db8:1::1f".parse().unwrap()).unwrap())
        .unwrap();
    subnet
        .add_pool(Pool::new(LeaseType::Ta, ta_range.parse().unwrap()).unwrap())
        .unwrap();
    Arc::new(subnet)
}

fn hosts(reservations: Vec<Host>) -> CfgHosts {
    let mut hosts = CfgHosts::new();
    for host in reservations {
        hosts.add(host).unwrap();
    }
    hosts
}

#[test]
fn test_reserved_address_is_granted() -> Result<(), eyre::Report> {
    let subnet = subnet6();
    let reserved = v6("2001:db8:1::100");
    let hosts = hosts(vec![reservation(
        HostIdentifier::Duid(duid(1)),
        IPv6Resrv::address(reserved),
    )]);
    let fixture = Fixture::new(AddressFamily::Ipv6, hosts, Hooks::new());

    let mut request = ctx(&subnet, duid(1), false);
    let leases = fixture.engine.allocate_leases6(&mut request);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].addr, reserved);
    assert_eq!(leases[0].prefix_len, 128);
    assert!(leases[0].fixed);
    assert!(fixture.leases.get_lease6(LeaseType::Na, reserved)?.is_some());

    // Coming back keeps the same reserved lease.
    let mut request = ctx(&subnet, duid(1), false);
    let leases = fixture.engine.allocate_leases6(&mut request);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].addr, reserved);
    assert!(request.old_leases.is_empty());
    assert_eq!(fixture.leases.len(), 1);

    // Outside the pools, but still the client's own reservation.
    let mut renew = renew_ctx(&fixture, &subnet, duid(1), Message6Type::Renew);
    let leases = fixture.engine.renew_leases6(&mut renew);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].addr, reserved);
    assert!(renew.old_leases.is_empty());

    Ok(())
}

#[test]
fn test_solicit_is_not_persisted() {
    let subnet = subnet6();
    let fixture = Fixture::new(AddressFamily::Ipv6, CfgHosts::new(), Hooks::new());

    let mut solicit = ctx(&subnet, duid(1), true);
    let leases = fixture.engine.allocate_leases6(&mut solicit);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].addr, v6("2001:db8:1::10"));
    assert!(fixture.leases.is_empty());
}

#[test]
fn test_hint_is_preferred_when_free() {
    let subnet = subnet6();
    let fixture = Fixture::new(AddressFamily::Ipv6, CfgHosts::new(), Hooks::new());
    let hint = v6("2001:db8:1::15");

    let mut request = ctx(&subnet, duid(1), false);
    request.hints.push((hint, 128));
    let leases = fixture.engine.allocate_leases6(&mut request);
    assert_eq!(leases[0].addr, hint);

    // Already leased, so the second client falls back to the pool walk.
    let mut request = ctx(&subnet, duid(2), false);
    request.hints.push((hint, 128));
    let leases = fixture.engine.allocate_leases6(&mut request);
    assert_eq!(leases[0].addr, v6("2001:db8:1::10"));
    assert_eq!(fixture.leases.len(), 2);
}

#[test]
fn test_expired_hint_is_reused() -> Result<(), eyre::Report> {
    let subnet = subnet6();
    let fixture = Fixture::new(AddressFamily::Ipv6, CfgHosts::new(), Hooks::new());
    let hint = v6("2001:db8:1::15");
    fixture.leases.add_lease6(&lease6(hint, duid(9), 3, 60, 3600))?;

    let mut request = ctx(&subnet, duid(1), false);
    request.hints.push((hint, 128));
    let leases = fixture.engine.allocate_leases6(&mut request);
    assert_eq!(leases[0].addr, hint);
    assert_eq!(leases[0].duid, duid(1));
    assert_eq!(request.old_leases.len(), 1);
    assert_eq!(request.old_leases[0].duid, duid(9));

    let stored = fixture.leases.get_lease6(LeaseType::Na, hint)?.unwrap();
    assert_eq!(stored.duid, duid(1));
    assert_eq!(stored.iaid, 1);

    Ok(())
}

#[test]
fn test_prefix_delegation() {
    let mut subnet = Subnet::new(SUBNET_ID, "2001:db8::/48".parse().unwrap());
    subnet
        .add_pool(Pool::new_pd("2001:db8:0:100::/56".parse().unwrap(), 64).unwrap())
        .unwrap();
    let subnet = Arc::new(subnet);
    let fixture = Fixture::new(AddressFamily::Ipv6, CfgHosts::new(), Hooks::new());

    let mut request = ctx(&subnet, duid(1), false);
    request.lease_type = LeaseType::Pd;
    let leases = fixture.engine.allocate_leases6(&mut request);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].addr, v6("2001:db8:0:100::"));
    assert_eq!(leases[0].prefix_len, 64);
    assert_eq!(leases[0].lease_type, LeaseType::Pd);

    let mut request = ctx(&subnet, duid(2), false);
    request.lease_type = LeaseType::Pd;
    let leases = fixture.engine.allocate_leases6(&mut request);
    assert_eq!(leases[0].addr, v6("2001:db8:0:101::"));
}

#[test]
fn test_lease_reserved_for_another_client_is_replaced() -> Result<(), eyre::Report> {
    let subnet = subnet6();
    let taken = v6("2001:db8:1::12");
    let hosts = hosts(vec![reservation(
        HostIdentifier::Duid(duid(1)),
        IPv6Resrv::address(taken),
    )]);
    let fixture = Fixture::new(AddressFamily::Ipv6, hosts, Hooks::new());
    fixture.leases.add_lease6(&lease6(taken, duid(2), 1, 3600, 0))?;

    let mut request = ctx(&subnet, duid(2), false);
    let leases = fixture.engine.allocate_leases6(&mut request);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].addr, v6("2001:db8:1::10"));
    assert!(fixture.leases.get_lease6(LeaseType::Na, taken)?.is_none());

    Ok(())
}

#[test]
fn test_renew_revokes_lease_reserved_for_another_client() -> Result<(), eyre::Report> {
    let subnet = subnet6();
    let taken = v6("2001:db8:1::12");
    let hosts = hosts(vec![reservation(
        HostIdentifier::Duid(duid(1)),
        IPv6Resrv::address(taken),
    )]);
    let fixture = Fixture::new(AddressFamily::Ipv6, hosts, Hooks::new());
    fixture.leases.add_lease6(&lease6(taken, duid(2), 1, 3600, 0))?;

    let mut renew = renew_ctx(&fixture, &subnet, duid(2), Message6Type::Renew);
    let leases = fixture.engine.renew_leases6(&mut renew);
    assert!(leases.is_empty());
    assert_eq!(renew.old_leases.len(), 1);
    assert_eq!(renew.old_leases[0].addr, taken);
    assert!(fixture.leases.is_empty());

    Ok(())
}

#[test]
fn test_last_nonreserved_lease_is_kept() -> Result<(), eyre::Report> {
    let subnet = subnet6();
    let reserved = v6("2001:db8:1::100");
    let hosts = hosts(vec![reservation(
        HostIdentifier::Duid(duid(1)),
        IPv6Resrv::address(reserved),
    )]);
    let fixture = Fixture::new(AddressFamily::Ipv6, hosts, Hooks::new());

    // The reserved address is still held by somebody else.
    fixture.leases.add_lease6(&lease6(reserved, duid(2), 1, 3600, 0))?;
    fixture.leases.add_lease6(&lease6(v6("2001:db8:1::10"), duid(1), 1, 3600, 0))?;
    fixture.leases.add_lease6(&lease6(v6("2001:db8:1::11"), duid(1), 1, 3600, 0))?;

    let mut request = ctx(&subnet, duid(1), false);
    let leases = fixture.engine.allocate_leases6(&mut request);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].addr, v6("2001:db8:1::11"));
    assert_eq!(request.old_leases.len(), 1);
    assert_eq!(request.old_leases[0].addr, v6("2001:db8:1::10"));
    assert!(fixture.leases.get_lease6(LeaseType::Na, v6("2001:db8:1::10"))?.is_none());

    Ok(())
}

#[test]
fn test_returning_client_dns_update() -> Result<(), eyre::Report> {
    let subnet = subnet6();
    let addr = v6("2001:db8:1::10");
    let fixture = Fixture::new(AddressFamily::Ipv6, CfgHosts::new(), Hooks::new());
    fixture.leases.add_lease6(&lease6(addr, duid(1), 1, 3600, 0))?;

    let mut request = ctx(&subnet, duid(1), false);
    request.hostname = "client.example.com".to_string();
    request.fwd_dns_update = true;
    let leases = fixture.engine.allocate_leases6(&mut request);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].hostname, "client.example.com");
    assert_eq!(request.changed_leases.len(), 1);
    assert_eq!(request.changed_leases[0].hostname, "");

    let stored = fixture.leases.get_lease6(LeaseType::Na, addr)?.unwrap();
    assert!(stored.fqdn_fwd);

    Ok(())
}

#[test]
fn test_ambiguous_reservation_yields_nothing() {
    let subnet = subnet6();
    let hosts = hosts(vec![
        reservation(
            HostIdentifier::Duid(duid(1)),
            IPv6Resrv::address(v6("2001:db8:1::100")),
        ),
        reservation(
            HostIdentifier::HwAddress(mac(1)),
            IPv6Resrv::address(v6("2001:db8:1::101")),
        ),
    ]);
    let fixture = Fixture::new(AddressFamily::Ipv6, hosts, Hooks::new());

    let mut request = ctx(&subnet, duid(1), false);
    request.hwaddr = Some(mac(1));
    assert!(fixture.engine.allocate_leases6(&mut request).is_empty());
    assert!(fixture.leases.is_empty());
}

#[test]
fn test_renew_extends_lease() -> Result<(), eyre::Report> {
    let subnet = subnet6();
    let addr = v6("2001:db8:1::10");
    let fixture = Fixture::new(AddressFamily::Ipv6, CfgHosts::new(), Hooks::new());
    fixture.leases.add_lease6(&lease6(addr, duid(1), 1, 60, 30))?;

    let mut renew = renew_ctx(&fixture, &subnet, duid(1), Message6Type::Renew);
    let leases = fixture.engine.renew_leases6(&mut renew);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].valid_lft, subnet.timers().valid);
    assert_eq!(
        fixture.leases.get_lease6(LeaseType::Na, addr)?.unwrap().valid_lft,
        subnet.timers().valid
    );

    Ok(())
}

#[test]
fn test_renew_revokes_lease_outside_pools() -> Result<(), eyre::Report> {
    let subnet = subnet6();
    let stray = v6("2001:db8:1::99");
    let fixture = Fixture::new(AddressFamily::Ipv6, CfgHosts::new(), Hooks::new());
    fixture.leases.add_lease6(&lease6(stray, duid(1), 1, 3600, 0))?;

    let mut renew = renew_ctx(&fixture, &subnet, duid(1), Message6Type::Renew);
    assert!(fixture.engine.renew_leases6(&mut renew).is_empty());
    assert_eq!(renew.old_leases.len(), 1);
    assert_eq!(renew.old_leases[0].addr, stray);
    assert!(fixture.leases.is_empty());

    Ok(())
}

#[test]
fn test_renew_keeps_own_reservation_outside_pools() -> Result<(), eyre::Report> {
    let subnet = subnet6();
    let reserved = v6("2001:db8:1::99");
    let hosts = hosts(vec![reservation(
        HostIdentifier::Duid(duid(1)),
        IPv6Resrv::address(reserved),
    )]);
    let fixture = Fixture::new(AddressFamily::Ipv6, hosts, Hooks::new());
    fixture.leases.add_lease6(&lease6(reserved, duid(1), 1, 60, 30))?;

    // Same address as in test_renew_revokes_lease_outside_pools, but here it
    // is the client's reservation.
    let mut renew = renew_ctx(&fixture, &subnet, duid(1), Message6Type::Renew);
    let leases = fixture.engine.renew_leases6(&mut renew);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].addr, reserved);
    assert_eq!(leases[0].valid_lft, subnet.timers().valid);
    assert!(renew.old_leases.is_empty());
    assert_eq!(
        fixture.leases.get_lease6(LeaseType::Na, reserved)?.unwrap().valid_lft,
        subnet.timers().valid
    );

    Ok(())
}

#[test]
fn test_temporary_request_leaves_reservation_alone() {
    let subnet = subnet6_with_ta("2001:db8:1::20-2001:db8:1::2f");
    let reserved = v6("2001:db8:1::99");
    let hosts = hosts(vec![reservation(
        HostIdentifier::Duid(duid(1)),
        IPv6Resrv::address(reserved),
    )]);
    let fixture = Fixture::new(AddressFamily::Ipv6, hosts, Hooks::new());

    let mut temporary = ctx(&subnet, duid(1), false);
    temporary.iaid = 2;
    temporary.lease_type = LeaseType::Ta;
    let leases = fixture.engine.allocate_leases6(&mut temporary);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].addr, v6("2001:db8:1::20"));
    assert_eq!(leases[0].lease_type, LeaseType::Ta);
    assert!(!leases[0].fixed);

    let mut request = ctx(&subnet, duid(1), false);
    let leases = fixture.engine.allocate_leases6(&mut request);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].addr, reserved);
    assert_eq!(leases[0].lease_type, LeaseType::Na);
    assert!(leases[0].fixed);
    assert_eq!(fixture.leases.len(), 2);
}

#[test]
fn test_offer_skips_address_held_by_another_lease_type() -> Result<(), eyre::Report> {
    // The temporary pool overlaps the non-temporary one.
    let subnet = subnet6_with_ta("2001:db8:1::10-2001:db8:1::1f");
    let fixture = Fixture::new(AddressFamily::Ipv6, CfgHosts::new(), Hooks::new());
    fixture.leases.add_lease6(&lease6(v6("2001:db8:1::10"), duid(9), 1, 3600, 0))?;

    let mut solicit = ctx(&subnet, duid(1), true);
    solicit.lease_type = LeaseType::Ta;
    let leases = fixture.engine.allocate_leases6(&mut solicit);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].addr, v6("2001:db8:1::11"));
    assert_eq!(fixture.leases.len(), 1);

    Ok(())
}

#[test]
fn test_disabled_mode_skips_reservation_lookup() {
    let subnet = subnet_with_mode(
        "2001:db8:1::/64",
        LeaseType::Na,
        "2001:db8:1::10-2001:db8:1::1f",
        ReservationMode::Disabled,
    );
    let hosts = hosts(vec![reservation(
        HostIdentifier::Duid(duid(1)),
        IPv6Resrv::address(v6("2001:db8:1::100")),
    )]);
    let fixture = Fixture::new(AddressFamily::Ipv6, hosts, Hooks::new());

    let mut request = ctx(&subnet, duid(1), false);
    let leases = fixture.engine.allocate_leases6(&mut request);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].addr, v6("2001:db8:1::10"));
    assert!(!leases[0].fixed);
    assert!(request.host.is_none());
}

#[test]
fn test_new_leases_in_renewals() {
    let subnet = subnet6();

    let fixture = Fixture::new(AddressFamily::Ipv6, CfgHosts::new(), Hooks::new());
    let mut renew = renew_ctx(&fixture, &subnet, duid(1), Message6Type::Renew);
    assert!(fixture.engine.renew_leases6(&mut renew).is_empty());
    assert!(fixture.leases.is_empty());

    let config = EngineConfig {
        allow_new_leases_in_renewals: true,
        ..Default::default()
    };
    let fixture =
        Fixture::with_config(AddressFamily::Ipv6, CfgHosts::new(), Hooks::new(), &config);
    let mut renew = renew_ctx(&fixture, &subnet, duid(1), Message6Type::Renew);
    let leases = fixture.engine.renew_leases6(&mut renew);
    assert_eq!(leases.len(), 1);
    assert_eq!(fixture.leases.len(), 1);
}

#[test]
fn test_rebind_and_renew_hooks() -> Result<(), eyre::Report> {
    let subnet = subnet6();
    let addr = v6("2001:db8:1::10");
    let hooks = Hooks::new()
        .on_lease6_rebind(|args| {
            assert_eq!(args.query.map(|query| query.transaction_id), Some(42));
            assert!(args.ia_rsp.is_some());
            let mut lease = args.lease.clone();
            lease.hostname = "rebound".to_string();
            HookAction::Replace(lease)
        })
        .on_lease6_renew(|_| HookAction::Skip);
    let fixture = Fixture::new(AddressFamily::Ipv6, CfgHosts::new(), hooks);
    fixture.leases.add_lease6(&lease6(addr, duid(1), 1, 3600, 0))?;

    let mut rebind = renew_ctx(&fixture, &subnet, duid(1), Message6Type::Rebind);
    let leases = fixture.engine.renew_leases6(&mut rebind);
    assert_eq!(leases[0].hostname, "rebound");
    assert_eq!(fixture.leases.get_lease6(LeaseType::Na, addr)?.unwrap().hostname, "rebound");

    // A skipped renew hands back the lease as it was stored.
    let mut renew = renew_ctx(&fixture, &subnet, duid(1), Message6Type::Renew);
    renew.hostname = "ignored".to_string();
    let leases = fixture.engine.renew_leases6(&mut renew);
    assert_eq!(leases[0].hostname, "rebound");
    assert_eq!(fixture.leases.get_lease6(LeaseType::Na, addr)?.unwrap().hostname, "rebound");

    Ok(())
}
