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
use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;

use chrono::Utc;

use super::AllocEngine;
use crate::context::ClientContext6;
use crate::errors::AllocError;
use crate::hooks::HookOutcome;
use crate::host::{Host, IPv6Resrv, IPv6ResrvType};
use crate::lease::{Duid, Lease6, LeaseType};
use crate::subnet::Subnet;

impl AllocEngine {
    /// Allocate (or, for a solicit, offer) leases for one identity
    /// association of the client.
    ///
    /// Existing leases and host reservations are reconciled first; the
    /// dynamic pools are only consulted when that leaves the client with
    /// nothing. An empty result means no lease is available; faults are
    /// logged here and never returned.
    pub fn allocate_leases6(&self, ctx: &mut ClientContext6) -> Vec<Lease6> {
        let result = self.try_allocate_leases6(ctx);
        self.finish6(ctx, result, "allocate")
    }

    /// Extend the client's leases for a renew or rebind.
    ///
    /// Leases that no longer fit the subnet's pools are removed and end up in
    /// `ctx.old_leases` instead of the returned set.
    pub fn renew_leases6(&self, ctx: &mut ClientContext6) -> Vec<Lease6> {
        let result = self.try_renew_leases6(ctx);
        self.finish6(ctx, result, "renew")
    }

    fn finish6(
        &self,
        ctx: &ClientContext6,
        result: Result<Vec<Lease6>, AllocError>,
        operation: &'static str,
    ) -> Vec<Lease6> {
        match result {
            Ok(leases) => {
                if leases.is_empty() {
                    tracing::warn!(
                        operation,
                        duid = ?ctx.duid,
                        iaid = ctx.iaid,
                        lease_type = %ctx.lease_type,
                        attempts = ?ctx
                            .subnet
                            .as_deref()
                            .map(|subnet| self.max_attempts(subnet, ctx.lease_type)),
                        "Failed to allocate an IPv6 lease"
                    );
                }
                leases
            }
            Err(e) if e.is_ambiguous_reservation() => {
                tracing::error!(
                    operation,
                    duid = ?ctx.duid,
                    hwaddr = ?ctx.hwaddr,
                    error = %e,
                    "Host reservations are misconfigured, not allocating"
                );
                Vec::new()
            }
            Err(e) => {
                tracing::error!(
                    operation,
                    duid = ?ctx.duid,
                    iaid = ctx.iaid,
                    lease_type = %ctx.lease_type,
                    error = %e,
                    "IPv6 allocation failed"
                );
                Vec::new()
            }
        }
    }

    fn required6(ctx: &ClientContext6) -> Result<(Arc<Subnet>, Duid), AllocError> {
        let subnet = ctx.subnet.clone().ok_or(AllocError::MissingArgument(
            "Subnet is required for IPv6 lease allocation",
        ))?;
        let duid = ctx.duid.clone().ok_or(AllocError::MissingArgument(
            "DUID is mandatory for IPv6 lease allocation",
        ))?;
        Ok((subnet, duid))
    }

    fn try_allocate_leases6(&self, ctx: &mut ClientContext6) -> Result<Vec<Lease6>, AllocError> {
        let (subnet, duid) = Self::required6(ctx)?;
        ctx.host = self.find_reservation6(ctx, &subnet, &duid)?;

        let mut leases =
            self.lease_store
                .get_leases6(ctx.lease_type, &duid, ctx.iaid, subnet.id())?;

        match (leases.is_empty(), ctx.host.is_some()) {
            // Fresh client with a reservation.
            (true, true) => {
                self.allocate_reserved_leases6(ctx, &subnet, &duid, &mut leases)?;
                if !leases.is_empty() {
                    return Ok(leases);
                }
            }
            // Returning client without a reservation.
            (false, false) => {
                self.remove_nonmatching_reserved_leases6(ctx, &subnet, &mut leases)?;
                if !leases.is_empty() {
                    return self.update_fqdn_data(ctx, leases);
                }
            }
            // Returning client with a reservation.
            (false, true) => {
                self.allocate_reserved_leases6(ctx, &subnet, &duid, &mut leases)?;
                self.remove_nonmatching_reserved_leases6(ctx, &subnet, &mut leases)?;
                self.remove_nonreserved_leases6(ctx, &mut leases)?;
                if !leases.is_empty() {
                    return Ok(leases);
                }
            }
            (true, false) => {}
        }

        self.allocate_unreserved_leases6(ctx, &subnet, &duid)
    }

    fn try_renew_leases6(&self, ctx: &mut ClientContext6) -> Result<Vec<Lease6>, AllocError> {
        let (subnet, duid) = Self::required6(ctx)?;
        ctx.host = self.find_reservation6(ctx, &subnet, &duid)?;

        let mut leases =
            self.lease_store
                .get_leases6(ctx.lease_type, &duid, ctx.iaid, subnet.id())?;

        if !leases.is_empty() {
            self.remove_nonmatching_reserved_leases6(ctx, &subnet, &mut leases)?;
        }
        if ctx.host.is_some() {
            self.allocate_reserved_leases6(ctx, &subnet, &duid, &mut leases)?;
            self.remove_nonreserved_leases6(ctx, &mut leases)?;
        }
        if leases.is_empty() && ctx.allow_new_leases_in_renewals {
            leases = self.allocate_unreserved_leases6(ctx, &subnet, &duid)?;
        }

        let mut extended = Vec::with_capacity(leases.len());
        for lease in leases {
            if let Some(lease) = self.extend_lease6(ctx, &subnet, lease)? {
                extended.push(lease);
            }
        }
        Ok(extended)
    }

    fn find_reservation6(
        &self,
        ctx: &ClientContext6,
        subnet: &Subnet,
        duid: &Duid,
    ) -> Result<Option<Arc<Host>>, AllocError> {
        if !subnet.reservation_mode().enabled() {
            return Ok(None);
        }
        Ok(self
            .host_store
            .get6(subnet.id(), Some(duid), ctx.hwaddr.as_ref())?)
    }

    // Create a lease for every reservation of the requested kind that is
    // neither held by the client already nor leased to anybody else.
    fn allocate_reserved_leases6(
        &self,
        ctx: &mut ClientContext6,
        subnet: &Subnet,
        duid: &Duid,
        leases: &mut Vec<Lease6>,
    ) -> Result<(), AllocError> {
        let (Some(host), Some(kind)) = (ctx.host.clone(), reservation_kind(ctx.lease_type)) else {
            return Ok(());
        };

        for resrv in host.ipv6_reservations_of(kind) {
            if leases
                .iter()
                .any(|lease| lease.addr == resrv.prefix && lease.valid_lft != 0)
            {
                continue;
            }
            if self.address_leased6(resrv.prefix)? {
                continue;
            }
            if let Some(lease) =
                self.create_lease6(ctx, subnet, duid, resrv.prefix, resrv.prefix_len)?
            {
                tracing::info!(
                    reservation = %resrv,
                    duid = %duid,
                    iaid = ctx.iaid,
                    "Granted reserved lease"
                );
                leases.push(lease);
            }
        }
        Ok(())
    }

    // Drop leases for addresses that are now reserved for another client.
    fn remove_nonmatching_reserved_leases6(
        &self,
        ctx: &mut ClientContext6,
        subnet: &Subnet,
        leases: &mut Vec<Lease6>,
    ) -> Result<(), AllocError> {
        if leases.is_empty() || !subnet.reservation_mode().enabled() {
            return Ok(());
        }

        let mut kept = Vec::with_capacity(leases.len());
        for lease in leases.drain(..) {
            let holder = self.host_store.get6_by_address(subnet.id(), lease.addr)?;
            let reserved_for_other = holder
                .is_some_and(|holder| ctx.host.as_deref() != Some(holder.as_ref()));
            if !reserved_for_other {
                kept.push(lease);
                continue;
            }
            tracing::info!(
                address = %lease.addr,
                duid = %lease.duid,
                "Revoking lease reserved for another client"
            );
            self.lease_store.delete_lease(IpAddr::V6(lease.addr))?;
            ctx.old_leases.push(lease);
        }
        *leases = kept;
        Ok(())
    }

    // Drop leases that match none of the client's reservations. The last
    // remaining lease survives once at least two existed.
    fn remove_nonreserved_leases6(
        &self,
        ctx: &mut ClientContext6,
        leases: &mut Vec<Lease6>,
    ) -> Result<(), AllocError> {
        let (Some(host), Some(kind)) = (ctx.host.clone(), reservation_kind(ctx.lease_type)) else {
            return Ok(());
        };
        if leases.is_empty() || !host.has_ipv6_reservation() {
            return Ok(());
        }
        let mut total = leases.len();
        let mut removed = vec![false; leases.len()];

        for (idx, lease) in leases.iter().enumerate() {
            let resrv = IPv6Resrv {
                kind,
                prefix: lease.addr,
                prefix_len: lease.prefix_len,
            };
            if host.has_reservation(&resrv) {
                continue;
            }
            tracing::info!(
                address = %lease.addr,
                duid = %lease.duid,
                "Revoking lease not covered by the client's reservations"
            );
            self.lease_store.delete_lease(IpAddr::V6(lease.addr))?;
            ctx.old_leases.push(lease.clone());
            removed[idx] = true;

            total -= 1;
            if total == 1 {
                break;
            }
        }

        let mut removed = removed.into_iter();
        leases.retain(|_| !removed.next().unwrap_or(false));
        Ok(())
    }

    // Copies of the leases carrying the context's DNS data. On commit,
    // leases whose DNS data changed are written back and their previous
    // state kept in `ctx.changed_leases`.
    fn update_fqdn_data(
        &self,
        ctx: &mut ClientContext6,
        leases: Vec<Lease6>,
    ) -> Result<Vec<Lease6>, AllocError> {
        let mut updated_leases = Vec::with_capacity(leases.len());
        for original in leases {
            let mut lease = original.clone();
            lease.hostname = ctx.hostname.clone();
            lease.fqdn_fwd = ctx.fwd_dns_update;
            lease.fqdn_rev = ctx.rev_dns_update;

            if !ctx.fake_allocation && lease.fqdn_differs(&original) {
                self.lease_store.update_lease6(&lease)?;
                ctx.changed_leases.push(original);
            }
            updated_leases.push(lease);
        }
        Ok(updated_leases)
    }

    fn allocate_unreserved_leases6(
        &self,
        ctx: &mut ClientContext6,
        subnet: &Subnet,
        duid: &Duid,
    ) -> Result<Vec<Lease6>, AllocError> {
        let allocator = self.allocator(ctx.lease_type)?;
        let mode = subnet.reservation_mode();
        let hint = ctx
            .hints
            .first()
            .map(|(addr, _)| *addr)
            .unwrap_or(Ipv6Addr::UNSPECIFIED);

        if !hint.is_unspecified()
            && let Some(pool) = subnet.pool(ctx.lease_type, IpAddr::V6(hint))
        {
            let prefix_len = pool.prefix_len();
            let reserved = mode.checks_in_pool()
                && self.host_store.get6_by_address(subnet.id(), hint)?.is_some();

            if !reserved {
                match self.lease_store.get_lease6(ctx.lease_type, hint)? {
                    None => {
                        if let Some(lease) = self.create_lease6(ctx, subnet, duid, hint, prefix_len)? {
                            return Ok(vec![lease]);
                        }
                    }
                    Some(existing) if existing.expired() => {
                        let previous = existing.clone();
                        if let Some(lease) =
                            self.reuse_expired_lease6(ctx, subnet, duid, existing, prefix_len)?
                        {
                            ctx.old_leases.push(previous);
                            return Ok(vec![lease]);
                        }
                    }
                    Some(_) => {}
                }
            }
        }

        for _ in 0..self.max_attempts(subnet, ctx.lease_type) {
            let IpAddr::V6(candidate) =
                allocator.pick_address(subnet, Some(duid.as_bytes()), IpAddr::V6(hint))?
            else {
                return Err(AllocError::Internal(
                    "IPv6 allocator returned an IPv4 candidate".to_string(),
                ));
            };

            if mode.checks_candidates()
                && self.host_store.get6_by_address(subnet.id(), candidate)?.is_some()
            {
                continue;
            }

            let prefix_len = match ctx.lease_type {
                LeaseType::Pd => subnet
                    .pool(LeaseType::Pd, IpAddr::V6(candidate))
                    .map(|pool| pool.prefix_len())
                    .ok_or_else(|| {
                        AllocError::Internal(format!(
                            "Candidate prefix {candidate} does not belong to any prefix pool"
                        ))
                    })?,
                _ => 128,
            };

            match self.lease_store.get_lease6(ctx.lease_type, candidate)? {
                None => {
                    if let Some(lease) =
                        self.create_lease6(ctx, subnet, duid, candidate, prefix_len)?
                    {
                        ctx.old_leases.clear();
                        return Ok(vec![lease]);
                    }
                }
                Some(existing) if existing.expired() => {
                    let previous = existing.clone();
                    if let Some(lease) =
                        self.reuse_expired_lease6(ctx, subnet, duid, existing, prefix_len)?
                    {
                        ctx.old_leases.push(previous);
                        return Ok(vec![lease]);
                    }
                }
                Some(_) => {}
            }
        }
        Ok(Vec::new())
    }

    fn create_lease6(
        &self,
        ctx: &ClientContext6,
        subnet: &Subnet,
        duid: &Duid,
        addr: Ipv6Addr,
        prefix_len: u8,
    ) -> Result<Option<Lease6>, AllocError> {
        let prefix_len = if ctx.lease_type == LeaseType::Pd {
            prefix_len
        } else {
            128
        };
        let timers = subnet.timers();
        let lease = Lease6 {
            addr,
            prefix_len,
            lease_type: ctx.lease_type,
            duid: duid.clone(),
            iaid: ctx.iaid,
            preferred_lft: timers.preferred,
            valid_lft: timers.valid,
            t1: timers.t1,
            t2: timers.t2,
            cltt: Utc::now(),
            subnet_id: subnet.id(),
            hwaddr: ctx.hwaddr,
            fixed: reserved_for_client(ctx, addr, prefix_len),
            hostname: ctx.hostname.clone(),
            fqdn_fwd: ctx.fwd_dns_update,
            fqdn_rev: ctx.rev_dns_update,
        };

        let lease = match self.hooks.lease6_select(subnet, ctx.fake_allocation, lease) {
            HookOutcome::Proceed(lease) => lease,
            HookOutcome::Skip => {
                tracing::debug!(address = %addr, "Lease6 select callout skipped lease creation");
                return Ok(None);
            }
        };

        if ctx.fake_allocation {
            // Offers are never persisted; only report whether it is free.
            return Ok((!self.address_leased6(lease.addr)?).then_some(lease));
        }

        match self.lease_store.add_lease6(&lease) {
            Ok(true) => Ok(Some(lease)),
            Ok(false) => {
                tracing::debug!(address = %lease.addr, "Lease already taken by another client");
                Ok(None)
            }
            Err(e) => {
                tracing::debug!(address = %lease.addr, error = %e, "Failed to add lease");
                Ok(None)
            }
        }
    }

    fn reuse_expired_lease6(
        &self,
        ctx: &ClientContext6,
        subnet: &Subnet,
        duid: &Duid,
        mut expired: Lease6,
        prefix_len: u8,
    ) -> Result<Option<Lease6>, AllocError> {
        if !expired.expired() {
            return Err(AllocError::InvalidArgument(format!(
                "Attempt to recycle lease {} that is still valid",
                expired.addr
            )));
        }

        let timers = subnet.timers();
        expired.prefix_len = if expired.lease_type == LeaseType::Pd {
            prefix_len
        } else {
            128
        };
        expired.duid = duid.clone();
        expired.iaid = ctx.iaid;
        expired.subnet_id = subnet.id();
        expired.hwaddr = ctx.hwaddr;
        expired.cltt = Utc::now();
        expired.preferred_lft = timers.preferred;
        expired.valid_lft = timers.valid;
        expired.t1 = timers.t1;
        expired.t2 = timers.t2;
        expired.fixed = false;
        expired.hostname = ctx.hostname.clone();
        expired.fqdn_fwd = ctx.fwd_dns_update;
        expired.fqdn_rev = ctx.rev_dns_update;

        let lease = match self.hooks.lease6_select(subnet, ctx.fake_allocation, expired) {
            HookOutcome::Proceed(lease) => lease,
            HookOutcome::Skip => {
                tracing::debug!("Lease6 select callout skipped reuse of an expired lease");
                return Ok(None);
            }
        };

        if !ctx.fake_allocation {
            self.lease_store.update_lease6(&lease)?;
        }
        Ok(Some(lease))
    }

    // True when a lease of any type holds `addr`. The store keys leases on
    // the address alone, so a lease of another type still blocks `add`.
    fn address_leased6(&self, addr: Ipv6Addr) -> Result<bool, AllocError> {
        for lease_type in [LeaseType::Na, LeaseType::Ta, LeaseType::Pd] {
            if self.lease_store.get_lease6(lease_type, addr)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // Returns `None` when the lease was revoked instead of extended.
    fn extend_lease6(
        &self,
        ctx: &mut ClientContext6,
        subnet: &Subnet,
        mut lease: Lease6,
    ) -> Result<Option<Lease6>, AllocError> {
        if !subnet.in_pool(lease.lease_type, IpAddr::V6(lease.addr))
            && !reserved_for_client(ctx, lease.addr, lease.prefix_len)
        {
            tracing::info!(
                address = %lease.addr,
                subnet_id = subnet.id(),
                "Revoking lease that no longer belongs to the subnet pools"
            );
            self.lease_store.delete_lease(IpAddr::V6(lease.addr))?;
            ctx.old_leases.push(lease);
            return Ok(None);
        }

        let snapshot = lease.clone();
        let timers = subnet.timers();
        lease.preferred_lft = timers.preferred;
        lease.valid_lft = timers.valid;
        lease.t1 = timers.t1;
        lease.t2 = timers.t2;
        lease.cltt = Utc::now();
        lease.hwaddr = ctx.hwaddr;
        lease.hostname = ctx.hostname.clone();
        lease.fqdn_fwd = ctx.fwd_dns_update;
        lease.fqdn_rev = ctx.rev_dns_update;

        match self.hooks.lease6_extend(
            ctx.is_rebind(),
            subnet,
            ctx.query.as_ref(),
            ctx.ia_rsp.as_ref(),
            lease,
        ) {
            HookOutcome::Proceed(lease) => {
                self.lease_store.update_lease6(&lease)?;
                Ok(Some(lease))
            }
            HookOutcome::Skip => {
                tracing::debug!(address = %snapshot.addr, "Lease6 extend callout skipped the update");
                Ok(Some(snapshot))
            }
        }
    }
}

// Temporary addresses are never reserved.
fn reservation_kind(lease_type: LeaseType) -> Option<IPv6ResrvType> {
    match lease_type {
        LeaseType::Na => Some(IPv6ResrvType::Na),
        LeaseType::Pd => Some(IPv6ResrvType::Pd),
        LeaseType::Ta | LeaseType::V4 => None,
    }
}

fn reserved_for_client(ctx: &ClientContext6, addr: Ipv6Addr, prefix_len: u8) -> bool {
    let Some(kind) = reservation_kind(ctx.lease_type) else {
        return false;
    };
    ctx.host.as_ref().is_some_and(|host| {
        host.has_reservation(&IPv6Resrv {
            kind,
            prefix: addr,
            prefix_len,
        })
    })
}
