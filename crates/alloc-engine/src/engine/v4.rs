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
use std::net::{IpAddr, Ipv4Addr};

use chrono::Utc;

use super::AllocEngine;
use crate::context::ClientContext4;
use crate::errors::AllocError;
use crate::hooks::HookOutcome;
use crate::lease::{ClientId, Lease4, LeaseType};
use crate::subnet::Subnet;

enum ClientLease {
    /// A lease owned by a client we cannot tell apart from this one.
    Conflict,
    Found(Option<Lease4>),
}

impl AllocEngine {
    /// Offer (discover) or assign (request) an IPv4 lease, depending on
    /// `ctx.fake_allocation`.
    ///
    /// Returns `None` when no lease can be given to the client. Faults are
    /// logged here and never returned.
    pub fn allocate_lease4(&self, ctx: &mut ClientContext4) -> Option<Lease4> {
        ctx.old_lease = None;
        ctx.conflicting_lease = None;

        match self.try_allocate_lease4(ctx) {
            Ok(Some(lease)) => Some(lease),
            Ok(None) => {
                tracing::warn!(
                    hwaddr = ?ctx.hwaddr,
                    client_id = ?ctx.client_id,
                    attempts = ?ctx
                        .subnet
                        .as_deref()
                        .map(|subnet| self.max_attempts(subnet, LeaseType::V4)),
                    "Failed to allocate an IPv4 address"
                );
                None
            }
            Err(e) if e.is_ambiguous_reservation() => {
                tracing::error!(
                    hwaddr = ?ctx.hwaddr,
                    client_id = ?ctx.client_id,
                    error = %e,
                    "Host reservations are misconfigured, not allocating"
                );
                None
            }
            Err(e) => {
                tracing::error!(
                    hwaddr = ?ctx.hwaddr,
                    client_id = ?ctx.client_id,
                    error = %e,
                    "IPv4 allocation failed"
                );
                None
            }
        }
    }

    fn try_allocate_lease4(&self, ctx: &mut ClientContext4) -> Result<Option<Lease4>, AllocError> {
        let subnet = ctx.subnet.clone().ok_or(AllocError::MissingArgument(
            "Can't allocate IPv4 address without subnet",
        ))?;
        if ctx.hwaddr.is_none() {
            return Err(AllocError::MissingArgument("HWAddr must be defined"));
        }

        self.find_reservation4(ctx)?;

        if ctx.fake_allocation {
            self.discover_lease4(ctx, &subnet)
        } else {
            self.request_lease4(ctx, &subnet)
        }
    }

    /// Resolve the client's reservation into `ctx.host`.
    pub fn find_reservation4(&self, ctx: &mut ClientContext4) -> Result<(), AllocError> {
        ctx.host = None;
        let Some(subnet) = ctx.subnet.as_deref() else {
            return Ok(());
        };
        if !subnet.reservation_mode().enabled() {
            return Ok(());
        }
        if ctx.hwaddr.is_some() || ctx.client_id.is_some() {
            ctx.host = self.host_store.get4(
                subnet.id(),
                ctx.hwaddr.as_ref(),
                ctx.client_id.as_ref(),
            )?;
        }
        Ok(())
    }

    fn discover_lease4(
        &self,
        ctx: &mut ClientContext4,
        subnet: &Subnet,
    ) -> Result<Option<Lease4>, AllocError> {
        let client_lease = match self.match_client_lease(ctx, subnet)? {
            ClientLease::Conflict => return Ok(None),
            ClientLease::Found(lease) => lease,
        };
        let in_pool_checked = subnet.reservation_mode().checks_in_pool();
        let mut new_lease = None;

        if let Some(reserved) = reserved_address(ctx) {
            new_lease = match &client_lease {
                Some(lease) if lease.addr == reserved => {
                    Some(self.renew_lease4(ctx, subnet, lease.clone())?)
                }
                _ => self.allocate_or_reuse_lease4(reserved, ctx, subnet)?,
            };
        }

        if new_lease.is_none()
            && let Some(lease) = &client_lease
            && subnet.in_pool(LeaseType::V4, IpAddr::V4(lease.addr))
            && !(in_pool_checked && self.address_reserved4(ctx, subnet, lease.addr)?)
        {
            new_lease = Some(self.renew_lease4(ctx, subnet, lease.clone())?);
        }

        let requested = ctx.requested_address;
        if new_lease.is_none()
            && !requested.is_unspecified()
            && subnet.in_pool(LeaseType::V4, IpAddr::V4(requested))
            && !(in_pool_checked && self.address_reserved4(ctx, subnet, requested)?)
        {
            new_lease = self.allocate_or_reuse_lease4(requested, ctx, subnet)?;
        }

        if new_lease.is_none() {
            new_lease = self.allocate_unreserved_lease4(ctx, subnet)?;
        }

        if ctx.old_lease.is_none() {
            ctx.old_lease = client_lease;
        }
        Ok(new_lease)
    }

    fn request_lease4(
        &self,
        ctx: &mut ClientContext4,
        subnet: &Subnet,
    ) -> Result<Option<Lease4>, AllocError> {
        let client_lease = match self.match_client_lease(ctx, subnet)? {
            ClientLease::Conflict => return Ok(None),
            ClientLease::Found(lease) => lease,
        };
        let reserved = reserved_address(ctx);

        let mut target = ctx.requested_address;
        if target.is_unspecified()
            && let Some(reserved) = reserved
        {
            target = reserved;
        }

        if !target.is_unspecified() {
            if self.address_reserved4(ctx, subnet, target)? {
                tracing::debug!(address = %target, "Requested address is reserved for another client");
                return Ok(None);
            }

            if let Some(reserved) = reserved
                && reserved != target
            {
                // The client must come back for its reserved address unless
                // somebody else currently holds it.
                let holder = self.lease_store.get_lease4(reserved)?;
                if holder.is_none_or(|lease| lease.expired()) {
                    tracing::debug!(
                        address = %target,
                        reserved = %reserved,
                        "Rejecting request for non-reserved address while the reservation is free"
                    );
                    return Ok(None);
                }
            }

            if reserved != Some(target) && !subnet.in_pool(LeaseType::V4, IpAddr::V4(target)) {
                tracing::debug!(address = %target, "Requested address is outside the dynamic pools");
                return Ok(None);
            }
        }

        if let Some(lease) = &client_lease
            && (lease.addr == target || target.is_unspecified())
        {
            return self.renew_lease4(ctx, subnet, lease.clone()).map(Some);
        }

        let new_lease = if target.is_unspecified() {
            self.allocate_unreserved_lease4(ctx, subnet)?
        } else {
            self.allocate_or_reuse_lease4(target, ctx, subnet)?
        };

        if new_lease.is_some()
            && let Some(previous) = client_lease
        {
            self.lease_store.delete_lease(IpAddr::V4(previous.addr))?;
            ctx.old_lease = Some(previous);
        }
        Ok(new_lease)
    }

    // Look up the client's lease by hardware address first and by client id
    // second.
    fn match_client_lease(
        &self,
        ctx: &ClientContext4,
        subnet: &Subnet,
    ) -> Result<ClientLease, AllocError> {
        let mut client_lease = match &ctx.hwaddr {
            Some(hwaddr) => self.lease_store.get_lease4_by_hwaddr(hwaddr, subnet.id())?,
            None => None,
        };

        if let Some(client_id) = &ctx.client_id
            && client_lease.as_ref().is_none_or(|lease| !ctx.my_lease(lease))
        {
            if let Some(lease) = &client_lease
                && ctx.is_in_conflict(lease)
            {
                return Ok(ClientLease::Conflict);
            }
            client_lease = self.lease_store.get_lease4_by_client_id(client_id, subnet.id())?;
        }

        if let Some(lease) = &client_lease
            && !ctx.my_lease(lease)
        {
            if ctx.is_in_conflict(lease) {
                tracing::debug!(address = %lease.addr, "Lease belongs to a conflicting client");
                return Ok(ClientLease::Conflict);
            }
            client_lease = None;
        }
        Ok(ClientLease::Found(client_lease))
    }

    // True when `addr` is reserved for a client other than this one.
    fn address_reserved4(
        &self,
        ctx: &ClientContext4,
        subnet: &Subnet,
        addr: Ipv4Addr,
    ) -> Result<bool, AllocError> {
        if !subnet.reservation_mode().enabled() {
            return Ok(false);
        }
        let host = self.host_store.get4_by_address(subnet.id(), addr)?;
        Ok(host.is_some_and(|host| !host.matches_client4(ctx.hwaddr.as_ref(), ctx.client_id.as_ref())))
    }

    fn allocate_unreserved_lease4(
        &self,
        ctx: &mut ClientContext4,
        subnet: &Subnet,
    ) -> Result<Option<Lease4>, AllocError> {
        let allocator = self.allocator(LeaseType::V4)?;
        let check_reservations = subnet.reservation_mode().checks_candidates();
        let hint = IpAddr::V4(ctx.requested_address);

        for _ in 0..self.max_attempts(subnet, LeaseType::V4) {
            let identifier = ctx.client_id.as_ref().map(ClientId::as_bytes);
            let IpAddr::V4(candidate) = allocator.pick_address(subnet, identifier, hint)? else {
                return Err(AllocError::Internal(
                    "IPv4 allocator returned an IPv6 candidate".to_string(),
                ));
            };
            if check_reservations && self.address_reserved4(ctx, subnet, candidate)? {
                continue;
            }
            if let Some(lease) = self.allocate_or_reuse_lease4(candidate, ctx, subnet)? {
                return Ok(Some(lease));
            }
        }
        Ok(None)
    }

    fn allocate_or_reuse_lease4(
        &self,
        candidate: Ipv4Addr,
        ctx: &mut ClientContext4,
        subnet: &Subnet,
    ) -> Result<Option<Lease4>, AllocError> {
        ctx.conflicting_lease = None;
        match self.lease_store.get_lease4(candidate)? {
            Some(existing) if existing.expired() => {
                ctx.old_lease = Some(existing.clone());
                self.reuse_expired_lease4(ctx, subnet, existing)
            }
            Some(existing) => {
                ctx.conflicting_lease = Some(existing);
                Ok(None)
            }
            None => self.create_lease4(ctx, subnet, candidate),
        }
    }

    fn create_lease4(
        &self,
        ctx: &ClientContext4,
        subnet: &Subnet,
        addr: Ipv4Addr,
    ) -> Result<Option<Lease4>, AllocError> {
        if ctx.hwaddr.is_none() {
            return Err(AllocError::InvalidArgument(
                "Can't create a lease with NULL HW address".to_string(),
            ));
        }
        let timers = subnet.timers();
        let lease = Lease4 {
            addr,
            hwaddr: ctx.hwaddr,
            client_id: ctx.client_id.clone(),
            valid_lft: timers.valid,
            t1: timers.t1,
            t2: timers.t2,
            cltt: Utc::now(),
            subnet_id: subnet.id(),
            fixed: reserved_address(ctx) == Some(addr),
            hostname: ctx.hostname.clone(),
            fqdn_fwd: ctx.fwd_dns_update,
            fqdn_rev: ctx.rev_dns_update,
        };

        let lease = match self.hooks.lease4_select(subnet, ctx.fake_allocation, lease) {
            HookOutcome::Proceed(lease) => lease,
            HookOutcome::Skip => {
                tracing::debug!(address = %addr, "Lease4 select callout skipped lease creation");
                return Ok(None);
            }
        };

        if ctx.fake_allocation {
            // Offers are never persisted; only report whether it is free.
            return Ok(self.lease_store.get_lease4(lease.addr)?.is_none().then_some(lease));
        }

        match self.lease_store.add_lease4(&lease) {
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

    fn renew_lease4(
        &self,
        ctx: &mut ClientContext4,
        subnet: &Subnet,
        mut lease: Lease4,
    ) -> Result<Lease4, AllocError> {
        let snapshot = lease.clone();
        ctx.old_lease = Some(snapshot.clone());
        update_lease4_information(&mut lease, ctx, subnet);

        match self.hooks.lease4_renew(
            subnet,
            ctx.client_id.as_ref(),
            ctx.hwaddr.as_ref(),
            ctx.fake_allocation,
            lease,
        ) {
            HookOutcome::Proceed(lease) => {
                if !ctx.fake_allocation {
                    self.lease_store.update_lease4(&lease)?;
                }
                Ok(lease)
            }
            HookOutcome::Skip => {
                tracing::debug!(address = %snapshot.addr, "Lease4 renew callout skipped the update");
                Ok(snapshot)
            }
        }
    }

    fn reuse_expired_lease4(
        &self,
        ctx: &ClientContext4,
        subnet: &Subnet,
        mut expired: Lease4,
    ) -> Result<Option<Lease4>, AllocError> {
        if !expired.expired() {
            return Err(AllocError::InvalidArgument(format!(
                "Attempt to recycle lease {} that is still valid",
                expired.addr
            )));
        }
        update_lease4_information(&mut expired, ctx, subnet);
        expired.fixed = false;

        let lease = match self.hooks.lease4_select(subnet, ctx.fake_allocation, expired) {
            HookOutcome::Proceed(lease) => lease,
            HookOutcome::Skip => {
                tracing::debug!("Lease4 select callout skipped reuse of an expired lease");
                return Ok(None);
            }
        };

        if !ctx.fake_allocation {
            self.lease_store.update_lease4(&lease)?;
        }
        Ok(Some(lease))
    }
}

fn reserved_address(ctx: &ClientContext4) -> Option<Ipv4Addr> {
    ctx.host
        .as_ref()
        .filter(|host| host.has_ipv4_reservation())
        .map(|host| host.ipv4_reservation)
}

fn update_lease4_information(lease: &mut Lease4, ctx: &ClientContext4, subnet: &Subnet) {
    let timers = subnet.timers();
    lease.subnet_id = subnet.id();
    lease.hwaddr = ctx.hwaddr;
    lease.client_id = ctx.client_id.clone();
    lease.cltt = Utc::now();
    lease.t1 = timers.t1;
    lease.t2 = timers.t2;
    lease.valid_lft = timers.valid;
    lease.fqdn_fwd = ctx.fwd_dns_update;
    lease.fqdn_rev = ctx.rev_dns_update;
    lease.hostname = ctx.hostname.clone();
}
