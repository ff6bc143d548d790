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

//! Policy callouts invoked by the engine at fixed points of a decision.
//!
//! Callouts are registered when the engine is built and run synchronously,
//! in registration order. Each one sees the candidate lease as left by the
//! previous callout and answers with a [`HookAction`]:
//!
//! - `Continue` keeps the candidate as it is;
//! - `Replace(lease)` substitutes the candidate for the following callouts
//!   and for the engine;
//! - `Skip` stops the chain and tells the engine not to perform its default
//!   action (persisting a new lease, extending an existing one).

use std::fmt::{self, Display};

use mac_address::MacAddress;

use crate::context::{IaResponse, Query6};
use crate::lease::{ClientId, Lease4, Lease6};
use crate::subnet::Subnet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    Lease4Select,
    Lease4Renew,
    Lease6Select,
    Lease6Renew,
    Lease6Rebind,
}

impl Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookPoint::Lease4Select => "lease4_select",
            HookPoint::Lease4Renew => "lease4_renew",
            HookPoint::Lease6Select => "lease6_select",
            HookPoint::Lease6Renew => "lease6_renew",
            HookPoint::Lease6Rebind => "lease6_rebind",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookAction<L> {
    Continue,
    Replace(L),
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HookOutcome<L> {
    Proceed(L),
    Skip,
}

#[derive(Debug)]
pub struct Lease4SelectArgs<'a> {
    pub subnet: &'a Subnet,
    pub fake_allocation: bool,
    pub lease: &'a Lease4,
}

#[derive(Debug)]
pub struct Lease4RenewArgs<'a> {
    pub subnet: &'a Subnet,
    pub client_id: Option<&'a ClientId>,
    pub hwaddr: Option<&'a MacAddress>,
    pub fake_allocation: bool,
    pub lease: &'a Lease4,
}

#[derive(Debug)]
pub struct Lease6SelectArgs<'a> {
    pub subnet: &'a Subnet,
    pub fake_allocation: bool,
    pub lease: &'a Lease6,
}

/// Shared by the renew and rebind points.
#[derive(Debug)]
pub struct Lease6ExtendArgs<'a> {
    pub subnet: &'a Subnet,
    pub query: Option<&'a Query6>,
    pub lease: &'a Lease6,
    pub ia_rsp: Option<&'a IaResponse>,
}

pub type Lease4SelectCallout = Box<dyn Fn(&Lease4SelectArgs<'_>) -> HookAction<Lease4> + Send + Sync>;
pub type Lease4RenewCallout = Box<dyn Fn(&Lease4RenewArgs<'_>) -> HookAction<Lease4> + Send + Sync>;
pub type Lease6SelectCallout = Box<dyn Fn(&Lease6SelectArgs<'_>) -> HookAction<Lease6> + Send + Sync>;
pub type Lease6ExtendCallout = Box<dyn Fn(&Lease6ExtendArgs<'_>) -> HookAction<Lease6> + Send + Sync>;

#[derive(Default)]
pub struct Hooks {
    lease4_select: Vec<Lease4SelectCallout>,
    lease4_renew: Vec<Lease4RenewCallout>,
    lease6_select: Vec<Lease6SelectCallout>,
    lease6_renew: Vec<Lease6ExtendCallout>,
    lease6_rebind: Vec<Lease6ExtendCallout>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("lease4_select", &self.lease4_select.len())
            .field("lease4_renew", &self.lease4_renew.len())
            .field("lease6_select", &self.lease6_select.len())
            .field("lease6_renew", &self.lease6_renew.len())
            .field("lease6_rebind", &self.lease6_rebind.len())
            .finish()
    }
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_lease4_select<F>(mut self, callout: F) -> Self
    where
        F: Fn(&Lease4SelectArgs<'_>) -> HookAction<Lease4> + Send + Sync + 'static,
    {
        self.lease4_select.push(Box::new(callout));
        self
    }

    pub fn on_lease4_renew<F>(mut self, callout: F) -> Self
    where
        F: Fn(&Lease4RenewArgs<'_>) -> HookAction<Lease4> + Send + Sync + 'static,
    {
        self.lease4_renew.push(Box::new(callout));
        self
    }

    pub fn on_lease6_select<F>(mut self, callout: F) -> Self
    where
        F: Fn(&Lease6SelectArgs<'_>) -> HookAction<Lease6> + Send + Sync + 'static,
    {
        self.lease6_select.push(Box::new(callout));
        self
    }

    pub fn on_lease6_renew<F>(mut self, callout: F) -> Self
    where
        F: Fn(&Lease6ExtendArgs<'_>) -> HookAction<Lease6> + Send + Sync + 'static,
    {
        self.lease6_renew.push(Box::new(callout));
        self
    }

    pub fn on_lease6_rebind<F>(mut self, callout: F) -> Self
    where
        F: Fn(&Lease6ExtendArgs<'_>) -> HookAction<Lease6> + Send + Sync + 'static,
    {
        self.lease6_rebind.push(Box::new(callout));
        self
    }

    pub fn has_callouts(&self, point: HookPoint) -> bool {
        match point {
            HookPoint::Lease4Select => !self.lease4_select.is_empty(),
            HookPoint::Lease4Renew => !self.lease4_renew.is_empty(),
            HookPoint::Lease6Select => !self.lease6_select.is_empty(),
            HookPoint::Lease6Renew => !self.lease6_renew.is_empty(),
            HookPoint::Lease6Rebind => !self.lease6_rebind.is_empty(),
        }
    }

    pub(crate) fn lease4_select(
        &self,
        subnet: &Subnet,
        fake_allocation: bool,
        lease: Lease4,
    ) -> HookOutcome<Lease4> {
        run_chain(HookPoint::Lease4Select, &self.lease4_select, lease, |callout, lease| {
            callout(&Lease4SelectArgs {
                subnet,
                fake_allocation,
                lease,
            })
        })
    }

    pub(crate) fn lease4_renew(
        &self,
        subnet: &Subnet,
        client_id: Option<&ClientId>,
        hwaddr: Option<&MacAddress>,
        fake_allocation: bool,
        lease: Lease4,
    ) -> HookOutcome<Lease4> {
        run_chain(HookPoint::Lease4Renew, &self.lease4_renew, lease, |callout, lease| {
            callout(&Lease4RenewArgs {
                subnet,
                client_id,
                hwaddr,
                fake_allocation,
                lease,
            })
        })
    }

    pub(crate) fn lease6_select(
        &self,
        subnet: &Subnet,
        fake_allocation: bool,
        lease: Lease6,
    ) -> HookOutcome<Lease6> {
        run_chain(HookPoint::Lease6Select, &self.lease6_select, lease, |callout, lease| {
            callout(&Lease6SelectArgs {
                subnet,
                fake_allocation,
                lease,
            })
        })
    }

    pub(crate) fn lease6_extend(
        &self,
        rebind: bool,
        subnet: &Subnet,
        query: Option<&Query6>,
        ia_rsp: Option<&IaResponse>,
        lease: Lease6,
    ) -> HookOutcome<Lease6> {
        let (point, callouts) = if rebind {
            (HookPoint::Lease6Rebind, &self.lease6_rebind)
        } else {
            (HookPoint::Lease6Renew, &self.lease6_renew)
        };
        run_chain(point, callouts, lease, |callout, lease| {
            callout(&Lease6ExtendArgs {
                subnet,
                query,
                lease,
                ia_rsp,
            })
        })
    }
}

fn run_chain<C, L>(
    point: HookPoint,
    callouts: &[C],
    mut lease: L,
    call: impl Fn(&C, &L) -> HookAction<L>,
) -> HookOutcome<L> {
    for callout in callouts {
        match call(callout, &lease) {
            HookAction::Continue => {}
            HookAction::Replace(replacement) => lease = replacement,
            HookAction::Skip => {
                tracing::debug!(%point, "Callout requested skip");
                return HookOutcome::Skip;
            }
        }
    }
    HookOutcome::Proceed(lease)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use ipnet::IpNet;

    use super::*;
    use crate::lease::{Duid, LeaseType};

    fn lease6() -> Lease6 {
        Lease6 {
            addr: "2001:db8::1".parse().unwrap(),
            prefix_len: 128,
            lease_type: LeaseType::Na,
            duid: Duid::new(vec![1]),
            iaid: 1,
            preferred_lft: 1,
            valid_lft: 2,
            t1: 0,
            t2: 0,
            cltt: Utc::now(),
            subnet_id: 1,
            hwaddr: None,
            fixed: false,
            hostname: String::new(),
            fqdn_fwd: false,
            fqdn_rev: false,
        }
    }

    #[test]
    fn test_replace_feeds_next_callout() {
        let hooks = Hooks::new()
            .on_lease6_select(|args| {
                let mut lease = args.lease.clone();
                lease.hostname = "first".to_string();
                HookAction::Replace(lease)
            })
            .on_lease6_select(|args| {
                assert_eq!(args.lease.hostname, "first");
                let mut lease = args.lease.clone();
                lease.valid_lft = 99;
                HookAction::Replace(lease)
            });
        let subnet = Subnet::new(1, IpNet::from_str("2001:db8::/64").unwrap());

        let HookOutcome::Proceed(lease) = hooks.lease6_select(&subnet, false, lease6()) else {
            panic!("Unexpected skip");
        };
        assert_eq!(lease.hostname, "first");
        assert_eq!(lease.valid_lft, 99);
    }

    #[test]
    fn test_skip_stops_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let hooks = Hooks::new()
            .on_lease6_rebind(|_| HookAction::Skip)
            .on_lease6_rebind(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                HookAction::Continue
            });

        let subnet = Subnet::new(1, IpNet::from_str("2001:db8::/64").unwrap());
        let lease = lease6();
        assert_eq!(
            hooks.lease6_extend(true, &subnet, None, None, lease.clone()),
            HookOutcome::Skip
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Renew has no callouts registered.
        assert!(!hooks.has_callouts(HookPoint::Lease6Renew));
        assert_eq!(
            hooks.lease6_extend(false, &subnet, None, None, lease.clone()),
            HookOutcome::Proceed(lease)
        );
    }
}
