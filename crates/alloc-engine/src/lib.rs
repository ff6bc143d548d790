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

//! Address and prefix allocation engine for DHCPv4 and DHCPv6 servers.
//!
//! Given a client identity and a request, [`engine::AllocEngine`] decides
//! which address or delegated prefix the client receives. It reconciles host
//! reservations with dynamic pool allocation, recycles expired leases and
//! resolves races on a shared [`lease_store::LeaseStore`] optimistically.

pub mod allocator;
pub mod cfg_hosts;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod hooks;
pub mod host;
pub mod lease;
pub mod lease_store;
pub mod logging;
pub mod simulate;
pub mod subnet;

pub use engine::{AddressFamily, AllocEngine};
pub use errors::AllocError;
