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
use std::sync::Once;

use tracing::metadata::LevelFilter;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

static LOG_SETUP: Once = Once::new();

/// Initialize global logging output to STDERR, leaving STDOUT to the
/// simulation output. Applies to all threads.
/// Use `export RUST_LOG=trace|debug|info|warn|error` to change log level.
pub fn init_logging() -> Result<(), TryInitError> {
    let mut result = Ok(());
    LOG_SETUP.call_once(|| {
        result = subscriber().try_init();
    });
    result
}

/// The subscriber installed by [`init_logging`]. Tests can scope it to one
/// thread with `subscriber().set_default()`; it stays active until the
/// returned guard is dropped.
pub fn subscriber() -> impl SubscriberInitExt {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let stderr_formatter = fmt::layer().with_writer(std::io::stderr);
    tracing_subscriber::registry().with(stderr_formatter.with_filter(env_filter))
}
