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
use std::path::PathBuf;

use alloc_engine::allocator::AllocatorKind;
use alloc_engine::config::{ConfigError, SimulationConfig};
use alloc_engine::{logging, simulate};
use clap::Parser;
use eyre::WrapErr;

fn main() -> Result<(), eyre::Report> {
    let options = Options::parse();
    logging::init_logging()?;

    match options.command {
        Command::Simulate(simulate_command) => {
            let pretty = simulate_command.pretty;
            let config = SimulationConfig::try_from(simulate_command)?;
            tracing::info!(
                subnets = config.subnets.len(),
                hosts = config.hosts.len(),
                steps = config.steps.len(),
                "Running allocation scenario"
            );

            let outcomes = simulate::run(&config).wrap_err("Failed to run scenario")?;
            for outcome in outcomes {
                let line = if pretty {
                    serde_json::to_string_pretty(&outcome)?
                } else {
                    serde_json::to_string(&outcome)?
                };
                println!("{line}");
            }
        }
    }

    Ok(())
}

#[derive(Parser)]
pub struct Options {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Parser)]
pub enum Command {
    #[clap(about = "Run a scripted allocation scenario and print each outcome as JSON")]
    Simulate(SimulateCommand),
}

#[derive(Parser)]
pub struct SimulateCommand {
    #[clap(long, short = 'f', help = "Path to TOML scenario file")]
    config_file: PathBuf,

    #[clap(long, help = "Override the allocator strategy from the scenario file")]
    pub allocator: Option<AllocatorKind>,

    #[clap(long, help = "Override the maximum number of candidates per allocation")]
    pub attempts: Option<u64>,

    #[clap(long, help = "Pretty-print the JSON output")]
    pub pretty: bool,
}

impl TryFrom<SimulateCommand> for SimulationConfig {
    type Error = ConfigError;

    fn try_from(command: SimulateCommand) -> Result<Self, Self::Error> {
        let mut config = SimulationConfig::load(&command.config_file)?;

        if let Some(allocator) = command.allocator {
            config.engine.allocator = allocator;
        }

        if let Some(attempts) = command.attempts {
            config.engine.attempts = attempts;
        }

        Ok(config)
    }
}
