// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use pilotcore::{
    common::{parse_rate, parse_seconds},
    fingerprint::Mode,
};
use serde_json::json;
use tracing::level_filters::LevelFilter;
use zenoh::config::{Config, WhatAmI};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// CAN interfaces in bus order, the first one is the primary bus. Without
    /// any interface the vehicle is reported as the simulator.
    #[arg(long, env, value_delimiter = ' ')]
    pub can: Vec<String>,

    /// Give up fingerprinting after this many seconds. Waits forever when
    /// unset.
    #[arg(long, env, value_parser = parse_seconds)]
    pub fingerprint_timeout: Option<Duration>,

    /// Skip fingerprinting and report the simulator.
    #[arg(long, env = "SIMULATOR", conflicts_with = "simulator2")]
    pub simulator: bool,

    /// Skip fingerprinting and report the second simulator.
    #[arg(long, env = "SIMULATOR2")]
    pub simulator2: bool,

    /// Vehicle fingerprint catalog (JSON) replacing the built-in one.
    #[arg(long, env)]
    pub fingerprints: Option<PathBuf>,

    /// Alert catalog (JSON) replacing the built-in one.
    #[arg(long, env)]
    pub alerts: Option<PathBuf>,

    /// Control loop rate in Hz.
    #[arg(long, env, default_value = "100", value_parser = parse_rate)]
    pub rate: f64,

    /// Real-time FIFO priority of the control loop, 0 leaves the default
    /// scheduler.
    #[arg(long, env, default_value = "10")]
    pub priority: i32,

    /// alert state topic name
    #[arg(long, default_value = "rt/pilot/alerts")]
    pub alerts_topic: String,

    /// alert trigger requests topic name
    #[arg(long, default_value = "rt/pilot/alerts/trigger")]
    pub trigger_topic: String,

    /// resolved vehicle topic name
    #[arg(long, default_value = "rt/pilot/vehicle")]
    pub vehicle_topic: String,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// Enable Tracy profiler broadcast
    #[arg(long, env)]
    pub tracy: bool,

    /// zenoh connection mode
    #[arg(long, env, default_value = "peer")]
    mode: WhatAmI,

    /// connect to zenoh endpoints
    #[arg(long, env)]
    connect: Vec<String>,

    /// listen to zenoh endpoints
    #[arg(long, env)]
    listen: Vec<String>,

    /// disable zenoh multicast scouting
    #[arg(long, env)]
    no_multicast_scouting: bool,
}

impl Args {
    pub fn resolver_mode(&self) -> Mode {
        Mode::from_switches(self.simulator, self.simulator2)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate)
    }
}

impl TryFrom<&Args> for Config {
    type Error = zenoh::Error;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let mut config = Config::default();

        config.insert_json5("mode", &json!(args.mode).to_string())?;

        if !args.connect.is_empty() {
            config.insert_json5("connect/endpoints", &json!(args.connect).to_string())?;
        }

        if !args.listen.is_empty() {
            config.insert_json5("listen/endpoints", &json!(args.listen).to_string())?;
        }

        if args.no_multicast_scouting {
            config.insert_json5("scouting/multicast/enabled", &json!(false).to_string())?;
        }

        config.insert_json5("scouting/multicast/interface", &json!("lo").to_string())?;

        Ok(config)
    }
}
