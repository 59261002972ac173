// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use log::{debug, error};
use pilotcore::{
    alertmanager::{AlertManager, AlertOutput},
    alerts::AlertCatalog,
    can::{self, ChannelSource, FrameSource},
    common::{parse_rate, parse_seconds},
    fingerprint::{MonotonicClock, Resolver},
    vehicles::CandidateCatalog,
};
use std::{path::PathBuf, process::ExitCode, time::Duration};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CAN devices in bus order, the first is the primary bus
    #[arg(short, long, default_value = "can0", value_delimiter = ' ')]
    device: Vec<String>,

    /// Identify the vehicle on the bus and print its fingerprint.
    #[arg(short, long)]
    fingerprint: bool,

    /// Fingerprint timeout in seconds
    #[arg(short, long, default_value = "10", value_parser = parse_seconds)]
    timeout: Duration,

    /// Vehicle fingerprint catalog (JSON) replacing the built-in one
    #[arg(long)]
    fingerprints: Option<PathBuf>,

    /// Monitor the CAN bus and print frames.
    #[arg(short, long)]
    monitor: bool,

    /// List the alert catalog.
    #[arg(short, long)]
    list: bool,

    /// Alert catalog (JSON) replacing the built-in one
    #[arg(long)]
    alerts: Option<PathBuf>,

    /// Replay an alert through the alert manager and print its outputs
    #[arg(short, long)]
    replay: Option<String>,

    /// Text appended to the replayed alert's second line
    #[arg(long, default_value = "")]
    extra_text: String,

    /// Replay tick rate in Hz
    #[arg(long, default_value = "10", value_parser = parse_rate)]
    rate: f64,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let alerts = match &args.alerts {
        Some(path) => AlertCatalog::load(path)?,
        None => AlertCatalog::builtin().clone(),
    };

    if args.list {
        for name in alerts.names() {
            println!("{}: {}", name, alerts.get(name)?);
        }
    }

    if let Some(name) = &args.replay {
        replay(&alerts, name, &args.extra_text, args.rate)?;
    }

    if args.fingerprint {
        let vehicles = match &args.fingerprints {
            Some(path) => CandidateCatalog::load(path)?,
            None => CandidateCatalog::builtin(),
        };
        let mut source = open(&args.device)?;
        let resolver = Resolver::new(&vehicles).with_timeout(Some(args.timeout));

        match resolver.resolve(Some(&mut source), &MonotonicClock::new()) {
            Ok(resolution) => {
                println!("Vehicle: {}", resolution.vehicle);
                println!("Family: {}", vehicles.family(&resolution.vehicle)?);
                println!("Fingerprint: {:?}", resolution.fingerprint);
            }
            Err(err) => {
                println!("{}", err);
                println!("Fingerprint: {:?}", err.fingerprint());
                return Err(err.into());
            }
        }
    }

    if args.monitor {
        let mut source = open(&args.device)?;
        loop {
            for frame in source.drain(true)?.iter().flatten() {
                println!("{}", frame);
            }
        }
    }

    Ok(())
}

fn open(devices: &[String]) -> Result<ChannelSource, can::Error> {
    if devices.is_empty() {
        return Err(can::Error::NoInterface);
    }

    let (tx, source) = ChannelSource::unbounded();
    for (bus, device) in devices.iter().enumerate() {
        debug!("opening can interface {} as bus {}", device, bus);
        can::spawn_reader(device, bus as u8, tx.clone())?;
    }
    Ok(source)
}

/// Drives a fresh alert manager with a single trigger and prints every tick
/// where the outputs change until the alert has fully expired.
fn replay(
    catalog: &AlertCatalog,
    name: &str,
    extra_text: &str,
    rate: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let alert = catalog.get(name)?;
    let period = 1.0 / rate;
    let ticks = (alert.max_duration() / period).ceil() as usize + 2;

    let mut manager = AlertManager::new(catalog);
    manager.trigger(name, extra_text)?;

    let mut last = None;
    for i in 0..ticks {
        let now = i as f64 * period;
        let output = manager.tick(now);
        if last.as_ref() != Some(&output) {
            println!("{:7.3}s {}", now, describe(&output));
        }
        last = Some(output);
    }

    Ok(())
}

fn describe(output: &AlertOutput) -> String {
    if output.is_idle() {
        return "idle".to_string();
    }

    format!(
        "audible={:?} visual={:?} status={:?} size={:?} text=\"{}\" / \"{}\"",
        output.audible, output.visual, output.status, output.size, output.text_1, output.text_2
    )
}
