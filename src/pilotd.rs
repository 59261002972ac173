// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use kanal::{AsyncReceiver, AsyncSender};
use pilotcore::{
    alertmanager::{AlertManager, AlertOutput},
    alerts::AlertCatalog,
    can::{self, ChannelSource},
    common::set_process_priority,
    fingerprint::{Mode, MonotonicClock, Resolution, Resolver},
    vehicles::CandidateCatalog,
};
use serde::Deserialize;
use serde_json::json;
use std::{thread, time::Instant};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, instrument, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _, Registry};
use tracy_client::{frame_mark, plot};
use zenoh::{
    bytes::{Encoding, ZBytes},
    config::Config,
    qos::{CongestionControl, Priority},
    Session,
};

#[cfg(feature = "profiling")]
#[global_allocator]
static GLOBAL: tracy_client::ProfiledAllocator<std::alloc::System> =
    tracy_client::ProfiledAllocator::new(std::alloc::System, 100);

/// Alert raised by another subsystem over Zenoh.
#[derive(Debug, Deserialize)]
struct TriggerRequest {
    alert: String,
    #[serde(default = "enabled_default")]
    enabled: bool,
    #[serde(default)]
    extra_text: String,
}

fn enabled_default() -> bool {
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    args.tracy.then(tracy_client::Client::start);

    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(args.rust_log);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(args.rust_log)),
        Err(_) => None,
    };

    let tracy = match args.tracy {
        true => Some(tracing_tracy::TracyLayer::default().with_filter(args.rust_log)),
        false => None,
    };

    let subscriber = Registry::default()
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    let vehicles = match &args.fingerprints {
        Some(path) => CandidateCatalog::load(path)?,
        None => CandidateCatalog::builtin(),
    };

    let alerts = match &args.alerts {
        Some(path) => AlertCatalog::load(path)?,
        None => AlertCatalog::builtin().clone(),
    };
    info!("loaded {} vehicles and {} alerts", vehicles.len(), alerts.len());

    // Nothing else may run before the vehicle is known.
    let resolution = tokio::task::block_in_place(|| resolve(&args, &vehicles))?;
    let family = vehicles.family(&resolution.vehicle)?;
    info!(
        "vehicle {} ({}) with {} fingerprint addresses",
        resolution.vehicle,
        family,
        resolution.fingerprint.len()
    );

    let session = zenoh::open(Config::try_from(&args)?).await?;

    let vehicle_msg = json!({
        "vehicle": resolution.vehicle,
        "family": family,
        "fingerprint": resolution.fingerprint,
    });
    session
        .put(&args.vehicle_topic, ZBytes::from(vehicle_msg.to_string()))
        .encoding(Encoding::APPLICATION_JSON)
        .await?;

    let (tx, rx) = kanal::bounded_async(64);

    {
        let session = session.clone();
        let args = args.clone();

        thread::Builder::new()
            .name("control".to_string())
            .spawn(move || {
                if args.priority > 0 {
                    set_process_priority(args.priority);
                }

                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        error!("control runtime error: {}", err);
                        std::process::exit(1);
                    }
                };

                if let Err(err) = runtime.block_on(control_loop(session, args, alerts, rx)) {
                    error!("control loop failed: {}", err);
                    std::process::exit(1);
                }
            })?;
    }

    triggers(session, args.trigger_topic.clone(), tx).await?;

    Ok(())
}

/// Runs the fingerprint resolver against the configured interfaces. The
/// simulator modes never open a socket, and without any interface the
/// simulator identity is reported.
fn resolve(
    args: &Args,
    vehicles: &CandidateCatalog,
) -> Result<Resolution, Box<dyn std::error::Error + Send + Sync>> {
    let mode = args.resolver_mode();
    let resolver = Resolver::new(vehicles)
        .with_mode(mode)
        .with_timeout(args.fingerprint_timeout);

    let (tx, mut source) = ChannelSource::unbounded();
    if mode == Mode::Normal {
        for (bus, interface) in args.can.iter().enumerate() {
            can::spawn_reader(interface, bus as u8, tx.clone())?;
        }
    }
    drop(tx);

    let configured = mode == Mode::Simulator2 || !args.can.is_empty();
    match resolver.resolve(configured.then_some(&mut source), &MonotonicClock::new()) {
        Ok(resolution) => Ok(resolution),
        Err(err) => {
            warn!(
                "vehicle doesn't match any fingerprints: {:?}",
                err.fingerprint()
            );
            Err(err.into())
        }
    }
}

/// Forwards trigger requests from Zenoh to the control loop.
async fn triggers(
    session: Session,
    topic: String,
    tx: AsyncSender<TriggerRequest>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subscriber = session.declare_subscriber(&topic).await?;

    while let Ok(sample) = subscriber.recv_async().await {
        let payload = sample.payload().to_bytes();
        match serde_json::from_slice::<TriggerRequest>(&payload) {
            Ok(request) => {
                if tx.send(request).await.is_err() {
                    break;
                }
            }
            Err(err) => warn!("{} invalid trigger request: {}", topic, err),
        }
    }

    Ok(())
}

async fn control_loop(
    session: Session,
    args: Args,
    catalog: AlertCatalog,
    rx: AsyncReceiver<TriggerRequest>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let publisher = session
        .declare_publisher(args.alerts_topic.clone())
        .priority(Priority::DataHigh)
        .congestion_control(CongestionControl::Drop)
        .await?;

    let mut manager = AlertManager::new(&catalog);
    if catalog.contains("startup") {
        manager.trigger("startup", "")?;
    }

    let mut interval = tokio::time::interval(args.tick_period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let epoch = Instant::now();
    let mut last = AlertOutput::default();

    loop {
        interval.tick().await;

        while let Ok(Some(request)) = rx.try_recv() {
            // Remote producers are not trusted to know the catalog.
            if !catalog.contains(&request.alert) {
                error!("{} unknown alert {}", args.trigger_topic, request.alert);
                continue;
            }
            manager.trigger_with(&request.alert, request.enabled, &request.extra_text)?;
        }

        let output = info_span!("alert_tick")
            .in_scope(|| manager.tick(epoch.elapsed().as_secs_f64()));

        if output != last {
            info!(
                "alert {:?} audible={:?} visual={:?} {}/{}",
                manager.current(),
                output.audible,
                output.visual,
                output.text_1,
                output.text_2
            );
        }

        let msg = format_output(&output)?;
        let span = info_span!("alerts_publish");
        async {
            match publisher
                .put(msg)
                .encoding(Encoding::APPLICATION_JSON)
                .await
            {
                Ok(_) => {}
                Err(e) => error!("{} publish error: {:?}", args.alerts_topic, e),
            }
        }
        .instrument(span)
        .await;

        args.tracy.then(|| {
            plot!("alert active", if output.is_idle() { 0.0 } else { 1.0 });
        });
        args.tracy.then(frame_mark);
        last = output;
    }
}

#[instrument(skip_all)]
fn format_output(output: &AlertOutput) -> Result<ZBytes, serde_json::Error> {
    Ok(ZBytes::from(serde_json::to_vec(output)?))
}
