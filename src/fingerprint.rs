// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Vehicle identification by candidate elimination.
//!
//! The resolver watches the live bus traffic and discards every catalog model
//! which declares a payload length for an observed address that disagrees
//! with the length actually seen. Once a single model survives, and the bus
//! has been observed for at least [`GRACE_PERIOD`], that model is the
//! vehicle.

use crate::{
    can::{self, Frame, FrameSource, PRIMARY_BUS},
    vehicles::{CandidateCatalog, Fingerprint, VehicleId, SIMULATOR, SIMULATOR2},
};
use log::{debug, trace, warn};
use std::{
    collections::BTreeSet,
    fmt,
    time::{Duration, Instant},
};

/// Time the bus must be observed for after the first frame before a single
/// surviving candidate is accepted. Some models emit a uniquely identifying
/// frame well before the rest of their traffic appears.
pub const GRACE_PERIOD: f64 = 0.1;

/// Slack added to the final bounded wait so the timeout is strictly exceeded
/// when it returns empty handed.
const WAIT_SLACK: Duration = Duration::from_millis(1);

/// Failure to identify the vehicle. Every variant carries the fingerprint
/// observed up to that point.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// No candidate survived elimination
    Exhausted(Fingerprint),
    /// The time budget ran out with candidates remaining
    TimedOut(Fingerprint),
    /// The frame source closed before the vehicle was identified
    Disconnected(Fingerprint),
}

impl Error {
    /// Fingerprint observed before the failure.
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            Error::Exhausted(finger) | Error::TimedOut(finger) | Error::Disconnected(finger) => {
                finger
            }
        }
    }

    /// Consumes the error, returning the observed fingerprint.
    pub fn into_fingerprint(self) -> Fingerprint {
        match self {
            Error::Exhausted(finger) | Error::TimedOut(finger) | Error::Disconnected(finger) => {
                finger
            }
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Exhausted(finger) => write!(
                f,
                "no vehicle matches fingerprint of {} addresses",
                finger.len()
            ),
            Error::TimedOut(finger) => write!(
                f,
                "fingerprint timed out after {} addresses",
                finger.len()
            ),
            Error::Disconnected(finger) => write!(
                f,
                "frame source disconnected after {} addresses",
                finger.len()
            ),
        }
    }
}

/// Monotonic time source in seconds.
pub trait Clock {
    /// Seconds since an arbitrary fixed epoch.
    fn now(&self) -> f64;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Starts the clock at zero.
    pub fn new() -> Self {
        MonotonicClock {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        MonotonicClock::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Resolver operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Identify the vehicle from the bus
    #[default]
    Normal,
    /// Report the `simulator` identity. Also reported when no frame source
    /// is configured, whatever the mode.
    Simulator,
    /// Report the `simulator2` identity, given a frame source is configured
    Simulator2,
}

impl Mode {
    /// Builds the mode from the two simulator switches; the first wins when
    /// both are set.
    pub fn from_switches(simulator: bool, simulator2: bool) -> Self {
        match (simulator, simulator2) {
            (true, _) => Mode::Simulator,
            (false, true) => Mode::Simulator2,
            (false, false) => Mode::Normal,
        }
    }
}

/// Result of a successful identification.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Identified catalog model or simulated identity
    pub vehicle: VehicleId,
    /// Primary bus address → payload length, empty for simulated identities
    pub fingerprint: Fingerprint,
}

/// Identifies the vehicle against a candidate catalog.
pub struct Resolver<'a> {
    catalog: &'a CandidateCatalog,
    mode: Mode,
    timeout: Option<Duration>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver in [`Mode::Normal`] without a time budget.
    pub fn new(catalog: &'a CandidateCatalog) -> Self {
        Resolver {
            catalog,
            mode: Mode::Normal,
            timeout: None,
        }
    }

    /// Selects the operating mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Bounds the resolution by a wall-clock budget; `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Identifies the vehicle from `source`, blocking the calling thread
    /// while waiting for traffic.
    pub fn resolve<S, C>(&self, source: Option<&mut S>, clock: &C) -> Result<Resolution, Error>
    where
        S: FrameSource + ?Sized,
        C: Clock + ?Sized,
    {
        match (self.mode, source) {
            (Mode::Simulator, _) | (_, None) => Ok(simulated(SIMULATOR)),
            (Mode::Simulator2, Some(_)) => Ok(simulated(SIMULATOR2)),
            (Mode::Normal, Some(source)) => self.fingerprint(source, clock),
        }
    }

    fn fingerprint<S, C>(&self, source: &mut S, clock: &C) -> Result<Resolution, Error>
    where
        S: FrameSource + ?Sized,
        C: Clock + ?Sized,
    {
        warn!("waiting for fingerprint...");

        let timeout = self.timeout.map(|timeout| timeout.as_secs_f64());
        let start = clock.now();
        let mut candidates: BTreeSet<VehicleId> = self.catalog.ids().cloned().collect();
        let mut finger = Fingerprint::new();
        let mut first_frame = None;

        loop {
            let drained = match timeout {
                Some(timeout) => {
                    let remaining = (start + timeout - clock.now()).max(0.0);
                    let wait = Duration::try_from_secs_f64(remaining).unwrap_or(Duration::MAX);
                    source.drain_timeout(wait.saturating_add(WAIT_SLACK))
                }
                None => source.drain(true),
            };

            let batches = match drained {
                Ok(batches) => batches,
                Err(can::Error::Disconnected) => return Err(Error::Disconnected(finger)),
                Err(err) => {
                    warn!("frame source error: {}", err);
                    return Err(Error::Disconnected(finger));
                }
            };

            for frame in batches.iter().flatten() {
                if first_frame.is_none() {
                    first_frame = Some(clock.now());
                }

                if frame.bus == PRIMARY_BUS {
                    finger.insert(frame.address, frame.data.len());
                }

                self.eliminate(&mut candidates, frame);
            }

            let now = clock.now();
            let settled = first_frame.is_some_and(|first| now - first > GRACE_PERIOD);

            if candidates.len() == 1 && settled {
                break;
            } else if candidates.is_empty() {
                debug!("no candidates left after {} addresses", finger.len());
                return Err(Error::Exhausted(finger));
            } else if timeout.is_some_and(|timeout| now - start > timeout) {
                debug!("{} candidates left at timeout", candidates.len());
                return Err(Error::TimedOut(finger));
            }
        }

        // The loop only exits with exactly one candidate.
        let vehicle = candidates
            .pop_first()
            .ok_or_else(|| Error::Exhausted(finger.clone()))?;
        warn!("fingerprinted {}", vehicle);

        Ok(Resolution {
            vehicle,
            fingerprint: finger,
        })
    }
}

impl Resolver<'_> {
    /// Drops every candidate declaring a different payload length for the
    /// frame's address. Undeclared addresses keep the candidate.
    fn eliminate(&self, candidates: &mut BTreeSet<VehicleId>, frame: &Frame) {
        candidates.retain(|id| match self.catalog.expected_len(id, frame.address) {
            Some(len) if len != frame.data.len() => {
                trace!(
                    "eliminated {}: {:#X} expected {} got {}",
                    id,
                    frame.address,
                    len,
                    frame.data.len()
                );
                false
            }
            _ => true,
        });
    }
}

fn simulated(id: &str) -> Resolution {
    Resolution {
        vehicle: VehicleId::from(id),
        fingerprint: Fingerprint::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        can::{ChannelSource, FrameBatch},
        vehicles::{VehicleFamily, HONDA_CIVIC, TOYOTA_PRIUS},
    };
    use std::{cell::Cell, collections::VecDeque, rc::Rc};

    #[derive(Clone, Default)]
    struct ManualClock(Rc<Cell<f64>>);

    impl ManualClock {
        fn set(&self, t: f64) {
            self.0.set(t);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> f64 {
            self.0.get()
        }
    }

    /// Hands out one scripted batch per drain, moving the clock to the time
    /// the batch "arrived". Disconnects once the script runs out.
    struct ScriptedSource {
        clock: ManualClock,
        script: VecDeque<(f64, FrameBatch)>,
        touched: bool,
    }

    impl ScriptedSource {
        fn new(clock: &ManualClock, script: Vec<(f64, FrameBatch)>) -> Self {
            ScriptedSource {
                clock: clock.clone(),
                script: script.into(),
                touched: false,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn drain(&mut self, _wait_for_one: bool) -> Result<Vec<FrameBatch>, can::Error> {
            self.touched = true;
            match self.script.pop_front() {
                Some((t, batch)) => {
                    self.clock.set(t);
                    Ok(vec![batch])
                }
                None => Err(can::Error::Disconnected),
            }
        }
    }

    fn catalog() -> CandidateCatalog {
        CandidateCatalog::from_tables([
            ("CAR A", VehicleFamily::Honda, &[(0x10, 8), (0x20, 4)][..]),
            ("CAR B", VehicleFamily::Honda, &[(0x10, 8), (0x20, 6)][..]),
            ("CAR C", VehicleFamily::Toyota, &[(0x10, 5), (0x30, 2)][..]),
        ])
    }

    fn frame(address: u32, len: usize) -> Frame {
        Frame::new(PRIMARY_BUS, address, &vec![0; len])
    }

    #[test]
    fn test_simulator_bypass() {
        let catalog = catalog();
        let clock = ManualClock::default();
        let mut source = ScriptedSource::new(&clock, vec![(0.0, vec![frame(0x10, 8)])]);

        let res = Resolver::new(&catalog)
            .with_mode(Mode::Simulator)
            .resolve(Some(&mut source), &clock)
            .unwrap();
        assert_eq!(res.vehicle.as_str(), SIMULATOR);
        assert!(res.fingerprint.is_empty());

        let res = Resolver::new(&catalog)
            .with_mode(Mode::Simulator2)
            .resolve(Some(&mut source), &clock)
            .unwrap();
        assert_eq!(res.vehicle.as_str(), SIMULATOR2);
        assert!(res.fingerprint.is_empty());
        assert!(!source.touched);
    }

    #[test]
    fn test_no_source_is_simulator() {
        let catalog = catalog();
        let res = Resolver::new(&catalog)
            .resolve(None::<&mut ScriptedSource>, &ManualClock::default())
            .unwrap();
        assert_eq!(res.vehicle.as_str(), SIMULATOR);
    }

    #[test]
    fn test_simulator2_without_source() {
        let catalog = catalog();
        let res = Resolver::new(&catalog)
            .with_mode(Mode::Simulator2)
            .resolve(None::<&mut ScriptedSource>, &ManualClock::default())
            .unwrap();
        assert_eq!(res.vehicle.as_str(), SIMULATOR);
    }

    #[test]
    fn test_mode_switches() {
        assert_eq!(Mode::from_switches(false, false), Mode::Normal);
        assert_eq!(Mode::from_switches(true, false), Mode::Simulator);
        assert_eq!(Mode::from_switches(false, true), Mode::Simulator2);
        assert_eq!(Mode::from_switches(true, true), Mode::Simulator);
    }

    #[test]
    fn test_grace_period_boundary() {
        let catalog = catalog();
        let clock = ManualClock::default();
        // 0x10 with 5 bytes leaves only CAR C at t=0.
        let mut source = ScriptedSource::new(
            &clock,
            vec![
                (0.0, vec![frame(0x10, 5)]),
                (0.099, vec![frame(0x30, 2)]),
                (0.101, vec![frame(0x30, 2)]),
                (0.2, vec![frame(0x30, 2)]),
            ],
        );

        let res = Resolver::new(&catalog)
            .resolve(Some(&mut source), &clock)
            .unwrap();
        assert_eq!(res.vehicle.as_str(), "CAR C");
        assert_eq!(res.fingerprint.get(&0x10), Some(&5));
        // Returned on the batch at 0.101, the one at 0.2 is still queued.
        assert_eq!(source.script.len(), 1);
        assert_eq!(clock.now(), 0.101);
    }

    #[test]
    fn test_no_convergence_inside_grace_period() {
        let catalog = catalog();
        let clock = ManualClock::default();
        let mut source = ScriptedSource::new(
            &clock,
            vec![(0.0, vec![frame(0x10, 5)]), (0.099, vec![frame(0x30, 2)])],
        );

        let err = Resolver::new(&catalog)
            .resolve(Some(&mut source), &clock)
            .unwrap_err();
        assert!(matches!(err, Error::Disconnected(_)));
    }

    #[test]
    fn test_grace_period_starts_at_first_frame() {
        let catalog = catalog();
        let clock = ManualClock::default();
        let mut source = ScriptedSource::new(
            &clock,
            vec![
                (5.0, vec![]),
                (10.0, vec![frame(0x10, 5)]),
                (10.05, vec![frame(0x30, 2)]),
                (10.15, vec![frame(0x30, 2)]),
            ],
        );

        let res = Resolver::new(&catalog)
            .resolve(Some(&mut source), &clock)
            .unwrap();
        assert_eq!(res.vehicle.as_str(), "CAR C");
        assert_eq!(clock.now(), 10.15);
    }

    #[test]
    fn test_exhausted() {
        let catalog = catalog();
        let clock = ManualClock::default();
        let mut source = ScriptedSource::new(&clock, vec![(0.0, vec![frame(0x10, 1)])]);

        let err = Resolver::new(&catalog)
            .resolve(Some(&mut source), &clock)
            .unwrap_err();
        assert!(matches!(err, Error::Exhausted(_)));
        assert_eq!(err.fingerprint().len(), 1);
        assert_eq!(err.fingerprint().get(&0x10), Some(&1));
    }

    #[test]
    fn test_timeout() {
        let catalog = catalog();
        let clock = ManualClock::default();
        // A and B agree on 0x10 and are never split.
        let mut source = ScriptedSource::new(
            &clock,
            vec![
                (0.0, vec![frame(0x10, 8)]),
                (0.5, vec![frame(0x10, 8)]),
                (1.0, vec![frame(0x10, 8)]),
                (1.01, vec![frame(0x10, 8)]),
                (2.0, vec![frame(0x10, 8)]),
            ],
        );

        let err = Resolver::new(&catalog)
            .with_timeout(Some(Duration::from_secs(1)))
            .resolve(Some(&mut source), &clock)
            .unwrap_err();
        assert_eq!(err, Error::TimedOut([(0x10, 8)].into_iter().collect()));
        assert_eq!(clock.now(), 1.01);
    }

    #[test]
    fn test_unknown_addresses_are_uninformative() {
        let catalog = catalog();
        let clock = ManualClock::default();
        let mut source = ScriptedSource::new(
            &clock,
            vec![
                (0.0, vec![frame(0x10, 8), frame(0x7FF, 1), frame(0x30, 7)]),
                (0.05, vec![frame(0x20, 6)]),
                (0.2, vec![frame(0x7FE, 3)]),
            ],
        );

        let res = Resolver::new(&catalog)
            .resolve(Some(&mut source), &clock)
            .unwrap();
        assert_eq!(res.vehicle.as_str(), "CAR B");
        assert_eq!(res.fingerprint.len(), 5);
    }

    #[test]
    fn test_only_primary_bus_is_recorded() {
        let catalog = catalog();
        let clock = ManualClock::default();
        let mut source = ScriptedSource::new(
            &clock,
            vec![
                (0.0, vec![Frame::new(1, 0x10, &[0; 5]), Frame::new(2, 0x99, &[0; 2])]),
                (0.5, vec![frame(0x30, 2)]),
            ],
        );

        let res = Resolver::new(&catalog)
            .resolve(Some(&mut source), &clock)
            .unwrap();
        // Secondary bus frames still eliminate, but are not recorded.
        assert_eq!(res.vehicle.as_str(), "CAR C");
        assert_eq!(res.fingerprint, [(0x30, 2)].into_iter().collect());
    }

    /// Candidate count never increases and a vehicle replaying its own table
    /// is never eliminated.
    #[test]
    fn test_monotone_and_conservative() {
        let catalog = CandidateCatalog::builtin();
        let resolver = Resolver::new(&catalog);

        for id in catalog.ids() {
            let table = &catalog.get(id).unwrap().fingerprint;
            let mut candidates: BTreeSet<VehicleId> = catalog.ids().cloned().collect();
            let mut count = candidates.len();

            for (address, len) in table {
                resolver.eliminate(&mut candidates, &frame(*address, *len));
                assert!(candidates.len() <= count);
                assert!(candidates.contains(id), "{} eliminated itself", id);
                count = candidates.len();
            }
        }
    }

    #[test]
    fn test_every_builtin_vehicle_resolves_frame_by_frame() {
        let catalog = CandidateCatalog::builtin();

        for id in catalog.ids() {
            let clock = ManualClock::default();
            let table = &catalog.get(id).unwrap().fingerprint;
            let mut script: Vec<(f64, FrameBatch)> = table
                .iter()
                .enumerate()
                .map(|(i, (address, len))| (i as f64 * 0.001, vec![frame(*address, *len)]))
                .collect();
            script.push((1.0, table.iter().map(|(a, l)| frame(*a, *l)).collect()));
            let mut source = ScriptedSource::new(&clock, script);

            let res = Resolver::new(&catalog)
                .resolve(Some(&mut source), &clock)
                .unwrap();
            assert_eq!(&res.vehicle, id);
            assert_eq!(&res.fingerprint, table);
        }
    }

    #[test]
    fn test_timeout_on_silent_bus() {
        let catalog = CandidateCatalog::builtin();
        let (_tx, mut source) = ChannelSource::unbounded();

        let start = std::time::Instant::now();
        let err = Resolver::new(&catalog)
            .with_timeout(Some(Duration::from_millis(200)))
            .resolve(Some(&mut source), &MonotonicClock::new())
            .unwrap_err();
        assert_eq!(err, Error::TimedOut(Fingerprint::new()));
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_while_waiting_for_traffic() {
        let catalog = catalog();
        let (tx, mut source) = ChannelSource::unbounded();
        tx.send(vec![frame(0x10, 8)]).unwrap();

        // A and B stay undecided and the bus goes quiet.
        let err = Resolver::new(&catalog)
            .with_timeout(Some(Duration::from_millis(100)))
            .resolve(Some(&mut source), &MonotonicClock::new())
            .unwrap_err();
        assert_eq!(err, Error::TimedOut([(0x10, 8)].into_iter().collect()));
        drop(tx);
    }

    #[test]
    fn test_builtin_resolution() {
        let catalog = CandidateCatalog::builtin();

        for target in [HONDA_CIVIC, TOYOTA_PRIUS] {
            let clock = ManualClock::default();
            let table = &catalog.get(&VehicleId::from(target)).unwrap().fingerprint;
            let traffic: FrameBatch = table.iter().map(|(a, l)| frame(*a, *l)).collect();
            let mut source = ScriptedSource::new(
                &clock,
                vec![(0.0, traffic.clone()), (0.01, traffic.clone()), (0.11, traffic)],
            );

            let res = Resolver::new(&catalog)
                .with_timeout(Some(Duration::from_secs(1)))
                .resolve(Some(&mut source), &clock)
                .unwrap();
            assert_eq!(res.vehicle.as_str(), target);
            assert_eq!(&res.fingerprint, table);
        }
    }
}
