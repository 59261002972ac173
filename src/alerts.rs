// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use log::debug;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, fs, io, path::Path, sync::OnceLock};

/// Alert catalog error types.
#[derive(Debug)]
pub enum Error {
    /// Catalog file could not be read
    Io(io::Error),
    /// Catalog JSON is malformed or names an unknown cue
    Json(serde_json::Error),
    /// Alert name missing from the catalog
    UnknownAlert(String),
    /// Alert declares a negative or non-finite duration
    InvalidDuration(String),
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Json(err) => write!(f, "alert catalog error: {}", err),
            Error::UnknownAlert(alert) => write!(f, "unknown alert: {}", alert),
            Error::InvalidDuration(alert) => write!(f, "invalid duration for alert: {}", alert),
        }
    }
}

/// Alert priority. Only compared within a single control tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Priority {
    /// Informational
    Low = 1,
    /// Driver action required
    Mid = 2,
    /// Immediate takeover
    High = 3,
}

/// Severity the alert is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertStatus {
    /// Plain information
    #[default]
    Normal,
    /// Asks the driver to act
    UserPrompt,
    /// Demands an immediate takeover
    Critical,
}

/// Screen area the alert text takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertSize {
    /// No text shown
    #[default]
    None,
    /// Full width banner
    Full,
}

/// HUD signals the vehicle's own display can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VisualCue {
    /// Forward collision warning
    Fcw,
    /// Hands on the wheel
    SteerRequired,
    /// Brake pedal pressed
    BrakePressed,
    /// Gear lever not in drive
    WrongGear,
    /// Driver seatbelt unlatched
    SeatbeltUnbuckled,
    /// Vehicle speed above the supported range
    SpeedTooHigh,
}

/// Sounds the vehicle's chime module can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AudibleCue {
    /// One beep
    BeepSingle,
    /// Three beeps
    BeepTriple,
    /// Beeps until silenced
    BeepRepeated,
    /// One chime
    ChimeSingle,
    /// Two chimes
    ChimeDouble,
    /// Chimes until silenced
    ChimeRepeated,
    /// Continuous chime
    ChimeContinuous,
}

/// Immutable definition of one alert. Each output channel (sound, HUD and
/// text) runs for its own duration, measured in seconds from the moment the
/// alert becomes current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDescriptor {
    /// First text line
    pub text_1: String,
    /// Second text line, triggers may append to it
    pub text_2: String,
    /// Rendering severity
    pub status: AlertStatus,
    /// Text area
    pub size: AlertSize,
    /// Selection priority within a tick
    pub priority: Priority,
    /// HUD cue, if any
    #[serde(default)]
    pub visual: Option<VisualCue>,
    /// Sound, if any
    #[serde(default)]
    pub audible: Option<AudibleCue>,
    /// Seconds the sound plays
    pub duration_sound: f64,
    /// Seconds the HUD cue is shown
    pub duration_hud: f64,
    /// Seconds the text, status and size are shown
    pub duration_text: f64,
}

impl AlertDescriptor {
    /// Longest of the three channel durations.
    pub fn max_duration(&self) -> f64 {
        self.duration_sound
            .max(self.duration_hud)
            .max(self.duration_text)
    }

    fn validate(&self, name: &str) -> Result<(), Error> {
        let valid = |d: f64| d.is_finite() && d >= 0.0;
        match valid(self.duration_sound) && valid(self.duration_hud) && valid(self.duration_text)
        {
            true => Ok(()),
            false => Err(Error::InvalidDuration(name.to_string())),
        }
    }
}

impl fmt::Display for AlertDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}/{} {:?} {:?} {:?}",
            self.text_1, self.text_2, self.priority, self.visual, self.audible
        )
    }
}

/// Closed table of every alert the control stack may raise. Built once at
/// startup and never modified.
#[derive(Debug, Clone, Default)]
pub struct AlertCatalog {
    alerts: HashMap<String, AlertDescriptor>,
}

impl AlertCatalog {
    /// Builds a catalog, rejecting negative or non-finite durations.
    pub fn new<I, S>(alerts: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (S, AlertDescriptor)>,
        S: Into<String>,
    {
        let alerts = alerts
            .into_iter()
            .map(|(name, alert)| {
                let name = name.into();
                alert.validate(&name)?;
                Ok((name, alert))
            })
            .collect::<Result<HashMap<_, _>, Error>>()?;
        Ok(AlertCatalog { alerts })
    }

    /// Loads a catalog from a JSON object keyed by alert name. Unknown cue
    /// names fail to parse, so an invalid catalog never reaches the control
    /// loop.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let catalog = AlertCatalog::from_json(&fs::read_to_string(path)?)?;
        debug!("loaded {} alerts from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Parses a catalog from a JSON object keyed by alert name.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let alerts: HashMap<String, AlertDescriptor> = serde_json::from_str(json)?;
        AlertCatalog::new(alerts)
    }

    /// The process-wide built-in catalog.
    pub fn builtin() -> &'static AlertCatalog {
        static BUILTIN: OnceLock<AlertCatalog> = OnceLock::new();
        BUILTIN.get_or_init(|| AlertCatalog {
            alerts: builtin_alerts()
                .into_iter()
                .map(|(name, alert)| (name.to_string(), alert))
                .collect(),
        })
    }

    /// Looks up an alert by name.
    pub fn get(&self, name: &str) -> Result<&AlertDescriptor, Error> {
        self.alerts
            .get(name)
            .ok_or_else(|| Error::UnknownAlert(name.to_string()))
    }

    /// True if `name` is in the catalog.
    pub fn contains(&self, name: &str) -> bool {
        self.alerts.contains_key(name)
    }

    /// Alert names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.alerts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of alerts.
    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    /// True for a catalog without alerts.
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

#[allow(clippy::too_many_arguments)]
fn alert(
    text_1: &str,
    text_2: &str,
    status: AlertStatus,
    size: AlertSize,
    priority: Priority,
    visual: Option<VisualCue>,
    audible: Option<AudibleCue>,
    duration_sound: f64,
    duration_hud: f64,
    duration_text: f64,
) -> AlertDescriptor {
    AlertDescriptor {
        text_1: text_1.to_string(),
        text_2: text_2.to_string(),
        status,
        size,
        priority,
        visual,
        audible,
        duration_sound,
        duration_hud,
        duration_text,
    }
}

/// Immediate disable: critical, high priority, steering takeover.
fn immediate_disable(text_2: &str) -> AlertDescriptor {
    alert(
        "Take Control Immediately",
        text_2,
        AlertStatus::Critical,
        AlertSize::Full,
        Priority::High,
        Some(VisualCue::SteerRequired),
        Some(AudibleCue::ChimeRepeated),
        1.,
        3.,
        4.,
    )
}

/// Soft disable: critical, mid priority, steering takeover.
fn soft_disable(text_2: &str) -> AlertDescriptor {
    alert(
        "Take Control Immediately",
        text_2,
        AlertStatus::Critical,
        AlertSize::Full,
        Priority::Mid,
        Some(VisualCue::SteerRequired),
        Some(AudibleCue::ChimeRepeated),
        1.,
        3.,
        3.,
    )
}

/// Engagement refused.
fn no_entry(text_2: &str, visual: Option<VisualCue>, duration_hud: f64) -> AlertDescriptor {
    alert(
        "Comma Unavailable",
        text_2,
        AlertStatus::Normal,
        AlertSize::Full,
        Priority::Low,
        visual,
        Some(AudibleCue::ChimeDouble),
        0.4,
        duration_hud,
        3.,
    )
}

/// Quiet cancellation while the driver is already in control.
fn cancellation(text_2: &str) -> AlertDescriptor {
    alert(
        "Comma Canceled",
        text_2,
        AlertStatus::Normal,
        AlertSize::Full,
        Priority::High,
        None,
        Some(AudibleCue::ChimeDouble),
        0.4,
        2.,
        3.,
    )
}

fn builtin_alerts() -> Vec<(&'static str, AlertDescriptor)> {
    use AlertSize as Size;
    use AlertStatus as Status;

    let beep = |priority| {
        alert(
            "",
            "",
            Status::Normal,
            Size::None,
            priority,
            None,
            Some(AudibleCue::BeepSingle),
            0.2,
            0.,
            0.,
        )
    };

    vec![
        ("enable", beep(Priority::Mid)),
        ("disable", beep(Priority::Mid)),
        (
            "fcw",
            alert(
                "Brake!",
                "Risk of Collision",
                Status::Critical,
                Size::Full,
                Priority::High,
                Some(VisualCue::Fcw),
                Some(AudibleCue::ChimeRepeated),
                1.,
                2.,
                2.,
            ),
        ),
        (
            "steerSaturated",
            alert(
                "Take Control",
                "Turn Exceeds Limit",
                Status::UserPrompt,
                Size::Full,
                Priority::Low,
                Some(VisualCue::SteerRequired),
                Some(AudibleCue::ChimeSingle),
                1.,
                2.,
                3.,
            ),
        ),
        (
            "steerTempUnavailable",
            alert(
                "Take Control",
                "Steer Temporarily Unavailable",
                Status::UserPrompt,
                Size::Full,
                Priority::Low,
                Some(VisualCue::SteerRequired),
                Some(AudibleCue::ChimeDouble),
                0.4,
                2.,
                3.,
            ),
        ),
        (
            "preDriverDistracted",
            alert(
                "Take Control",
                "User Distracted",
                Status::UserPrompt,
                Size::Full,
                Priority::Low,
                Some(VisualCue::SteerRequired),
                Some(AudibleCue::ChimeDouble),
                0.4,
                2.,
                3.,
            ),
        ),
        (
            "driverDistracted",
            alert(
                "Take Control to Regain Speed",
                "User Distracted",
                Status::Critical,
                Size::Full,
                Priority::Low,
                Some(VisualCue::SteerRequired),
                Some(AudibleCue::ChimeRepeated),
                0.5,
                0.5,
                0.5,
            ),
        ),
        (
            "startup",
            alert(
                "Always Keep Hands on Wheel",
                "Be Ready to Take Over Any Time",
                Status::Normal,
                Size::Full,
                Priority::Low,
                None,
                None,
                0.,
                0.,
                15.,
            ),
        ),
        (
            "ethicalDilemma",
            alert(
                "Take Control Immediately",
                "Ethical Dilemma Detected",
                Status::Critical,
                Size::Full,
                Priority::High,
                Some(VisualCue::SteerRequired),
                Some(AudibleCue::ChimeRepeated),
                1.,
                3.,
                3.,
            ),
        ),
        (
            "steerTempUnavailableNoEntry",
            no_entry("Steer Temporary Unavailable", None, 0.),
        ),
        (
            "manualRestart",
            alert(
                "Take Control",
                "Resume Driving Manually",
                Status::UserPrompt,
                Size::Full,
                Priority::Low,
                None,
                None,
                0.,
                0.,
                1.,
            ),
        ),
        ("wrongCarModeNoEntry", no_entry("Main Switch Off", None, 0.)),
        (
            "dataNeededNoEntry",
            no_entry("Data needed for calibration. Upload drive, try again", None, 0.),
        ),
        ("outOfSpaceNoEntry", no_entry("Out of Space", None, 0.)),
        (
            "pedalPressedNoEntry",
            no_entry("Pedal Pressed", Some(VisualCue::BrakePressed), 2.),
        ),
        ("speedTooLowNoEntry", no_entry("Speed Too Low", None, 2.)),
        ("brakeHoldNoEntry", no_entry("Brake Hold Active", None, 2.)),
        ("parkBrakeNoEntry", no_entry("Park Brake Engaged", None, 2.)),
        (
            "lowSpeedLockoutNoEntry",
            no_entry("Cruise Fault: Restart the Car", None, 2.),
        ),
        ("overheat", soft_disable("System Overheated")),
        ("wrongGear", soft_disable("Gear not D")),
        (
            "calibrationInvalid",
            soft_disable("Calibration Invalid: Reposition Neo and Recalibrate"),
        ),
        ("calibrationInProgress", soft_disable("Calibration in Progress")),
        ("doorOpen", soft_disable("Door Open")),
        ("seatbeltNotLatched", soft_disable("Seatbelt Unlatched")),
        ("espDisabled", soft_disable("ESP Off")),
        ("radarCommIssue", immediate_disable("Radar Error: Restart the Car")),
        ("radarFault", immediate_disable("Radar Error: Restart the Car")),
        ("modelCommIssue", immediate_disable("Model Error: Restart the Car")),
        ("controlsFailed", immediate_disable("Controls Failed")),
        ("controlsMismatch", immediate_disable("Controls Mismatch")),
        ("commIssue", immediate_disable("CAN Error: Restart the Car")),
        ("steerUnavailable", immediate_disable("Steer Fault: Restart the Car")),
        ("brakeUnavailable", immediate_disable("Brake Fault: Restart the Car")),
        ("gasUnavailable", immediate_disable("Gas Fault: Restart the Car")),
        ("reverseGear", immediate_disable("Reverse Gear")),
        ("cruiseDisabled", immediate_disable("Cruise Is Off")),
        ("noTarget", cancellation("No Close Lead")),
        ("speedTooLow", cancellation("Speed Too Low")),
        ("overheatNoEntry", no_entry("System Overheated", None, 2.)),
        ("wrongGearNoEntry", no_entry("Gear not D", None, 2.)),
        (
            "calibrationInvalidNoEntry",
            no_entry("Calibration Invalid: Reposition Neo and Recalibrate", None, 2.),
        ),
        (
            "calibrationInProgressNoEntry",
            no_entry("Calibration in Progress", None, 2.),
        ),
        ("doorOpenNoEntry", no_entry("Door Open", None, 2.)),
        ("seatbeltNotLatchedNoEntry", no_entry("Seatbelt Unlatched", None, 2.)),
        ("espDisabledNoEntry", no_entry("ESP Off", None, 2.)),
        (
            "radarCommIssueNoEntry",
            no_entry("Radar Error: Restart the Car", None, 2.),
        ),
        ("radarFaultNoEntry", no_entry("Radar Error: Restart the Car", None, 2.)),
        (
            "modelCommIssueNoEntry",
            no_entry("Model Error: Restart the Car", None, 2.),
        ),
        ("controlsFailedNoEntry", no_entry("Controls Failed", None, 2.)),
        ("controlsMismatchNoEntry", no_entry("Controls Mismatch", None, 2.)),
        ("commIssueNoEntry", no_entry("CAN Error: Restart the Car", None, 2.)),
        (
            "steerUnavailableNoEntry",
            no_entry("Steer Fault: Restart the Car", None, 2.),
        ),
        (
            "brakeUnavailableNoEntry",
            no_entry("Brake Fault: Restart the Car", None, 2.),
        ),
        ("gasUnavailableNoEntry", no_entry("Gas Error: Restart the Car", None, 2.)),
        ("reverseGearNoEntry", no_entry("Reverse Gear", None, 2.)),
        ("cruiseDisabledNoEntry", no_entry("Cruise is Off", None, 2.)),
        ("noTargetNoEntry", no_entry("No Close Lead", None, 2.)),
    ]
}
