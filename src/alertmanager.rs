// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Driver alert scheduling.
//!
//! Alerts raised during a control tick are queued and the highest priority
//! one becomes current when the tick is processed, replacing whatever alert
//! was current before. The current alert then drives three output channels
//! (sound, HUD cue and text) which each expire after their own duration.

use crate::alerts::{
    self, AlertCatalog, AlertDescriptor, AlertSize, AlertStatus, AudibleCue, VisualCue,
};
use log::debug;
use serde::Serialize;
use tracing::{event, Level};

/// Receiver of alert escalation reports. Reports are advisory and never
/// influence scheduling.
pub trait EventSink {
    /// Called when `alert` is raised above the current alert's priority.
    fn alert_escalated(&self, alert: &str, enabled: bool);
}

/// Reports escalations as structured tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn alert_escalated(&self, alert: &str, enabled: bool) {
        event!(Level::INFO, event = "alert_add", alert_type = alert, enabled);
    }
}

/// Snapshot of the alert channels for one control tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertOutput {
    /// Sound to play
    pub audible: Option<AudibleCue>,
    /// HUD cue to show
    pub visual: Option<VisualCue>,
    /// First text line, empty when the text channel is off
    pub text_1: String,
    /// Second text line
    pub text_2: String,
    /// Rendering severity
    pub status: AlertStatus,
    /// Text area
    pub size: AlertSize,
}

impl AlertOutput {
    /// True when every channel is off.
    pub fn is_idle(&self) -> bool {
        *self == AlertOutput::default()
    }
}

/// An alert raised during the current tick.
#[derive(Debug, Clone)]
struct Pending {
    name: String,
    alert: AlertDescriptor,
}

/// The alert currently driving the output channels.
#[derive(Debug, Clone)]
struct Active {
    name: String,
    alert: AlertDescriptor,
    start: f64,
}

/// Selects the alert to show each control tick and drives its output
/// channels.
pub struct AlertManager<'a> {
    catalog: &'a AlertCatalog,
    sink: Box<dyn EventSink + Send + 'a>,
    pending: Vec<Pending>,
    current: Option<Active>,
}

impl<'a> AlertManager<'a> {
    /// Creates an idle manager reporting escalations through tracing.
    pub fn new(catalog: &'a AlertCatalog) -> Self {
        AlertManager::with_sink(catalog, TracingSink)
    }

    /// Creates an idle manager reporting escalations to `sink`.
    pub fn with_sink(catalog: &'a AlertCatalog, sink: impl EventSink + Send + 'a) -> Self {
        AlertManager {
            catalog,
            sink: Box::new(sink),
            pending: Vec::new(),
            current: None,
        }
    }

    /// True when alerts have been raised since the last tick.
    pub fn alert_present(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Name of the alert driving the outputs, if any.
    pub fn current(&self) -> Option<&str> {
        self.current.as_ref().map(|active| active.name.as_str())
    }

    /// Raises `name` for this tick with `extra_text` appended to its second
    /// line.
    pub fn trigger(&mut self, name: &str, extra_text: &str) -> Result<(), alerts::Error> {
        self.trigger_with(name, true, extra_text)
    }

    /// Like [`AlertManager::trigger`], forwarding the controls `enabled`
    /// state to the escalation report.
    ///
    /// # Errors
    /// Returns `UnknownAlert` if `name` is not in the catalog. The catalog is
    /// closed, so this is a caller bug and must not be ignored.
    pub fn trigger_with(
        &mut self,
        name: &str,
        enabled: bool,
        extra_text: &str,
    ) -> Result<(), alerts::Error> {
        let mut alert = self.catalog.get(name)?.clone();
        alert.text_2.push_str(extra_text);

        let escalates = match &self.current {
            None => true,
            Some(active) => alert.priority > active.alert.priority,
        };
        if self.pending.is_empty() && escalates {
            self.sink.alert_escalated(name, enabled);
        }

        self.pending.push(Pending {
            name: name.to_string(),
            alert,
        });
        Ok(())
    }

    /// Advances the alert state to `now` (seconds) and returns the channel
    /// outputs for this tick. Must be called exactly once per control tick,
    /// after every trigger of that tick.
    pub fn tick(&mut self, now: f64) -> AlertOutput {
        // Highest priority wins, the earliest raised on a tie. The winner
        // replaces the current alert whatever its priority.
        let mut selected: Option<Pending> = None;
        for pending in self.pending.drain(..) {
            match &selected {
                Some(best) if pending.alert.priority <= best.alert.priority => {}
                _ => selected = Some(pending),
            }
        }
        if let Some(Pending { name, alert }) = selected {
            debug!("alert {} current at {:.3}: {}", name, now, alert);
            self.current = Some(Active {
                name,
                alert,
                start: now,
            });
        }

        let mut output = AlertOutput::default();

        if let Some(active) = &self.current {
            let alert = &active.alert;
            let start = active.start;

            if start + alert.duration_sound > now {
                output.audible = alert.audible;
            }

            if start + alert.duration_hud > now {
                output.visual = alert.visual;
            }

            if start + alert.duration_text > now {
                output.text_1 = alert.text_1.clone();
                output.text_2 = alert.text_2.clone();
                output.status = alert.status;
                output.size = alert.size;
            }

            if start + alert.max_duration() < now {
                debug!("alert {} expired at {:.3}", active.name, now);
                self.current = None;
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Priority;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Vec<(String, bool)>>>);

    impl RecordingSink {
        fn events(&self) -> Vec<(String, bool)> {
            self.0.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn alert_escalated(&self, alert: &str, enabled: bool) {
            self.0.lock().unwrap().push((alert.to_string(), enabled));
        }
    }

    fn descriptor(
        priority: Priority,
        audible: AudibleCue,
        visual: VisualCue,
        durations: [f64; 3],
    ) -> AlertDescriptor {
        AlertDescriptor {
            text_1: format!("{:?}", priority),
            text_2: "line 2".to_string(),
            status: AlertStatus::Critical,
            size: AlertSize::Full,
            priority,
            visual: Some(visual),
            audible: Some(audible),
            duration_sound: durations[0],
            duration_hud: durations[1],
            duration_text: durations[2],
        }
    }

    fn catalog() -> AlertCatalog {
        AlertCatalog::new([
            (
                "low",
                descriptor(
                    Priority::Low,
                    AudibleCue::ChimeSingle,
                    VisualCue::SteerRequired,
                    [0.2, 2.0, 3.0],
                ),
            ),
            (
                "low2",
                descriptor(
                    Priority::Low,
                    AudibleCue::ChimeDouble,
                    VisualCue::BrakePressed,
                    [0.2, 2.0, 3.0],
                ),
            ),
            (
                "mid",
                descriptor(
                    Priority::Mid,
                    AudibleCue::BeepSingle,
                    VisualCue::WrongGear,
                    [0.2, 2.0, 3.0],
                ),
            ),
            (
                "high",
                descriptor(
                    Priority::High,
                    AudibleCue::ChimeRepeated,
                    VisualCue::Fcw,
                    [1.0, 2.0, 2.0],
                ),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_idle_tick() {
        let catalog = catalog();
        let mut am = AlertManager::new(&catalog);
        for i in 0..5 {
            assert!(am.tick(i as f64 * 0.01).is_idle());
        }
        assert_eq!(am.current(), None);
    }

    #[test]
    fn test_unknown_alert() {
        let catalog = catalog();
        let mut am = AlertManager::new(&catalog);
        assert!(matches!(
            am.trigger("nope", ""),
            Err(alerts::Error::UnknownAlert(_))
        ));
        assert!(!am.alert_present());
        assert!(am.tick(0.0).is_idle());
    }

    #[test]
    fn test_priority_within_tick() {
        let catalog = catalog();
        let mut am = AlertManager::new(&catalog);
        am.trigger("low", "").unwrap();
        am.trigger("high", "").unwrap();
        assert!(am.alert_present());

        let out = am.tick(0.0);
        assert_eq!(out.audible, Some(AudibleCue::ChimeRepeated));
        assert_eq!(out.visual, Some(VisualCue::Fcw));
        assert_eq!(out.text_1, "High");
        assert_eq!(am.current(), Some("high"));
        assert!(!am.alert_present());
    }

    #[test]
    fn test_tie_keeps_first_raised() {
        let catalog = catalog();
        let mut am = AlertManager::new(&catalog);
        am.trigger("low2", "").unwrap();
        am.trigger("low", "").unwrap();

        let out = am.tick(0.0);
        assert_eq!(out.audible, Some(AudibleCue::ChimeDouble));
        assert_eq!(am.current(), Some("low2"));
    }

    #[test]
    fn test_replacement_across_ticks() {
        let catalog = catalog();
        let mut am = AlertManager::new(&catalog);
        am.trigger("high", "").unwrap();
        am.tick(0.0);

        // A lower priority alert in a later tick still takes over.
        am.trigger("low", "").unwrap();
        let out = am.tick(0.01);
        assert_eq!(out.audible, Some(AudibleCue::ChimeSingle));
        assert_eq!(out.visual, Some(VisualCue::SteerRequired));
        assert_eq!(out.text_1, "Low");
        assert_eq!(am.current(), Some("low"));
    }

    #[test]
    fn test_independent_channel_expiry() {
        let catalog = catalog();
        let mut am = AlertManager::new(&catalog);
        am.trigger("low", "").unwrap();
        am.tick(0.0);

        let out = am.tick(0.1);
        assert_eq!(out.audible, Some(AudibleCue::ChimeSingle));
        assert_eq!(out.visual, Some(VisualCue::SteerRequired));
        assert_eq!(out.text_1, "Low");
        assert_eq!(out.status, AlertStatus::Critical);
        assert_eq!(out.size, AlertSize::Full);

        let out = am.tick(1.0);
        assert_eq!(out.audible, None);
        assert_eq!(out.visual, Some(VisualCue::SteerRequired));
        assert_eq!(out.text_2, "line 2");

        let out = am.tick(2.5);
        assert_eq!(out.audible, None);
        assert_eq!(out.visual, None);
        assert_eq!(out.text_1, "Low");
        assert_eq!(out.status, AlertStatus::Critical);
        assert_eq!(out.size, AlertSize::Full);
        assert_eq!(am.current(), Some("low"));

        let out = am.tick(3.1);
        assert!(out.is_idle());
        assert_eq!(am.current(), None);
        assert!(am.tick(3.2).is_idle());
    }

    #[test]
    fn test_pending_queue_cleared() {
        let catalog = catalog();
        let mut am = AlertManager::new(&catalog);
        am.trigger("low", "").unwrap();
        am.trigger("mid", "").unwrap();
        assert_eq!(am.tick(0.0).audible, Some(AudibleCue::BeepSingle));

        // Re-applying the queue at 0.15 would keep the sound alive at 0.25.
        assert_eq!(am.tick(0.15).audible, Some(AudibleCue::BeepSingle));
        assert_eq!(am.tick(0.25).audible, None);
        assert_eq!(am.current(), Some("mid"));
    }

    #[test]
    fn test_extra_text() {
        let catalog = catalog();
        let mut am = AlertManager::new(&catalog);
        am.trigger("mid", " (bus 1)").unwrap();
        assert_eq!(am.tick(0.0).text_2, "line 2 (bus 1)");

        // The catalog entry is untouched.
        assert_eq!(catalog.get("mid").unwrap().text_2, "line 2");
        am.trigger("mid", "").unwrap();
        assert_eq!(am.tick(0.1).text_2, "line 2");
    }

    #[test]
    fn test_escalation_reports() {
        let catalog = catalog();
        let sink = RecordingSink::default();
        let mut am = AlertManager::with_sink(&catalog, sink.clone());

        // Nothing current: the first alert of the tick escalates, the second
        // is queued behind it and is not reported.
        am.trigger_with("mid", false, "").unwrap();
        am.trigger("high", "").unwrap();
        am.tick(0.0);
        assert_eq!(sink.events(), vec![("mid".to_string(), false)]);

        // Not above the current alert.
        am.trigger("low", "").unwrap();
        am.tick(0.1);
        assert_eq!(sink.events().len(), 1);

        // Current is now "low".
        am.trigger("high", "").unwrap();
        am.tick(0.2);
        assert_eq!(
            sink.events(),
            vec![("mid".to_string(), false), ("high".to_string(), true)]
        );
    }

    #[test]
    fn test_builtin_startup_alert() {
        let mut am = AlertManager::new(AlertCatalog::builtin());
        am.trigger("startup", "").unwrap();

        let out = am.tick(100.0);
        assert_eq!(out.audible, None);
        assert_eq!(out.visual, None);
        assert_eq!(out.text_1, "Always Keep Hands on Wheel");
        assert_eq!(out.status, AlertStatus::Normal);
        assert_eq!(out.size, AlertSize::Full);

        assert_eq!(am.tick(114.9).size, AlertSize::Full);
        assert!(am.tick(115.1).is_idle());
    }
}
