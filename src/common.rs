// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use log::{debug, warn};
use std::time::Duration;

/// Highest control or replay rate accepted on the command line, in Hz.
pub const MAX_RATE: f64 = 1000.0;

/// Parses a non-negative number of seconds, such as `2.5`, into a duration.
pub fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|err| format!("{}", err))?;
    Duration::try_from_secs_f64(secs).map_err(|err| format!("{}: {}", s, err))
}

/// Parses a rate in Hz between 1 and [`MAX_RATE`].
pub fn parse_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse().map_err(|err| format!("{}", err))?;
    if (1.0..=MAX_RATE).contains(&rate) {
        Ok(rate)
    } else {
        Err(format!("rate must be between 1 and {} Hz", MAX_RATE))
    }
}

/// Moves the calling thread onto the real-time FIFO scheduler so the control
/// loop keeps its cadence under load. Failure (usually missing privileges)
/// is logged and otherwise ignored.
#[cfg(target_os = "linux")]
pub fn set_process_priority(priority: i32) {
    let mut param = libc::sched_param {
        sched_priority: priority,
    };
    let pid = unsafe { libc::pthread_self() };
    let err = unsafe {
        libc::pthread_setschedparam(pid, libc::SCHED_FIFO, &mut param as *mut libc::sched_param)
    };
    if err != 0 {
        let err = std::io::Error::from_raw_os_error(err);
        warn!("unable to set control loop real-time fifo scheduler: {}", err);
    } else {
        debug!("control loop running at fifo priority {}", priority);
    }
}

/// Real-time scheduling is only supported on Linux.
#[cfg(not(target_os = "linux"))]
pub fn set_process_priority(_priority: i32) {}
