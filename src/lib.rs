// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! PilotCore Library
//!
//! The identification and alerting core of a CAN based driver assistance
//! control loop.
//!
//! # Features
//!
//! - **Fingerprint Resolver** - Identify the vehicle model from live bus
//!   traffic by eliminating catalog models with conflicting frame lengths
//! - **Alert Manager** - Priority ordered driver alerts with independently
//!   expiring sound, HUD and text channels
//! - **CAN Interface** - Feed bus frames from SocketCAN interfaces
//!
//! # Binaries
//!
//! - `pilotd` - Identify the vehicle, then run the alert loop and publish the
//!   alert state over Zenoh
//! - `pilotctl` - Fingerprint, monitor and alert replay tool

#![warn(missing_docs)]

/// Alert manager state machine
pub mod alertmanager;

/// Alert catalog and descriptors
pub mod alerts;

/// CAN frames, frame sources and the SocketCAN reader
pub mod can;

/// Common utilities
pub mod common;

/// Vehicle fingerprint resolver
pub mod fingerprint;

/// Candidate vehicle catalog
pub mod vehicles;
