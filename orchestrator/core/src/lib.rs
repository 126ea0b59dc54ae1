// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Warpgate Core
//!
//! Moves owner-attributed structures between independently running host
//! processes through a shared mailbox folder.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Wires domain, application, infrastructure and presentation

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
