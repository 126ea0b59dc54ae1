// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`warpgate-core`)
//!
//! HTTP surface other processes talk to. **No business logic lives here**;
//! capacity answers come from a `CapacityReporter`.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`status_api`] | HTTP (Axum) | `/status` capacity probe, `/health`, `/metrics` |

pub mod status_api;
