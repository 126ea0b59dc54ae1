// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Provides the portal, structure, identity and transfer model.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types, invariants and collaborator contracts

pub mod config;
pub mod destination;
pub mod events;
pub mod geometry;
pub mod identity;
pub mod jump;
pub mod placement;
pub mod portal;
pub mod server_status;
pub mod structure;
pub mod transfer;
pub mod world;
