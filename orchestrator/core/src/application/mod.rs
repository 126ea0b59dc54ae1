// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod destination_resolver;
pub mod identity_remapper;
pub mod inbound_queue;
pub mod jump_orchestrator;

// Re-export use cases for convenience
pub use destination_resolver::{DestinationResolver, ResolvedJump};
pub use identity_remapper::{DetachedOccupant, IdentityRemapper, RemapOutcome};
pub use inbound_queue::{InboundQueue, QueuedInbound};
pub use jump_orchestrator::{InboundReport, JumpOrchestrator, JumpReport, TickReport};
