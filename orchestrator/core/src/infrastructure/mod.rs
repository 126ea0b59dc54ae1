// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod in_memory_world;
pub mod mailbox;
pub mod status_probe;
pub mod wire_format;

pub use event_bus::{EventBus, EventBusError, EventReceiver};
pub use in_memory_world::InMemoryWorld;
pub use mailbox::FilesystemMailbox;
pub use status_probe::{BackoffProbe, HttpStatusProbe};
pub use wire_format::WireFormat;
