//! Actor implementation for the room synchronizer.
//!
//! ```text
//! RoomSession ──callbacks (mpsc)──▶ RoomSyncActor ──watch──▶ StreamMapReceiver
//!      ▲                              │  owns store, policy engine,
//!      └──── add_subscription ◀───────┘  sequence guard, map writer
//!               (spawned task, outcome returned via mailbox)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer**: only the actor mutates room state, one callback at a time
//! - **Fire-and-forget commands**: subscribe calls run in spawned tasks and never block the pipeline
//! - **CancellationToken**: the owning client cancels the actor on shutdown
//! - **Mailbox monitoring**: depth thresholds logged at normal/warning/critical levels
//!
//! # Modules
//!
//! - [`sync`] - `RoomSyncActor` and its handle
//! - [`messages`] - Message types for the actor mailbox
//! - [`metrics`] - Mailbox monitoring

pub mod messages;
pub mod metrics;
pub mod sync;

pub use messages::*;
pub use metrics::{MailboxLevel, MailboxMonitor};
pub use sync::{RoomSyncActor, RoomSyncHandle};
