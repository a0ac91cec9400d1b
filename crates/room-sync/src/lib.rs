//! Room Sync Library
//!
//! Client-side participant and stream lifecycle synchronizer for a
//! multi-party video room. It consumes the callbacks of a media session and
//! keeps a consistent local view of which remote streams are renderable,
//! keyed by participant.
//!
//! # Architecture
//!
//! ```text
//! session callbacks ─▶ EventNormalizer ─▶ SequenceGuard ─▶ RoomStateStore
//!                                                             │
//!                      RoomSession ◀── subscribe ── SubscriptionPolicyEngine
//!                                                             │
//!                                      StreamMapReceiver ◀── LocalStreamMap
//! ```
//!
//! All of it runs inside one [`actors::RoomSyncActor`]; the UI only holds
//! receivers. The local user's own stream goes through
//! [`publish::PublishController`] and never enters the remote map.
//!
//! # Modules
//!
//! - [`actors`] - Sync actor, mailbox messages, mailbox monitoring
//! - [`client`] - Startup flow and UI-facing surface
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types and the fatal/non-fatal split
//! - [`events`] - Raw callbacks and their canonical form
//! - [`media`] - Track and handle types
//! - [`policy`] - Subscription policy engine and ordering guard
//! - [`publish`] - Local publication
//! - [`replay`] - Session backed by recorded callbacks
//! - [`session`] - Boundary to the media session
//! - [`store`] - Room state store
//! - [`stream_map`] - Copy-on-write participant to handle map

pub mod actors;
pub mod client;
pub mod config;
pub mod errors;
pub mod events;
pub mod media;
pub mod observability;
pub mod policy;
pub mod publish;
pub mod replay;
pub mod session;
pub mod store;
pub mod stream_map;
