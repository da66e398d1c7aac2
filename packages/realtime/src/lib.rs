#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Realtime delivery of incident changes.
//!
//! [`router::FanoutRouter`] turns the store's single change feed into many
//! filtered [`router::Subscription`]s. [`dashboard::Dashboard`] keeps a
//! [`view::LocalView`] current from a subscription plus reconciling polls,
//! and [`unread::UnreadCounter`] tracks chat messages per viewer.

pub mod context;
pub mod dashboard;
pub mod filter;
pub mod router;
pub mod unread;
pub mod view;

use fireline_database::StoreError;
use thiserror::Error;

pub use context::RouterContext;
pub use dashboard::Dashboard;
pub use filter::SubscriptionFilter;
pub use router::{FanoutRouter, RouterConfig, RouterMessage, Subscription};
pub use unread::{CueError, NotificationCue, UnreadCounter};
pub use view::LocalView;

/// Errors raised by realtime consumers.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// A poll or procedure call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The router shut down.
    #[error("Realtime router closed")]
    Closed,
}
