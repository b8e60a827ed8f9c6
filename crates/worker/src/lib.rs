//! The offline cache agent of the student portal.
//!
//! This crate intercepts page requests and answers them from the network or
//! the versioned cache store, runs the install/activate lifecycle, and handles
//! push notifications and background sync. Everything the host runtime owns
//! is reached through [`Platform`]; everything on the wire through
//! [`satchel_client::Network`].

pub mod events;
pub mod interceptor;
pub mod lifecycle;
pub mod notify;
pub mod platform;
pub mod selector;
pub mod strategy;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod testing;

pub use events::{Event, EventOutcome, dispatch};
pub use interceptor::{FetchInterceptor, FetchOutcome, Intercepted};
pub use lifecycle::{ActivateReport, InstallReport, Lifecycle, LifecycleState};
pub use notify::{ClickOutcome, NotificationAgent, NotificationClick, PushMessage, parse_push_payload};
pub use platform::{ClientInfo, InMemoryPlatform, Notification, NotificationAction, Platform, PlatformSnapshot};
pub use selector::{RequestClass, StrategyPolicy, StrategySelector};
pub use strategy::StrategyRunner;
pub use sync::{ClientMessage, SyncAgent, SyncReport, SyncTag};
pub use worker::{MessageReply, ServiceWorker, WorkerStatus};
