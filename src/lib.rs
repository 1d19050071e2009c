//! SafeNet Core Library
//!
//! Friend graph, privacy-gated location sharing and notification fan-out
//! for SafeNet. Hosts open a [`SafeNetCore`], supply an
//! [`identity::IdentityDirectory`] and a [`notify::DeliveryChannel`], and
//! drive everything through [`proximity::ProximityNotifier`].

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

mod api;
pub mod config;
pub mod error;
pub mod graph;
pub mod identity;
pub mod location;
pub mod notify;
pub mod proximity;
mod timestamp;

pub use api::SafeNetCore;
pub use config::CoreConfig;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use identity::ActorId;
