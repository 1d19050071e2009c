//! Friend graph for SafeNet.
//!
//! Owns the friend request lifecycle and the symmetric friendship relation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 FriendGraph                  │
//! │  (authorization, identity checks, queries)   │
//! └──────────────┬───────────────────┬───────────┘
//!                │                   │
//!                ▼                   ▼
//!     ┌──────────────────┐  ┌──────────────────────┐
//!     │   GraphStorage   │  │  IdentityDirectory   │
//!     │ (SQLite, atomic  │  │  (external provider) │
//!     │  pair-keyed ops) │  │                      │
//!     └──────────────────┘  └──────────────────────┘
//! ```
//!
//! # Invariants
//!
//! - No actor is paired with itself
//! - At most one request and at most one friendship per unordered pair
//! - A request is `Accepted` exactly when its friendship exists, until the
//!   friendship is removed and the request reopens to `Pending`

pub mod error;
pub mod manager;
pub mod storage;
pub mod types;

pub use error::{GraphError, GraphResult};
pub use manager::FriendGraph;
pub use storage::GraphStorage;
pub use types::{
    ActorPair, FriendRequest, Friendship, FriendshipId, RequestCounts, RequestId, RequestStatus,
};
