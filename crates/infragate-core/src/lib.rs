//! infragate core
//!
//! This crate provides the backend adapter framework of infragate: a single
//! canonical resource model (compute, network, storage and the links between
//! them) served on top of incompatible backend platforms.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │           transport layer (HTTP / CLI)           │
//! └─────────────────┬───────────────────────────────┘
//!                   │ kind name, id, entity, action
//! ┌─────────────────▼───────────────────────────────┐
//! │                 infragate-core                   │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │ KindRegistry │──│      BackendProxy        │ │
//! │  └──────────────┘  └────────────┬─────────────┘ │
//! │          trait EntityAdapter    │               │
//! │  ┌────────────┐ ┌──────────┐ ┌──▼─────┐ ┌─────┐ │
//! │  │ Identifier │ │ Transfer │ │ Attach │ │Wait │ │
//! │  │   Codec    │ │  Table   │ │ Policy │ │ er  │ │
//! │  └────────────┘ └──────────┘ └────────┘ └─────┘ │
//! └───────┬─────────────────┬───────────────┬───────┘
//!         │                 │               │
//! ┌───────▼───────┐ ┌───────▼───────┐ ┌─────▼─────┐
//! │ dummy backend │ │  opennebula   │ │    ec2    │
//! └───────────────┘ └───────────────┘ └───────────┘
//! ```

pub mod adapter;
pub mod attach;
pub mod catalog;
pub mod context;
pub mod error;
pub mod ident;
pub mod model;
pub mod proxy;
pub mod registry;
pub mod transfer;
pub mod waiter;

// Re-exports
pub use adapter::{ActionDispatch, EntityAdapter};
pub use attach::{AttachPolicy, MixinTag};
pub use catalog::Catalog;
pub use context::{CancellationToken, RequestContext};
pub use error::{BackendError, ErrorClass, Result};
pub use ident::{DecodedId, Identifier, IdentifierCodec};
pub use model::{
    ActionDef, ActionInstance, Entity, Kind, LinkEnds, Location, Mixin, MixinFilter, MixinSet,
};
pub use proxy::{BackendProxy, BackendProxyBuilder};
pub use registry::KindRegistry;
pub use transfer::TransferTable;
pub use waiter::{TerminalState, WaitConfig, Waiter, Watched};
