//! # Map Sync
//!
//! Keeps declarative marker descriptions in step with the live objects of
//! an asynchronously loaded mapping engine.
//!
//! ## Features
//!
//! - **Engine Handle**: One deferred map instance that every engine call waits on
//! - **Marker Manager**: Mirrors marker attributes onto engine markers
//! - **Cluster Manager**: Hands markers to a clustering object instead of the map
//! - **Marker Facade**: Turns attribute changes into targeted manager calls
//! - **Event Bridge**: Forwards engine events as neutral, position-bearing outputs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use map_sync::engine::memory::MemoryEngine;
//! use map_sync::facade::MarkerChange;
//! use map_sync::MapBuilder;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> map_sync::Result<()> {
//!     let context = MapBuilder::new()
//!         .with_container("map")
//!         .with_engine(Arc::new(MemoryEngine::new()))
//!         .build()?;
//!     context.bootstrap().await?;
//!
//!     let mut marker = context.marker(context.marker_manager());
//!     marker.apply([
//!         MarkerChange::Latitude(Some(52.52.into())),
//!         MarkerChange::Longitude(Some(13.40.into())),
//!         MarkerChange::Title(Some("Berlin".to_string())),
//!     ]);
//!
//!     let mut outputs = marker.outputs();
//!     while let Some(event) = outputs.recv().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod builder;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod events;
pub mod facade;
pub mod handle;
pub mod managers;
pub mod types;
pub mod zone;

// Re-exports for ergonomic API
pub use builder::{MapBuilder, MapConfig, MapContext};
pub use deferred::{Completion, Deferred, Resolver};
pub use engine::{EngineLoader, MapEngine, ReadyLoader};
pub use error::{MapError, Result};
pub use events::{EventStream, EventSubscription, MarkerEvent};
pub use facade::{MarkerDescriptor, MarkerFacade, MarkerId, MarkerOutput};
pub use handle::MapHandle;
pub use managers::{ClusterManager, EntityManager, MarkerManager};
pub use types::{
    Animation, ClusterOptions, IconSpec, LatLngBounds, LatLngLiteral, MapContainer, MapOptions,
    MouseEvent,
};
pub use zone::Zone;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::MapBuilder;
    pub use crate::error::Result;
    pub use crate::facade::{MarkerChange, MarkerFacade};
    pub use crate::managers::{ClusterManager, EntityManager, MarkerManager};
    pub use crate::types::{Animation, ClusterOptions, LatLngLiteral, MapOptions};
}
