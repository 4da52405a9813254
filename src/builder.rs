//! MapBuilder for configuring and constructing map contexts
//!
//! ## Table of Contents
//! - **MapConfig**: Complete configuration struct
//! - **MapBuilder**: Builder pattern for map configuration
//! - **MapContext**: The built engine handle plus manager and facade factories

use crate::engine::{EngineLoader, MapEngine, ReadyLoader};
use crate::error::{MapError, Result};
use crate::facade::MarkerFacade;
use crate::handle::MapHandle;
use crate::managers::{ClusterManager, EntityManager, MarkerManager};
use crate::types::{ClusterOptions, MapContainer, MapOptions};
use crate::zone::Zone;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Complete map configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Surface the map renders into
    pub container: MapContainer,
    /// Options the map is constructed with
    pub map_options: MapOptions,
    /// Options a cluster manager is initialised with
    pub cluster_options: Option<ClusterOptions>,
    /// Name of the main task queue, used in logs
    pub zone_name: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            container: MapContainer::default(),
            map_options: MapOptions::default(),
            cluster_options: None,
            zone_name: "main".to_string(),
        }
    }
}

impl MapConfig {
    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MapError::config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.container.0.is_empty() {
            return Err(MapError::config("container must not be empty"));
        }
        Ok(())
    }
}

/// Builder for constructing map contexts
pub struct MapBuilder {
    config: MapConfig,
    engine: Option<Arc<dyn MapEngine>>,
    loader: Option<Arc<dyn EngineLoader>>,
}

impl MapBuilder {
    /// Create a new MapBuilder with default configuration
    pub fn new() -> Self {
        Self {
            config: MapConfig::default(),
            engine: None,
            loader: None,
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: MapConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the container
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.config.container = MapContainer::new(container);
        self
    }

    /// Set the map options
    pub fn with_map_options(mut self, options: MapOptions) -> Self {
        self.config.map_options = options;
        self
    }

    /// Set options for cluster managers
    pub fn with_cluster_options(mut self, options: ClusterOptions) -> Self {
        self.config.cluster_options = Some(options);
        self
    }

    /// Set the engine (required)
    pub fn with_engine(mut self, engine: Arc<dyn MapEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the engine loader; defaults to [`ReadyLoader`]
    pub fn with_loader(mut self, loader: Arc<dyn EngineLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Build the context
    ///
    /// Starts the main task queue, so this must run inside a tokio runtime.
    pub fn build(self) -> Result<MapContext> {
        let engine = self
            .engine
            .ok_or_else(|| MapError::config("no map engine configured"))?;
        self.config.validate()?;

        info!(
            engine = %engine.name(),
            container = %self.config.container,
            "Building map context"
        );

        let loader = self.loader.unwrap_or_else(|| Arc::new(ReadyLoader));
        let zone = Zone::spawn(self.config.zone_name.clone());
        let handle = MapHandle::new(engine, loader, zone);

        Ok(MapContext {
            config: self.config,
            handle,
        })
    }
}

impl Default for MapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured engine handle
#[derive(Debug, Clone)]
pub struct MapContext {
    config: MapConfig,
    handle: MapHandle,
}

impl MapContext {
    /// The configuration this context was built with
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// The engine handle
    pub fn handle(&self) -> &MapHandle {
        &self.handle
    }

    /// Load the engine and construct the configured map
    pub async fn bootstrap(&self) -> Result<()> {
        self.handle
            .create_map(&self.config.container, &self.config.map_options)
            .await
    }

    /// A manager for markers attached directly to the map
    pub fn marker_manager(&self) -> Arc<MarkerManager> {
        Arc::new(MarkerManager::new(self.handle.clone()))
    }

    /// A manager for clustered markers
    ///
    /// Initialised with the configured cluster options when present;
    /// otherwise call [`ClusterManager::init`] yourself.
    pub fn cluster_manager(&self) -> Arc<ClusterManager> {
        let manager = ClusterManager::new(self.handle.clone());
        if let Some(options) = self.config.cluster_options.clone() {
            let _ = manager.init(options);
        }
        Arc::new(manager)
    }

    /// A new marker facade bound to `manager`
    pub fn marker(&self, manager: Arc<dyn EntityManager>) -> MarkerFacade {
        MarkerFacade::new(manager)
    }
}
