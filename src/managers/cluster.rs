//! Cluster manager
//!
//! ## Table of Contents
//! - **ClusterManager**: Markers placed by a clustering object instead of the map
//!
//! Markers are built detached and handed to the clustering object once both
//! exist. Configuration setters may be issued before `init`; they queue on
//! the deferred clustering object and apply in issue order.

use super::{EntityManager, MarkerRegistry};
use crate::deferred::{Completion, Deferred, Resolver};
use crate::engine::{NativeClustererRef, NativeMarkerRef};
use crate::error::MapError;
use crate::events::EventStream;
use crate::facade::MarkerDescriptor;
use crate::handle::MapHandle;
use crate::types::{Calculator, ClusterOptions, NativeEvent};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

/// Manages markers grouped under one clustering object
pub struct ClusterManager {
    registry: MarkerRegistry,
    clusterer: Deferred<NativeClustererRef>,
    resolver: Mutex<Option<Resolver<NativeClustererRef>>>,
}

impl ClusterManager {
    /// Create a manager over `handle`; call [`ClusterManager::init`] to build the clusterer
    pub fn new(handle: MapHandle) -> Self {
        let (clusterer, resolver) = Deferred::new();
        Self {
            registry: MarkerRegistry::new(handle),
            clusterer,
            resolver: Mutex::new(Some(resolver)),
        }
    }

    /// The identity association
    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    /// The deferred clustering object
    pub fn clusterer(&self) -> Deferred<NativeClustererRef> {
        self.clusterer.clone()
    }

    /// Build the clustering object once the map exists
    ///
    /// Starts with no members. Only the first call has any effect.
    pub fn init(&self, options: ClusterOptions) -> Completion<()> {
        let resolver = self.resolver.lock().take();
        let Some(resolver) = resolver else {
            warn!("Clusterer already initialised, ignoring init");
            return self.clusterer.then(|_| ());
        };

        let engine = self.registry.handle().engine().clone();
        let (tx, completion) = Completion::channel();
        self.registry
            .handle()
            .native_map()
            .when_settled(move |outcome| {
                let outcome = outcome
                    .map_err(MapError::clone)
                    .and_then(|map| engine.create_clusterer(map.clone(), Vec::new(), &options));
                match &outcome {
                    Ok(_) => info!("Clusterer ready"),
                    Err(err) => error!(error = %err, "Clusterer construction failed"),
                }
                let result = outcome.as_ref().map(|_| ()).map_err(MapError::clone);
                resolver.settle(outcome);
                tx.send(result);
            });
        completion
    }

    /// Remove every member from the clustering object
    pub fn clear_entities(&self) -> Completion<()> {
        self.clusterer.then(|clusterer| clusterer.clear_markers())
    }

    /// Apply the grid size, if given
    pub fn set_grid_size(&self, options: &ClusterOptions) -> Completion<()> {
        let value = options.grid_size;
        self.clusterer.then(move |c| {
            if let Some(size) = value {
                c.set_grid_size(size);
            }
        })
    }

    /// Apply the max zoom, if given
    pub fn set_max_zoom(&self, options: &ClusterOptions) -> Completion<()> {
        let value = options.max_zoom;
        self.clusterer.then(move |c| {
            if let Some(zoom) = value {
                c.set_max_zoom(zoom);
            }
        })
    }

    /// Apply the icon styles, if given
    pub fn set_styles(&self, options: &ClusterOptions) -> Completion<()> {
        let value = options.styles.clone();
        self.clusterer.then(move |c| {
            if let Some(styles) = value {
                c.set_styles(styles);
            }
        })
    }

    /// Apply zoom-on-click, if given
    pub fn set_zoom_on_click(&self, options: &ClusterOptions) -> Completion<()> {
        let value = options.zoom_on_click;
        self.clusterer.then(move |c| {
            if let Some(enabled) = value {
                c.set_zoom_on_click(enabled);
            }
        })
    }

    /// Apply average-center, if given
    pub fn set_average_center(&self, options: &ClusterOptions) -> Completion<()> {
        let value = options.average_center;
        self.clusterer.then(move |c| {
            if let Some(enabled) = value {
                c.set_average_center(enabled);
            }
        })
    }

    /// Apply the image path, if given
    pub fn set_image_path(&self, options: &ClusterOptions) -> Completion<()> {
        let value = options.image_path.clone();
        self.clusterer.then(move |c| {
            if let Some(path) = value {
                c.set_image_path(path);
            }
        })
    }

    /// Apply the minimum cluster size, if given
    pub fn set_minimum_cluster_size(&self, options: &ClusterOptions) -> Completion<()> {
        let value = options.minimum_cluster_size;
        self.clusterer.then(move |c| {
            if let Some(size) = value {
                c.set_minimum_cluster_size(size);
            }
        })
    }

    /// Apply the image extension, if given
    pub fn set_image_extension(&self, options: &ClusterOptions) -> Completion<()> {
        let value = options.image_extension.clone();
        self.clusterer.then(move |c| {
            if let Some(extension) = value {
                c.set_image_extension(extension);
            }
        })
    }

    /// Apply the calculator, if given and callable
    pub fn set_calculator(&self, options: &ClusterOptions) -> Completion<()> {
        let value = options.calculator.clone();
        self.clusterer.then(move |c| match value {
            Some(Calculator::Function(calculator)) => c.set_calculator(calculator),
            Some(other) => trace!(calculator = ?other, "Calculator is not callable, ignored"),
            None => {}
        })
    }
}

impl std::fmt::Debug for ClusterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterManager")
            .field("registry", &self.registry)
            .field("clusterer", &self.clusterer)
            .finish()
    }
}

impl EntityManager for ClusterManager {
    fn add_entity(&self, marker: &MarkerDescriptor) {
        let Some(pending) = self.registry.register(marker, false) else {
            return;
        };
        let clusterer = self.clusterer.clone();
        pending.when_settled(move |outcome| {
            if let Ok(native) = outcome {
                let native = native.clone();
                clusterer.when_settled(move |outcome| {
                    if let Ok(clusterer) = outcome {
                        clusterer.add_marker(native);
                    }
                });
            }
        });
    }

    fn delete_entity(&self, marker: &MarkerDescriptor) -> Completion<()> {
        let Some(pending) = self.registry.take(marker.id()) else {
            trace!(marker = %marker, "Delete for unknown marker ignored");
            return Completion::ready(Ok(()));
        };
        debug!(marker = %marker, "Clustered marker deleted");

        let zone = self.registry.handle().zone().clone();
        let clusterer = self.clusterer.clone();
        let (tx, completion) = Completion::channel();
        pending.when_settled(move |outcome| match outcome {
            Ok(native) => {
                let detached = native.clone();
                zone.post(move || {
                    detached.set_map(None);
                    tx.send(Ok(()));
                });

                // Membership removal follows init, which may never come.
                let native = native.clone();
                clusterer.when_settled(move |outcome| {
                    if let Ok(clusterer) = outcome {
                        let clusterer = clusterer.clone();
                        zone.post(move || {
                            if !clusterer.remove_marker(&native) {
                                trace!("Marker was not a cluster member");
                            }
                        });
                    }
                });
            }
            Err(err) => tx.send(Err(err.clone())),
        });
        completion
    }

    fn update_position(&self, marker: &MarkerDescriptor) -> Completion<()> {
        self.registry.update_position(marker)
    }

    fn update_title(&self, marker: &MarkerDescriptor) -> Completion<()> {
        self.registry.update_title(marker)
    }

    fn update_label(&self, marker: &MarkerDescriptor) -> Completion<()> {
        self.registry.update_label(marker)
    }

    fn update_draggable(&self, marker: &MarkerDescriptor) -> Completion<()> {
        self.registry.update_draggable(marker)
    }

    fn update_icon(&self, marker: &MarkerDescriptor) -> Completion<()> {
        self.registry.update_icon(marker)
    }

    fn update_opacity(&self, marker: &MarkerDescriptor) -> Completion<()> {
        self.registry.update_opacity(marker)
    }

    fn update_visible(&self, marker: &MarkerDescriptor) -> Completion<()> {
        self.registry.update_visible(marker)
    }

    fn update_z_index(&self, marker: &MarkerDescriptor) -> Completion<()> {
        self.registry.update_z_index(marker)
    }

    fn update_clickable(&self, marker: &MarkerDescriptor) -> Completion<()> {
        self.registry.update_clickable(marker)
    }

    fn update_animation(&self, marker: &MarkerDescriptor) -> Completion<()> {
        self.registry.update_animation(marker)
    }

    fn create_event_observable(&self, event: &str, marker: &MarkerDescriptor) -> EventStream<NativeEvent> {
        self.registry.observe(event, marker)
    }

    fn native_entity(&self, marker: &MarkerDescriptor) -> Option<Deferred<NativeMarkerRef>> {
        self.registry.get(marker.id())
    }
}
