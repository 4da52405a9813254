//! Entity managers
//!
//! ## Table of Contents
//! - **EntityManager**: Capability interface used by marker facades
//! - **MarkerRegistry**: Identity to pending-marker association plus the
//!   update operations both managers share
//! - **MarkerManager**: Markers attached directly to the map
//! - **ClusterManager**: Markers owned by a clustering object
//!
//! Operations targeting an identity with no entry are stale (normal during
//! teardown races). They log at trace level and complete successfully.

pub mod cluster;
pub mod marker;

pub use cluster::ClusterManager;
pub use marker::MarkerManager;

use crate::deferred::{Completion, Deferred};
use crate::engine::NativeMarkerRef;
use crate::events::{observe, EventStream};
use crate::facade::{MarkerDescriptor, MarkerId};
use crate::handle::MapHandle;
use crate::types::{Animation, MarkerOptions, NativeAnimation, NativeEvent};
use dashmap::DashMap;
use tracing::{debug, trace};

/// Create, update and delete engine objects for marker descriptions
pub trait EntityManager: Send + Sync {
    /// Start constructing the engine object; does not wait for it
    fn add_entity(&self, marker: &MarkerDescriptor);

    /// Detach and forget the engine object; a no-op when none exists
    fn delete_entity(&self, marker: &MarkerDescriptor) -> Completion<()>;

    /// Apply the position and recenter the map on it
    fn update_position(&self, marker: &MarkerDescriptor) -> Completion<()>;

    /// Apply the title
    fn update_title(&self, marker: &MarkerDescriptor) -> Completion<()>;

    /// Apply the label
    fn update_label(&self, marker: &MarkerDescriptor) -> Completion<()>;

    /// Apply the drag flag
    fn update_draggable(&self, marker: &MarkerDescriptor) -> Completion<()>;

    /// Apply the icon
    fn update_icon(&self, marker: &MarkerDescriptor) -> Completion<()>;

    /// Apply the opacity
    fn update_opacity(&self, marker: &MarkerDescriptor) -> Completion<()>;

    /// Apply visibility
    fn update_visible(&self, marker: &MarkerDescriptor) -> Completion<()>;

    /// Apply the stacking index
    fn update_z_index(&self, marker: &MarkerDescriptor) -> Completion<()>;

    /// Apply the clickable flag
    fn update_clickable(&self, marker: &MarkerDescriptor) -> Completion<()>;

    /// Apply the animation
    fn update_animation(&self, marker: &MarkerDescriptor) -> Completion<()>;

    /// Stream a named event from the engine object once it exists
    ///
    /// The stream never completes on its own; dispose it when the
    /// description is destroyed.
    fn create_event_observable(&self, event: &str, marker: &MarkerDescriptor) -> EventStream<NativeEvent>;

    /// The raw pending engine object
    ///
    /// Use with care: mutations made through it bypass the manager.
    fn native_entity(&self, marker: &MarkerDescriptor) -> Option<Deferred<NativeMarkerRef>>;
}

/// Association from marker identity to pending engine object
pub struct MarkerRegistry {
    markers: DashMap<MarkerId, Deferred<NativeMarkerRef>>,
    handle: MapHandle,
}

impl MarkerRegistry {
    /// Create an empty registry over `handle`
    pub fn new(handle: MapHandle) -> Self {
        Self {
            markers: DashMap::new(),
            handle,
        }
    }

    /// The engine handle
    pub fn handle(&self) -> &MapHandle {
        &self.handle
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Whether `id` has an entry
    pub fn contains(&self, id: MarkerId) -> bool {
        self.markers.contains_key(&id)
    }

    /// The pending object for `id`
    pub fn get(&self, id: MarkerId) -> Option<Deferred<NativeMarkerRef>> {
        self.markers.get(&id).map(|entry| entry.value().clone())
    }

    /// Remove and return the pending object for `id`
    pub fn take(&self, id: MarkerId) -> Option<Deferred<NativeMarkerRef>> {
        self.markers.remove(&id).map(|(_, pending)| pending)
    }

    /// Start creating the engine object for `marker`
    ///
    /// Returns `None` without creating anything when `marker` already has
    /// an entry.
    pub fn register(&self, marker: &MarkerDescriptor, add_to_map: bool) -> Option<Deferred<NativeMarkerRef>> {
        if self.contains(marker.id()) {
            debug!(marker = %marker, "Marker already registered, ignoring add");
            return None;
        }
        let pending = self
            .handle
            .create_marker(self.marker_options(marker), add_to_map);
        self.markers.insert(marker.id(), pending.clone());
        debug!(marker = %marker, add_to_map, "Marker registered");
        Some(pending)
    }

    /// Translate a description into engine construction options
    pub fn marker_options(&self, marker: &MarkerDescriptor) -> MarkerOptions {
        MarkerOptions {
            position: marker.position(),
            title: marker.title.clone(),
            label: marker.label.clone(),
            draggable: marker.draggable,
            icon: marker.icon(),
            opacity: marker.opacity,
            visible: marker.visible,
            z_index: marker.z_index,
            clickable: marker.clickable,
            animation: self.animation(marker.animation),
        }
    }

    /// Map a declared animation onto the engine's constant
    ///
    /// Named modes go through the engine's table; native values pass
    /// through unchanged.
    pub fn animation(&self, animation: Option<Animation>) -> Option<NativeAnimation> {
        match animation? {
            Animation::Native(value) => Some(value),
            named => {
                let name = named.name()?;
                let value = self.handle.engine().animation(name);
                if value.is_none() {
                    trace!(animation = name, "Engine has no such animation");
                }
                value
            }
        }
    }

    /// Run `f` on the engine object for `marker` once it exists
    pub fn with_marker<F>(&self, marker: &MarkerDescriptor, op: &'static str, f: F) -> Completion<()>
    where
        F: FnOnce(&NativeMarkerRef) + Send + 'static,
    {
        match self.get(marker.id()) {
            Some(pending) => pending.then(f),
            None => {
                trace!(marker = %marker, op, "Stale marker operation ignored");
                Completion::ready(Ok(()))
            }
        }
    }

    /// Apply the position and recenter the map on it
    pub fn update_position(&self, marker: &MarkerDescriptor) -> Completion<()> {
        let Some(position) = marker.position() else {
            trace!(marker = %marker, "Position incomplete, update skipped");
            return Completion::ready(Ok(()));
        };
        let handle = self.handle.clone();
        self.with_marker(marker, "position", move |m| {
            m.set_position(position);
            // The map is already resolved here, so the recenter has run.
            drop(handle.set_center(position));
        })
    }

    /// Apply the title
    pub fn update_title(&self, marker: &MarkerDescriptor) -> Completion<()> {
        let title = marker.title.clone();
        self.with_marker(marker, "title", move |m| m.set_title(title))
    }

    /// Apply the label
    pub fn update_label(&self, marker: &MarkerDescriptor) -> Completion<()> {
        let label = marker.label.clone();
        self.with_marker(marker, "label", move |m| m.set_label(label))
    }

    /// Apply the drag flag
    pub fn update_draggable(&self, marker: &MarkerDescriptor) -> Completion<()> {
        let draggable = marker.draggable;
        self.with_marker(marker, "draggable", move |m| m.set_draggable(draggable))
    }

    /// Apply the icon
    pub fn update_icon(&self, marker: &MarkerDescriptor) -> Completion<()> {
        let icon = marker.icon().map(|icon| icon.to_native()).unwrap_or_default();
        self.with_marker(marker, "icon", move |m| m.set_icon(icon))
    }

    /// Apply the opacity
    pub fn update_opacity(&self, marker: &MarkerDescriptor) -> Completion<()> {
        let opacity = marker.opacity;
        self.with_marker(marker, "opacity", move |m| m.set_opacity(opacity))
    }

    /// Apply visibility
    pub fn update_visible(&self, marker: &MarkerDescriptor) -> Completion<()> {
        let visible = marker.visible;
        self.with_marker(marker, "visible", move |m| m.set_visible(visible))
    }

    /// Apply the stacking index
    pub fn update_z_index(&self, marker: &MarkerDescriptor) -> Completion<()> {
        let z_index = marker.z_index;
        self.with_marker(marker, "z_index", move |m| m.set_z_index(z_index))
    }

    /// Apply the clickable flag
    pub fn update_clickable(&self, marker: &MarkerDescriptor) -> Completion<()> {
        let clickable = marker.clickable;
        self.with_marker(marker, "clickable", move |m| m.set_clickable(clickable))
    }

    /// Apply the animation
    pub fn update_animation(&self, marker: &MarkerDescriptor) -> Completion<()> {
        let animation = self.animation(marker.animation);
        self.with_marker(marker, "animation", move |m| m.set_animation(animation))
    }

    /// Stream a named event from the engine object for `marker`
    ///
    /// A stale identity gets a stream that ends immediately.
    pub fn observe(&self, event: &str, marker: &MarkerDescriptor) -> EventStream<NativeEvent> {
        match self.get(marker.id()) {
            Some(pending) => observe(&pending, self.handle.zone(), event, |m, name, listener| {
                m.add_listener(name, listener)
            }),
            None => {
                trace!(marker = %marker, event, "Event subscription for unknown marker");
                let (_, stream) = EventStream::channel();
                stream
            }
        }
    }
}

impl std::fmt::Debug for MarkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerRegistry")
            .field("markers", &self.markers.len())
            .field("handle", &self.handle)
            .finish()
    }
}
