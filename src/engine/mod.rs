//! Capability traits for the external mapping engine
//!
//! ## Table of Contents
//! - **EngineLoader**: Fetches the engine bundle and populates its namespace
//! - **MapEngine**: Constructors and engine-global helpers
//! - **NativeMap / NativeMarker / NativeClusterer / NativeOverlay**: Live objects
//! - **ListenerHandle**: Disposal handle for a registered native listener
//! - **ReadyLoader**: Loader for engines that are available up front
//! - **memory**: Recording in-memory engine
//!
//! Every native object is shared as `Arc<dyn Trait>`; mutators take `&self`
//! because engine objects are internally synchronized handles.

pub mod memory;

use crate::error::Result;
use crate::types::{
    ClusterOptions, ClusterStyle, CalculatorFn, LatLngBounds, LatLngLiteral, MapContainer,
    MapOptions, MapTypeId, MarkerLabel, MarkerOptions, NativeAnimation, NativeEvent, NativeIcon,
    OverlayKind, OverlayOptions,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Shared reference to a live map
pub type NativeMapRef = Arc<dyn NativeMap>;

/// Shared reference to a live marker
pub type NativeMarkerRef = Arc<dyn NativeMarker>;

/// Shared reference to a live clustering object
pub type NativeClustererRef = Arc<dyn NativeClusterer>;

/// Shared reference to a live non-marker overlay
pub type NativeOverlayRef = Arc<dyn NativeOverlay>;

/// Callback registered with the engine for a named event
pub type Listener = Arc<dyn Fn(NativeEvent) + Send + Sync>;

/// Loads the engine's script bundle
///
/// Failures propagate to the caller; the loader is never retried by this
/// crate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngineLoader: Send + Sync {
    /// Resolve once the engine namespace is populated
    async fn load(&self) -> Result<()>;
}

/// Loader for engines whose namespace is populated before the handle exists
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadyLoader;

#[async_trait]
impl EngineLoader for ReadyLoader {
    async fn load(&self) -> Result<()> {
        Ok(())
    }
}

/// Marker construction options in the engine's representation
#[derive(Clone, Default)]
pub struct NativeMarkerOptions {
    /// Map to attach to during construction; `None` builds a detached marker
    pub map: Option<NativeMapRef>,
    /// Position
    pub position: Option<LatLngLiteral>,
    /// Hover title
    pub title: Option<String>,
    /// Label
    pub label: Option<MarkerLabel>,
    /// Drag enabled
    pub draggable: bool,
    /// Icon with native size/point values
    pub icon: Option<NativeIcon>,
    /// Opacity in [0, 1]
    pub opacity: f64,
    /// Visibility
    pub visible: bool,
    /// Stacking index
    pub z_index: i32,
    /// Clickable
    pub clickable: bool,
    /// Animation constant
    pub animation: Option<NativeAnimation>,
}

impl NativeMarkerOptions {
    /// Translate declared options, converting icon pixel pairs
    pub fn from_options(options: MarkerOptions, map: Option<NativeMapRef>) -> Self {
        Self {
            map,
            position: options.position,
            title: options.title,
            label: options.label,
            draggable: options.draggable,
            icon: options.icon.as_ref().map(|icon| icon.to_native()),
            opacity: options.opacity,
            visible: options.visible,
            z_index: options.z_index,
            clickable: options.clickable,
            animation: options.animation,
        }
    }
}

impl std::fmt::Debug for NativeMarkerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeMarkerOptions")
            .field("attached", &self.map.is_some())
            .field("position", &self.position)
            .field("title", &self.title)
            .field("icon", &self.icon)
            .field("animation", &self.animation)
            .finish_non_exhaustive()
    }
}

/// The mapping engine: constructors and engine-global helpers
pub trait MapEngine: Send + Sync {
    /// Construct a map inside `container`
    fn create_map(&self, container: &MapContainer, options: &MapOptions) -> Result<NativeMapRef>;

    /// Construct a marker, attached to `options.map` when present
    fn create_marker(&self, options: NativeMarkerOptions) -> Result<NativeMarkerRef>;

    /// Construct a detached shape, data layer or info window
    fn create_overlay(&self, options: OverlayOptions) -> Result<NativeOverlayRef>;

    /// Construct a clustering object over `map`
    fn create_clusterer(
        &self,
        map: NativeMapRef,
        markers: Vec<NativeMarkerRef>,
        options: &ClusterOptions,
    ) -> Result<NativeClustererRef>;

    /// Look up a named animation mode in the engine's animation table
    fn animation(&self, name: &str) -> Option<NativeAnimation>;

    /// Remove every listener registered on `map`
    fn clear_instance_listeners(&self, map: &dyn NativeMap);

    /// Fire the named event on `map`
    fn trigger(&self, map: &dyn NativeMap, event: &str);

    /// Engine name for logging
    fn name(&self) -> &str {
        "engine"
    }
}

/// Disposal handle for a registered listener
pub trait ListenerHandle: Send + Sync {
    /// Stop delivering events to the listener
    fn remove(&self);
}

/// A live map instance
pub trait NativeMap: Send + Sync {
    /// Apply new options
    fn set_options(&self, options: &MapOptions);
    /// Move the viewport center
    fn set_center(&self, center: LatLngLiteral);
    /// Current viewport center
    fn get_center(&self) -> LatLngLiteral;
    /// Set zoom level
    fn set_zoom(&self, zoom: f64);
    /// Current zoom level
    fn get_zoom(&self) -> f64;
    /// Visible area, if the map has been laid out
    fn get_bounds(&self) -> Option<LatLngBounds>;
    /// Current base map type
    fn get_map_type_id(&self) -> MapTypeId;
    /// Animate the center to `center`
    fn pan_to(&self, center: LatLngLiteral);
    /// Pan by a pixel offset
    fn pan_by(&self, x: f64, y: f64);
    /// Fit the viewport to `bounds`
    fn fit_bounds(&self, bounds: LatLngBounds);
    /// Pan the minimum distance needed to show `bounds`
    fn pan_to_bounds(&self, bounds: LatLngBounds);
    /// Register a listener for a named event
    fn add_listener(&self, event: &str, listener: Listener) -> Box<dyn ListenerHandle>;
}

/// A live marker
pub trait NativeMarker: Send + Sync {
    /// Attach to a map, or detach with `None`
    fn set_map(&self, map: Option<NativeMapRef>);
    /// Move the marker
    fn set_position(&self, position: LatLngLiteral);
    /// Set hover title
    fn set_title(&self, title: Option<String>);
    /// Set label
    fn set_label(&self, label: Option<MarkerLabel>);
    /// Enable or disable dragging
    fn set_draggable(&self, draggable: bool);
    /// Replace the icon
    fn set_icon(&self, icon: NativeIcon);
    /// Set opacity
    fn set_opacity(&self, opacity: f64);
    /// Show or hide
    fn set_visible(&self, visible: bool);
    /// Set stacking index
    fn set_z_index(&self, z_index: i32);
    /// Enable or disable clicks
    fn set_clickable(&self, clickable: bool);
    /// Start or stop an animation
    fn set_animation(&self, animation: Option<NativeAnimation>);
    /// Register a listener for a named event
    fn add_listener(&self, event: &str, listener: Listener) -> Box<dyn ListenerHandle>;
}

/// A live clustering object
pub trait NativeClusterer: Send + Sync {
    /// Add a marker to the membership
    fn add_marker(&self, marker: NativeMarkerRef);
    /// Remove a marker from the membership; false when it was not a member
    fn remove_marker(&self, marker: &NativeMarkerRef) -> bool;
    /// Empty the membership
    fn clear_markers(&self);
    /// Set grid size
    fn set_grid_size(&self, size: u32);
    /// Set max zoom
    fn set_max_zoom(&self, zoom: u32);
    /// Set icon styles
    fn set_styles(&self, styles: Vec<ClusterStyle>);
    /// Set zoom-on-click
    fn set_zoom_on_click(&self, enabled: bool);
    /// Set average-center
    fn set_average_center(&self, enabled: bool);
    /// Set image path
    fn set_image_path(&self, path: String);
    /// Set minimum cluster size
    fn set_minimum_cluster_size(&self, size: u32);
    /// Set image extension
    fn set_image_extension(&self, extension: String);
    /// Set size calculator
    fn set_calculator(&self, calculator: CalculatorFn);
}

/// A live shape, data layer or info window
pub trait NativeOverlay: Send + Sync {
    /// What this overlay is
    fn kind(&self) -> OverlayKind;
    /// Attach to a map, or detach with `None`
    fn set_map(&self, map: Option<NativeMapRef>);
    /// Register a listener for a named event
    fn add_listener(&self, event: &str, listener: Listener) -> Box<dyn ListenerHandle>;
}
