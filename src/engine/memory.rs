//! In-memory engine
//!
//! ## Table of Contents
//! - **MemoryEngine**: Engine that builds recording objects
//! - **MemoryMap / MemoryMarker / MemoryClusterer / MemoryOverlay**: Live objects
//! - **MemoryLoader / LoadGate**: Loader whose completion the caller controls
//!
//! Every mutator appends to an operation log so callers can assert exactly
//! which engine primitives ran and in what order. Events are fired by hand
//! with `fire`.

use super::{
    EngineLoader, Listener, ListenerHandle, MapEngine, NativeClusterer, NativeClustererRef,
    NativeMap, NativeMapRef, NativeMarker, NativeMarkerOptions, NativeMarkerRef, NativeOverlay,
    NativeOverlayRef,
};
use crate::deferred::{Deferred, Resolver};
use crate::error::{MapError, Result};
use crate::types::{
    CalculatorFn, ClusterIconInfo, ClusterOptions, ClusterStyle, LatLngBounds, LatLngLiteral,
    MapContainer, MapOptions, MapTypeId, MarkerLabel, NativeAnimation, NativeEvent, NativeIcon,
    OverlayKind, OverlayOptions,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Engine constant for the bounce animation
pub const BOUNCE: NativeAnimation = NativeAnimation(1);

/// Engine constant for the drop animation
pub const DROP: NativeAnimation = NativeAnimation(2);

fn same_object<A: ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    (a as *const A).cast::<()>() == (b as *const B).cast::<()>()
}

// ============================================================================
// Listeners
// ============================================================================

#[derive(Default)]
struct ListenerTable {
    next_key: u64,
    entries: HashMap<String, Vec<(u64, Listener)>>,
}

#[derive(Clone, Default)]
struct Listeners {
    table: Arc<Mutex<ListenerTable>>,
}

impl Listeners {
    fn add(&self, event: &str, listener: Listener) -> Box<dyn ListenerHandle> {
        let mut table = self.table.lock();
        table.next_key += 1;
        let key = table.next_key;
        table
            .entries
            .entry(event.to_string())
            .or_default()
            .push((key, listener));

        Box::new(MemoryListener {
            table: Arc::downgrade(&self.table),
            event: event.to_string(),
            key,
        })
    }

    fn fire(&self, event: &str, payload: NativeEvent) -> usize {
        let listeners: Vec<Listener> = self
            .table
            .lock()
            .entries
            .get(event)
            .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();

        for listener in &listeners {
            listener(payload.clone());
        }
        listeners.len()
    }

    fn count(&self, event: &str) -> usize {
        self.table
            .lock()
            .entries
            .get(event)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn clear(&self) {
        self.table.lock().entries.clear();
    }
}

struct MemoryListener {
    table: Weak<Mutex<ListenerTable>>,
    event: String,
    key: u64,
}

impl ListenerHandle for MemoryListener {
    fn remove(&self) {
        if let Some(table) = self.table.upgrade() {
            if let Some(entries) = table.lock().entries.get_mut(&self.event) {
                entries.retain(|(key, _)| *key != self.key);
            }
        }
    }
}

// ============================================================================
// Map
// ============================================================================

/// Recorded map operation
#[derive(Debug, Clone, PartialEq)]
pub enum MapOp {
    /// `set_options`
    SetOptions(MapOptions),
    /// `set_center`
    SetCenter(LatLngLiteral),
    /// `set_zoom`
    SetZoom(f64),
    /// `pan_to`
    PanTo(LatLngLiteral),
    /// `pan_by`
    PanBy(f64, f64),
    /// `fit_bounds`
    FitBounds(LatLngBounds),
    /// `pan_to_bounds`
    PanToBounds(LatLngBounds),
    /// Engine-level trigger
    Trigger(String),
    /// Engine-level listener wipe
    ClearListeners,
}

#[derive(Debug, Clone)]
struct MapState {
    options: MapOptions,
    center: LatLngLiteral,
    zoom: f64,
    bounds: Option<LatLngBounds>,
}

/// Recording map
pub struct MemoryMap {
    container: MapContainer,
    state: Mutex<MapState>,
    ops: Mutex<Vec<MapOp>>,
    listeners: Listeners,
}

impl MemoryMap {
    fn new(container: &MapContainer, options: &MapOptions) -> Self {
        Self {
            container: container.clone(),
            state: Mutex::new(MapState {
                options: options.clone(),
                center: options.center.unwrap_or(LatLngLiteral::new(0.0, 0.0)),
                zoom: options.zoom.unwrap_or(8.0),
                bounds: None,
            }),
            ops: Mutex::new(Vec::new()),
            listeners: Listeners::default(),
        }
    }

    /// Container the map was created in
    pub fn container(&self) -> &MapContainer {
        &self.container
    }

    /// Recorded operations
    pub fn ops(&self) -> Vec<MapOp> {
        self.ops.lock().clone()
    }

    /// Current options
    pub fn options(&self) -> MapOptions {
        self.state.lock().options.clone()
    }

    /// Fire a named event at registered listeners; returns how many ran
    pub fn fire(&self, event: &str, payload: NativeEvent) -> usize {
        self.listeners.fire(event, payload)
    }

    /// Number of listeners for a named event
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.count(event)
    }

    fn record(&self, op: MapOp) {
        self.ops.lock().push(op);
    }
}

impl NativeMap for MemoryMap {
    fn set_options(&self, options: &MapOptions) {
        self.state.lock().options = options.clone();
        self.record(MapOp::SetOptions(options.clone()));
    }

    fn set_center(&self, center: LatLngLiteral) {
        self.state.lock().center = center;
        self.record(MapOp::SetCenter(center));
    }

    fn get_center(&self) -> LatLngLiteral {
        self.state.lock().center
    }

    fn set_zoom(&self, zoom: f64) {
        self.state.lock().zoom = zoom;
        self.record(MapOp::SetZoom(zoom));
    }

    fn get_zoom(&self) -> f64 {
        self.state.lock().zoom
    }

    fn get_bounds(&self) -> Option<LatLngBounds> {
        self.state.lock().bounds
    }

    fn get_map_type_id(&self) -> MapTypeId {
        self.state.lock().options.map_type_id.unwrap_or_default()
    }

    fn pan_to(&self, center: LatLngLiteral) {
        self.state.lock().center = center;
        self.record(MapOp::PanTo(center));
    }

    fn pan_by(&self, x: f64, y: f64) {
        self.record(MapOp::PanBy(x, y));
    }

    fn fit_bounds(&self, bounds: LatLngBounds) {
        {
            let mut state = self.state.lock();
            state.bounds = Some(bounds);
            state.center = bounds.center();
        }
        self.record(MapOp::FitBounds(bounds));
    }

    fn pan_to_bounds(&self, bounds: LatLngBounds) {
        self.state.lock().center = bounds.center();
        self.record(MapOp::PanToBounds(bounds));
    }

    fn add_listener(&self, event: &str, listener: Listener) -> Box<dyn ListenerHandle> {
        self.listeners.add(event, listener)
    }
}

// ============================================================================
// Marker
// ============================================================================

/// Recorded marker operation
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerOp {
    /// `set_map`; true when attached
    SetMap(bool),
    /// `set_position`
    SetPosition(LatLngLiteral),
    /// `set_title`
    SetTitle(Option<String>),
    /// `set_label`
    SetLabel(Option<MarkerLabel>),
    /// `set_draggable`
    SetDraggable(bool),
    /// `set_icon`
    SetIcon(NativeIcon),
    /// `set_opacity`
    SetOpacity(f64),
    /// `set_visible`
    SetVisible(bool),
    /// `set_z_index`
    SetZIndex(i32),
    /// `set_clickable`
    SetClickable(bool),
    /// `set_animation`
    SetAnimation(Option<NativeAnimation>),
}

/// Snapshot of a marker's engine-side attributes
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerState {
    /// Currently attached to a map
    pub attached: bool,
    /// Position
    pub position: Option<LatLngLiteral>,
    /// Title
    pub title: Option<String>,
    /// Label
    pub label: Option<MarkerLabel>,
    /// Draggable
    pub draggable: bool,
    /// Icon
    pub icon: Option<NativeIcon>,
    /// Opacity
    pub opacity: f64,
    /// Visible
    pub visible: bool,
    /// Stacking index
    pub z_index: i32,
    /// Clickable
    pub clickable: bool,
    /// Animation
    pub animation: Option<NativeAnimation>,
}

/// Recording marker
pub struct MemoryMarker {
    attached_at_construction: bool,
    state: Mutex<MarkerState>,
    ops: Mutex<Vec<MarkerOp>>,
    listeners: Listeners,
}

impl MemoryMarker {
    fn new(options: NativeMarkerOptions) -> Self {
        let attached = options.map.is_some();
        Self {
            attached_at_construction: attached,
            state: Mutex::new(MarkerState {
                attached,
                position: options.position,
                title: options.title,
                label: options.label,
                draggable: options.draggable,
                icon: options.icon,
                opacity: options.opacity,
                visible: options.visible,
                z_index: options.z_index,
                clickable: options.clickable,
                animation: options.animation,
            }),
            ops: Mutex::new(Vec::new()),
            listeners: Listeners::default(),
        }
    }

    /// Whether the constructor received a map
    pub fn attached_at_construction(&self) -> bool {
        self.attached_at_construction
    }

    /// Current attributes
    pub fn state(&self) -> MarkerState {
        self.state.lock().clone()
    }

    /// Recorded operations
    pub fn ops(&self) -> Vec<MarkerOp> {
        self.ops.lock().clone()
    }

    /// Whether any `set_map(Some(_))` call was recorded
    pub fn ever_attached_by_set_map(&self) -> bool {
        self.ops.lock().iter().any(|op| *op == MarkerOp::SetMap(true))
    }

    /// Fire a named event at registered listeners; returns how many ran
    pub fn fire(&self, event: &str, payload: NativeEvent) -> usize {
        self.listeners.fire(event, payload)
    }

    /// Number of listeners for a named event
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.count(event)
    }

    fn apply(&self, op: MarkerOp) {
        {
            let mut state = self.state.lock();
            match &op {
                MarkerOp::SetMap(attached) => state.attached = *attached,
                MarkerOp::SetPosition(p) => state.position = Some(*p),
                MarkerOp::SetTitle(t) => state.title = t.clone(),
                MarkerOp::SetLabel(l) => state.label = l.clone(),
                MarkerOp::SetDraggable(d) => state.draggable = *d,
                MarkerOp::SetIcon(i) => state.icon = Some(i.clone()),
                MarkerOp::SetOpacity(o) => state.opacity = *o,
                MarkerOp::SetVisible(v) => state.visible = *v,
                MarkerOp::SetZIndex(z) => state.z_index = *z,
                MarkerOp::SetClickable(c) => state.clickable = *c,
                MarkerOp::SetAnimation(a) => state.animation = *a,
            }
        }
        self.ops.lock().push(op);
    }
}

impl NativeMarker for MemoryMarker {
    fn set_map(&self, map: Option<NativeMapRef>) {
        self.apply(MarkerOp::SetMap(map.is_some()));
    }

    fn set_position(&self, position: LatLngLiteral) {
        self.apply(MarkerOp::SetPosition(position));
    }

    fn set_title(&self, title: Option<String>) {
        self.apply(MarkerOp::SetTitle(title));
    }

    fn set_label(&self, label: Option<MarkerLabel>) {
        self.apply(MarkerOp::SetLabel(label));
    }

    fn set_draggable(&self, draggable: bool) {
        self.apply(MarkerOp::SetDraggable(draggable));
    }

    fn set_icon(&self, icon: NativeIcon) {
        self.apply(MarkerOp::SetIcon(icon));
    }

    fn set_opacity(&self, opacity: f64) {
        self.apply(MarkerOp::SetOpacity(opacity));
    }

    fn set_visible(&self, visible: bool) {
        self.apply(MarkerOp::SetVisible(visible));
    }

    fn set_z_index(&self, z_index: i32) {
        self.apply(MarkerOp::SetZIndex(z_index));
    }

    fn set_clickable(&self, clickable: bool) {
        self.apply(MarkerOp::SetClickable(clickable));
    }

    fn set_animation(&self, animation: Option<NativeAnimation>) {
        self.apply(MarkerOp::SetAnimation(animation));
    }

    fn add_listener(&self, event: &str, listener: Listener) -> Box<dyn ListenerHandle> {
        self.listeners.add(event, listener)
    }
}

// ============================================================================
// Clusterer
// ============================================================================

/// Clustering configuration as held by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ClustererConfig {
    /// Grid size
    pub grid_size: u32,
    /// Max zoom
    pub max_zoom: Option<u32>,
    /// Icon styles
    pub styles: Vec<ClusterStyle>,
    /// Zoom on click
    pub zoom_on_click: bool,
    /// Average center
    pub average_center: bool,
    /// Image path
    pub image_path: String,
    /// Minimum cluster size
    pub minimum_cluster_size: u32,
    /// Image extension
    pub image_extension: String,
    /// Whether a custom calculator is installed
    pub custom_calculator: bool,
}

impl Default for ClustererConfig {
    fn default() -> Self {
        Self {
            grid_size: 60,
            max_zoom: None,
            styles: Vec::new(),
            zoom_on_click: true,
            average_center: false,
            image_path: "../images/m".to_string(),
            minimum_cluster_size: 2,
            image_extension: "png".to_string(),
            custom_calculator: false,
        }
    }
}

/// Recording clustering object
pub struct MemoryClusterer {
    members: Mutex<Vec<NativeMarkerRef>>,
    config: Mutex<ClustererConfig>,
    calculator: Mutex<Option<CalculatorFn>>,
}

impl MemoryClusterer {
    fn new(markers: Vec<NativeMarkerRef>, options: &ClusterOptions) -> Self {
        let defaults = ClustererConfig::default();
        let calculator = options
            .calculator
            .as_ref()
            .and_then(|c| c.as_function().cloned());
        let config = ClustererConfig {
            grid_size: options.grid_size.unwrap_or(defaults.grid_size),
            max_zoom: options.max_zoom.or(defaults.max_zoom),
            styles: options.styles.clone().unwrap_or(defaults.styles),
            zoom_on_click: options.zoom_on_click.unwrap_or(defaults.zoom_on_click),
            average_center: options.average_center.unwrap_or(defaults.average_center),
            image_path: options.image_path.clone().unwrap_or(defaults.image_path),
            minimum_cluster_size: options
                .minimum_cluster_size
                .unwrap_or(defaults.minimum_cluster_size),
            image_extension: options
                .image_extension
                .clone()
                .unwrap_or(defaults.image_extension),
            custom_calculator: calculator.is_some(),
        };
        Self {
            members: Mutex::new(markers),
            config: Mutex::new(config),
            calculator: Mutex::new(calculator),
        }
    }

    /// Current configuration
    pub fn config(&self) -> ClustererConfig {
        self.config.lock().clone()
    }

    /// Number of member markers
    pub fn member_count(&self) -> usize {
        self.members.lock().len()
    }

    /// Run the installed calculator over the current members
    pub fn calculate(&self, style_count: usize) -> Option<ClusterIconInfo> {
        let calculator = self.calculator.lock().clone()?;
        let members = self.members.lock().clone();
        Some(calculator(&members, style_count))
    }
}

impl NativeClusterer for MemoryClusterer {
    fn add_marker(&self, marker: NativeMarkerRef) {
        self.members.lock().push(marker);
    }

    fn remove_marker(&self, marker: &NativeMarkerRef) -> bool {
        let mut members = self.members.lock();
        let before = members.len();
        members.retain(|m| !same_object(&**m, &**marker));
        members.len() != before
    }

    fn clear_markers(&self) {
        self.members.lock().clear();
    }

    fn set_grid_size(&self, size: u32) {
        self.config.lock().grid_size = size;
    }

    fn set_max_zoom(&self, zoom: u32) {
        self.config.lock().max_zoom = Some(zoom);
    }

    fn set_styles(&self, styles: Vec<ClusterStyle>) {
        self.config.lock().styles = styles;
    }

    fn set_zoom_on_click(&self, enabled: bool) {
        self.config.lock().zoom_on_click = enabled;
    }

    fn set_average_center(&self, enabled: bool) {
        self.config.lock().average_center = enabled;
    }

    fn set_image_path(&self, path: String) {
        self.config.lock().image_path = path;
    }

    fn set_minimum_cluster_size(&self, size: u32) {
        self.config.lock().minimum_cluster_size = size;
    }

    fn set_image_extension(&self, extension: String) {
        self.config.lock().image_extension = extension;
    }

    fn set_calculator(&self, calculator: CalculatorFn) {
        *self.calculator.lock() = Some(calculator);
        self.config.lock().custom_calculator = true;
    }
}

// ============================================================================
// Overlays
// ============================================================================

/// Recording shape, data layer or info window
pub struct MemoryOverlay {
    options: OverlayOptions,
    attached: Mutex<bool>,
    listeners: Listeners,
}

impl MemoryOverlay {
    /// Whether the overlay is attached to a map
    pub fn is_attached(&self) -> bool {
        *self.attached.lock()
    }
}

impl NativeOverlay for MemoryOverlay {
    fn kind(&self) -> OverlayKind {
        self.options.kind()
    }

    fn set_map(&self, map: Option<NativeMapRef>) {
        *self.attached.lock() = map.is_some();
    }

    fn add_listener(&self, event: &str, listener: Listener) -> Box<dyn ListenerHandle> {
        self.listeners.add(event, listener)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Engine that builds recording objects
#[derive(Default)]
pub struct MemoryEngine {
    maps: Mutex<Vec<Arc<MemoryMap>>>,
    markers: Mutex<Vec<Arc<MemoryMarker>>>,
    clusterers: Mutex<Vec<Arc<MemoryClusterer>>>,
    overlays: Mutex<Vec<Arc<MemoryOverlay>>>,
    map_failure: Mutex<Option<String>>,
}

impl MemoryEngine {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create_map` call fail with `msg`
    pub fn fail_next_map(&self, msg: impl Into<String>) {
        *self.map_failure.lock() = Some(msg.into());
    }

    /// Maps created so far
    pub fn maps(&self) -> Vec<Arc<MemoryMap>> {
        self.maps.lock().clone()
    }

    /// Markers created so far, in creation order
    pub fn markers(&self) -> Vec<Arc<MemoryMarker>> {
        self.markers.lock().clone()
    }

    /// Clustering objects created so far
    pub fn clusterers(&self) -> Vec<Arc<MemoryClusterer>> {
        self.clusterers.lock().clone()
    }

    /// Overlays created so far
    pub fn overlays(&self) -> Vec<Arc<MemoryOverlay>> {
        self.overlays.lock().clone()
    }

    fn find_map(&self, map: &dyn NativeMap) -> Option<Arc<MemoryMap>> {
        self.maps
            .lock()
            .iter()
            .find(|m| same_object(&**m, map))
            .cloned()
    }
}

impl MapEngine for MemoryEngine {
    fn create_map(&self, container: &MapContainer, options: &MapOptions) -> Result<NativeMapRef> {
        if let Some(msg) = self.map_failure.lock().take() {
            return Err(MapError::engine(msg));
        }
        let map = Arc::new(MemoryMap::new(container, options));
        self.maps.lock().push(map.clone());
        debug!(container = %container, "Memory map created");
        Ok(map)
    }

    fn create_marker(&self, options: NativeMarkerOptions) -> Result<NativeMarkerRef> {
        let marker = Arc::new(MemoryMarker::new(options));
        self.markers.lock().push(marker.clone());
        Ok(marker)
    }

    fn create_overlay(&self, options: OverlayOptions) -> Result<NativeOverlayRef> {
        let overlay = Arc::new(MemoryOverlay {
            options,
            attached: Mutex::new(false),
            listeners: Listeners::default(),
        });
        self.overlays.lock().push(overlay.clone());
        Ok(overlay)
    }

    fn create_clusterer(
        &self,
        _map: NativeMapRef,
        markers: Vec<NativeMarkerRef>,
        options: &ClusterOptions,
    ) -> Result<NativeClustererRef> {
        let clusterer = Arc::new(MemoryClusterer::new(markers, options));
        self.clusterers.lock().push(clusterer.clone());
        Ok(clusterer)
    }

    fn animation(&self, name: &str) -> Option<NativeAnimation> {
        match name {
            "BOUNCE" => Some(BOUNCE),
            "DROP" => Some(DROP),
            _ => None,
        }
    }

    fn clear_instance_listeners(&self, map: &dyn NativeMap) {
        if let Some(map) = self.find_map(map) {
            map.listeners.clear();
            map.record(MapOp::ClearListeners);
        }
    }

    fn trigger(&self, map: &dyn NativeMap, event: &str) {
        if let Some(map) = self.find_map(map) {
            map.record(MapOp::Trigger(event.to_string()));
            map.fire(event, NativeEvent::empty());
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Loader
// ============================================================================

/// Loader whose completion is controlled by a [`LoadGate`]
pub struct MemoryLoader {
    gate: Deferred<()>,
    loads: AtomicUsize,
}

impl MemoryLoader {
    /// Loader that succeeds immediately
    pub fn ready() -> Self {
        Self {
            gate: Deferred::resolved(()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Loader that waits until the returned gate is opened or failed
    pub fn gated() -> (Self, LoadGate) {
        let (gate, resolver) = Deferred::new();
        let loader = Self {
            gate,
            loads: AtomicUsize::new(0),
        };
        (loader, LoadGate { resolver })
    }

    /// How many times `load` was called
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLoader for MemoryLoader {
    async fn load(&self) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.gate.value().await
    }
}

/// Controls when a gated [`MemoryLoader`] completes
pub struct LoadGate {
    resolver: Resolver<()>,
}

impl LoadGate {
    /// Let the load succeed
    pub fn open(self) {
        self.resolver.resolve(());
    }

    /// Let the load fail
    pub fn fail(self, msg: impl Into<String>) {
        self.resolver.reject(MapError::bootstrap(msg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CircleOptions;

    #[test]
    fn test_listener_removal() {
        let engine = MemoryEngine::new();
        let marker = engine
            .create_marker(NativeMarkerOptions::default())
            .unwrap();
        let recorded = engine.markers()[0].clone();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let handle = marker.add_listener(
            "click",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(recorded.fire("click", NativeEvent::empty()), 1);
        handle.remove();
        assert_eq!(recorded.fire("click", NativeEvent::empty()), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clusterer_membership() {
        let engine = MemoryEngine::new();
        let map = engine
            .create_map(&MapContainer::default(), &MapOptions::default())
            .unwrap();
        let clusterer = engine
            .create_clusterer(map, Vec::new(), &ClusterOptions::new().grid_size(40))
            .unwrap();
        let a = engine.create_marker(NativeMarkerOptions::default()).unwrap();
        let b = engine.create_marker(NativeMarkerOptions::default()).unwrap();

        clusterer.add_marker(a.clone());
        clusterer.add_marker(b.clone());
        assert!(clusterer.remove_marker(&a));
        assert!(!clusterer.remove_marker(&a));

        let recorded = engine.clusterers()[0].clone();
        assert_eq!(recorded.member_count(), 1);
        assert_eq!(recorded.config().grid_size, 40);
        assert_eq!(recorded.config().minimum_cluster_size, 2);
        assert!(clusterer.remove_marker(&b));
    }

    #[test]
    fn test_trigger_and_clear_listeners() {
        let engine = MemoryEngine::new();
        let map = engine
            .create_map(&MapContainer::default(), &MapOptions::default())
            .unwrap();
        let _handle = map.add_listener("idle", Arc::new(|_| {}));
        let recorded = engine.maps()[0].clone();
        assert_eq!(recorded.listener_count("idle"), 1);

        engine.trigger(map.as_ref(), "idle");
        engine.clear_instance_listeners(map.as_ref());

        assert_eq!(recorded.listener_count("idle"), 0);
        assert_eq!(
            recorded.ops(),
            vec![MapOp::Trigger("idle".to_string()), MapOp::ClearListeners]
        );
    }

    #[test]
    fn test_overlay_kind() {
        let engine = MemoryEngine::new();
        let circle = engine
            .create_overlay(OverlayOptions::Circle(CircleOptions {
                center: LatLngLiteral::new(1.0, 2.0),
                radius: 100.0,
                style: None,
            }))
            .unwrap();
        assert_eq!(circle.kind(), OverlayKind::Circle);
        assert!(!engine.overlays()[0].is_attached());
    }

    #[tokio::test]
    async fn test_gated_loader() {
        let (loader, gate) = MemoryLoader::gated();
        let loader = Arc::new(loader);

        let waiting = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load().await })
        };
        gate.fail("offline");

        let err = waiting.await.unwrap().unwrap_err();
        assert!(err.is_bootstrap());
        assert_eq!(loader.load_count(), 1);
    }
}
