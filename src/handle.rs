//! Engine handle
//!
//! ## Table of Contents
//! - **MapHandle**: Owns the deferred map instance and gates every engine call on it
//!
//! Every operation is "wait for the map, then call the engine primitive".
//! Operations issued before the map exists queue on the deferred value and
//! run in issue order once it resolves. A failed bootstrap rejects the
//! deferred value, so every dependent operation fails instead of waiting.

use crate::deferred::{Completion, Deferred, Resolver};
use crate::engine::{
    EngineLoader, MapEngine, NativeMapRef, NativeMarkerOptions, NativeMarkerRef, NativeOverlayRef,
};
use crate::error::{MapError, Result};
use crate::events::{observe, EventStream};
use crate::types::{
    CircleOptions, DataOptions, InfoWindowOptions, LatLngBounds, LatLngLiteral, MapContainer,
    MapOptions, MapTypeId, MarkerOptions, NativeEvent, OverlayOptions, PolygonOptions,
    PolylineOptions, RectangleOptions,
};
use crate::zone::Zone;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info};

struct Inner {
    engine: Arc<dyn MapEngine>,
    loader: Arc<dyn EngineLoader>,
    zone: Zone,
    map: Deferred<NativeMapRef>,
    resolver: Mutex<Option<Resolver<NativeMapRef>>>,
}

/// Handle to the single live map instance
#[derive(Clone)]
pub struct MapHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MapHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapHandle")
            .field("engine", &self.inner.engine.name())
            .field("map", &self.inner.map)
            .field("zone", &self.inner.zone)
            .finish()
    }
}

impl MapHandle {
    /// Create a handle whose map does not exist yet
    pub fn new(engine: Arc<dyn MapEngine>, loader: Arc<dyn EngineLoader>, zone: Zone) -> Self {
        let (map, resolver) = Deferred::new();
        Self {
            inner: Arc::new(Inner {
                engine,
                loader,
                zone,
                map,
                resolver: Mutex::new(Some(resolver)),
            }),
        }
    }

    /// Load the engine and construct the map
    ///
    /// Bootstraps at most once. Later calls wait for the first outcome.
    pub async fn create_map(&self, container: &MapContainer, options: &MapOptions) -> Result<()> {
        let resolver = self.inner.resolver.lock().take();
        let Some(resolver) = resolver else {
            debug!(container = %container, "Map already bootstrapping, waiting on first outcome");
            return self.inner.map.value().await.map(|_| ());
        };

        info!(engine = %self.inner.engine.name(), container = %container, "Bootstrapping map engine");

        let outcome = match self.inner.loader.load().await {
            Ok(()) => self.inner.engine.create_map(container, options),
            Err(err) => Err(err),
        }
        .map_err(|err| {
            if err.is_bootstrap() {
                err
            } else {
                MapError::bootstrap(err.to_string())
            }
        });

        match &outcome {
            Ok(_) => info!(container = %container, "Map ready"),
            Err(err) => error!(container = %container, error = %err, "Map bootstrap failed"),
        }

        let result = outcome.as_ref().map(|_| ()).map_err(Clone::clone);
        resolver.settle(outcome);
        result
    }

    /// Replace the map options
    pub fn set_map_options(&self, options: MapOptions) -> Completion<()> {
        self.inner.map.then(move |map| map.set_options(&options))
    }

    /// Move the viewport center
    pub fn set_center(&self, center: LatLngLiteral) -> Completion<()> {
        self.inner.map.then(move |map| map.set_center(center))
    }

    /// Current viewport center
    pub fn get_center(&self) -> Completion<LatLngLiteral> {
        self.inner.map.then(|map| map.get_center())
    }

    /// Set the zoom level
    pub fn set_zoom(&self, zoom: f64) -> Completion<()> {
        self.inner.map.then(move |map| map.set_zoom(zoom))
    }

    /// Current zoom level
    pub fn get_zoom(&self) -> Completion<f64> {
        self.inner.map.then(|map| map.get_zoom())
    }

    /// Visible area
    pub fn get_bounds(&self) -> Completion<Option<LatLngBounds>> {
        self.inner.map.then(|map| map.get_bounds())
    }

    /// Current base map type
    pub fn get_map_type_id(&self) -> Completion<MapTypeId> {
        self.inner.map.then(|map| map.get_map_type_id())
    }

    /// Animate the center to `center`
    pub fn pan_to(&self, center: LatLngLiteral) -> Completion<()> {
        self.inner.map.then(move |map| map.pan_to(center))
    }

    /// Pan by a pixel offset
    pub fn pan_by(&self, x: f64, y: f64) -> Completion<()> {
        self.inner.map.then(move |map| map.pan_by(x, y))
    }

    /// Fit the viewport to `bounds`
    pub fn fit_bounds(&self, bounds: LatLngBounds) -> Completion<()> {
        self.inner.map.then(move |map| map.fit_bounds(bounds))
    }

    /// Pan the minimum distance needed to show `bounds`
    pub fn pan_to_bounds(&self, bounds: LatLngBounds) -> Completion<()> {
        self.inner.map.then(move |map| map.pan_to_bounds(bounds))
    }

    /// Construct a marker once the map exists
    ///
    /// Icon pixel pairs are converted to engine size/point values. With
    /// `add_to_map` false the marker is built detached so a clustering
    /// object can take ownership of its placement.
    pub fn create_marker(&self, options: MarkerOptions, add_to_map: bool) -> Deferred<NativeMarkerRef> {
        let engine = self.inner.engine.clone();
        self.inner.map.map(move |map| {
            let attach = add_to_map.then(|| map.clone());
            engine.create_marker(NativeMarkerOptions::from_options(options, attach))
        })
    }

    /// Construct a detached info window
    pub fn create_info_window(&self, options: InfoWindowOptions) -> Deferred<NativeOverlayRef> {
        self.build_overlay(OverlayOptions::InfoWindow(options), false)
    }

    /// Construct a circle on the map
    pub fn create_circle(&self, options: CircleOptions) -> Deferred<NativeOverlayRef> {
        self.build_overlay(OverlayOptions::Circle(options), true)
    }

    /// Construct a rectangle on the map
    pub fn create_rectangle(&self, options: RectangleOptions) -> Deferred<NativeOverlayRef> {
        self.build_overlay(OverlayOptions::Rectangle(options), true)
    }

    /// Construct a polyline on the map
    pub fn create_polyline(&self, options: PolylineOptions) -> Deferred<NativeOverlayRef> {
        self.build_overlay(OverlayOptions::Polyline(options), true)
    }

    /// Construct a polygon on the map
    pub fn create_polygon(&self, options: PolygonOptions) -> Deferred<NativeOverlayRef> {
        self.build_overlay(OverlayOptions::Polygon(options), true)
    }

    /// Construct a data layer on the map
    pub fn create_data_layer(&self, options: DataOptions) -> Deferred<NativeOverlayRef> {
        self.build_overlay(OverlayOptions::Data(options), true)
    }

    fn build_overlay(&self, options: OverlayOptions, attach: bool) -> Deferred<NativeOverlayRef> {
        let engine = self.inner.engine.clone();
        self.inner.map.map(move |map| {
            let overlay = engine.create_overlay(options)?;
            if attach {
                overlay.set_map(Some(map.clone()));
            }
            Ok(overlay)
        })
    }

    /// Stream a named map event
    pub fn subscribe_to_map_event(&self, event: &str) -> EventStream<NativeEvent> {
        observe(&self.inner.map, &self.inner.zone, event, |map, name, listener| {
            map.add_listener(name, listener)
        })
    }

    /// Remove every listener registered on the map
    pub fn clear_instance_listeners(&self) -> Completion<()> {
        let engine = self.inner.engine.clone();
        self.inner
            .map
            .then(move |map| engine.clear_instance_listeners(map.as_ref()))
    }

    /// Fire a named event on the map
    pub fn trigger_map_event(&self, event: &str) -> Completion<()> {
        let engine = self.inner.engine.clone();
        let event = event.to_string();
        self.inner
            .map
            .then(move |map| engine.trigger(map.as_ref(), &event))
    }

    /// The raw deferred map instance
    ///
    /// Use with care: calls made through it bypass the zone.
    pub fn native_map(&self) -> Deferred<NativeMapRef> {
        self.inner.map.clone()
    }

    /// The engine
    pub fn engine(&self) -> &Arc<dyn MapEngine> {
        &self.inner.engine
    }

    /// The main task queue
    pub fn zone(&self) -> &Zone {
        &self.inner.zone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::{MapOp, MemoryEngine, MemoryLoader};
    use crate::engine::MockEngineLoader;
    use crate::types::{IconSpec, Size};
    use futures::StreamExt;

    fn handle(engine: &Arc<MemoryEngine>) -> MapHandle {
        MapHandle::new(engine.clone(), Arc::new(MemoryLoader::ready()), Zone::spawn("test"))
    }

    #[tokio::test]
    async fn test_create_map_then_operate() {
        crate::test_support::init_tracing();
        let engine = Arc::new(MemoryEngine::new());
        let handle = handle(&engine);

        handle
            .create_map(&MapContainer::new("main"), &MapOptions::new().zoom(4.0))
            .await
            .unwrap();
        handle.set_center(LatLngLiteral::new(1.0, 2.0)).await.unwrap();

        assert_eq!(handle.get_zoom().await.unwrap(), 4.0);
        assert_eq!(engine.maps()[0].container(), &MapContainer::new("main"));
        assert_eq!(
            engine.maps()[0].ops(),
            vec![MapOp::SetCenter(LatLngLiteral::new(1.0, 2.0))]
        );
    }

    #[tokio::test]
    async fn test_operations_before_bootstrap_apply_in_order() {
        let engine = Arc::new(MemoryEngine::new());
        let (loader, gate) = MemoryLoader::gated();
        let handle = MapHandle::new(engine.clone(), Arc::new(loader), Zone::spawn("test"));

        let zoom = handle.set_zoom(3.0);
        let pan = handle.pan_by(10.0, -5.0);
        let center = handle.set_center(LatLngLiteral::new(5.0, 6.0));

        let creating = {
            let handle = handle.clone();
            tokio::spawn(async move {
                handle
                    .create_map(&MapContainer::default(), &MapOptions::default())
                    .await
            })
        };
        gate.open();
        creating.await.unwrap().unwrap();
        zoom.await.unwrap();
        pan.await.unwrap();
        center.await.unwrap();

        assert_eq!(
            engine.maps()[0].ops(),
            vec![
                MapOp::SetZoom(3.0),
                MapOp::PanBy(10.0, -5.0),
                MapOp::SetCenter(LatLngLiteral::new(5.0, 6.0)),
            ]
        );
    }

    #[tokio::test]
    async fn test_loader_failure_rejects_dependents() {
        let engine = Arc::new(MemoryEngine::new());
        let (loader, gate) = MemoryLoader::gated();
        let handle = MapHandle::new(engine.clone(), Arc::new(loader), Zone::spawn("test"));

        let waiting = handle.get_center();
        let marker = handle.create_marker(MarkerOptions::default(), true);
        gate.fail("script blocked");

        let err = handle
            .create_map(&MapContainer::default(), &MapOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_bootstrap());
        assert!(waiting.await.unwrap_err().is_bootstrap());
        assert!(marker.value().await.err().unwrap().is_bootstrap());
        assert!(engine.maps().is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_becomes_bootstrap_error() {
        let engine = Arc::new(MemoryEngine::new());
        engine.fail_next_map("container missing");
        let handle = handle(&engine);

        let err = handle
            .create_map(&MapContainer::default(), &MapOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_bootstrap());
        assert!(handle.set_zoom(1.0).await.unwrap_err().is_bootstrap());
    }

    #[tokio::test]
    async fn test_second_create_map_does_not_reload() {
        let engine = Arc::new(MemoryEngine::new());
        let mut loader = MockEngineLoader::new();
        loader.expect_load().times(1).returning(|| Ok(()));
        let handle = MapHandle::new(engine.clone(), Arc::new(loader), Zone::spawn("test"));

        handle
            .create_map(&MapContainer::default(), &MapOptions::default())
            .await
            .unwrap();
        handle
            .create_map(&MapContainer::new("other"), &MapOptions::default())
            .await
            .unwrap();

        assert_eq!(engine.maps().len(), 1);
    }

    #[tokio::test]
    async fn test_create_marker_translates_icon() {
        let engine = Arc::new(MemoryEngine::new());
        let handle = handle(&engine);
        handle
            .create_map(&MapContainer::default(), &MapOptions::default())
            .await
            .unwrap();

        let options = MarkerOptions {
            icon: Some(IconSpec {
                size: Some([32.0, 40.0]),
                ..IconSpec::url("pin.png")
            }),
            ..MarkerOptions::default()
        };
        handle.create_marker(options, true).value().await.unwrap();
        handle
            .create_marker(MarkerOptions::default(), false)
            .value()
            .await
            .unwrap();

        let markers = engine.markers();
        let icon = markers[0].state().icon.unwrap();
        let expected = Some(Size {
            width: 32.0,
            height: 40.0,
        });
        assert_eq!(icon.size, expected);
        assert_eq!(icon.scaled_size, expected);
        assert!(markers[0].attached_at_construction());
        assert!(!markers[1].attached_at_construction());
        assert!(markers[1].state().icon.is_none());
    }

    #[tokio::test]
    async fn test_overlay_attachment() {
        let engine = Arc::new(MemoryEngine::new());
        let handle = handle(&engine);
        handle
            .create_map(&MapContainer::default(), &MapOptions::default())
            .await
            .unwrap();

        handle
            .create_polyline(PolylineOptions::default())
            .value()
            .await
            .unwrap();
        handle
            .create_info_window(InfoWindowOptions::default())
            .value()
            .await
            .unwrap();

        let overlays = engine.overlays();
        assert!(overlays[0].is_attached());
        assert!(!overlays[1].is_attached());
    }

    #[tokio::test]
    async fn test_map_event_subscription() {
        let engine = Arc::new(MemoryEngine::new());
        let handle = handle(&engine);
        let mut clicks = handle.subscribe_to_map_event("click");

        handle
            .create_map(&MapContainer::default(), &MapOptions::default())
            .await
            .unwrap();
        handle.trigger_map_event("click").await.unwrap();

        let event = clicks.next().await.unwrap();
        assert!(event.lat_lng.is_none());

        handle.clear_instance_listeners().await.unwrap();
        assert_eq!(engine.maps()[0].listener_count("click"), 0);
    }
}
