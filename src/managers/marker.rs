//! Marker manager
//!
//! Markers are attached to the map as part of construction and detached on
//! deletion.

use super::{EntityManager, MarkerRegistry};
use crate::deferred::{Completion, Deferred};
use crate::engine::NativeMarkerRef;
use crate::events::EventStream;
use crate::facade::MarkerDescriptor;
use crate::handle::MapHandle;
use crate::types::NativeEvent;
use tracing::{debug, trace};

/// Manages markers attached directly to the map
#[derive(Debug)]
pub struct MarkerManager {
    registry: MarkerRegistry,
}

impl MarkerManager {
    /// Create a manager over `handle`
    pub fn new(handle: MapHandle) -> Self {
        Self {
            registry: MarkerRegistry::new(handle),
        }
    }

    /// The identity association
    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }
}

impl EntityManager for MarkerManager {
    fn add_entity(&self, marker: &MarkerDescriptor) {
        self.registry.register(marker, true);
    }

    fn delete_entity(&self, marker: &MarkerDescriptor) -> Completion<()> {
        let Some(pending) = self.registry.take(marker.id()) else {
            trace!(marker = %marker, "Delete for unknown marker ignored");
            return Completion::ready(Ok(()));
        };
        debug!(marker = %marker, "Marker deleted");

        let zone = self.registry.handle().zone().clone();
        let (tx, completion) = Completion::channel();
        pending.when_settled(move |outcome| match outcome {
            Ok(native) => {
                let native = native.clone();
                zone.post(move || {
                    native.set_map(None);
                    tx.send(Ok(()));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::{MapOp, MarkerOp, MemoryEngine, MemoryLoader, BOUNCE};
    use crate::types::{Animation, LatLngLiteral, MapContainer, MapOptions, NativeAnimation};
    use crate::zone::Zone;
    use futures::StreamExt;
    use std::sync::Arc;

    struct Fixture {
        engine: Arc<MemoryEngine>,
        handle: MapHandle,
        manager: MarkerManager,
    }

    async fn fixture() -> Fixture {
        let engine = Arc::new(MemoryEngine::new());
        let handle = MapHandle::new(engine.clone(), Arc::new(MemoryLoader::ready()), Zone::spawn("test"));
        handle
            .create_map(&MapContainer::default(), &MapOptions::default())
            .await
            .unwrap();
        let manager = MarkerManager::new(handle.clone());
        Fixture {
            engine,
            handle,
            manager,
        }
    }

    #[tokio::test]
    async fn test_add_translates_attributes() {
        let f = fixture().await;
        let mut marker = MarkerDescriptor::at(10.0, 20.0);
        marker.title = Some("Depot".to_string());
        marker.animation = Some(Animation::Bounce);

        f.manager.add_entity(&marker);
        f.manager.native_entity(&marker).unwrap().value().await.unwrap();

        let state = f.engine.markers()[0].state();
        assert!(state.attached);
        assert_eq!(state.position, Some(LatLngLiteral::new(10.0, 20.0)));
        assert_eq!(state.title.as_deref(), Some("Depot"));
        assert_eq!(state.animation, Some(BOUNCE));
        assert_eq!(state.z_index, 1);
        assert_eq!(state.opacity, 1.0);
    }

    #[tokio::test]
    async fn test_native_animation_passes_through() {
        let f = fixture().await;
        let mut marker = MarkerDescriptor::at(0.0, 0.0);
        marker.animation = Some(Animation::Native(NativeAnimation(42)));
        f.manager.add_entity(&marker);
        f.manager.native_entity(&marker).unwrap().value().await.unwrap();

        assert_eq!(
            f.engine.markers()[0].state().animation,
            Some(NativeAnimation(42))
        );
    }

    #[tokio::test]
    async fn test_duplicate_add_is_ignored() {
        let f = fixture().await;
        let marker = MarkerDescriptor::at(1.0, 1.0);
        f.manager.add_entity(&marker);
        f.manager.add_entity(&marker);

        f.manager.update_title(&marker).await.unwrap();
        assert_eq!(f.engine.markers().len(), 1);
        assert_eq!(f.manager.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_updates_before_resolution_apply_in_order() {
        let engine = Arc::new(MemoryEngine::new());
        let (loader, gate) = MemoryLoader::gated();
        let handle = MapHandle::new(engine.clone(), Arc::new(loader), Zone::spawn("test"));
        let manager = MarkerManager::new(handle.clone());

        let mut marker = MarkerDescriptor::at(0.0, 0.0);
        manager.add_entity(&marker);

        marker.title = Some("first".to_string());
        let title = manager.update_title(&marker);
        marker.opacity = 0.5;
        let opacity = manager.update_opacity(&marker);
        marker.title = Some("second".to_string());
        let retitle = manager.update_title(&marker);
        marker.visible = false;
        let visible = manager.update_visible(&marker);

        gate.open();
        handle
            .create_map(&MapContainer::default(), &MapOptions::default())
            .await
            .unwrap();
        title.await.unwrap();
        opacity.await.unwrap();
        retitle.await.unwrap();
        visible.await.unwrap();

        assert_eq!(
            engine.markers()[0].ops(),
            vec![
                MarkerOp::SetTitle(Some("first".to_string())),
                MarkerOp::SetOpacity(0.5),
                MarkerOp::SetTitle(Some("second".to_string())),
                MarkerOp::SetVisible(false),
            ]
        );
    }

    #[tokio::test]
    async fn test_position_update_recenters_map() {
        let f = fixture().await;
        let mut marker = MarkerDescriptor::at(1.0, 2.0);
        f.manager.add_entity(&marker);

        marker.latitude = Some(5.0.into());
        f.manager.update_position(&marker).await.unwrap();
        f.handle.get_zoom().await.unwrap();

        let target = LatLngLiteral::new(5.0, 2.0);
        assert_eq!(
            f.engine.markers()[0].ops(),
            vec![MarkerOp::SetPosition(target)]
        );
        assert_eq!(f.engine.maps()[0].ops(), vec![MapOp::SetCenter(target)]);
    }

    #[tokio::test]
    async fn test_delete_twice_is_idempotent() {
        let f = fixture().await;
        let marker = MarkerDescriptor::at(1.0, 2.0);
        f.manager.add_entity(&marker);

        f.manager.delete_entity(&marker).await.unwrap();
        f.manager.delete_entity(&marker).await.unwrap();

        assert_eq!(f.engine.markers()[0].ops(), vec![MarkerOp::SetMap(false)]);
        assert!(f.manager.native_entity(&marker).is_none());
    }

    #[tokio::test]
    async fn test_delete_before_resolution_detaches() {
        let engine = Arc::new(MemoryEngine::new());
        let (loader, gate) = MemoryLoader::gated();
        let handle = MapHandle::new(engine.clone(), Arc::new(loader), Zone::spawn("test"));
        let manager = MarkerManager::new(handle.clone());

        let marker = MarkerDescriptor::at(3.0, 4.0);
        manager.add_entity(&marker);
        let deleting = manager.delete_entity(&marker);
        assert!(manager.native_entity(&marker).is_none());

        gate.open();
        handle
            .create_map(&MapContainer::default(), &MapOptions::default())
            .await
            .unwrap();
        deleting.await.unwrap();

        let state = engine.markers()[0].state();
        assert!(!state.attached);
    }

    #[tokio::test]
    async fn test_stale_update_is_noop() {
        let f = fixture().await;
        let marker = MarkerDescriptor::at(1.0, 2.0);
        f.manager.update_title(&marker).await.unwrap();
        f.manager.update_position(&marker).await.unwrap();
        assert!(f.engine.markers().is_empty());

        let mut events = f.manager.create_event_observable("click", &marker);
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_event_observable_forwards_clicks() {
        let f = fixture().await;
        let marker = MarkerDescriptor::at(1.0, 2.0);
        f.manager.add_entity(&marker);

        let mut clicks = f.manager.create_event_observable("click", &marker);
        f.manager.native_entity(&marker).unwrap().value().await.unwrap();

        let native = f.engine.markers()[0].clone();
        assert_eq!(native.fire("click", NativeEvent::at(1.0, 2.0)), 1);
        let event = clicks.next().await.unwrap();
        assert_eq!(
            event.to_mouse_event().unwrap().coords,
            LatLngLiteral::new(1.0, 2.0)
        );

        clicks.dispose();
        assert_eq!(native.listener_count("click"), 0);
    }
}
