//! Marker facade
//!
//! ## Table of Contents
//! - **MarkerFacade**: Turns attribute changes into manager calls
//! - **MarkerOutput**: Events emitted to the UI layer
//! - **InfoWindowHost**: Info window that can be bound to a marker
//!
//! A facade is unregistered until both coordinates are known. The first
//! change that completes the position registers the marker, publishes its
//! fit-bounds contribution and subscribes every bridged event. After that
//! each changed field maps to exactly one manager update.
//!
//! Output handlers run inside the zone job that delivers each engine
//! firing, so outputs keep the engine's firing order across event types.

use super::{MarkerChange, MarkerDescriptor, MarkerField, MarkerId};
use crate::deferred::Completion;
use crate::error::{MapError, Result};
use crate::events::{EventEmitter, EventStream, EventSubscription, MarkerEvent};
use crate::managers::EntityManager;
use crate::types::{FitBoundsDetails, MouseEvent, NativeEvent};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Info window that a marker can open
pub trait InfoWindowHost: Send + Sync {
    /// Bind the window to its host marker
    fn set_host_marker(&self, marker: MarkerId);

    /// Show the window
    fn open(&self);
}

/// Event emitted by a marker facade
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerOutput {
    /// The marker was clicked
    Click(MarkerId),
    /// The marker was right-clicked
    RightClick,
    /// Dragging started
    DragStart(MouseEvent),
    /// Dragging moved
    Drag(MouseEvent),
    /// Dragging ended
    DragEnd(MouseEvent),
    /// Pointer entered the marker
    MouseOver(MouseEvent),
    /// Pointer left the marker
    MouseOut(MouseEvent),
}

impl MarkerOutput {
    fn positioned(event: MarkerEvent, payload: &NativeEvent) -> Option<Self> {
        let mouse = payload.to_mouse_event()?;
        match event {
            MarkerEvent::DragStart => Some(MarkerOutput::DragStart(mouse)),
            MarkerEvent::Drag => Some(MarkerOutput::Drag(mouse)),
            MarkerEvent::DragEnd => Some(MarkerOutput::DragEnd(mouse)),
            MarkerEvent::MouseOver => Some(MarkerOutput::MouseOver(mouse)),
            MarkerEvent::MouseOut => Some(MarkerOutput::MouseOut(mouse)),
            MarkerEvent::Click | MarkerEvent::RightClick => None,
        }
    }
}

/// Fan-out of facade outputs to every live subscriber
///
/// Each subscriber has its own unbounded stream, so a slow reader never
/// loses events. Subscribers whose stream was dropped are pruned on send.
#[derive(Clone, Default)]
struct OutputHub {
    subscribers: Arc<Mutex<Vec<EventEmitter<MarkerOutput>>>>,
}

impl OutputHub {
    fn subscribe(&self) -> EventStream<MarkerOutput> {
        let (emitter, stream) = EventStream::channel();
        self.subscribers.lock().push(emitter);
        stream
    }

    fn send(&self, output: MarkerOutput) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.emit(output.clone()));
    }
}

/// Reconciles a marker description with its manager
pub struct MarkerFacade {
    descriptor: MarkerDescriptor,
    manager: Arc<dyn EntityManager>,
    registered: bool,
    destroyed: bool,
    outputs: OutputHub,
    fit_bounds: watch::Sender<Option<FitBoundsDetails>>,
    info_window: Arc<Mutex<Option<Arc<dyn InfoWindowHost>>>>,
    open_info_window: Arc<AtomicBool>,
    subscriptions: Vec<EventSubscription<NativeEvent>>,
}

impl MarkerFacade {
    /// Create an unregistered facade
    pub fn new(manager: Arc<dyn EntityManager>) -> Self {
        let descriptor = MarkerDescriptor::new();
        let (fit_bounds, _) = watch::channel(None);
        Self {
            open_info_window: Arc::new(AtomicBool::new(descriptor.open_info_window)),
            descriptor,
            manager,
            registered: false,
            destroyed: false,
            outputs: OutputHub::default(),
            fit_bounds,
            info_window: Arc::new(Mutex::new(None)),
            subscriptions: Vec::new(),
        }
    }

    /// Current description
    pub fn descriptor(&self) -> &MarkerDescriptor {
        &self.descriptor
    }

    /// Identity
    pub fn id(&self) -> MarkerId {
        self.descriptor.id()
    }

    /// Whether the marker has been handed to the manager
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Receive click, drag and hover events
    ///
    /// Every subscriber sees every output, in the order the engine fired
    /// the underlying events.
    pub fn outputs(&self) -> EventStream<MarkerOutput> {
        self.outputs.subscribe()
    }

    /// Receive the fit-bounds contribution; `None` until registration
    pub fn fit_bounds_details(&self) -> watch::Receiver<Option<FitBoundsDetails>> {
        self.fit_bounds.subscribe()
    }

    /// Assign attributes and reconcile them as one change batch
    pub fn apply<I>(&mut self, changes: I)
    where
        I: IntoIterator<Item = MarkerChange>,
    {
        let mut fields = BTreeSet::new();
        for change in changes {
            fields.insert(change.field());
            change.apply_to(&mut self.descriptor);
        }
        self.on_changes(&fields);
    }

    /// Reconcile a batch of changed fields against the manager
    pub fn on_changes(&mut self, fields: &BTreeSet<MarkerField>) {
        if self.destroyed {
            trace!(marker = %self.descriptor, "Change after destroy ignored");
            return;
        }
        if fields.contains(&MarkerField::OpenInfoWindow) {
            self.open_info_window
                .store(self.descriptor.open_info_window, Ordering::SeqCst);
        }

        if !self.registered {
            match self.descriptor.position() {
                Some(_) => self.register(),
                None => trace!(marker = %self.descriptor, "Position incomplete, registration deferred"),
            }
            return;
        }

        if fields.contains(&MarkerField::Latitude) || fields.contains(&MarkerField::Longitude) {
            let _ = self.manager.update_position(&self.descriptor);
        }
        if fields.contains(&MarkerField::Title) {
            let _ = self.manager.update_title(&self.descriptor);
        }
        if fields.contains(&MarkerField::Label) {
            let _ = self.manager.update_label(&self.descriptor);
        }
        if fields.contains(&MarkerField::Draggable) {
            let _ = self.manager.update_draggable(&self.descriptor);
        }
        if fields.iter().any(MarkerField::is_icon) {
            let _ = self.manager.update_icon(&self.descriptor);
        }
        if fields.contains(&MarkerField::Opacity) {
            let _ = self.manager.update_opacity(&self.descriptor);
        }
        if fields.contains(&MarkerField::Visible) {
            let _ = self.manager.update_visible(&self.descriptor);
        }
        if fields.contains(&MarkerField::ZIndex) {
            let _ = self.manager.update_z_index(&self.descriptor);
        }
        if fields.contains(&MarkerField::Clickable) {
            let _ = self.manager.update_clickable(&self.descriptor);
        }
        if fields.contains(&MarkerField::Animation) {
            let _ = self.manager.update_animation(&self.descriptor);
        }
    }

    /// Associate info windows with this marker
    ///
    /// At most one is allowed; more is a configuration error.
    pub fn set_info_windows(&mut self, windows: Vec<Arc<dyn InfoWindowHost>>) -> Result<()> {
        if windows.len() > 1 {
            return Err(MapError::misconfigured(format!(
                "{} has {} info windows, expected at most one",
                self.descriptor,
                windows.len()
            )));
        }
        let window = windows.into_iter().next();
        if let Some(window) = &window {
            window.set_host_marker(self.id());
        }
        *self.info_window.lock() = window;
        Ok(())
    }

    /// Delete the marker and stop every event subscription
    ///
    /// Safe to call when never registered and safe to call twice.
    pub fn destroy(&mut self) -> Completion<()> {
        if self.destroyed {
            return Completion::ready(Ok(()));
        }
        self.destroyed = true;
        for subscription in self.subscriptions.drain(..) {
            subscription.dispose();
        }
        debug!(marker = %self.descriptor, registered = self.registered, "Marker facade destroyed");
        self.manager.delete_entity(&self.descriptor)
    }

    fn register(&mut self) {
        self.manager.add_entity(&self.descriptor);
        self.registered = true;
        if let Some(position) = self.descriptor.position() {
            self.fit_bounds
                .send_replace(Some(FitBoundsDetails { lat_lng: position }));
        }
        debug!(marker = %self.descriptor, "Marker facade registered");

        for event in MarkerEvent::ALL {
            let stream = self
                .manager
                .create_event_observable(event.as_str(), &self.descriptor);
            let outputs = self.outputs.clone();
            let subscription = match event {
                MarkerEvent::Click => {
                    let id = self.id();
                    let info_window = self.info_window.clone();
                    let open = self.open_info_window.clone();
                    stream.forward(move |_| {
                        if open.load(Ordering::SeqCst) {
                            if let Some(window) = info_window.lock().clone() {
                                window.open();
                            }
                        }
                        outputs.send(MarkerOutput::Click(id));
                    })
                }
                MarkerEvent::RightClick => stream.forward(move |_| {
                    outputs.send(MarkerOutput::RightClick);
                }),
                positioned => stream.forward(move |payload| {
                    if let Some(output) = MarkerOutput::positioned(positioned, &payload) {
                        outputs.send(output);
                    }
                }),
            };
            self.subscriptions.push(subscription);
        }
    }
}

impl Drop for MarkerFacade {
    fn drop(&mut self) {
        if !self.destroyed {
            let _ = self.destroy();
        }
    }
}

impl std::fmt::Debug for MarkerFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerFacade")
            .field("descriptor", &self.descriptor)
            .field("registered", &self.registered)
            .field("destroyed", &self.destroyed)
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Deferred;
    use crate::engine::memory::{MemoryEngine, MemoryLoader};
    use crate::engine::NativeMarkerRef;
    use crate::events::{EventEmitter, EventStream};
    use crate::facade::Coordinate;
    use crate::handle::MapHandle;
    use crate::managers::MarkerManager;
    use crate::types::{LatLngLiteral, MapContainer, MapOptions};
    use crate::zone::Zone;
    use std::collections::HashMap;

    /// Records every manager call by name
    #[derive(Default)]
    struct RecordingManager {
        calls: Mutex<Vec<String>>,
        emitters: Mutex<HashMap<String, EventEmitter<NativeEvent>>>,
    }

    impl RecordingManager {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn record(&self, call: impl Into<String>) -> Completion<()> {
            self.calls.lock().push(call.into());
            Completion::ready(Ok(()))
        }

        fn fire(&self, event: &str, payload: NativeEvent) {
            let emitter = self.emitters.lock().get(event).cloned();
            assert!(emitter.expect("no subscription").emit(payload));
        }
    }

    impl EntityManager for RecordingManager {
        fn add_entity(&self, marker: &MarkerDescriptor) {
            let position = marker.position().unwrap();
            let _ = self.record(format!("add({},{})", position.lat, position.lng));
        }
        fn delete_entity(&self, _: &MarkerDescriptor) -> Completion<()> {
            self.record("delete")
        }
        fn update_position(&self, _: &MarkerDescriptor) -> Completion<()> {
            self.record("position")
        }
        fn update_title(&self, marker: &MarkerDescriptor) -> Completion<()> {
            self.record(format!("title({})", marker.title.clone().unwrap_or_default()))
        }
        fn update_label(&self, _: &MarkerDescriptor) -> Completion<()> {
            self.record("label")
        }
        fn update_draggable(&self, _: &MarkerDescriptor) -> Completion<()> {
            self.record("draggable")
        }
        fn update_icon(&self, _: &MarkerDescriptor) -> Completion<()> {
            self.record("icon")
        }
        fn update_opacity(&self, _: &MarkerDescriptor) -> Completion<()> {
            self.record("opacity")
        }
        fn update_visible(&self, _: &MarkerDescriptor) -> Completion<()> {
            self.record("visible")
        }
        fn update_z_index(&self, _: &MarkerDescriptor) -> Completion<()> {
            self.record("z_index")
        }
        fn update_clickable(&self, _: &MarkerDescriptor) -> Completion<()> {
            self.record("clickable")
        }
        fn update_animation(&self, _: &MarkerDescriptor) -> Completion<()> {
            self.record("animation")
        }
        fn create_event_observable(&self, event: &str, _: &MarkerDescriptor) -> EventStream<NativeEvent> {
            let (emitter, stream) = EventStream::channel();
            self.emitters.lock().insert(event.to_string(), emitter);
            stream
        }
        fn native_entity(&self, _: &MarkerDescriptor) -> Option<Deferred<NativeMarkerRef>> {
            None
        }
    }

    #[derive(Default)]
    struct RecordingWindow {
        host: Mutex<Option<MarkerId>>,
        opened: AtomicBool,
    }

    impl InfoWindowHost for RecordingWindow {
        fn set_host_marker(&self, marker: MarkerId) {
            *self.host.lock() = Some(marker);
        }

        fn open(&self) {
            self.opened.store(true, Ordering::SeqCst);
        }
    }

    fn facade() -> (Arc<RecordingManager>, MarkerFacade) {
        let manager = Arc::new(RecordingManager::default());
        let facade = MarkerFacade::new(manager.clone());
        (manager, facade)
    }

    #[tokio::test]
    async fn test_register_then_single_title_update() {
        let (manager, mut facade) = facade();

        facade.apply([
            MarkerChange::Latitude(Some(10.0.into())),
            MarkerChange::Longitude(Some(20.0.into())),
        ]);
        assert!(facade.is_registered());
        assert_eq!(manager.calls(), vec!["add(10,20)"]);

        facade.apply([MarkerChange::Title(Some("A".to_string()))]);
        assert_eq!(manager.calls(), vec!["add(10,20)", "title(A)"]);
    }

    #[tokio::test]
    async fn test_registration_waits_for_both_coordinates() {
        let (manager, mut facade) = facade();

        facade.apply([MarkerChange::Title(Some("early".to_string()))]);
        facade.apply([MarkerChange::Latitude(Some(Coordinate::from("10")))]);
        facade.apply([MarkerChange::Longitude(Some(Coordinate::from("east")))]);
        assert!(!facade.is_registered());
        assert!(manager.calls().is_empty());

        facade.apply([MarkerChange::Longitude(Some(Coordinate::from("20")))]);
        assert_eq!(manager.calls(), vec!["add(10,20)"]);
        assert_eq!(facade.descriptor().title.as_deref(), Some("early"));
    }

    #[tokio::test]
    async fn test_each_field_gets_its_own_update() {
        let (manager, mut facade) = facade();
        facade.apply([
            MarkerChange::Latitude(Some(1.0.into())),
            MarkerChange::Longitude(Some(2.0.into())),
        ]);

        facade.apply([
            MarkerChange::Latitude(Some(3.0.into())),
            MarkerChange::Longitude(Some(4.0.into())),
            MarkerChange::Opacity(0.5),
            MarkerChange::IconUrl(Some("pin.png".to_string())),
            MarkerChange::IconSize(Some([32.0, 40.0])),
            MarkerChange::Visible(false),
            MarkerChange::OpenInfoWindow(false),
        ]);

        assert_eq!(
            manager.calls(),
            vec!["add(1,2)", "position", "icon", "opacity", "visible"]
        );
    }

    #[tokio::test]
    async fn test_fit_bounds_emitted_once_on_registration() {
        let (_manager, mut facade) = facade();
        let details = facade.fit_bounds_details();
        assert!(details.borrow().is_none());

        facade.apply([
            MarkerChange::Latitude(Some(10.0.into())),
            MarkerChange::Longitude(Some(20.0.into())),
        ]);
        facade.apply([MarkerChange::Latitude(Some(11.0.into()))]);

        assert_eq!(
            *details.borrow(),
            Some(FitBoundsDetails {
                lat_lng: LatLngLiteral::new(10.0, 20.0)
            })
        );
    }

    #[tokio::test]
    async fn test_destroy_without_registration() {
        let (manager, mut facade) = facade();
        facade.destroy().await.unwrap();
        facade.destroy().await.unwrap();
        drop(facade);
        assert_eq!(manager.calls(), vec!["delete"]);
    }

    #[tokio::test]
    async fn test_drop_destroys() {
        let (manager, mut facade) = facade();
        facade.apply([
            MarkerChange::Latitude(Some(1.0.into())),
            MarkerChange::Longitude(Some(1.0.into())),
        ]);
        drop(facade);
        assert_eq!(manager.calls(), vec!["add(1,1)", "delete"]);
    }

    #[tokio::test]
    async fn test_two_info_windows_rejected() {
        let (_manager, mut facade) = facade();
        let windows: Vec<Arc<dyn InfoWindowHost>> = vec![
            Arc::new(RecordingWindow::default()),
            Arc::new(RecordingWindow::default()),
        ];
        let err = facade.set_info_windows(windows).unwrap_err();
        assert!(matches!(err, MapError::Misconfigured(_)));
    }

    #[tokio::test]
    async fn test_click_opens_info_window_then_emits() {
        let (manager, mut facade) = facade();
        let window = Arc::new(RecordingWindow::default());
        facade.set_info_windows(vec![window.clone()]).unwrap();
        assert_eq!(*window.host.lock(), Some(facade.id()));

        let mut outputs = facade.outputs();
        facade.apply([
            MarkerChange::Latitude(Some(1.0.into())),
            MarkerChange::Longitude(Some(2.0.into())),
        ]);

        manager.fire("click", NativeEvent::at(1.0, 2.0));
        assert_eq!(outputs.recv().await.unwrap(), MarkerOutput::Click(facade.id()));
        assert!(window.opened.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_click_respects_open_flag() {
        let (manager, mut facade) = facade();
        let window = Arc::new(RecordingWindow::default());
        facade.set_info_windows(vec![window.clone()]).unwrap();
        let mut outputs = facade.outputs();

        facade.apply([
            MarkerChange::Latitude(Some(1.0.into())),
            MarkerChange::Longitude(Some(2.0.into())),
            MarkerChange::OpenInfoWindow(false),
        ]);

        manager.fire("click", NativeEvent::empty());
        assert_eq!(outputs.recv().await.unwrap(), MarkerOutput::Click(facade.id()));
        assert!(!window.opened.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_drag_events_keep_firing_order() {
        let (manager, mut facade) = facade();
        let mut outputs = facade.outputs();
        facade.apply([
            MarkerChange::Latitude(Some(1.0.into())),
            MarkerChange::Longitude(Some(2.0.into())),
        ]);

        manager.fire("dragstart", NativeEvent::at(1.0, 2.0));
        manager.fire("drag", NativeEvent::at(3.0, 4.0));
        manager.fire("dragend", NativeEvent::at(5.0, 6.0));
        manager.fire("rightclick", NativeEvent::empty());

        let at = |lat, lng| MouseEvent {
            coords: LatLngLiteral::new(lat, lng),
        };
        let received: Vec<_> = std::iter::from_fn(|| outputs.try_recv()).collect();
        assert_eq!(
            received,
            vec![
                MarkerOutput::DragStart(at(1.0, 2.0)),
                MarkerOutput::Drag(at(3.0, 4.0)),
                MarkerOutput::DragEnd(at(5.0, 6.0)),
                MarkerOutput::RightClick,
            ]
        );
    }

    #[tokio::test]
    async fn test_slow_subscriber_loses_nothing() {
        let (manager, mut facade) = facade();
        let mut outputs = facade.outputs();
        let late = facade.outputs();
        drop(late);
        facade.apply([
            MarkerChange::Latitude(Some(1.0.into())),
            MarkerChange::Longitude(Some(2.0.into())),
        ]);

        for i in 0..200 {
            manager.fire("drag", NativeEvent::at(f64::from(i), 0.0));
        }

        for i in 0..200 {
            assert_eq!(
                outputs.recv().await.unwrap(),
                MarkerOutput::Drag(MouseEvent {
                    coords: LatLngLiteral::new(f64::from(i), 0.0)
                })
            );
        }
        assert_eq!(facade.outputs.subscribers.lock().len(), 1);
    }

    #[test]
    fn test_registration_needs_no_runtime() {
        let (manager, mut facade) = facade();
        let mut outputs = facade.outputs();
        facade.apply([
            MarkerChange::Latitude(Some(1.0.into())),
            MarkerChange::Longitude(Some(2.0.into())),
        ]);
        manager.fire("click", NativeEvent::empty());
        assert_eq!(outputs.try_recv(), Some(MarkerOutput::Click(facade.id())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_engine_firings_reach_outputs_in_order() {
        let engine = Arc::new(MemoryEngine::new());
        let handle = MapHandle::new(engine.clone(), Arc::new(MemoryLoader::ready()), Zone::spawn("test"));
        handle
            .create_map(&MapContainer::default(), &MapOptions::default())
            .await
            .unwrap();
        let mut facade = MarkerFacade::new(Arc::new(MarkerManager::new(handle.clone())));
        let mut outputs = facade.outputs();
        facade.apply([
            MarkerChange::Latitude(Some(0.0.into())),
            MarkerChange::Longitude(Some(0.0.into())),
        ]);
        let native = engine.markers()[0].clone();

        for round in 0..300 {
            let lat = f64::from(round);
            native.fire("dragstart", NativeEvent::at(lat, 1.0));
            native.fire("drag", NativeEvent::at(lat, 2.0));
            native.fire("dragend", NativeEvent::at(lat, 3.0));
        }
        handle.zone().run(|| ()).await.unwrap();

        let received: Vec<_> = std::iter::from_fn(|| outputs.try_recv()).collect();
        let expected: Vec<_> = (0..300)
            .flat_map(|round| {
                let at = move |lng| MouseEvent {
                    coords: LatLngLiteral::new(f64::from(round), lng),
                };
                [
                    MarkerOutput::DragStart(at(1.0)),
                    MarkerOutput::Drag(at(2.0)),
                    MarkerOutput::DragEnd(at(3.0)),
                ]
            })
            .collect();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_with_marker_manager() {
        crate::test_support::init_tracing();
        let engine = Arc::new(MemoryEngine::new());
        let handle = MapHandle::new(engine.clone(), Arc::new(MemoryLoader::ready()), Zone::spawn("test"));
        handle
            .create_map(&MapContainer::default(), &MapOptions::default())
            .await
            .unwrap();
        let manager = Arc::new(MarkerManager::new(handle));
        let mut facade = MarkerFacade::new(manager.clone());
        let mut outputs = facade.outputs();

        facade.apply([
            MarkerChange::Latitude(Some(10.0.into())),
            MarkerChange::Longitude(Some(20.0.into())),
        ]);
        facade.apply([MarkerChange::Title(Some("A".to_string()))]);

        let native = engine.markers()[0].clone();
        assert_eq!(native.state().title.as_deref(), Some("A"));
        assert_eq!(native.listener_count("click"), 1);

        native.fire("mouseover", NativeEvent::at(10.0, 20.0));
        assert!(matches!(
            outputs.recv().await.unwrap(),
            MarkerOutput::MouseOver(_)
        ));

        facade.destroy().await.unwrap();
        assert!(!native.state().attached);
        assert_eq!(native.listener_count("click"), 0);
    }
}
