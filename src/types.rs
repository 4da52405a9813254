//! Core value types for map-sync
//!
//! ## Table of Contents
//! 1. Coordinates and bounds
//! 2. Map options
//! 3. Marker attributes (icon, label, animation)
//! 4. Overlay options (circle, rectangle, polyline, polygon, data, info window)
//! 5. Clustering options
//! 6. Events

use crate::engine::NativeMarkerRef;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// 1. Coordinates and bounds
// ============================================================================

/// Plain latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngLiteral {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
}

impl LatLngLiteral {
    /// Create a new coordinate pair
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Rectangular area in geographic coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    /// South-west corner
    pub south_west: LatLngLiteral,
    /// North-east corner
    pub north_east: LatLngLiteral,
}

impl LatLngBounds {
    /// Create bounds from two corners
    pub fn new(south_west: LatLngLiteral, north_east: LatLngLiteral) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Center of the bounds
    pub fn center(&self) -> LatLngLiteral {
        LatLngLiteral::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }
}

// ============================================================================
// 2. Map options
// ============================================================================

/// Base map type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapTypeId {
    /// Default road map
    #[default]
    Roadmap,
    /// Satellite imagery
    Satellite,
    /// Satellite imagery with road overlay
    Hybrid,
    /// Physical terrain
    Terrain,
}

/// Opaque identifier of the surface the map renders into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapContainer(pub String);

impl MapContainer {
    /// Create a container reference
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl Default for MapContainer {
    fn default() -> Self {
        Self::new("map")
    }
}

impl std::fmt::Display for MapContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options passed to the engine when the map is constructed or reconfigured
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapOptions {
    /// Initial center
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<LatLngLiteral>,
    /// Initial zoom level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    /// Minimum zoom level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,
    /// Maximum zoom level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
    /// Whether the map can be dragged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draggable: Option<bool>,
    /// Hide the engine's default controls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_default_ui: Option<bool>,
    /// Whether points of interest are clickable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clickable_icons: Option<bool>,
    /// Base map type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_type_id: Option<MapTypeId>,
    /// Engine-specific styling rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub styles: Option<serde_json::Value>,
}

impl MapOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set initial center
    pub fn center(mut self, center: LatLngLiteral) -> Self {
        self.center = Some(center);
        self
    }

    /// Set initial zoom
    pub fn zoom(mut self, zoom: f64) -> Self {
        self.zoom = Some(zoom);
        self
    }

    /// Set base map type
    pub fn map_type(mut self, map_type: MapTypeId) -> Self {
        self.map_type_id = Some(map_type);
        self
    }
}

// ============================================================================
// 3. Marker attributes
// ============================================================================

/// Width/height or x/y pair in pixels, as declared
pub type PixelPair = [f64; 2];

/// Engine-native size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels
    pub width: f64,
    /// Height in pixels
    pub height: f64,
}

impl From<PixelPair> for Size {
    fn from([width, height]: PixelPair) -> Self {
        Self { width, height }
    }
}

/// Engine-native point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal offset in pixels
    pub x: f64,
    /// Vertical offset in pixels
    pub y: f64,
}

impl From<PixelPair> for Point {
    fn from([x, y]: PixelPair) -> Self {
        Self { x, y }
    }
}

/// Declared marker icon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconSpec {
    /// Image URL
    pub url: Option<String>,
    /// Rendered width/height
    pub size: Option<PixelPair>,
    /// Sprite origin
    pub origin: Option<PixelPair>,
    /// Anchor relative to the image's top-left corner
    pub anchor: Option<PixelPair>,
}

impl IconSpec {
    /// Icon from an image URL
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Whether nothing was declared
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.size.is_none() && self.origin.is_none() && self.anchor.is_none()
    }

    /// Translate pixel pairs into the engine's size/point representation
    ///
    /// A declared size sets both `size` and `scaled_size`. Absent pairs
    /// stay unset.
    pub fn to_native(&self) -> NativeIcon {
        NativeIcon {
            url: self.url.clone(),
            size: self.size.map(Size::from),
            scaled_size: self.size.map(Size::from),
            origin: self.origin.map(Point::from),
            anchor: self.anchor.map(Point::from),
        }
    }
}

/// Icon in the engine's representation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeIcon {
    /// Image URL
    pub url: Option<String>,
    /// Sprite size
    pub size: Option<Size>,
    /// Size the image is scaled to
    pub scaled_size: Option<Size>,
    /// Sprite origin
    pub origin: Option<Point>,
    /// Anchor point
    pub anchor: Option<Point>,
}

/// Styled marker label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelStyle {
    /// Label text
    pub text: String,
    /// CSS color
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Font family
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    /// Font size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
    /// Font weight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
}

/// Marker label: plain text or styled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkerLabel {
    /// Plain text, usually a single character
    Text(String),
    /// Text with styling
    Styled(LabelStyle),
}

impl From<&str> for MarkerLabel {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Engine enumeration value for a marker animation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeAnimation(pub u32);

/// Declared marker animation
///
/// Named modes are looked up in the engine's animation table. A
/// `Native` value is handed to the engine unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Animation {
    /// Bounce in place
    Bounce,
    /// Drop from the top of the map
    Drop,
    /// Engine constant passed through as-is
    Native(NativeAnimation),
}

impl Animation {
    /// Engine table name of a named mode
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Animation::Bounce => Some("BOUNCE"),
            Animation::Drop => Some("DROP"),
            Animation::Native(_) => None,
        }
    }
}

/// Marker construction options with declared (pixel-pair) icon
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerOptions {
    /// Position
    pub position: Option<LatLngLiteral>,
    /// Hover title
    pub title: Option<String>,
    /// Label
    pub label: Option<MarkerLabel>,
    /// Drag enabled
    pub draggable: bool,
    /// Icon
    pub icon: Option<IconSpec>,
    /// Opacity in [0, 1]
    pub opacity: f64,
    /// Visibility
    pub visible: bool,
    /// Stacking index
    pub z_index: i32,
    /// Clickable
    pub clickable: bool,
    /// Animation, already translated to the engine's constant
    pub animation: Option<NativeAnimation>,
}

// ============================================================================
// 4. Overlay options
// ============================================================================

/// Circle overlay options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleOptions {
    /// Center
    pub center: LatLngLiteral,
    /// Radius in meters
    pub radius: f64,
    /// Engine-specific stroke and fill
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<serde_json::Value>,
}

/// Rectangle overlay options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectangleOptions {
    /// Covered area
    pub bounds: LatLngBounds,
    /// Engine-specific stroke and fill
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<serde_json::Value>,
}

/// Polyline overlay options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolylineOptions {
    /// Vertices in order
    pub path: Vec<LatLngLiteral>,
    /// Engine-specific stroke and fill
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<serde_json::Value>,
}

/// Polygon overlay options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolygonOptions {
    /// Outer ring followed by holes
    pub paths: Vec<Vec<LatLngLiteral>>,
    /// Engine-specific stroke and fill
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<serde_json::Value>,
}

/// Data layer options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataOptions {
    /// GeoJSON to load on creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_json: Option<serde_json::Value>,
    /// Engine-specific style
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<serde_json::Value>,
}

/// Info window options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfoWindowOptions {
    /// Content markup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Anchor position when not attached to a marker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<LatLngLiteral>,
}

/// Which overlay an [`OverlayOptions`] builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverlayKind {
    /// Circle
    Circle,
    /// Rectangle
    Rectangle,
    /// Polyline
    Polyline,
    /// Polygon
    Polygon,
    /// Data layer
    Data,
    /// Info window
    InfoWindow,
}

/// Construction options for any non-marker overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OverlayOptions {
    /// Circle
    Circle(CircleOptions),
    /// Rectangle
    Rectangle(RectangleOptions),
    /// Polyline
    Polyline(PolylineOptions),
    /// Polygon
    Polygon(PolygonOptions),
    /// Data layer
    Data(DataOptions),
    /// Info window
    InfoWindow(InfoWindowOptions),
}

impl OverlayOptions {
    /// Kind of overlay these options build
    pub fn kind(&self) -> OverlayKind {
        match self {
            OverlayOptions::Circle(_) => OverlayKind::Circle,
            OverlayOptions::Rectangle(_) => OverlayKind::Rectangle,
            OverlayOptions::Polyline(_) => OverlayKind::Polyline,
            OverlayOptions::Polygon(_) => OverlayKind::Polygon,
            OverlayOptions::Data(_) => OverlayKind::Data,
            OverlayOptions::InfoWindow(_) => OverlayKind::InfoWindow,
        }
    }
}

// ============================================================================
// 5. Clustering options
// ============================================================================

/// Icon style for one cluster size bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStyle {
    /// Image URL
    pub url: String,
    /// Image height in pixels
    pub height: f64,
    /// Image width in pixels
    pub width: f64,
    /// Label color
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    /// Label size in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_size: Option<f64>,
    /// Sprite offset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_position: Option<String>,
    /// Label anchor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<PixelPair>,
}

/// What a calculator says to render for a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIconInfo {
    /// Label text
    pub text: String,
    /// One-based index into the style list
    pub index: usize,
    /// Hover title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Function computing a cluster's icon from its members and style count
pub type CalculatorFn =
    Arc<dyn Fn(&[NativeMarkerRef], usize) -> ClusterIconInfo + Send + Sync>;

/// Declared size calculator
///
/// Bound values are not guaranteed to be callable; only
/// [`Calculator::Function`] is ever handed to the engine.
#[derive(Clone)]
pub enum Calculator {
    /// Callable calculator
    Function(CalculatorFn),
    /// Some other bound value
    Opaque(serde_json::Value),
}

impl Calculator {
    /// Wrap a closure
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[NativeMarkerRef], usize) -> ClusterIconInfo + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    /// The callable, if this is one
    pub fn as_function(&self) -> Option<&CalculatorFn> {
        match self {
            Calculator::Function(f) => Some(f),
            Calculator::Opaque(_) => None,
        }
    }
}

impl std::fmt::Debug for Calculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Calculator::Function(_) => f.write_str("Calculator::Function(..)"),
            Calculator::Opaque(value) => write!(f, "Calculator::Opaque({value})"),
        }
    }
}

/// Declared clustering configuration
///
/// `None` leaves the engine default in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    /// Grid cell size in pixels
    pub grid_size: Option<u32>,
    /// Zoom above which markers are never clustered
    pub max_zoom: Option<u32>,
    /// Icon styles by size bucket
    pub styles: Option<Vec<ClusterStyle>>,
    /// Zoom into a cluster when it is clicked
    pub zoom_on_click: Option<bool>,
    /// Position clusters at the average of their members
    pub average_center: Option<bool>,
    /// Base path of the bundled cluster images
    pub image_path: Option<String>,
    /// Minimum members before a cluster is shown
    pub minimum_cluster_size: Option<u32>,
    /// Extension of the bundled cluster images
    pub image_extension: Option<String>,
    /// Custom size calculator
    #[serde(skip)]
    pub calculator: Option<Calculator>,
}

impl ClusterOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set grid size
    pub fn grid_size(mut self, size: u32) -> Self {
        self.grid_size = Some(size);
        self
    }

    /// Set max zoom
    pub fn max_zoom(mut self, zoom: u32) -> Self {
        self.max_zoom = Some(zoom);
        self
    }

    /// Set icon styles
    pub fn styles(mut self, styles: Vec<ClusterStyle>) -> Self {
        self.styles = Some(styles);
        self
    }

    /// Set zoom-on-click
    pub fn zoom_on_click(mut self, enabled: bool) -> Self {
        self.zoom_on_click = Some(enabled);
        self
    }

    /// Set average-center
    pub fn average_center(mut self, enabled: bool) -> Self {
        self.average_center = Some(enabled);
        self
    }

    /// Set image path
    pub fn image_path(mut self, path: impl Into<String>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    /// Set minimum cluster size
    pub fn minimum_cluster_size(mut self, size: u32) -> Self {
        self.minimum_cluster_size = Some(size);
        self
    }

    /// Set image extension
    pub fn image_extension(mut self, ext: impl Into<String>) -> Self {
        self.image_extension = Some(ext.into());
        self
    }

    /// Set calculator
    pub fn calculator(mut self, calculator: Calculator) -> Self {
        self.calculator = Some(calculator);
        self
    }
}

// ============================================================================
// 6. Events
// ============================================================================

/// Lazily evaluated latitude/longitude carried by engine events
pub trait LatLngAccessor: Send + Sync {
    /// Latitude in degrees
    fn lat(&self) -> f64;
    /// Longitude in degrees
    fn lng(&self) -> f64;
}

impl LatLngAccessor for LatLngLiteral {
    fn lat(&self) -> f64 {
        self.lat
    }

    fn lng(&self) -> f64 {
        self.lng
    }
}

/// Event payload as delivered by the engine
#[derive(Clone, Default)]
pub struct NativeEvent {
    /// Position accessor, absent for events without a location
    pub lat_lng: Option<Arc<dyn LatLngAccessor>>,
}

impl NativeEvent {
    /// Event without a location
    pub fn empty() -> Self {
        Self::default()
    }

    /// Event located at `lat`/`lng`
    pub fn at(lat: f64, lng: f64) -> Self {
        Self {
            lat_lng: Some(Arc::new(LatLngLiteral::new(lat, lng))),
        }
    }

    /// Translate into the neutral event shape, evaluating the accessors
    pub fn to_mouse_event(&self) -> Option<MouseEvent> {
        self.lat_lng.as_ref().map(|ll| MouseEvent {
            coords: LatLngLiteral::new(ll.lat(), ll.lng()),
        })
    }
}

impl std::fmt::Debug for NativeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEvent")
            .field("lat_lng", &self.lat_lng.as_ref().map(|ll| (ll.lat(), ll.lng())))
            .finish()
    }
}

/// Position-bearing event as exposed to the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouseEvent {
    /// Where the event happened
    pub coords: LatLngLiteral,
}

/// A marker's contribution to the map's fit-bounds computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitBoundsDetails {
    /// Point to include
    pub lat_lng: LatLngLiteral,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_size_sets_size_and_scaled_size() {
        let icon = IconSpec {
            url: Some("pin.png".to_string()),
            size: Some([32.0, 40.0]),
            ..IconSpec::default()
        };
        let native = icon.to_native();
        let expected = Size {
            width: 32.0,
            height: 40.0,
        };
        assert_eq!(native.size, Some(expected));
        assert_eq!(native.scaled_size, Some(expected));
        assert_eq!(native.origin, None);
        assert_eq!(native.anchor, None);
    }

    #[test]
    fn test_icon_without_size_leaves_fields_unset() {
        let native = IconSpec::url("pin.png").to_native();
        assert_eq!(native.url.as_deref(), Some("pin.png"));
        assert!(native.size.is_none());
        assert!(native.scaled_size.is_none());
    }

    #[test]
    fn test_icon_origin_and_anchor() {
        let icon = IconSpec {
            origin: Some([1.0, 2.0]),
            anchor: Some([16.0, 40.0]),
            ..IconSpec::default()
        };
        let native = icon.to_native();
        assert_eq!(native.origin, Some(Point { x: 1.0, y: 2.0 }));
        assert_eq!(native.anchor, Some(Point { x: 16.0, y: 40.0 }));
    }

    #[test]
    fn test_bounds_center() {
        let bounds = LatLngBounds::new(LatLngLiteral::new(-5.0, 20.0), LatLngLiteral::new(10.0, 30.0));
        assert_eq!(bounds.center(), LatLngLiteral::new(2.5, 25.0));
    }

    #[test]
    fn test_native_event_translation() {
        let event = NativeEvent::at(1.5, -2.5);
        assert_eq!(
            event.to_mouse_event(),
            Some(MouseEvent {
                coords: LatLngLiteral::new(1.5, -2.5)
            })
        );
        assert_eq!(NativeEvent::empty().to_mouse_event(), None);
    }

    #[test]
    fn test_animation_names() {
        assert_eq!(Animation::Bounce.name(), Some("BOUNCE"));
        assert_eq!(Animation::Drop.name(), Some("DROP"));
        assert_eq!(Animation::Native(NativeAnimation(9)).name(), None);
    }

    #[test]
    fn test_cluster_options_from_json() {
        let options: ClusterOptions =
            serde_json::from_str(r#"{"grid_size": 50, "zoom_on_click": false}"#).unwrap();
        assert_eq!(options.grid_size, Some(50));
        assert_eq!(options.zoom_on_click, Some(false));
        assert!(options.max_zoom.is_none());
        assert!(options.calculator.is_none());
    }

    #[test]
    fn test_label_untagged() {
        let label: MarkerLabel = serde_json::from_str(r#""A""#).unwrap();
        assert_eq!(label, MarkerLabel::Text("A".to_string()));
    }
}
