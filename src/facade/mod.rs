//! Declarative marker descriptions
//!
//! ## Table of Contents
//! - **MarkerId**: Sequential identity assigned at construction
//! - **Coordinate**: Numeric or textual coordinate as declared
//! - **MarkerDescriptor**: Desired marker attributes
//! - **MarkerField / MarkerChange**: Attribute change notifications
//! - **MarkerFacade**: Change reconciler (see [`marker`])

pub mod marker;

pub use marker::{InfoWindowHost, MarkerFacade, MarkerOutput};

use crate::types::{Animation, IconSpec, LatLngLiteral, MarkerLabel, PixelPair};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MARKER_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a marker description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(u64);

impl MarkerId {
    /// Allocate the next identity
    pub fn next() -> Self {
        Self(NEXT_MARKER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MarkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coordinate as bound by the UI layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    /// Already numeric
    Number(f64),
    /// Textual, parsed on use
    Text(String),
}

impl Coordinate {
    /// Numeric value; `None` for unparsable text or NaN
    pub fn value(&self) -> Option<f64> {
        let value = match self {
            Coordinate::Number(v) => *v,
            Coordinate::Text(text) => text.trim().parse::<f64>().ok()?,
        };
        (!value.is_nan()).then_some(value)
    }
}

impl From<f64> for Coordinate {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Coordinate {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Desired state of one marker
///
/// Holds no engine object; managers key their pending objects by
/// [`MarkerDescriptor::id`].
#[derive(Debug, Clone)]
pub struct MarkerDescriptor {
    id: MarkerId,
    /// Latitude
    pub latitude: Option<Coordinate>,
    /// Longitude
    pub longitude: Option<Coordinate>,
    /// Hover title
    pub title: Option<String>,
    /// Label
    pub label: Option<MarkerLabel>,
    /// Drag enabled
    pub draggable: bool,
    /// Icon image URL
    pub icon_url: Option<String>,
    /// Icon size in pixels
    pub icon_size: Option<PixelPair>,
    /// Icon sprite origin in pixels
    pub icon_origin: Option<PixelPair>,
    /// Icon anchor in pixels
    pub icon_anchor: Option<PixelPair>,
    /// Opacity in [0, 1]
    pub opacity: f64,
    /// Visible
    pub visible: bool,
    /// Stacking index
    pub z_index: i32,
    /// Clickable
    pub clickable: bool,
    /// Animation
    pub animation: Option<Animation>,
    /// Open the associated info window on click
    pub open_info_window: bool,
}

impl MarkerDescriptor {
    /// Create a descriptor with default attributes and a fresh identity
    pub fn new() -> Self {
        Self {
            id: MarkerId::next(),
            latitude: None,
            longitude: None,
            title: None,
            label: None,
            draggable: false,
            icon_url: None,
            icon_size: None,
            icon_origin: None,
            icon_anchor: None,
            opacity: 1.0,
            visible: true,
            z_index: 1,
            clickable: true,
            animation: None,
            open_info_window: true,
        }
    }

    /// Create a descriptor at a numeric position
    pub fn at(lat: f64, lng: f64) -> Self {
        Self {
            latitude: Some(Coordinate::Number(lat)),
            longitude: Some(Coordinate::Number(lng)),
            ..Self::new()
        }
    }

    /// Identity
    pub fn id(&self) -> MarkerId {
        self.id
    }

    /// Position, once both coordinates are present and numeric
    pub fn position(&self) -> Option<LatLngLiteral> {
        let lat = self.latitude.as_ref()?.value()?;
        let lng = self.longitude.as_ref()?.value()?;
        Some(LatLngLiteral::new(lat, lng))
    }

    /// Icon specification, if any icon attribute is set
    pub fn icon(&self) -> Option<IconSpec> {
        let icon = IconSpec {
            url: self.icon_url.clone(),
            size: self.icon_size,
            origin: self.icon_origin,
            anchor: self.icon_anchor,
        };
        (!icon.is_empty()).then_some(icon)
    }
}

impl Default for MarkerDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MarkerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Marker-{}", self.id)
    }
}

/// Attribute named in a change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarkerField {
    /// `latitude`
    Latitude,
    /// `longitude`
    Longitude,
    /// `title`
    Title,
    /// `label`
    Label,
    /// `draggable`
    Draggable,
    /// `icon_url`
    IconUrl,
    /// `icon_size`
    IconSize,
    /// `icon_origin`
    IconOrigin,
    /// `icon_anchor`
    IconAnchor,
    /// `opacity`
    Opacity,
    /// `visible`
    Visible,
    /// `z_index`
    ZIndex,
    /// `clickable`
    Clickable,
    /// `animation`
    Animation,
    /// `open_info_window`
    OpenInfoWindow,
}

impl MarkerField {
    /// Whether this field is part of the icon
    pub fn is_icon(&self) -> bool {
        matches!(
            self,
            MarkerField::IconUrl
                | MarkerField::IconSize
                | MarkerField::IconOrigin
                | MarkerField::IconAnchor
        )
    }
}

/// One attribute assignment
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerChange {
    /// Set latitude
    Latitude(Option<Coordinate>),
    /// Set longitude
    Longitude(Option<Coordinate>),
    /// Set title
    Title(Option<String>),
    /// Set label
    Label(Option<MarkerLabel>),
    /// Set drag flag
    Draggable(bool),
    /// Set icon URL
    IconUrl(Option<String>),
    /// Set icon size
    IconSize(Option<PixelPair>),
    /// Set icon origin
    IconOrigin(Option<PixelPair>),
    /// Set icon anchor
    IconAnchor(Option<PixelPair>),
    /// Set opacity
    Opacity(f64),
    /// Set visibility
    Visible(bool),
    /// Set stacking index
    ZIndex(i32),
    /// Set clickable flag
    Clickable(bool),
    /// Set animation
    Animation(Option<Animation>),
    /// Set open-on-click flag
    OpenInfoWindow(bool),
}

impl MarkerChange {
    /// Field this change assigns
    pub fn field(&self) -> MarkerField {
        match self {
            MarkerChange::Latitude(_) => MarkerField::Latitude,
            MarkerChange::Longitude(_) => MarkerField::Longitude,
            MarkerChange::Title(_) => MarkerField::Title,
            MarkerChange::Label(_) => MarkerField::Label,
            MarkerChange::Draggable(_) => MarkerField::Draggable,
            MarkerChange::IconUrl(_) => MarkerField::IconUrl,
            MarkerChange::IconSize(_) => MarkerField::IconSize,
            MarkerChange::IconOrigin(_) => MarkerField::IconOrigin,
            MarkerChange::IconAnchor(_) => MarkerField::IconAnchor,
            MarkerChange::Opacity(_) => MarkerField::Opacity,
            MarkerChange::Visible(_) => MarkerField::Visible,
            MarkerChange::ZIndex(_) => MarkerField::ZIndex,
            MarkerChange::Clickable(_) => MarkerField::Clickable,
            MarkerChange::Animation(_) => MarkerField::Animation,
            MarkerChange::OpenInfoWindow(_) => MarkerField::OpenInfoWindow,
        }
    }

    /// Write the new value into `descriptor`
    pub fn apply_to(self, descriptor: &mut MarkerDescriptor) {
        match self {
            MarkerChange::Latitude(v) => descriptor.latitude = v,
            MarkerChange::Longitude(v) => descriptor.longitude = v,
            MarkerChange::Title(v) => descriptor.title = v,
            MarkerChange::Label(v) => descriptor.label = v,
            MarkerChange::Draggable(v) => descriptor.draggable = v,
            MarkerChange::IconUrl(v) => descriptor.icon_url = v,
            MarkerChange::IconSize(v) => descriptor.icon_size = v,
            MarkerChange::IconOrigin(v) => descriptor.icon_origin = v,
            MarkerChange::IconAnchor(v) => descriptor.icon_anchor = v,
            MarkerChange::Opacity(v) => descriptor.opacity = v,
            MarkerChange::Visible(v) => descriptor.visible = v,
            MarkerChange::ZIndex(v) => descriptor.z_index = v,
            MarkerChange::Clickable(v) => descriptor.clickable = v,
            MarkerChange::Animation(v) => descriptor.animation = v,
            MarkerChange::OpenInfoWindow(v) => descriptor.open_info_window = v,
        }
    }
}
