//! Waypoints ("stories") and the visualization labels they own.

use serde::{Deserialize, Serialize};

use crate::channel::Rgb;
use crate::error::ModelResult;
use crate::reindex::{Key, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pan {
    pub x: f64,
    pub y: f64,
}

impl Pan {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Default for Pan {
    fn default() -> Self {
        Self { x: 0.5, y: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrow {
    pub position: [f64; 2],
    pub angle: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub hide_arrow: bool,
}

/// Rectangular highlight in normalized viewport units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Overlay {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<[f64; 4]> for Overlay {
    fn from([x, y, width, height]: [f64; 4]) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<Overlay> for [f64; 4] {
    fn from(o: Overlay) -> Self {
        [o.x, o.y, o.width, o.height]
    }
}

impl Arrow {
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite()) && self.angle.is_finite()
    }
}

impl Overlay {
    pub fn is_finite(&self) -> bool {
        <[f64; 4]>::from(*self).iter().all(|v| v.is_finite())
    }
}

/// The four fixed visualization slots of a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisKind {
    Scatterplot,
    CanvasScatterplot,
    Matrix,
    BarChart,
}

impl VisKind {
    pub const ALL: [VisKind; 4] = [
        VisKind::Scatterplot,
        VisKind::CanvasScatterplot,
        VisKind::Matrix,
        VisKind::BarChart,
    ];

    pub fn slot(self) -> usize {
        match self {
            VisKind::Scatterplot => 0,
            VisKind::CanvasScatterplot => 1,
            VisKind::Matrix => 2,
            VisKind::BarChart => 3,
        }
    }

    pub fn has_axes(self) -> bool {
        matches!(self, VisKind::Scatterplot | VisKind::CanvasScatterplot)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub color: Rgb,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axes {
    pub x: String,
    pub y: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisLabel {
    pub data: String,
    pub axes: Axes,
    pub colormap_invert: bool,
    pub clusters: Registry<Cluster>,
    pub active_cluster: Option<Key>,
}

impl Default for VisLabel {
    fn default() -> Self {
        Self {
            data: String::new(),
            axes: Axes::default(),
            colormap_invert: false,
            clusters: Registry::new("cluster"),
            active_cluster: None,
        }
    }
}

impl VisLabel {
    pub fn is_set(&self) -> bool {
        !self.data.is_empty()
    }

    /// Insert a cluster after `after` and make it active.
    pub fn insert_cluster(&mut self, after: Option<Key>, cluster: Cluster) -> ModelResult<Key> {
        let key = self.clusters.insert_after(after, cluster)?;
        self.active_cluster = Some(key);
        Ok(key)
    }

    /// Remove a cluster and keep the active pointer on the same record, or on
    /// its predecessor when the active cluster itself goes.
    pub fn remove_cluster(&mut self, key: Key) -> ModelResult<Cluster> {
        let removed = self.clusters.remove(key)?;
        self.active_cluster = match self.active_cluster {
            _ if self.clusters.is_empty() => None,
            Some(active) if active == key => Some(key.saturating_sub(1)),
            Some(active) if active > key => Some(active - 1),
            other => other,
        };
        Ok(removed.as_ref().clone())
    }

    pub fn cluster_labels(&self) -> String {
        self.clusters
            .values()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn cluster_colors(&self) -> String {
        self.clusters
            .values()
            .map(|c| c.color.to_hex())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Story {
    pub name: String,
    pub text: String,
    pub pan: Pan,
    pub zoom: f64,
    pub arrows: Vec<Arrow>,
    pub overlays: Vec<Overlay>,
    pub masks: Vec<Key>,
    pub group: Key,
    pub vis: [VisLabel; 4],
}

impl Default for Story {
    fn default() -> Self {
        Self {
            name: String::new(),
            text: String::new(),
            pan: Pan::default(),
            zoom: 1.0,
            arrows: Vec::new(),
            overlays: Vec::new(),
            masks: Vec::new(),
            group: 0,
            vis: Default::default(),
        }
    }
}

impl Story {
    pub fn named(name: impl Into<String>, group: Key) -> Self {
        Self {
            name: name.into(),
            group,
            ..Default::default()
        }
    }

    pub fn vis(&self, kind: VisKind) -> &VisLabel {
        &self.vis[kind.slot()]
    }

    pub fn vis_mut(&mut self, kind: VisKind) -> &mut VisLabel {
        &mut self.vis[kind.slot()]
    }
}

/// Field-level edits for a story; `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryPatch {
    pub text: Option<String>,
    pub pan: Option<Pan>,
    pub zoom: Option<f64>,
    pub group: Option<Key>,
    pub masks: Option<Vec<Key>>,
    pub arrows: Option<Vec<Arrow>>,
    pub overlays: Option<Vec<Overlay>>,
}
