//! Projections of the live document into the persisted story definition and
//! the render request. Everything here is a pure function of its inputs.

use serde::{Deserialize, Serialize};

use crate::channel::{Channel, Rgb};
use crate::document::{Document, SampleInfo};
use crate::error::{ModelError, ModelResult};
use crate::group::Group;
use crate::mask::Mask;
use crate::reindex::{Key, Registry};
use crate::story::{Arrow, Axes, Overlay, Story, VisKind, VisLabel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelOutput {
    pub color: String,
    pub min: f64,
    pub max: f64,
    pub label: String,
    pub id: Key,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupOutput {
    pub label: String,
    pub channels: Vec<ChannelOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskChannelOutput {
    #[serde(default)]
    pub state_label: Option<String>,
    #[serde(default)]
    pub original_label: Option<String>,
    pub color: String,
    pub label: String,
    #[serde(default)]
    pub ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskOutput {
    pub label: String,
    pub path: String,
    #[serde(default)]
    pub map_path: Option<String>,
    pub channels: Vec<MaskChannelOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterOutput {
    pub labels: String,
    pub colors: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisScatterplotOutput {
    pub data: String,
    pub axes: Axes,
    pub clusters: ClusterOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisMatrixOutput {
    pub data: String,
    #[serde(rename = "colormapInvert")]
    pub colormap_invert: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointOutput {
    pub name: String,
    pub text: String,
    pub pan: [f64; 2],
    pub zoom: f64,
    pub masks: Vec<Key>,
    pub arrows: Vec<Arrow>,
    pub overlays: Vec<Overlay>,
    pub group: String,
    #[serde(rename = "VisScatterplot", default, skip_serializing_if = "Option::is_none")]
    pub vis_scatterplot: Option<VisScatterplotOutput>,
    #[serde(rename = "VisCanvasScatterplot", default, skip_serializing_if = "Option::is_none")]
    pub vis_canvas_scatterplot: Option<VisScatterplotOutput>,
    #[serde(rename = "VisMatrix", default, skip_serializing_if = "Option::is_none")]
    pub vis_matrix: Option<VisMatrixOutput>,
    #[serde(rename = "VisBarChart", default, skip_serializing_if = "Option::is_none")]
    pub vis_bar_chart: Option<String>,
}

/// The complete persistable document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryDefinition {
    pub sample_info: SampleInfo,
    pub image_name: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub story_uuid: Option<String>,
    #[serde(default)]
    pub image_uuid: Option<String>,
    pub waypoints: Vec<WaypointOutput>,
    pub groups: Vec<GroupOutput>,
    #[serde(default)]
    pub masks: Vec<MaskOutput>,
}

/// Where a save-as or publish writes its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveDestination {
    pub root_dir: String,
    pub out_name: String,
}

impl SaveDestination {
    pub fn validate(&self) -> ModelResult<()> {
        if self.root_dir.trim().is_empty() {
            return Err(ModelError::validation("choose a parent directory"));
        }
        let name = self.out_name.trim();
        if name.is_empty() || name == "." || name == ".." {
            return Err(ModelError::validation("choose an output name"));
        }
        if name.contains(['/', '\\']) {
            return Err(ModelError::validation(format!(
                "output name '{name}' may not contain path separators"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub root_dir: String,
    pub out_name: String,
    pub rgba: bool,
    pub story: StoryDefinition,
}

const RGBA_PALETTE: [(&str, Rgb); 3] = [("Red", Rgb::RED), ("Green", Rgb::GREEN), ("Blue", Rgb::BLUE)];

fn rgba_channels() -> Vec<ChannelOutput> {
    RGBA_PALETTE
        .iter()
        .enumerate()
        .map(|(id, (label, color))| ChannelOutput {
            color: color.to_hex(),
            min: 0.0,
            max: 1.0,
            label: (*label).to_string(),
            id,
        })
        .collect()
}

fn channel_output(doc: &Document, group: &Group, id: Key, channel: &Channel) -> Option<ChannelOutput> {
    let render = doc.effective_render(group, id)?;
    let (min, max) = render.normalized();
    Some(ChannelOutput {
        color: render.color.to_hex(),
        min,
        max,
        label: channel.label.clone(),
        id,
    })
}

pub fn build_group_output(doc: &Document) -> Vec<GroupOutput> {
    doc.groups()
        .values()
        .map(|group| {
            let channels = if doc.rgba {
                rgba_channels()
            } else {
                group
                    .active_ids
                    .iter()
                    .filter_map(|id| {
                        let channel = doc.channels().get(*id)?;
                        channel_output(doc, group, *id, channel)
                    })
                    .collect()
            };
            GroupOutput {
                label: group.label.clone(),
                channels,
                uuid: group.uuid.clone(),
            }
        })
        .collect()
}

pub fn build_mask_output(masks: &Registry<Mask>) -> Vec<MaskOutput> {
    masks
        .values()
        .map(|mask| MaskOutput {
            label: mask.name.clone(),
            path: mask.path.clone(),
            map_path: mask.map_path.clone(),
            channels: vec![MaskChannelOutput {
                state_label: mask.state_label.clone(),
                original_label: mask.cache_name.clone(),
                color: mask.color.to_hex(),
                label: mask.name.clone(),
                ids: mask.map_ids.clone(),
            }],
        })
        .collect()
}

fn scatterplot(vis: &VisLabel) -> Option<VisScatterplotOutput> {
    vis.is_set().then(|| VisScatterplotOutput {
        data: vis.data.clone(),
        axes: vis.axes.clone(),
        clusters: ClusterOutput {
            labels: vis.cluster_labels(),
            colors: vis.cluster_colors(),
        },
    })
}

fn waypoint(story: &Story, groups: &Registry<Group>, masks: &Registry<Mask>) -> WaypointOutput {
    let matrix = story.vis(VisKind::Matrix);
    let bar_chart = story.vis(VisKind::BarChart);
    WaypointOutput {
        name: story.name.clone(),
        text: story.text.clone(),
        pan: [story.pan.x, story.pan.y],
        zoom: story.zoom,
        masks: story
            .masks
            .iter()
            .copied()
            .filter(|m| masks.contains(*m))
            .collect(),
        arrows: story.arrows.clone(),
        overlays: story.overlays.clone(),
        group: groups
            .get(story.group)
            .map(|g| g.label.clone())
            .unwrap_or_default(),
        vis_scatterplot: scatterplot(story.vis(VisKind::Scatterplot)),
        vis_canvas_scatterplot: scatterplot(story.vis(VisKind::CanvasScatterplot)),
        vis_matrix: matrix.is_set().then(|| VisMatrixOutput {
            data: matrix.data.clone(),
            colormap_invert: matrix.colormap_invert,
        }),
        vis_bar_chart: bar_chart.is_set().then(|| bar_chart.data.clone()),
    }
}

pub fn build_waypoints(
    stories: &Registry<Story>,
    groups: &Registry<Group>,
    masks: &Registry<Mask>,
) -> Vec<WaypointOutput> {
    stories.values().map(|s| waypoint(s, groups, masks)).collect()
}

pub fn build_story_definition(doc: &Document) -> StoryDefinition {
    StoryDefinition {
        sample_info: doc.sample.clone(),
        image_name: doc.image_name.clone(),
        author_name: doc.author_name.clone(),
        story_uuid: doc.story_uuid.clone(),
        image_uuid: doc.image_uuid.clone(),
        waypoints: build_waypoints(doc.stories(), doc.groups(), doc.masks()),
        groups: build_group_output(doc),
        masks: build_mask_output(doc.masks()),
    }
}

pub fn build_render_request(doc: &Document, destination: &SaveDestination) -> ModelResult<RenderRequest> {
    destination.validate()?;
    Ok(RenderRequest {
        root_dir: destination.root_dir.clone(),
        out_name: destination.out_name.trim().to_string(),
        rgba: doc.rgba,
        story: build_story_definition(doc),
    })
}
