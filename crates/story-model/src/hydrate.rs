//! Rebuild a live document from a persisted story definition.
//!
//! Hydration trusts the saved labels and skips name validation; it only
//! drops references that no longer resolve.

use std::collections::BTreeSet;

use crate::channel::{ChanRender, Channel, IntensityRange, Rgb};
use crate::document::Document;
use crate::error::ModelResult;
use crate::group::{Group, find_group};
use crate::mask::Mask;
use crate::output::{GroupOutput, MaskOutput, StoryDefinition, VisScatterplotOutput, WaypointOutput};
use crate::reindex::Registry;
use crate::story::{Cluster, Pan, Story, VisKind, VisLabel};

fn denormalize(value: f64, max_range: u32) -> u32 {
    (value * f64::from(max_range)).round().clamp(0.0, f64::from(max_range)) as u32
}

fn hydrate_group(out: &GroupOutput, channels: &Registry<Channel>, max_range: u32, rgba: bool) -> Group {
    let mut group = Group::new(out.label.clone(), Vec::new());
    group.uuid = out.uuid.clone();
    if rgba {
        group.active_ids = channels.keys().collect();
        return group;
    }
    for entry in &out.channels {
        if !channels.contains(entry.id) {
            log::warn!("group '{}' references unknown channel {}", out.label, entry.id);
            continue;
        }
        let color = Rgb::from_hex(&entry.color).unwrap_or(Rgb::WHITE);
        let mut render = ChanRender::with_color(color, max_range);
        render.range = IntensityRange {
            min: denormalize(entry.min, max_range),
            max: denormalize(entry.max, max_range),
        };
        group.active_ids.push(entry.id);
        group.render.insert(entry.id, render);
    }
    group
}

fn hydrate_mask(out: &MaskOutput) -> Mask {
    let channel = out.channels.first();
    Mask {
        name: out.label.clone(),
        color: channel
            .and_then(|c| Rgb::from_hex(&c.color).ok())
            .unwrap_or(Rgb::WHITE),
        path: out.path.clone(),
        map_path: out.map_path.clone(),
        cache_name: channel.and_then(|c| c.original_label.clone()),
        state_label: channel.and_then(|c| c.state_label.clone()),
        map_ids: channel.map(|c| c.ids.clone()).unwrap_or_default(),
    }
}

fn split_list(list: &str) -> Vec<&str> {
    if list.is_empty() {
        Vec::new()
    } else {
        list.split(',').collect()
    }
}

fn hydrate_scatterplot(out: &VisScatterplotOutput) -> VisLabel {
    let mut vis = VisLabel {
        data: out.data.clone(),
        axes: out.axes.clone(),
        ..Default::default()
    };
    let colors = split_list(&out.clusters.colors);
    for (i, name) in split_list(&out.clusters.labels).into_iter().enumerate() {
        let color = colors
            .get(i)
            .and_then(|c| Rgb::from_hex(c).ok())
            .unwrap_or(Rgb::WHITE);
        vis.clusters.push(Cluster {
            name: name.to_string(),
            color,
        });
    }
    vis
}

fn hydrate_story(out: &WaypointOutput, groups: &Registry<Group>, masks: &Registry<Mask>) -> Story {
    let mut story = Story {
        name: out.name.clone(),
        text: out.text.clone(),
        pan: Pan {
            x: out.pan[0],
            y: out.pan[1],
        },
        zoom: out.zoom,
        arrows: out.arrows.clone(),
        overlays: out.overlays.clone(),
        masks: out.masks.iter().copied().filter(|m| masks.contains(*m)).collect(),
        group: find_group(groups, &out.group).unwrap_or(0),
        vis: Default::default(),
    };
    if let Some(vis) = &out.vis_scatterplot {
        *story.vis_mut(VisKind::Scatterplot) = hydrate_scatterplot(vis);
    }
    if let Some(vis) = &out.vis_canvas_scatterplot {
        *story.vis_mut(VisKind::CanvasScatterplot) = hydrate_scatterplot(vis);
    }
    if let Some(matrix) = &out.vis_matrix {
        let vis = story.vis_mut(VisKind::Matrix);
        vis.data = matrix.data.clone();
        vis.colormap_invert = matrix.colormap_invert;
    }
    if let Some(data) = &out.vis_bar_chart {
        story.vis_mut(VisKind::BarChart).data = data.clone();
    }
    story
}

impl Document {
    /// Construct a document from a saved definition over an image with the
    /// given channels.
    pub fn from_story_definition(
        def: &StoryDefinition,
        channel_labels: &[String],
        max_range: u32,
        rgba: bool,
    ) -> ModelResult<Document> {
        let mut channels = Registry::from_records(
            "channel",
            channel_labels
                .iter()
                .enumerate()
                .map(|(i, label)| Channel::new(i, label.clone(), max_range)),
        );
        let groups = Registry::from_records(
            "group",
            def.groups
                .iter()
                .map(|g| hydrate_group(g, &channels, max_range, rgba)),
        );
        // Base renders come from the first group that shows each channel.
        let mut seeded = BTreeSet::new();
        for group in groups.values() {
            for (id, render) in &group.render {
                if seeded.insert(*id) {
                    channels.update(*id, |c| c.render = *render)?;
                }
            }
        }
        let masks = Registry::from_records("mask", def.masks.iter().map(hydrate_mask));
        let stories = Registry::from_records(
            "story",
            def.waypoints
                .iter()
                .map(|w| hydrate_story(w, &groups, &masks)),
        );

        let mut doc = Document::from_parts(channels, groups, stories, masks);
        doc.sample = def.sample_info.clone();
        doc.image_name = def.image_name.clone();
        doc.author_name = def.author_name.clone();
        doc.story_uuid = def.story_uuid.clone();
        doc.image_uuid = def.image_uuid.clone();
        doc.rgba = rgba;
        doc.check_invariants()?;
        Ok(doc)
    }
}
