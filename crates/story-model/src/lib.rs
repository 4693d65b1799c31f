//! Document state engine for image stories: dense-keyed registries, the
//! reindexing that keeps their cross references consistent, projections into
//! the saved story definition, and the change detection behind autosave.

pub mod channel;
pub mod diff;
pub mod document;
pub mod error;
pub mod group;
mod hydrate;
pub mod mask;
pub mod output;
pub mod reindex;
pub mod story;
pub mod subsets;

pub use channel::{ChanRender, Channel, DEFAULT_MAX_RANGE, IntensityRange, RenderPatch, Rgb};
pub use diff::{EditorStatus, MapStatus, SaveState, is_save_worthy};
pub use document::{Document, SampleInfo, VisPatch};
pub use error::{ModelError, ModelResult};
pub use group::Group;
pub use mask::{ALL_CELLS, Mask, MaskPatch, PathStatus};
pub use output::{
    GroupOutput, MaskOutput, RenderRequest, SaveDestination, StoryDefinition, WaypointOutput,
    build_group_output, build_mask_output, build_render_request, build_story_definition,
    build_waypoints,
};
pub use reindex::{Key, Registry};
pub use story::{Arrow, Axes, Cluster, Overlay, Pan, Story, StoryPatch, VisKind, VisLabel};
pub use subsets::{CachedSelection, SubsetResponse};
