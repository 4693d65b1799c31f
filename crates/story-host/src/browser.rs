//! Helpers for the file-picker: ordering, filtering and size labels.

use std::cmp::Ordering;

use crate::adapters::registry::Collaborators;
use crate::error::HostResult;
use crate::protocol::{FileEntry, Listing};

pub const IMAGE_EXTENSIONS: [&str; 3] = ["tif", "tiff", "dat"];

/// Text after the last dot, or the whole name when there is none.
pub fn extension(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(_, ext)| ext)
}

pub fn is_image(entry: &FileEntry) -> bool {
    !entry.is_dir && IMAGE_EXTENSIONS.contains(&extension(&entry.name).to_ascii_lowercase().as_str())
}

/// Directories first, each side ordered by name ignoring case.
pub fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
    });
}

/// Keep directories and files whose extension is in `extensions`.
pub fn filter_entries(entries: Vec<FileEntry>, extensions: &[String]) -> Vec<FileEntry> {
    if extensions.is_empty() {
        return entries;
    }
    entries
        .into_iter()
        .filter(|e| {
            e.is_dir || {
                let ext = extension(&e.name).to_ascii_lowercase();
                extensions.iter().any(|x| x.eq_ignore_ascii_case(&ext))
            }
        })
        .collect()
}

/// Human-readable size in powers of 1000. Unknown or zero sizes print empty.
pub fn format_size(size: Option<u64>) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    let bytes = match size {
        None | Some(0) => return String::new(),
        Some(n) => n,
    };
    if bytes < 1000 {
        return format!("{bytes} bytes");
    }
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// List `path`, filter by extension and sort for display.
pub async fn browse(
    collab: &Collaborators,
    path: &str,
    parent: bool,
    extensions: &[String],
) -> HostResult<Listing> {
    let listing = collab.list(path, parent).await?;
    let mut entries = filter_entries(listing.entries, extensions);
    sort_entries(&mut entries);
    Ok(Listing {
        path: listing.path,
        entries,
    })
}
