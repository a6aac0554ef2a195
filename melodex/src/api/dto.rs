//! Wire-format value types shared by the API handlers, mirroring §6.
//!
//! `Track` and the session models already render camelCase directly; the
//! one shape genuinely different from its internal model is
//! `DuplicateGroup` — the wire form nests `{file, similarity}` pairs
//! instead of the internal model's two parallel arrays, so it gets its own
//! `From` conversion here.

use crate::models::{DuplicateGroup, Track};
use serde::Serialize;

/// A single member of a duplicate group on the wire: the full `Track` plus
/// its similarity to the group's representative (element 0 gets `1.0`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateFile {
    pub file: Track,
    pub similarity: Option<f64>,
}

/// `DuplicateGroup` as described in §6: `{groupId, files, fileCount,
/// representativeTitle, representativeArtist}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroupView {
    pub group_id: u64,
    pub files: Vec<DuplicateFile>,
    pub file_count: usize,
    pub representative_title: Option<String>,
    pub representative_artist: Option<String>,
}

impl From<&DuplicateGroup> for DuplicateGroupView {
    fn from(group: &DuplicateGroup) -> Self {
        let files = group
            .members
            .iter()
            .zip(group.member_similarities.iter())
            .map(|(file, similarity)| DuplicateFile { file: file.clone(), similarity: *similarity })
            .collect();
        Self {
            group_id: group.group_id,
            files,
            file_count: group.file_count(),
            representative_title: group.representative_title().map(str::to_string),
            representative_artist: group.representative_artist().map(str::to_string),
        }
    }
}

/// A page of items plus the total row count available, used by every
/// paged listing endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: usize,
    pub size: usize,
}

/// `?page=&size=` query parameters common to every paged listing endpoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

/// Default and maximum page size, so an unbounded `size` can't be used to
/// force the whole catalog through a single response.
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

impl PageQuery {
    pub fn page(&self) -> usize {
        self.page.unwrap_or(0)
    }

    pub fn size(&self) -> usize {
        self.size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() * self.size()) as i64
    }

    pub fn limit(&self) -> i64 {
        self.size() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Track;

    fn track(id: i64, path: &str) -> Track {
        let mut t = Track::new_unsaved(path.into(), "mp3".into());
        t.id = id;
        t
    }

    #[test]
    fn group_view_carries_similarities_alongside_files() {
        let group = DuplicateGroup::new(vec![track(2, "/z.mp3"), track(1, "/a.mp3")], 3).unwrap();
        let view = DuplicateGroupView::from(&group);
        assert_eq!(view.group_id, 3);
        assert_eq!(view.file_count, 2);
        assert_eq!(view.files[0].similarity, Some(1.0));
        assert_eq!(view.files[0].file.id, 1);
    }

    #[test]
    fn page_query_defaults_and_clamps() {
        let q = PageQuery { page: None, size: None };
        assert_eq!(q.page(), 0);
        assert_eq!(q.size(), DEFAULT_PAGE_SIZE);

        let q = PageQuery { page: Some(2), size: Some(10_000) };
        assert_eq!(q.size(), MAX_PAGE_SIZE);
        assert_eq!(q.offset(), 2 * MAX_PAGE_SIZE as i64);
    }
}
