//! Transient duplicate-group value produced by the scan controller (C7).
//!
//! Not persisted except via the scan result cache. Invariant:
//! `members.len() >= 2`, element 0's similarity is 1.0 by convention and all
//! others report similarity to element 0.

use crate::models::track::Track;
use serde::{Deserialize, Serialize};

/// A maximal set of tracks judged pairwise duplicate under the active config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub group_id: u64,
    pub members: Vec<Track>,
    /// Aligned with `members`; `member_similarities[0] == Some(1.0)` by convention.
    pub member_similarities: Vec<Option<f64>>,
}

impl DuplicateGroup {
    /// Build a group, enforcing the `members[0]` ordering invariant:
    /// `members[0]` is chosen deterministically as the lexicographically
    /// smallest `file_path`.
    pub fn new(mut members: Vec<Track>, group_id: u64) -> Option<Self> {
        if members.len() < 2 {
            return None;
        }
        members.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        let representative = members[0].clone();
        let member_similarities = members
            .iter()
            .map(|m| {
                if m.id == representative.id {
                    Some(1.0)
                } else {
                    None
                }
            })
            .collect();
        Some(Self {
            group_id,
            members,
            member_similarities,
        })
    }

    /// Attach a computed similarity for a non-representative member by id.
    pub fn set_similarity(&mut self, track_id: i64, similarity: f64) {
        if let Some(idx) = self.members.iter().position(|m| m.id == track_id) {
            self.member_similarities[idx] = Some(similarity);
        }
    }

    pub fn representative_title(&self) -> Option<&str> {
        self.members[0].title.as_deref()
    }

    pub fn representative_artist(&self) -> Option<&str> {
        self.members[0].artist.as_deref()
    }

    pub fn file_count(&self) -> usize {
        self.members.len()
    }

    /// All member ids, used for cache-coherence checks.
    pub fn member_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.members.iter().map(|m| m.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::track::Track;

    fn track(id: i64, path: &str) -> Track {
        let mut t = Track::new_unsaved(path.into(), "mp3".into());
        t.id = id;
        t
    }

    #[test]
    fn rejects_single_member_groups() {
        assert!(DuplicateGroup::new(vec![track(1, "/a.mp3")], 0).is_none());
    }

    #[test]
    fn orders_members_by_path_and_seeds_representative_similarity() {
        let g = DuplicateGroup::new(vec![track(2, "/z.mp3"), track(1, "/a.mp3")], 7).unwrap();
        assert_eq!(g.members[0].id, 1);
        assert_eq!(g.member_similarities[0], Some(1.0));
        assert_eq!(g.member_similarities[1], None);
    }

    #[test]
    fn set_similarity_updates_correct_member() {
        let mut g = DuplicateGroup::new(vec![track(2, "/z.mp3"), track(1, "/a.mp3")], 7).unwrap();
        g.set_similarity(2, 0.91);
        assert_eq!(g.member_similarities[1], Some(0.91));
    }
}
