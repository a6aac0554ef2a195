//! Auto-resolution policy (C8).
//!
//! Ranked tie-breakers applied to each duplicate group: higher bit-rate,
//! then richer metadata, then preferred directory, else manual review.
//! The plan is a pure value; applying it is a separate step performed by
//! the caller against the catalog store (C1). Grounded on the
//! plan-then-execute separation used by `hash_deduplicator.rs`'s
//! `link_duplicates` transaction pattern, adapted to a value-returning
//! (non-transactional) policy layer.

use crate::models::duplicate_group::DuplicateGroup;
use crate::models::track::Track;
use std::collections::HashSet;
use std::path::Path;

/// One resolved duplicate: the file to keep and the file to delete, with
/// the tie-breaker reason that decided it.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub group_id: u64,
    pub file_to_delete: i64,
    pub file_to_keep: i64,
    pub similarity: Option<f64>,
    pub reason: String,
}

/// Output of running the auto-resolver over a set of groups: groups that
/// produced a clear resolution, and groups deferred to manual review.
#[derive(Debug, Clone)]
pub struct ResolutionPlan {
    pub resolutions: Vec<Resolution>,
    pub manual_review: Vec<DuplicateGroup>,
}

/// Minimum bit-rate margin (as a fraction of `bitrate_tol_kbps`) required
/// for the bit-rate tie-breaker to declare a winner, so near-equal
/// bit-rates don't trigger spurious deletions.
fn bitrate_margin(bitrate_tol_kbps: f64) -> f64 {
    bitrate_tol_kbps / 4.0
}

/// Decide a single group's winner, or `None` if no rule produces one.
/// Returns `(keep_index, reason)` where `keep_index` indexes into
/// `group.members`.
fn decide_winner(group: &DuplicateGroup, bitrate_tol_kbps: f64, preferred_dir: Option<&Path>) -> Option<(usize, &'static str)> {
    let members = &group.members;

    // Rule 1: higher bit-rate wins, by more than the noise margin.
    if let Some(best) = strictly_greater_by_margin(members, |t| t.bit_rate as f64, bitrate_margin(bitrate_tol_kbps)) {
        return Some((best, "higher bitrate"));
    }

    // Rule 2: richer metadata wins.
    if let Some(best) = strictly_greater_by_margin(members, |t| t.metadata_richness() as f64, 0.5) {
        return Some((best, "richer metadata"));
    }

    // Rule 3: preferred directory wins.
    if let Some(dir) = preferred_dir {
        let inside: Vec<usize> = members
            .iter()
            .enumerate()
            .filter(|(_, t)| Path::new(&t.file_path).starts_with(dir))
            .map(|(i, _)| i)
            .collect();
        if inside.len() == 1 {
            return Some((inside[0], "preferred directory"));
        }
    }

    None
}

/// Returns the index of the single member whose score strictly exceeds
/// every other member's by more than `margin`. `None` if there is no
/// unique such member (including ties).
fn strictly_greater_by_margin(members: &[Track], score: impl Fn(&Track) -> f64, margin: f64) -> Option<usize> {
    let scores: Vec<f64> = members.iter().map(&score).collect();
    let (best_idx, &best_score) = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;

    let runner_up = scores
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != best_idx)
        .map(|(_, s)| *s)
        .fold(f64::MIN, f64::max);

    if best_score - runner_up > margin {
        Some(best_idx)
    } else {
        None
    }
}

/// Run the tie-breaker ladder over every group, producing one resolution
/// per group that yields a clear winner (one keep, N-1 deletes) and
/// deferring the rest to manual review. Resolutions with a
/// `file_to_delete` in `exclude` are dropped entirely (that row is simply
/// not produced). Output is in `group_id` order, matching input order.
pub fn resolve(
    groups: &[DuplicateGroup],
    bitrate_tol_kbps: f64,
    preferred_dir: Option<&Path>,
    exclude: &HashSet<i64>,
) -> ResolutionPlan {
    let mut resolutions = Vec::new();
    let mut manual_review = Vec::new();

    for group in groups {
        match decide_winner(group, bitrate_tol_kbps, preferred_dir) {
            Some((keep_idx, reason)) => {
                let keep = &group.members[keep_idx];
                let mut produced_any = false;
                for (idx, member) in group.members.iter().enumerate() {
                    if idx == keep_idx {
                        continue;
                    }
                    if exclude.contains(&member.id) {
                        continue;
                    }
                    produced_any = true;
                    resolutions.push(Resolution {
                        group_id: group.group_id,
                        file_to_delete: member.id,
                        file_to_keep: keep.id,
                        similarity: group.member_similarities[idx],
                        reason: reason.to_string(),
                    });
                }
                if !produced_any && group.members.len() > 2 {
                    // Every delete candidate was excluded; nothing to do
                    // for this group, but it is not a manual-review case
                    // either (a decision was made, just nothing to apply).
                }
            }
            None => manual_review.push(group.clone()),
        }
    }

    ResolutionPlan { resolutions, manual_review }
}

/// One pairing of directories that contain duplicate members, used by the
/// directory-centric variant (§4.8).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectoryPair {
    pub directory_a: String,
    pub directory_b: String,
}

/// Group duplicate pairs by the `(directory_a, directory_b)` pair of their
/// members, for the caller to then pick a preferred directory per pairing.
pub fn directory_conflicts(groups: &[DuplicateGroup]) -> Vec<(DirectoryPair, Vec<u64>)> {
    let mut conflicts: Vec<(DirectoryPair, Vec<u64>)> = Vec::new();

    for group in groups {
        let mut dirs: Vec<String> = group
            .members
            .iter()
            .filter_map(|t| Path::new(&t.file_path).parent().map(|p| p.to_string_lossy().to_string()))
            .collect();
        dirs.sort();
        dirs.dedup();
        if dirs.len() < 2 {
            continue;
        }
        for i in 0..dirs.len() {
            for j in (i + 1)..dirs.len() {
                let pair = DirectoryPair { directory_a: dirs[i].clone(), directory_b: dirs[j].clone() };
                match conflicts.iter_mut().find(|(p, _)| *p == pair) {
                    Some((_, ids)) => ids.push(group.group_id),
                    None => conflicts.push((pair, vec![group.group_id])),
                }
            }
        }
    }

    conflicts
}

/// Preview the files that would be deleted if `delete_dir` is resolved
/// against `keep_dir` for the given groups: every member under
/// `delete_dir` in a group that also has a member under `keep_dir`.
pub fn preview_directory_resolution(groups: &[DuplicateGroup], keep_dir: &Path, delete_dir: &Path) -> Vec<i64> {
    let mut to_delete = Vec::new();
    for group in groups {
        let has_keep = group.members.iter().any(|t| Path::new(&t.file_path).starts_with(keep_dir));
        if !has_keep {
            continue;
        }
        for member in &group.members {
            if Path::new(&member.file_path).starts_with(delete_dir) {
                to_delete.push(member.id);
            }
        }
    }
    to_delete
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: i64, path: &str, bit_rate: i64) -> Track {
        let mut t = Track::new_unsaved(path.into(), "mp3".into());
        t.id = id;
        t.bit_rate = bit_rate;
        t
    }

    fn group(members: Vec<Track>) -> DuplicateGroup {
        DuplicateGroup::new(members, 1).unwrap()
    }

    #[test]
    fn scenario_5_higher_bitrate_wins() {
        let g = group(vec![track(1, "/music/A.mp3", 320), track(2, "/other/A.mp3", 192)]);
        let plan = resolve(&[g], 64.0, None, &HashSet::new());
        assert_eq!(plan.resolutions.len(), 1);
        assert_eq!(plan.resolutions[0].file_to_keep, 1);
        assert_eq!(plan.resolutions[0].file_to_delete, 2);
        assert_eq!(plan.resolutions[0].reason, "higher bitrate");
        assert!(plan.manual_review.is_empty());
    }

    #[test]
    fn scenario_6_identical_metadata_no_preferred_dir_defers() {
        let g = group(vec![track(1, "/x/a.mp3", 256), track(2, "/y/a.mp3", 256)]);
        let plan = resolve(&[g], 64.0, None, &HashSet::new());
        assert!(plan.resolutions.is_empty());
        assert_eq!(plan.manual_review.len(), 1);
    }

    #[test]
    fn near_equal_bitrate_within_margin_does_not_decide() {
        let g = group(vec![track(1, "/a.mp3", 192), track(2, "/b.mp3", 200)]); // diff 8, margin 16
        let plan = resolve(&[g], 64.0, None, &HashSet::new());
        assert!(plan.resolutions.is_empty());
        assert_eq!(plan.manual_review.len(), 1);
    }

    #[test]
    fn richer_metadata_wins_when_bitrate_ties() {
        let mut a = track(1, "/a.mp3", 192);
        a.title = Some("Song".into());
        a.artist = Some("Artist".into());
        let b = track(2, "/b.mp3", 192);
        let plan = resolve(&[group(vec![a, b])], 64.0, None, &HashSet::new());
        assert_eq!(plan.resolutions.len(), 1);
        assert_eq!(plan.resolutions[0].file_to_keep, 1);
        assert_eq!(plan.resolutions[0].reason, "richer metadata");
    }

    #[test]
    fn preferred_directory_breaks_remaining_ties() {
        let a = track(1, "/keep/a.mp3", 192);
        let b = track(2, "/other/a.mp3", 192);
        let plan = resolve(&[group(vec![a, b])], 64.0, Some(Path::new("/keep")), &HashSet::new());
        assert_eq!(plan.resolutions.len(), 1);
        assert_eq!(plan.resolutions[0].file_to_keep, 1);
        assert_eq!(plan.resolutions[0].reason, "preferred directory");
    }

    #[test]
    fn excluded_ids_are_dropped_from_the_plan() {
        let g = group(vec![track(1, "/music/A.mp3", 320), track(2, "/other/A.mp3", 192)]);
        let exclude: HashSet<i64> = [2].into_iter().collect();
        let plan = resolve(&[g], 64.0, None, &exclude);
        assert!(plan.resolutions.is_empty());
    }

    #[test]
    fn directory_conflicts_groups_pairs_by_directory() {
        let g = group(vec![track(1, "/dirA/a.mp3", 192), track(2, "/dirB/a.mp3", 192)]);
        let conflicts = directory_conflicts(&[g]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].1, vec![1]);
    }

    #[test]
    fn preview_directory_resolution_lists_delete_dir_members() {
        let g = group(vec![track(1, "/keep/a.mp3", 192), track(2, "/delete/a.mp3", 192)]);
        let to_delete = preview_directory_resolution(&[g], Path::new("/keep"), Path::new("/delete"));
        assert_eq!(to_delete, vec![2]);
    }
}
