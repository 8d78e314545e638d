//! Line-level three-way content merge.
//!
//! Computes edit scripts base→ours and base→theirs with the `similar`
//! crate (Myers diff), then reconciles them chunk by chunk over base line
//! coordinates. Regions changed by only one side take that side; regions
//! changed identically by both collapse to one copy; overlapping or
//! directly adjacent divergent changes conflict, matching the conservative
//! behavior of line-based merge tools.

use similar::{DiffOp, TextDiff};

/// The outcome of merging one file's contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentMerge {
    /// The sides combined cleanly; here is the merged content.
    Merged(Vec<u8>),
    /// The sides made overlapping, divergent changes.
    Conflicted,
}

impl ContentMerge {
    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted)
    }
}

/// One side's replacement of a base region.
#[derive(Debug)]
struct Edit {
    base_start: usize,
    base_end: usize,
    lines: Vec<String>,
}

/// Merge `ours` and `theirs` against `base`.
///
/// Binary content (anything that is not UTF-8) never content-merges:
/// unless the sides are trivially reconcilable the result is
/// [`ContentMerge::Conflicted`].
pub fn merge_text(base: &[u8], ours: &[u8], theirs: &[u8]) -> ContentMerge {
    // Trivial cases hold for binary content too.
    if ours == theirs || base == theirs {
        return ContentMerge::Merged(ours.to_vec());
    }
    if base == ours {
        return ContentMerge::Merged(theirs.to_vec());
    }

    let (Ok(base_str), Ok(ours_str), Ok(theirs_str)) = (
        std::str::from_utf8(base),
        std::str::from_utf8(ours),
        std::str::from_utf8(theirs),
    ) else {
        return ContentMerge::Conflicted;
    };

    let base_lines = split_lines(base_str);
    let ours_lines = split_lines(ours_str);
    let theirs_lines = split_lines(theirs_str);

    let ours_edits = edit_script(&base_lines, &ours_lines);
    let theirs_edits = edit_script(&base_lines, &theirs_lines);

    let mut out = String::new();
    let mut pos = 0usize;
    let mut oi = 0usize;
    let mut ti = 0usize;

    loop {
        let next_o = ours_edits.get(oi).map(|e| e.base_start);
        let next_t = theirs_edits.get(ti).map(|e| e.base_start);
        let Some(start) = min_opt(next_o, next_t) else {
            for line in &base_lines[pos..] {
                out.push_str(line);
            }
            break;
        };

        // Unchanged gap before the next edited region.
        for line in &base_lines[pos..start] {
            out.push_str(line);
        }

        // Grow the region until neither side has an edit touching it.
        // Directly adjacent edits coalesce, which is what makes touching
        // divergent changes conflict.
        let mut end = start;
        let (o_from, t_from) = (oi, ti);
        loop {
            let mut grew = false;
            while let Some(edit) = ours_edits.get(oi) {
                if edit.base_start <= end {
                    end = end.max(edit.base_end);
                    oi += 1;
                    grew = true;
                } else {
                    break;
                }
            }
            while let Some(edit) = theirs_edits.get(ti) {
                if edit.base_start <= end {
                    end = end.max(edit.base_end);
                    ti += 1;
                    grew = true;
                } else {
                    break;
                }
            }
            if !grew {
                break;
            }
        }

        let ours_side = project(&base_lines, &ours_edits[o_from..oi], start, end);
        let theirs_side = project(&base_lines, &theirs_edits[t_from..ti], start, end);

        let touched_ours = oi > o_from;
        let touched_theirs = ti > t_from;
        let chosen = match (touched_ours, touched_theirs) {
            (true, false) => ours_side,
            (false, true) => theirs_side,
            _ if ours_side == theirs_side => ours_side,
            _ => return ContentMerge::Conflicted,
        };
        for line in chosen {
            out.push_str(&line);
        }
        pos = end;
    }

    ContentMerge::Merged(out.into_bytes())
}

/// What a side's content looks like for base region `[start, end)`.
fn project(base: &[&str], edits: &[Edit], start: usize, end: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut pos = start;
    for edit in edits {
        for line in &base[pos..edit.base_start] {
            out.push((*line).to_string());
        }
        out.extend(edit.lines.iter().cloned());
        pos = edit.base_end;
    }
    for line in &base[pos..end] {
        out.push((*line).to_string());
    }
    out
}

fn edit_script(base: &[&str], side: &[&str]) -> Vec<Edit> {
    let diff = TextDiff::from_slices(base, side);
    let mut edits = Vec::new();
    for op in diff.ops() {
        match op {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete {
                old_index, old_len, ..
            } => edits.push(Edit {
                base_start: *old_index,
                base_end: *old_index + *old_len,
                lines: Vec::new(),
            }),
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => edits.push(Edit {
                base_start: *old_index,
                base_end: *old_index,
                lines: side[*new_index..*new_index + *new_len]
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
            }),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => edits.push(Edit {
                base_start: *old_index,
                base_end: *old_index + *old_len,
                lines: side[*new_index..*new_index + *new_len]
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
            }),
        }
    }
    edits
}

/// Split into lines keeping terminators, so reassembly is byte-exact.
fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

fn min_opt(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged(result: ContentMerge) -> String {
        match result {
            ContentMerge::Merged(bytes) => String::from_utf8(bytes).unwrap(),
            ContentMerge::Conflicted => panic!("unexpected conflict"),
        }
    }

    #[test]
    fn identical_sides_merge_trivially() {
        let r = merge_text(b"a\n", b"b\n", b"b\n");
        assert_eq!(merged(r), "b\n");
    }

    #[test]
    fn one_side_unchanged_takes_the_other() {
        let base = b"one\ntwo\nthree\n";
        let ours = b"one\ntwo\nthree\n";
        let theirs = b"one\nTWO\nthree\n";
        assert_eq!(merged(merge_text(base, ours, theirs)), "one\nTWO\nthree\n");
        assert_eq!(merged(merge_text(base, theirs, ours)), "one\nTWO\nthree\n");
    }

    #[test]
    fn separated_changes_merge_cleanly() {
        let base = b"a\nb\nc\nd\ne\n";
        let ours = b"A\nb\nc\nd\ne\n";
        let theirs = b"a\nb\nc\nd\nE\n";
        assert_eq!(merged(merge_text(base, ours, theirs)), "A\nb\nc\nd\nE\n");
    }

    #[test]
    fn same_line_divergent_edit_conflicts() {
        let base = b"a\nb\nc\n";
        let ours = b"a\nOURS\nc\n";
        let theirs = b"a\nTHEIRS\nc\n";
        assert!(merge_text(base, ours, theirs).is_conflicted());
    }

    #[test]
    fn adjacent_divergent_edits_conflict() {
        let base = b"a\nb\nc\n";
        let ours = b"a\nB1\nc\n";
        let theirs = b"a\nb\nC1\n";
        // The edits touch (no unchanged line between them), so the region
        // coalesces and the sides disagree.
        assert!(merge_text(base, ours, theirs).is_conflicted());
    }

    #[test]
    fn identical_insertions_collapse() {
        let base = b"a\nc\n";
        let ours = b"a\nb\nc\n";
        let theirs = b"a\nb\nc\n";
        assert_eq!(merged(merge_text(base, ours, theirs)), "a\nb\nc\n");
    }

    #[test]
    fn divergent_insertions_at_same_point_conflict() {
        let base = b"a\nc\n";
        let ours = b"a\nX\nc\n";
        let theirs = b"a\nY\nc\n";
        assert!(merge_text(base, ours, theirs).is_conflicted());
    }

    #[test]
    fn delete_vs_keep_takes_the_delete() {
        let base = b"a\nb\nc\n";
        let ours = b"a\nc\n";
        let theirs = b"a\nb\nc\n";
        assert_eq!(merged(merge_text(base, ours, theirs)), "a\nc\n");
    }

    #[test]
    fn delete_vs_edit_conflicts() {
        let base = b"a\nb\nc\n";
        let ours = b"a\nc\n";
        let theirs = b"a\nB\nc\n";
        assert!(merge_text(base, ours, theirs).is_conflicted());
    }

    #[test]
    fn binary_content_never_content_merges() {
        let base = &[0u8, 159, 146, 150];
        let ours = &[0u8, 159, 1, 2];
        let theirs = &[0u8, 159, 3, 4];
        assert!(merge_text(base, ours, theirs).is_conflicted());
    }

    #[test]
    fn binary_trivial_cases_still_resolve() {
        let base = &[0u8, 159][..];
        let changed = &[0u8, 160][..];
        assert_eq!(
            merge_text(base, base, changed),
            ContentMerge::Merged(changed.to_vec())
        );
        assert_eq!(
            merge_text(base, changed, base),
            ContentMerge::Merged(changed.to_vec())
        );
    }

    #[test]
    fn merge_is_deterministic() {
        let base = b"a\nb\nc\nd\n";
        let ours = b"a\nB\nc\nd\n";
        let theirs = b"a\nb\nc\nD\n";
        let first = merge_text(base, ours, theirs);
        let second = merge_text(base, ours, theirs);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_trailing_newline_is_preserved() {
        let base = b"a\nb";
        let ours = b"a\nb";
        let theirs = b"a\nb2";
        assert_eq!(merged(merge_text(base, ours, theirs)), "a\nb2");
    }
}
