//! Line-level diff and patch for merge-mode output.

use similar::{ChangeTag, TextDiff};

/// One step of a line patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOp {
    Keep(String),
    Delete(String),
    Insert(String),
}

/// Ordered edit script turning one text into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

/// The patch does not match the text it is applied to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("patch does not apply at byte {offset}")]
pub struct PatchConflict {
    pub offset: usize,
}

impl Patch {
    /// Line diff from `old` to `new`.
    pub fn diff(old: &str, new: &str) -> Self {
        let diff = TextDiff::from_lines(old, new);
        let ops = diff
            .iter_all_changes()
            .map(|change| {
                let line = change.value().to_owned();
                match change.tag() {
                    ChangeTag::Equal => PatchOp::Keep(line),
                    ChangeTag::Delete => PatchOp::Delete(line),
                    ChangeTag::Insert => PatchOp::Insert(line),
                }
            })
            .collect();
        Self { ops }
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    /// Whether applying the patch would change anything.
    pub fn is_noop(&self) -> bool {
        self.ops.iter().all(|op| matches!(op, PatchOp::Keep(_)))
    }

    /// Apply to `base`. Every kept or deleted line must match exactly.
    pub fn apply(&self, base: &str) -> Result<String, PatchConflict> {
        let mut out = String::with_capacity(base.len());
        let mut cursor = 0;

        for op in &self.ops {
            match op {
                PatchOp::Keep(line) => {
                    expect_line(base, cursor, line)?;
                    out.push_str(line);
                    cursor += line.len();
                }
                PatchOp::Delete(line) => {
                    expect_line(base, cursor, line)?;
                    cursor += line.len();
                }
                PatchOp::Insert(line) => out.push_str(line),
            }
        }

        if cursor != base.len() {
            return Err(PatchConflict { offset: cursor });
        }
        Ok(out)
    }
}

fn expect_line(base: &str, cursor: usize, line: &str) -> Result<(), PatchConflict> {
    if base[cursor..].starts_with(line) {
        Ok(())
    } else {
        Err(PatchConflict { offset: cursor })
    }
}

/// Diff `existing` against `rendered` and patch `existing` with it.
///
/// Falls back to `rendered` when the patch does not apply.
pub fn merge(existing: &str, rendered: &str) -> String {
    Patch::diff(existing, rendered)
        .apply(existing)
        .unwrap_or_else(|_| rendered.to_owned())
}
