//! Display utilities for Quill.
//!
//! Renders expression trees as indented ASCII trees for traces and
//! diagnostics.

mod tree;

pub use tree::{DisplayTree, TreeNode};

/// Truncate a label for display, appending an ellipsis when cut.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
