//! Tree rewriting with identity preservation.
//!
//! A rewriter returns the very same node when nothing under it changed, so
//! callers can detect a no-op with [`Expr::ptr_eq`].

use std::collections::HashMap;

use common_error::QuillResult;

use crate::expr::{Expr, ExprKind, NodeKey};

/// A bottom-up tree transformation.
///
/// The default implementation rewrites every child and rebuilds the node
/// only if a child changed.
pub trait ExprRewriter {
    /// Rewrite one node.
    fn rewrite(&mut self, expr: &Expr) -> QuillResult<Expr> {
        rewrite_children(self, expr)
    }
}

/// Rewrite the children of `expr`, returning `expr` itself if none changed.
pub fn rewrite_children<R: ExprRewriter + ?Sized>(
    rewriter: &mut R,
    expr: &Expr,
) -> QuillResult<Expr> {
    let children = expr.children();
    if children.is_empty() {
        return Ok(expr.clone());
    }

    let mut changed = false;
    let mut rewritten = Vec::with_capacity(children.len());
    for child in children {
        let new_child = rewriter.rewrite(child)?;
        changed |= !new_child.ptr_eq(child);
        rewritten.push(new_child);
    }

    if changed {
        expr.with_new_children(rewritten)
    } else {
        Ok(expr.clone())
    }
}

/// A set of node replacements keyed by node identity.
///
/// Each entry keeps the original node alive so its identity cannot be
/// reused while the table exists.
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    entries: HashMap<NodeKey, (Expr, Expr)>,
}

impl Substitution {
    /// Create an empty substitution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every occurrence of `from` with `to`.
    pub fn insert(&mut self, from: Expr, to: Expr) {
        self.entries.insert(from.key(), (from, to));
    }

    /// Builder form of [`Substitution::insert`].
    #[must_use]
    pub fn with(mut self, from: Expr, to: Expr) -> Self {
        self.insert(from, to);
        self
    }

    /// Replacement for a node, if any.
    pub fn get(&self, expr: &Expr) -> Option<&Expr> {
        self.entries.get(&expr.key()).map(|(_, to)| to)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries as `(original, replacement)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Expr, &Expr)> {
        self.entries.values().map(|(from, to)| (from, to))
    }

    /// Apply every replacement to `expr`.
    ///
    /// Replacements are not themselves rewritten. A member read of a record
    /// constructed by a replacement is folded to the matching argument, so
    /// `new { o, g }.g` becomes the expression bound to `g`.
    pub fn apply(&self, expr: &Expr) -> QuillResult<Expr> {
        if self.is_empty() {
            return Ok(expr.clone());
        }
        ReplacingRewriter { substitution: self }.rewrite(expr)
    }
}

/// Replace every occurrence of `from` in `body` with `to`.
pub fn replace(body: &Expr, from: &Expr, to: &Expr) -> QuillResult<Expr> {
    Substitution::new().with(from.clone(), to.clone()).apply(body)
}

struct ReplacingRewriter<'a> {
    substitution: &'a Substitution,
}

impl ExprRewriter for ReplacingRewriter<'_> {
    fn rewrite(&mut self, expr: &Expr) -> QuillResult<Expr> {
        if let Some(replacement) = self.substitution.get(expr) {
            return Ok(replacement.clone());
        }

        let rewritten = rewrite_children(self, expr)?;
        if rewritten.ptr_eq(expr) {
            return Ok(rewritten);
        }
        Ok(fold_member_of_new(&rewritten))
    }
}

fn fold_member_of_new(expr: &Expr) -> Expr {
    if let ExprKind::Member { expr: target, member, .. } = expr.kind()
        && let ExprKind::New { record, args } = target.kind()
        && let Some(index) = record.fields.iter().position(|(name, _)| name == member)
    {
        return args[index].clone();
    }
    expr.clone()
}
