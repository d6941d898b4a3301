//! Tree rendering of expressions.

use common_display::{DisplayTree, TreeNode, truncate_string};

use crate::expr::{Expr, ExprKind, ProjectionBinding};

const MAX_DETAIL_LEN: usize = 60;

impl TreeNode for Expr {
    fn label(&self) -> String {
        match self.kind() {
            ExprKind::Constant { .. } => "Constant".to_string(),
            ExprKind::Parameter(_) => "Parameter".to_string(),
            ExprKind::Member { member, .. } => format!("Member .{member}"),
            ExprKind::Call(call) => format!("{}.{}", call.declaring(), call.op()),
            ExprKind::Lambda(_) => "Lambda".to_string(),
            ExprKind::Quote(_) => "Quote".to_string(),
            ExprKind::Binary { op, .. } => format!("Binary {op}"),
            ExprKind::Not(_) => "Not".to_string(),
            ExprKind::Conditional { .. } => "Conditional".to_string(),
            ExprKind::New { record, .. } => format!("New {}", record.name),
            ExprKind::QueryRoot { entity } => format!("QueryRoot {entity}"),
            ExprKind::EntityQueryable(entity_type) => format!("EntityQueryable {}", entity_type.name),
            ExprKind::ProjectionBinding(binding) => match binding.binding() {
                ProjectionBinding::Member(member) => format!("ProjectionBinding {member}"),
                ProjectionBinding::Index(index) => format!("ProjectionBinding #{index}"),
            },
            ExprKind::EntityShaper(shaper) => format!("EntityShaper {}", shaper.entity_type().name),
            ExprKind::FlattenedGroupJoin(_) => "FlattenedGroupJoin".to_string(),
        }
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        Self::children(self)
            .into_iter()
            .map(|child| child as &dyn TreeNode)
            .collect()
    }

    fn details(&self) -> Option<String> {
        match self.kind() {
            ExprKind::Constant { value, .. } => Some(truncate_string(&value.to_string(), MAX_DETAIL_LEN)),
            ExprKind::Parameter(p) => Some(format!("{}: {}", p.name(), p.ty())),
            ExprKind::Lambda(lambda) => {
                let params = lambda
                    .params()
                    .iter()
                    .map(|p| p.name().to_string())
                    .collect::<Vec<_>>();
                Some(params.join(", "))
            }
            ExprKind::Call(_) | ExprKind::Conditional { .. } | ExprKind::Binary { .. } => {
                Some(truncate_string(&self.ty().to_string(), MAX_DETAIL_LEN))
            }
            ExprKind::EntityShaper(shaper) if shaper.is_nullable() => Some("nullable".to_string()),
            _ => None,
        }
    }
}

impl Expr {
    /// Render this tree one node per line.
    pub fn explain(&self) -> String {
        DisplayTree::new(self).to_string()
    }
}

#[cfg(test)]
mod tests {
    use quill_core::Type;

    use crate::expr::Expr;
    use crate::query::{lambda, queryable};

    #[test]
    fn test_explain() {
        let query = queryable::where_(
            Expr::query_root("Customer"),
            lambda(&[("c", Type::entity("Customer"))], |p| {
                Expr::equal(
                    Expr::member(p[0].clone(), "City", Type::String),
                    Expr::constant("London"),
                )
            })
            .unwrap(),
        )
        .unwrap();

        let expected = "\
Queryable.Where (IQueryable<Customer>)
├─ QueryRoot Customer
└─ Quote
   └─ Lambda (c)
      └─ Binary == (Bool)
         ├─ Member .City
         │  └─ Parameter (c: Customer)
         └─ Constant (\"London\")
";
        assert_eq!(query.explain(), expected);
    }
}
