use std::collections::HashSet;
use std::fmt::Write;

use crate::maven::coordinates::{Dependency, DependencyId, DEFAULT_TYPE, SCOPE};
use crate::resolver::Resolution;

const ICON_SUCCESS: &str = "✅";
const ICON_FAILURE: &str = "❌⛔️";
const ICON_UNKNOWN: &str = "❓";
const ICON_SEE_ABOVE: &str = "⤴︎";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStatus {
    Normal,
    NotResolved,
    AlreadyShown,
}

struct TreeNode {
    id: DependencyId,
    status: NodeStatus,
    /// scope and optionality as declared by the parent node's POM
    declaration: Option<Dependency>,
    children: Vec<TreeNode>,
}

impl Resolution {
    /// Renders the resolved graph as a tree, e.g.
    ///
    /// ```text
    /// ╤ org.foo:proj:1.0 ✅ from central
    /// │ ╘ com.bar:pr:2.0 ❌⛔️ tried central: POM not found
    /// ╞ org.foo:other:1.0 ✅ from central
    /// │ ╘ org.foo:proj:1.0 ⤴︎
    /// ╘ com.baz:missing:2.0 ❓
    /// ```
    ///
    /// `roots` are printed first (and marked missing if they are not part of the resolution), then
    ///  every entry not reached from them. Each coordinate is expanded once, later occurrences refer
    ///  back to it.
    pub fn pretty_print(&self, roots: Option<&[DependencyId]>) -> String {
        let mut remaining = self.iter().map(|r| r.id.clone()).collect::<HashSet<_>>();
        let mut trees = Vec::new();

        for root in roots.unwrap_or_default() {
            let mut node = self.lift(root, None, &mut remaining);
            if node.status == NodeStatus::AlreadyShown && !self.contains(root) {
                node.status = NodeStatus::NotResolved;
            }
            trees.push(node);
        }
        for resolved in self.iter() {
            if remaining.contains(&resolved.id) {
                trees.push(self.lift(&resolved.id, None, &mut remaining));
            }
        }

        let mut result = String::new();
        let count = trees.len();
        for (i, tree) in trees.iter().enumerate() {
            let marker = match i {
                0 if count == 1 => "═ ",
                0 => "╤ ",
                i if i + 1 == count => "╘ ",
                _ => "╞ ",
            };
            result.push_str(marker);
            let mut prefix = String::from(if i + 1 == count { "  " } else { "│ " });
            self.print_node(tree, &mut prefix, &mut result);
        }
        result
    }

    /// One line per coordinate that failed to resolve, with the reason every repository gave
    pub fn failure_report(&self) -> String {
        self.failures().iter()
            .map(|r| format!("{}: {}", r.id, r.log))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn lift(&self, id: &DependencyId, declaration: Option<&Dependency>, remaining: &mut HashSet<DependencyId>) -> TreeNode {
        if !remaining.remove(id) {
            return TreeNode {
                id: id.clone(),
                status: NodeStatus::AlreadyShown,
                declaration: declaration.cloned(),
                children: vec![],
            };
        }

        let children = match self.get(id) {
            Some(resolved) => resolved.dependencies.iter()
                .filter(|d| self.contains(&d.id))
                .map(|d| self.lift(&d.id, Some(d), remaining))
                .collect(),
            None => vec![],
        };
        TreeNode {
            id: id.clone(),
            status: NodeStatus::Normal,
            declaration: declaration.cloned(),
            children,
        }
    }

    fn print_node(&self, node: &TreeNode, prefix: &mut String, result: &mut String) {
        let label = self.label(node);
        result.push_str(&label.replace('\n', &format!("\n{}", prefix)));
        result.push('\n');

        let base = prefix.len();
        let count = node.children.len();
        for (i, child) in node.children.iter().enumerate() {
            prefix.truncate(base);
            result.push_str(prefix);
            if i + 1 == count {
                result.push_str("╘ ");
                prefix.push_str("  ");
            }
            else {
                result.push_str("╞ ");
                prefix.push_str("│ ");
            }
            self.print_node(child, prefix, result);
        }
        prefix.truncate(base);
    }

    fn label(&self, node: &TreeNode) -> String {
        let id = &node.id;
        let mut result = format!("{}:{}:{}", id.group, id.name, id.version);
        if let Some(classifier) = id.classifier() {
            let _ = write!(result, ":{}", classifier);
        }
        if id.packaging_type() != DEFAULT_TYPE {
            let _ = write!(result, ":{}", id.packaging_type());
        }

        if node.status == NodeStatus::AlreadyShown {
            let _ = write!(result, " {}", ICON_SEE_ABOVE);
            return result;
        }

        if let Some(declaration) = &node.declaration {
            if let Some(scope) = declaration.id.explicit_attribute(&SCOPE) {
                let _ = write!(result, " {}", scope);
            }
            if declaration.id.is_optional() {
                result.push_str(" optional");
            }
        }

        let resolved = match node.status {
            NodeStatus::NotResolved => None,
            _ => self.get(id),
        };
        match resolved {
            None => {
                let _ = write!(result, " {}", ICON_UNKNOWN);
            }
            Some(resolved) => {
                let _ = write!(result, " {}", if resolved.has_error { ICON_FAILURE } else { ICON_SUCCESS });
                if let Some(from) = &resolved.resolved_from {
                    let _ = write!(result, " from {}", from.name());
                }
                if !resolved.log.trim().is_empty() {
                    let _ = write!(result, " {}", resolved.log);
                }
            }
        }
        result
    }
}
