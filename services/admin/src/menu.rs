//! Menu visibility filter
//!
//! Prunes the navigation tree down to what a user may see. The transform is
//! pure: the flat item list is never mutated and a fresh tree is returned.

use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

use crate::error::AdminResult;
use crate::models::{MenuItem, MenuNode};
use crate::rbac::RbacResolver;
use crate::store::SharedStore;

/// Build the visible menu tree.
///
/// Items must be active and either unrestricted or guarded by a permission
/// in `permissions`. A child survives only if its whole parent chain up to a
/// root survives, so orphans are dropped rather than promoted. Groups (no
/// `href`) left without children are removed, bottom-up. Siblings are
/// ordered by `order`, ties keeping input order.
pub fn filter_menu(items: &[MenuItem], permissions: &BTreeSet<String>) -> Vec<MenuNode> {
    let visible: Vec<&MenuItem> = items
        .iter()
        .filter(|item| item.is_active)
        .filter(|item| {
            item.permission_id
                .as_ref()
                .is_none_or(|p| permissions.contains(p))
        })
        .collect();

    let mut children: HashMap<Option<Uuid>, Vec<&MenuItem>> = HashMap::new();
    for item in &visible {
        children.entry(item.parent_id).or_default().push(item);
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|item| item.order);
    }

    let mut visited = HashSet::new();
    build_level(None, &children, &mut visited)
}

fn build_level(
    parent: Option<Uuid>,
    children: &HashMap<Option<Uuid>, Vec<&MenuItem>>,
    visited: &mut HashSet<Uuid>,
) -> Vec<MenuNode> {
    let Some(siblings) = children.get(&parent) else {
        return Vec::new();
    };

    let mut nodes = Vec::with_capacity(siblings.len());
    for item in siblings {
        // Duplicate ids or malformed links must not loop forever
        if !visited.insert(item.id) {
            continue;
        }

        let node = MenuNode {
            id: item.id,
            label: item.label.clone(),
            href: item.href.clone(),
            icon: item.icon.clone(),
            permission_id: item.permission_id.clone(),
            order: item.order,
            children: build_level(Some(item.id), children, visited),
        };

        if node.is_group() && node.children.is_empty() {
            continue;
        }
        nodes.push(node);
    }
    nodes
}

/// Loads the stored menu and filters it for a user
#[derive(Clone)]
pub struct MenuService {
    store: SharedStore,
    rbac: RbacResolver,
}

impl MenuService {
    pub fn new(store: SharedStore, rbac: RbacResolver) -> Self {
        Self { store, rbac }
    }

    pub async fn visible_menu(&self, user_id: Uuid) -> AdminResult<Vec<MenuNode>> {
        let items = self.store.list_menu_items().await?;
        let permissions = self.rbac.effective_permissions(user_id).await?;
        Ok(filter_menu(&items, &permissions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(
        label: &str,
        href: Option<&str>,
        permission: Option<&str>,
        parent: Option<Uuid>,
        order: i32,
    ) -> MenuItem {
        MenuItem {
            id: Uuid::new_v4(),
            label: label.to_string(),
            href: href.map(str::to_string),
            icon: None,
            permission_id: permission.map(str::to_string),
            is_active: true,
            order,
            parent_id: parent,
        }
    }

    fn perms(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn labels(nodes: &[MenuNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.label.as_str()).collect()
    }

    #[test]
    fn group_with_only_forbidden_child_disappears() {
        let group = item("Administration", None, None, None, 0);
        let users = item("Users", Some("/admin/users"), Some("user:read"), Some(group.id), 0);
        let home = item("Dashboard", Some("/"), None, None, 0);

        let tree = filter_menu(&[group, users, home], &perms(&[]));
        assert_eq!(labels(&tree), vec!["Dashboard"]);
    }

    #[test]
    fn group_with_deep_visible_descendant_survives() {
        let root = item("Settings", None, None, None, 0);
        let mid = item("Security", None, None, Some(root.id), 0);
        let leaf = item("Roles", Some("/admin/roles"), Some("role:read"), Some(mid.id), 0);
        let hidden = item("Audit", Some("/admin/audit"), Some("audit:read"), Some(mid.id), 1);

        let tree = filter_menu(&[root, mid, leaf, hidden], &perms(&["role:read"]));
        assert_eq!(labels(&tree), vec!["Settings"]);
        assert_eq!(labels(&tree[0].children), vec!["Security"]);
        assert_eq!(labels(&tree[0].children[0].children), vec!["Roles"]);
    }

    #[test]
    fn nested_empty_groups_collapse_bottom_up() {
        let outer = item("Outer", None, None, None, 0);
        let inner = item("Inner", None, None, Some(outer.id), 0);
        let leaf = item("Leaf", Some("/leaf"), Some("x:y"), Some(inner.id), 0);

        assert!(filter_menu(&[outer, inner, leaf], &perms(&[])).is_empty());
    }

    #[test]
    fn children_of_hidden_parent_are_dropped_not_promoted() {
        let parent = item("Reports", Some("/reports"), Some("report:read"), None, 0);
        let child = item("Sales", Some("/reports/sales"), None, Some(parent.id), 0);

        assert!(filter_menu(&[parent, child], &perms(&[])).is_empty());
    }

    #[test]
    fn inactive_items_are_skipped() {
        let mut off = item("Old", Some("/old"), None, None, 0);
        off.is_active = false;
        let on = item("New", Some("/new"), None, None, 1);

        assert_eq!(labels(&filter_menu(&[off, on], &perms(&[]))), vec!["New"]);
    }

    #[test]
    fn siblings_sorted_by_order_then_input() {
        let a = item("A", Some("/a"), None, None, 2);
        let b = item("B", Some("/b"), None, None, 1);
        let c = item("C", Some("/c"), None, None, 1);

        assert_eq!(labels(&filter_menu(&[a, b, c], &perms(&[]))), vec!["B", "C", "A"]);
    }

    #[test]
    fn cycles_are_dropped() {
        let mut x = item("X", Some("/x"), None, None, 0);
        let mut y = item("Y", Some("/y"), None, None, 0);
        x.parent_id = Some(y.id);
        y.parent_id = Some(x.id);
        let z = item("Z", Some("/z"), None, None, 0);

        assert_eq!(labels(&filter_menu(&[x, y, z], &perms(&[]))), vec!["Z"]);
    }

    #[test]
    fn input_is_left_untouched() {
        let group = item("Group", None, None, None, 0);
        let items = vec![group];
        let before = items.clone();
        let _ = filter_menu(&items, &perms(&[]));
        assert_eq!(items, before);
    }
}
