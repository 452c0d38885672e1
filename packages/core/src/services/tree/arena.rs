//! Flat node arena with a parent → children adjacency index
//!
//! Nodes are held in one `Vec` sorted by id; the adjacency lists keep
//! children in the same order, which is creation order.

use crate::models::CatalogNode;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    nodes: Vec<CatalogNode>,
    index: HashMap<i64, usize>,
    children: HashMap<i64, Vec<usize>>,
}

impl NodeArena {
    pub fn new(mut nodes: Vec<CatalogNode>) -> Self {
        nodes.sort_by_key(|node| node.id);
        nodes.dedup_by_key(|node| node.id);

        let index: HashMap<i64, usize> = nodes
            .iter()
            .enumerate()
            .map(|(slot, node)| (node.id, slot))
            .collect();

        let mut children: HashMap<i64, Vec<usize>> = HashMap::new();
        for (slot, node) in nodes.iter().enumerate() {
            if let Some(parent_id) = node.parent_id {
                children.entry(parent_id).or_default().push(slot);
            }
        }

        Self {
            nodes,
            index,
            children,
        }
    }

    pub fn get(&self, id: i64) -> Option<&CatalogNode> {
        self.index.get(&id).map(|&slot| &self.nodes[slot])
    }

    pub fn contains(&self, id: i64) -> bool {
        self.index.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogNode> {
        self.nodes.iter()
    }

    /// Nodes without a parent, in creation order
    pub fn roots(&self) -> impl Iterator<Item = &CatalogNode> {
        self.nodes.iter().filter(|node| node.is_root())
    }

    pub fn children(&self, id: i64) -> impl Iterator<Item = &CatalogNode> {
        self.children
            .get(&id)
            .into_iter()
            .flat_map(|slots| slots.iter().map(|&slot| &self.nodes[slot]))
    }

    /// Ids of `root` and its descendants, parents before children
    pub fn preorder(&self, root: i64) -> Vec<i64> {
        let mut order = Vec::new();
        if !self.contains(root) {
            return order;
        }

        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            let children: Vec<i64> = self.children(id).map(|child| child.id).collect();
            stack.extend(children.into_iter().rev());
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetaType;

    fn node(id: i64, parent_id: Option<i64>) -> CatalogNode {
        CatalogNode {
            id,
            name: format!("node-{}", id),
            description: None,
            price: 0.0,
            image_urls: None,
            parent_id,
            meta_type: MetaType::Product,
            attributes_list: Vec::new(),
            fabric_group_id: None,
            attribute_name: None,
        }
    }

    #[test]
    fn test_children_follow_id_order() {
        let arena = NodeArena::new(vec![
            node(4, Some(1)),
            node(1, None),
            node(2, Some(1)),
            node(3, Some(2)),
            node(5, None),
        ]);

        let children: Vec<i64> = arena.children(1).map(|n| n.id).collect();
        assert_eq!(children, vec![2, 4]);
        let roots: Vec<i64> = arena.roots().map(|n| n.id).collect();
        assert_eq!(roots, vec![1, 5]);
    }

    #[test]
    fn test_preorder_visits_parents_first() {
        let arena = NodeArena::new(vec![
            node(1, None),
            node(2, Some(1)),
            node(3, Some(2)),
            node(4, Some(1)),
        ]);

        assert_eq!(arena.preorder(1), vec![1, 2, 3, 4]);
        assert_eq!(arena.preorder(2), vec![2, 3]);
        assert!(arena.preorder(99).is_empty());
    }

    #[test]
    fn test_subtree_root_with_outside_parent() {
        let arena = NodeArena::new(vec![node(7, Some(3)), node(8, Some(7))]);
        assert_eq!(arena.roots().count(), 0);
        assert_eq!(arena.preorder(7), vec![7, 8]);
    }
}
