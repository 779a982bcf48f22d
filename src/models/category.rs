//! Category tree stored as an arena keyed by category id.
//!
//! Nodes never own each other: a node holds its parent id and the ordered
//! ids of its children, and all nodes live in one [`CategoryTree`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Category identifier derived from the category URL.
pub type CategoryId = String;

/// A category candidate extracted from a page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryLink {
    pub name: String,
    pub url: String,
}

impl CategoryLink {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// A node of the category tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub url: String,
    /// Back-reference only; the tree owns every node.
    pub parent_id: Option<CategoryId>,
    pub children: Vec<CategoryId>,
    pub is_leaf: bool,
    pub product_count: u32,
    /// Root candidates sit at depth 1.
    pub depth: u32,
}

/// Arena holding every category discovered in one crawl run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "TreeData", into = "TreeData")]
pub struct CategoryTree {
    nodes: Vec<Category>,
    index: HashMap<CategoryId, usize>,
    roots: Vec<CategoryId>,
}

#[derive(Serialize, Deserialize)]
struct TreeData {
    roots: Vec<CategoryId>,
    categories: Vec<Category>,
}

impl From<TreeData> for CategoryTree {
    fn from(data: TreeData) -> Self {
        let index = data
            .categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Self {
            nodes: data.categories,
            index,
            roots: data.roots,
        }
    }
}

impl From<CategoryTree> for TreeData {
    fn from(tree: CategoryTree) -> Self {
        Self {
            roots: tree.roots,
            categories: tree.nodes,
        }
    }
}

/// Derive a stable category id from its URL.
pub fn category_id(url: &str) -> CategoryId {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}

impl CategoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a depth-1 category.
    ///
    /// Returns `None` when the URL was already discovered in this run.
    pub fn insert_root(&mut self, link: CategoryLink) -> Option<CategoryId> {
        let id = self.insert(link, None, 1)?;
        self.roots.push(id.clone());
        Some(id)
    }

    /// Attach a child under `parent`.
    ///
    /// Returns `None` when the parent is unknown or the URL was already
    /// discovered, which keeps the tree acyclic.
    pub fn insert_child(&mut self, parent: &str, link: CategoryLink) -> Option<CategoryId> {
        let depth = self.get(parent)?.depth + 1;
        let id = self.insert(link, Some(parent.to_string()), depth)?;
        if let Some(parent) = self.get_mut(parent) {
            parent.children.push(id.clone());
        }
        Some(id)
    }

    fn insert(
        &mut self,
        link: CategoryLink,
        parent_id: Option<CategoryId>,
        depth: u32,
    ) -> Option<CategoryId> {
        let id = category_id(&link.url);
        if self.index.contains_key(&id) {
            return None;
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(Category {
            id: id.clone(),
            name: link.name,
            url: link.url,
            parent_id,
            children: Vec::new(),
            is_leaf: false,
            product_count: 0,
            depth,
        });
        Some(id)
    }

    pub fn get(&self, id: &str) -> Option<&Category> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Category> {
        self.index.get(id).map(|&i| &mut self.nodes[i])
    }

    /// Mark a node as a leaf.
    pub fn mark_leaf(&mut self, id: &str) {
        if let Some(node) = self.get_mut(id) {
            node.is_leaf = true;
        }
    }

    /// Ids of the depth-1 categories, in discovery order.
    pub fn roots(&self) -> &[CategoryId] {
        &self.roots
    }

    /// Children of a node, in discovery order.
    pub fn children(&self, id: &str) -> Vec<&Category> {
        self.get(id)
            .map(|node| node.children.iter().filter_map(|c| self.get(c)).collect())
            .unwrap_or_default()
    }

    /// All nodes in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.nodes.iter()
    }

    /// All nodes in depth-first pre-order, starting from the roots.
    pub fn depth_first(&self) -> Vec<&Category> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<&CategoryId> = self.roots.iter().rev().collect();
        while let Some(id) = stack.pop() {
            if let Some(node) = self.get(id) {
                out.push(node);
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf).count()
    }

    pub fn max_depth(&self) -> u32 {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(name: &str) -> CategoryLink {
        CategoryLink::new(name, format!("https://shop.example/{name}"))
    }

    #[test]
    fn test_category_id_is_stable() {
        let a = category_id("https://shop.example/women");
        assert_eq!(a, category_id("https://shop.example/women"));
        assert_ne!(a, category_id("https://shop.example/men"));
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_parent_and_children_references() {
        let mut tree = CategoryTree::new();
        let women = tree.insert_root(link("women")).unwrap();
        let dresses = tree.insert_child(&women, link("dresses")).unwrap();
        let shoes = tree.insert_child(&women, link("shoes")).unwrap();

        assert_eq!(tree.roots(), &[women.clone()]);
        assert_eq!(tree.get(&women).unwrap().children, vec![dresses.clone(), shoes]);
        assert_eq!(tree.get(&dresses).unwrap().parent_id, Some(women));
        assert_eq!(tree.get(&dresses).unwrap().depth, 2);
    }

    #[test]
    fn test_duplicate_url_is_attached_once() {
        let mut tree = CategoryTree::new();
        let women = tree.insert_root(link("women")).unwrap();
        let sale = tree.insert_child(&women, link("sale")).unwrap();

        assert!(tree.insert_root(link("sale")).is_none());
        assert!(tree.insert_child(&sale, link("women")).is_none());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_depth_first_order() {
        let mut tree = CategoryTree::new();
        let a = tree.insert_root(link("a")).unwrap();
        let b = tree.insert_root(link("b")).unwrap();
        let a1 = tree.insert_child(&a, link("a1")).unwrap();
        tree.insert_child(&a1, link("a1x")).unwrap();
        tree.insert_child(&b, link("b1")).unwrap();

        let names: Vec<_> = tree.depth_first().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "a1", "a1x", "b", "b1"]);
        assert_eq!(tree.max_depth(), 3);
    }

    #[test]
    fn test_serde_rebuilds_index() {
        let mut tree = CategoryTree::new();
        let root = tree.insert_root(link("home")).unwrap();
        tree.insert_child(&root, link("kitchen")).unwrap();
        tree.mark_leaf(&root);

        let json = serde_json::to_string(&tree).unwrap();
        let loaded: CategoryTree = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, tree);
        assert!(loaded.get(&root).unwrap().is_leaf);
        assert_eq!(loaded.children(&root).len(), 1);
    }
}
