//! Arena-allocated markup tree.
//!
//! html5ever parses each content unit into an [`ArenaDom`]. Nodes live in one
//! vector and link to each other by index, which keeps document-order walks
//! cheap and avoids reference-counted node graphs.

use html5ever::{LocalName, QualName};

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel for "no node".
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_some(self) -> bool {
        self != Self::NONE
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element { name: QualName, attrs: Vec<Attribute> },
    Text(String),
    Comment,
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: QualName,
    pub value: String,
}

#[derive(Debug)]
pub struct Node {
    pub data: NodeData,
    pub parent: NodeId,
    pub first_child: NodeId,
    pub last_child: NodeId,
    pub prev_sibling: NodeId,
    pub next_sibling: NodeId,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

/// Arena-based markup tree.
#[derive(Debug)]
pub struct ArenaDom {
    nodes: Vec<Node>,
}

impl Default for ArenaDom {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaDom {
    /// Create a tree holding only the document root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeData::Document)],
        }
    }

    pub fn document(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree holds only the document root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(data));
        id
    }

    pub fn create_element(&mut self, name: QualName, attrs: Vec<Attribute>) -> NodeId {
        self.alloc(NodeData::Element { name, attrs })
    }

    pub fn create_text(&mut self, text: String) -> NodeId {
        self.alloc(NodeData::Text(text))
    }

    pub fn create_comment(&mut self) -> NodeId {
        self.alloc(NodeData::Comment)
    }

    /// Append `child` as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        let last = self.get(parent).map_or(NodeId::NONE, |n| n.last_child);

        if let Some(node) = self.get_mut(child) {
            node.parent = parent;
            node.prev_sibling = last;
            node.next_sibling = NodeId::NONE;
        }
        if let Some(node) = self.get_mut(last) {
            node.next_sibling = child;
        }
        if let Some(node) = self.get_mut(parent) {
            if node.first_child.is_none() {
                node.first_child = child;
            }
            node.last_child = child;
        }
    }

    /// Insert `new_node` immediately before `sibling`.
    pub fn insert_before(&mut self, sibling: NodeId, new_node: NodeId) {
        let Some((parent, prev)) = self.get(sibling).map(|n| (n.parent, n.prev_sibling)) else {
            return;
        };

        if let Some(node) = self.get_mut(new_node) {
            node.parent = parent;
            node.prev_sibling = prev;
            node.next_sibling = sibling;
        }
        if let Some(node) = self.get_mut(sibling) {
            node.prev_sibling = new_node;
        }
        if prev.is_some() {
            if let Some(node) = self.get_mut(prev) {
                node.next_sibling = new_node;
            }
        } else if let Some(node) = self.get_mut(parent) {
            node.first_child = new_node;
        }
    }

    /// Append text under `parent`, merging with a trailing text node.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        let last = self.get(parent).map_or(NodeId::NONE, |n| n.last_child);
        if let Some(Node {
            data: NodeData::Text(existing),
            ..
        }) = self.get_mut(last)
        {
            existing.push_str(text);
            return;
        }

        let node = self.create_text(text.to_string());
        self.append(parent, node);
    }

    /// Unlink `target` from its parent and siblings.
    pub fn detach(&mut self, target: NodeId) {
        let Some((parent, prev, next)) = self
            .get(target)
            .map(|n| (n.parent, n.prev_sibling, n.next_sibling))
        else {
            return;
        };

        if prev.is_some() {
            if let Some(node) = self.get_mut(prev) {
                node.next_sibling = next;
            }
        } else if let Some(node) = self.get_mut(parent) {
            node.first_child = next;
        }

        if next.is_some() {
            if let Some(node) = self.get_mut(next) {
                node.prev_sibling = prev;
            }
        } else if let Some(node) = self.get_mut(parent) {
            node.last_child = prev;
        }

        if let Some(node) = self.get_mut(target) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
    }

    pub fn children(&self, parent: NodeId) -> Children<'_> {
        Children {
            dom: self,
            current: self.get(parent).map_or(NodeId::NONE, |n| n.first_child),
        }
    }

    /// Nodes under `root` (inclusive) in document order.
    pub fn descendants(&self, root: NodeId) -> Descendants<'_> {
        Descendants {
            dom: self,
            stack: if self.get(root).is_some() { vec![root] } else { Vec::new() },
            prune: None,
        }
    }

    pub fn element_name(&self, id: NodeId) -> Option<&LocalName> {
        match &self.get(id)?.data {
            NodeData::Element { name, .. } => Some(&name.local),
            _ => None,
        }
    }

    pub fn get_attr(&self, id: NodeId, attr_name: &str) -> Option<&str> {
        match &self.get(id)?.data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.name.local.as_ref().eq_ignore_ascii_case(attr_name))
                .map(|a| a.value.as_str()),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.get(id)?.data {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Elements with the given tag name, in document order.
    pub fn elements_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.descendants(self.document())
            .filter(move |&id| self.element_name(id).is_some_and(|n| n.as_ref() == tag))
    }

    pub fn find_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.elements_by_tag(tag).next()
    }

    /// Concatenated text of every text node under `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .filter_map(|node| self.text(node))
            .collect()
    }
}

/// Iterator over the children of a node.
pub struct Children<'a> {
    dom: &'a ArenaDom,
    current: NodeId,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.current;
        let node = self.dom.get(id)?;
        self.current = node.next_sibling;
        Some(id)
    }
}

/// Pre-order walk over a subtree.
pub struct Descendants<'a> {
    dom: &'a ArenaDom,
    stack: Vec<NodeId>,
    prune: Option<&'a dyn Fn(&LocalName) -> bool>,
}

impl<'a> Descendants<'a> {
    /// Skip the subtrees of elements for which `prune` returns true.
    ///
    /// Pruned elements themselves are not yielded.
    pub fn pruning(mut self, prune: &'a dyn Fn(&LocalName) -> bool) -> Self {
        self.prune = Some(prune);
        self
    }
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        loop {
            let id = self.stack.pop()?;
            if let (Some(prune), Some(name)) = (self.prune, self.dom.element_name(id))
                && prune(name)
            {
                continue;
            }

            let mark = self.stack.len();
            self.stack.extend(self.dom.children(id));
            // Children pop in document order.
            self.stack[mark..].reverse();
            return Some(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use html5ever::{local_name, ns};

    use super::*;

    fn qname(local: &str) -> QualName {
        QualName::new(None, ns!(html), LocalName::from(local))
    }

    #[test]
    fn test_append_children() {
        let mut dom = ArenaDom::new();
        let div = dom.create_element(qname("div"), vec![]);
        let p1 = dom.create_element(qname("p"), vec![]);
        let p2 = dom.create_element(qname("p"), vec![]);
        dom.append(dom.document(), div);
        dom.append(div, p1);
        dom.append(div, p2);

        let children: Vec<_> = dom.children(div).collect();
        assert_eq!(children, vec![p1, p2]);
    }

    #[test]
    fn test_text_merging() {
        let mut dom = ArenaDom::new();
        let p = dom.create_element(qname("p"), vec![]);
        dom.append(dom.document(), p);
        dom.append_text(p, "Hello, ");
        dom.append_text(p, "World!");

        let children: Vec<_> = dom.children(p).collect();
        assert_eq!(children.len(), 1);
        assert_eq!(dom.text(children[0]), Some("Hello, World!"));
    }

    #[test]
    fn test_descendants_document_order_and_pruning() {
        let mut dom = ArenaDom::new();
        let head = dom.create_element(qname("head"), vec![]);
        let body = dom.create_element(qname("body"), vec![]);
        dom.append(dom.document(), head);
        dom.append(dom.document(), body);
        dom.append_text(head, "skipped");
        dom.append_text(body, "first");
        let b = dom.create_element(qname("b"), vec![]);
        dom.append(body, b);
        dom.append_text(b, "second");
        dom.append_text(body, "third");

        let all: Vec<_> = dom
            .descendants(dom.document())
            .filter_map(|id| dom.text(id))
            .collect();
        assert_eq!(all, vec!["skipped", "first", "second", "third"]);

        let prune = |name: &LocalName| *name == local_name!("head");
        let pruned: Vec<_> = dom
            .descendants(dom.document())
            .pruning(&prune)
            .filter_map(|id| dom.text(id))
            .collect();
        assert_eq!(pruned, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_detach_and_insert_before() {
        let mut dom = ArenaDom::new();
        let a = dom.create_element(qname("a"), vec![]);
        let b = dom.create_element(qname("b"), vec![]);
        let c = dom.create_element(qname("i"), vec![]);
        dom.append(dom.document(), a);
        dom.append(dom.document(), b);
        dom.insert_before(b, c);
        assert_eq!(dom.children(dom.document()).collect::<Vec<_>>(), vec![a, c, b]);

        dom.detach(c);
        assert_eq!(dom.children(dom.document()).collect::<Vec<_>>(), vec![a, b]);
    }
}
