use super::node::Kind;
use super::node::Node;
use crate::family::errormodel::ErrorModel;
use petgraph::Direction;
use petgraph::graph::DiGraph;
use petgraph::graph::NodeIndex;
use std::sync::Arc;

/// rooted phylogeny over a petgraph arena. binary or multifurcating.
/// node payloads own everything except the transition matrices, which
/// point into the shared cache. read-only while an evaluation runs.
#[derive(Debug, Clone)]
pub struct Phylogeny {
    graph: DiGraph<Node, ()>,
    root: NodeIndex,
}

impl Phylogeny {
    pub fn new(root: Node) -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(root);
        Self { graph, root }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        self.graph
            .node_weight(index)
            .expect("index minted by this tree")
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> &mut Node {
        self.graph
            .node_weight_mut(index)
            .expect("index minted by this tree")
    }

    pub fn attach(&mut self, parent: NodeIndex, node: Node) -> NodeIndex {
        let child = self.graph.add_node(node);
        self.graph.add_edge(parent, child, ());
        child
    }

    /// children in left to right parse order
    pub fn children(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        children.reverse();
        children
    }

    pub fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(index, Direction::Incoming)
            .next()
    }

    /// the one traversal order every consumer relies on: children left
    /// to right, then self
    pub fn postorder(&self) -> Vec<NodeIndex> {
        self.postorder_from(self.root)
    }

    pub fn postorder_from(&self, from: NodeIndex) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut stack = vec![(from, false)];
        while let Some((index, expanded)) = stack.pop() {
            if expanded {
                order.push(index);
                continue;
            }
            stack.push((index, true));
            let mut children = self.children(index);
            while let Some(child) = children.pop() {
                stack.push((child, false));
            }
        }
        order
    }

    pub fn leaves(&self) -> Vec<NodeIndex> {
        self.postorder()
            .into_iter()
            .filter(|i| self.node(*i).is_leaf())
            .collect()
    }

    pub fn leaf(&self, species: &str) -> Option<NodeIndex> {
        self.leaves()
            .into_iter()
            .find(|i| self.node(*i).species() == Some(species))
    }

    /// sum of branch lengths from the root down to a node. the root's
    /// own branch is unused.
    pub fn depth(&self, index: NodeIndex) -> f64 {
        let mut depth = 0.0;
        let mut at = index;
        while let Some(parent) = self.parent(at) {
            depth += self.node(at).branch;
            at = parent;
        }
        depth
    }

    /// all leaves equidistant from the root
    pub fn is_ultrametric(&self) -> bool {
        let depths: Vec<f64> = self.leaves().into_iter().map(|i| self.depth(i)).collect();
        match depths.split_first() {
            None => true,
            Some((first, rest)) => rest
                .iter()
                .all(|d| (d - first).abs() < crate::ULTRAMETRIC_TOLERANCE),
        }
    }

    /// scale flagged branches for nested model comparison. only
    /// branches with a positive taxon id stretch; the rest, the root
    /// included, keep their length.
    pub fn stretch(&mut self, multiplier: f64) {
        for index in self.postorder() {
            if index == self.root {
                continue;
            }
            let node = self.node_mut(index);
            if node.taxon > 0 {
                node.branch *= multiplier;
            }
        }
    }

    /// attach an error model to one named leaf, or to every leaf when
    /// species is None. the model itself stays owned by the family
    /// store.
    pub fn attach_error(&mut self, species: Option<&str>, model: &Arc<ErrorModel>) -> bool {
        let mut hit = false;
        for index in self.leaves() {
            let node = self.node_mut(index);
            if let Kind::Leaf {
                species: name,
                error,
                ..
            } = &mut node.kind
            {
                if species.is_none() || species == Some(name.as_str()) {
                    *error = Some(model.clone());
                    hit = true;
                }
            }
        }
        hit
    }

    pub fn detach_error(&mut self, species: Option<&str>) {
        for index in self.leaves() {
            let node = self.node_mut(index);
            if let Kind::Leaf {
                species: name,
                error,
                ..
            } = &mut node.kind
            {
                if species.is_none() || species == Some(name.as_str()) {
                    *error = None;
                }
            }
        }
    }

    /// split at the branch above `at`: the subtree rooted there, and
    /// the remainder of the tree with that subtree pruned away. node
    /// payloads (matrix references included) are cloned, so both sides
    /// evaluate without another cache pass.
    pub fn split(&self, at: NodeIndex) -> (Phylogeny, Phylogeny) {
        let mut inside = Phylogeny::new(self.node(at).clone());
        self.copy_children(at, inside.root, &mut inside);
        let mut outside = Phylogeny::new(self.node(self.root).clone());
        self.copy_children_without(self.root, outside.root, &mut outside, at);
        (inside, outside)
    }

    fn copy_children(&self, from: NodeIndex, to: NodeIndex, into: &mut Phylogeny) {
        self.copy_children_without(from, to, into, from);
    }

    fn copy_children_without(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        into: &mut Phylogeny,
        skip: NodeIndex,
    ) {
        for child in self.children(from) {
            if child == skip {
                continue;
            }
            let copy = into.attach(to, self.node(child).clone());
            self.copy_children_without(child, copy, into, skip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::newick;

    const MAMMALS: &str = "(((chimp:6,human:6):81,(mouse:17,rat:17):70):6,dog:9);";

    #[test]
    fn root_distances() {
        let tree = newick::parse(MAMMALS).unwrap();
        let chimp = tree.leaf("chimp").unwrap();
        let mouse = tree.leaf("mouse").unwrap();
        let dog = tree.leaf("dog").unwrap();
        assert!((tree.depth(chimp) - 93.0).abs() < 1e-12);
        assert!((tree.depth(mouse) - 93.0).abs() < 1e-12);
        assert!((tree.depth(dog) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn mammal_tree_is_not_ultrametric() {
        let tree = newick::parse(MAMMALS).unwrap();
        assert!(!tree.is_ultrametric());
    }

    #[test]
    fn equal_depths_are_ultrametric() {
        let tree = newick::parse("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        assert!(tree.is_ultrametric());
        let lopsided = newick::parse("((A:1,B:1):1,(C:1,D:2):1);").unwrap();
        assert!(!lopsided.is_ultrametric());
    }

    #[test]
    fn postorder_visits_children_before_parents() {
        let tree = newick::parse(MAMMALS).unwrap();
        let order = tree.postorder();
        assert_eq!(order.len(), tree.len());
        assert_eq!(order.last().copied(), Some(tree.root()));
        for index in &order {
            let at = order.iter().position(|i| i == index).unwrap();
            for child in tree.children(*index) {
                let child_at = order.iter().position(|i| *i == child).unwrap();
                assert!(child_at < at);
            }
        }
    }

    #[test]
    fn postorder_is_left_to_right() {
        let tree = newick::parse("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        let species: Vec<Option<String>> = tree
            .postorder()
            .into_iter()
            .map(|i| tree.node(i).species().map(String::from))
            .collect();
        let leaves: Vec<String> = species.into_iter().flatten().collect();
        assert_eq!(leaves, ["A", "B", "C", "D"]);
    }

    #[test]
    fn stretch_scales_only_flagged_branches() {
        let tree = newick::parse("(left:459[1],right:459[-1]);").unwrap();
        let mut tree = tree;
        tree.stretch(1.5);
        let left = tree.leaf("left").unwrap();
        let right = tree.leaf("right").unwrap();
        assert!((tree.node(left).branch - 688.5).abs() < 1e-12);
        assert!((tree.node(right).branch - 459.0).abs() < 1e-12);
    }

    #[test]
    fn split_partitions_the_leaves() {
        let tree = newick::parse(MAMMALS).unwrap();
        let chimp = tree.leaf("chimp").unwrap();
        let cherry = tree.parent(chimp).unwrap();
        let (inside, outside) = tree.split(cherry);
        let mut inner: Vec<String> = inside
            .leaves()
            .into_iter()
            .map(|i| inside.node(i).species().unwrap().to_string())
            .collect();
        inner.sort();
        assert_eq!(inner, ["chimp", "human"]);
        let mut outer: Vec<String> = outside
            .leaves()
            .into_iter()
            .map(|i| outside.node(i).species().unwrap().to_string())
            .collect();
        outer.sort();
        assert_eq!(outer, ["dog", "mouse", "rat"]);
        assert_eq!(inside.len() + outside.len(), tree.len());
    }
}
