use serde::{Deserialize, Serialize};

/// Identifier of a renderable element (a node of the effect's model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub usize);

/// Declarative node used to build a [`SceneGraph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    #[serde(default)]
    pub children: Vec<NodeDef>,
}

impl NodeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: NodeDef) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone)]
struct SceneNode {
    name: String,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

/// Named transform hierarchy of an effect's model.
///
/// An effect instanced across several identical sub-assemblies has one root
/// per instance; path lookups are evaluated against every root.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    roots: Vec<ElementId>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph with one root per definition.
    pub fn from_defs(roots: &[NodeDef]) -> Self {
        let mut graph = Self::new();
        for root in roots {
            graph.insert_def(None, root);
        }
        graph
    }

    fn insert_def(&mut self, parent: Option<ElementId>, def: &NodeDef) -> ElementId {
        let id = match parent {
            Some(parent) => self.add_child(parent, def.name.clone()),
            None => self.add_root(def.name.clone()),
        };
        for child in &def.children {
            self.insert_def(Some(id), child);
        }
        id
    }

    pub fn add_root(&mut self, name: impl Into<String>) -> ElementId {
        let id = self.push(name.into(), None);
        self.roots.push(id);
        id
    }

    /// Adds a child node. Panics if `parent` does not belong to this graph.
    pub fn add_child(&mut self, parent: ElementId, name: impl Into<String>) -> ElementId {
        let id = self.push(name.into(), Some(parent));
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push(&mut self, name: String, parent: Option<ElementId>) -> ElementId {
        let id = ElementId(self.nodes.len());
        self.nodes.push(SceneNode {
            name,
            parent,
            children: Vec::new(),
        });
        id
    }

    pub fn roots(&self) -> &[ElementId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name(&self, id: ElementId) -> Option<&str> {
        self.nodes.get(id.0).map(|node| node.name.as_str())
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    /// Full path from the owning root, e.g. `model/nozzle/plume`.
    pub fn path(&self, id: ElementId) -> String {
        let mut segments = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.nodes.get(current.0) {
                Some(node) => {
                    segments.push(node.name.as_str());
                    cursor = node.parent;
                }
                None => break,
            }
        }
        segments.reverse();
        segments.join("/")
    }

    /// Resolves a `/`-separated path relative to every root.
    ///
    /// An empty path selects the roots themselves. Siblings sharing a name all
    /// match, so the result may hold several elements per root. Results are in
    /// root order, then depth-first order.
    pub fn find(&self, path: &str) -> Vec<ElementId> {
        let segments: Vec<&str> = path
            .split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect();

        let mut frontier: Vec<ElementId> = self.roots.clone();
        for segment in segments {
            frontier = frontier
                .iter()
                .flat_map(|id| self.nodes[id.0].children.iter().copied())
                .filter(|child| self.nodes[child.0].name == segment)
                .collect();
            if frontier.is_empty() {
                break;
            }
        }
        frontier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nozzle_model() -> SceneGraph {
        let instance = || {
            NodeDef::new("model").with_child(
                NodeDef::new("nozzle")
                    .with_child(NodeDef::new("plume"))
                    .with_child(NodeDef::new("light")),
            )
        };
        SceneGraph::from_defs(&[instance(), instance()])
    }

    #[test]
    fn finds_path_under_every_root() {
        let graph = nozzle_model();
        let found = graph.find("nozzle/plume");
        assert_eq!(found.len(), 2);
        for id in found {
            assert_eq!(graph.path(id), "model/nozzle/plume");
        }
    }

    #[test]
    fn empty_path_selects_roots() {
        let graph = nozzle_model();
        assert_eq!(graph.find(""), graph.roots().to_vec());
    }

    #[test]
    fn missing_path_matches_nothing() {
        let graph = nozzle_model();
        assert!(graph.find("nozzle/missing").is_empty());
        assert!(graph.find("missing/plume").is_empty());
    }

    #[test]
    fn duplicate_sibling_names_all_match() {
        let mut graph = SceneGraph::new();
        let root = graph.add_root("root");
        let a = graph.add_child(root, "jet");
        let b = graph.add_child(root, "jet");
        assert_eq!(graph.find("jet"), vec![a, b]);
        assert_eq!(graph.parent(a), Some(root));
    }
}
