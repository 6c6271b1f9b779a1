use std::sync::Arc;

use glam::Mat4;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::geometry::Transform;
use crate::material::Material;
use crate::mesh::MeshData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u32);

impl MeshId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshNode {
    pub mesh: MeshId,
    pub material: Material,
}

/// Scene nodes are either grouping nodes or renderable leaves, so traversal
/// never has to ask what a node is at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group { children: Vec<NodeId> },
    Mesh(MeshNode),
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub visible: bool,
    pub kind: NodeKind,
    parent: Option<NodeId>,
}

impl SceneNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Group { children } => children,
            NodeKind::Mesh(_) => &[],
        }
    }
}

/// Template produced by an asset source; instantiated into a `Scene`.
#[derive(Debug, Clone)]
pub struct ModelNode {
    pub name: String,
    pub transform: Transform,
    pub content: ModelContent,
}

#[derive(Debug, Clone)]
pub enum ModelContent {
    Group(Vec<ModelNode>),
    Mesh {
        mesh: Arc<MeshData>,
        material: Material,
    },
}

impl ModelNode {
    pub fn group(name: impl Into<String>, children: Vec<ModelNode>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::IDENTITY,
            content: ModelContent::Group(children),
        }
    }

    pub fn mesh(name: impl Into<String>, mesh: MeshData, material: Material) -> Self {
        Self {
            name: name.into(),
            transform: Transform::IDENTITY,
            content: ModelContent::Mesh {
                mesh: Arc::new(mesh),
                material,
            },
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn mesh_count(&self) -> usize {
        match &self.content {
            ModelContent::Group(children) => children.iter().map(ModelNode::mesh_count).sum(),
            ModelContent::Mesh { .. } => 1,
        }
    }
}

/// Visits renderable leaves below a root, depth first.
pub trait SceneVisitor {
    fn visit_mesh(&mut self, node: NodeId, name: &str, mesh: &mut MeshNode);

    fn enter_group(&mut self, _node: NodeId, _name: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub node: NodeId,
    pub mesh: MeshId,
    pub material: Material,
    pub world: Mat4,
}

#[derive(Debug, Default)]
pub struct Scene {
    nodes: Vec<Option<SceneNode>>,
    roots: Vec<NodeId>,
    meshes: Vec<Arc<MeshData>>,
    names: FxHashMap<String, NodeId>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: Arc<MeshData>) -> MeshId {
        let id = MeshId(self.meshes.len() as u32);
        self.meshes.push(mesh);
        id
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Arc<MeshData>> {
        self.meshes.get(id.index())
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn add_group(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        parent: Option<NodeId>,
    ) -> NodeId {
        self.insert(
            name.into(),
            transform,
            NodeKind::Group {
                children: Vec::new(),
            },
            parent,
        )
    }

    pub fn add_mesh_node(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        mesh: MeshId,
        material: Material,
        parent: Option<NodeId>,
    ) -> NodeId {
        self.insert(
            name.into(),
            transform,
            NodeKind::Mesh(MeshNode { mesh, material }),
            parent,
        )
    }

    /// Copies a model template into the scene and returns its root node.
    pub fn instantiate(&mut self, model: &ModelNode, parent: Option<NodeId>) -> NodeId {
        match &model.content {
            ModelContent::Mesh { mesh, material } => {
                let mesh_id = self.add_mesh(Arc::clone(mesh));
                self.add_mesh_node(model.name.clone(), model.transform, mesh_id, *material, parent)
            }
            ModelContent::Group(children) => {
                let id = self.add_group(model.name.clone(), model.transform, parent);
                for child in children {
                    self.instantiate(child, Some(id));
                }
                id
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.get_mut(id) {
            node.visible = visible;
        }
    }

    pub fn set_transform(&mut self, id: NodeId, transform: Transform) {
        if let Some(node) = self.get_mut(id) {
            node.transform = transform;
        }
    }

    pub fn mesh_node_mut(&mut self, id: NodeId) -> Option<&mut MeshNode> {
        match &mut self.get_mut(id)?.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            NodeKind::Group { .. } => None,
        }
    }

    /// Detaches `id` and drops it together with its subtree.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.get(id).map(SceneNode::parent) else {
            return false;
        };
        match parent.and_then(|parent| self.get_mut(parent)) {
            Some(SceneNode {
                kind: NodeKind::Group { children },
                ..
            }) => children.retain(|child| *child != id),
            _ => self.roots.retain(|root| *root != id),
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current.index()).and_then(Option::take) else {
                continue;
            };
            if self.names.get(&node.name) == Some(&current) {
                self.names.remove(&node.name);
            }
            stack.extend_from_slice(node.children());
        }
        true
    }

    pub fn walk_mut<V: SceneVisitor>(&mut self, root: NodeId, visitor: &mut V) {
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current.index()).and_then(Option::as_mut) else {
                continue;
            };
            match &mut node.kind {
                NodeKind::Mesh(mesh) => visitor.visit_mesh(current, &node.name, mesh),
                NodeKind::Group { children } => {
                    visitor.enter_group(current, &node.name);
                    stack.extend(children.iter().rev().copied());
                }
            }
        }
    }

    pub fn world_matrix(&self, id: NodeId) -> Option<Mat4> {
        let mut node = self.get(id)?;
        let mut world = node.transform.matrix();
        while let Some(parent) = node.parent.and_then(|parent| self.get(parent)) {
            world = parent.transform.matrix() * world;
            node = parent;
        }
        Some(world)
    }

    /// Visible renderable leaves with their accumulated world matrices.
    pub fn draw_list(&self) -> Vec<DrawItem> {
        let mut draws = Vec::new();
        let mut stack: Vec<(NodeId, Mat4)> =
            self.roots.iter().rev().map(|root| (*root, Mat4::IDENTITY)).collect();
        while let Some((current, parent_world)) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            let world = parent_world * node.transform.matrix();
            match &node.kind {
                NodeKind::Mesh(mesh) => draws.push(DrawItem {
                    node: current,
                    mesh: mesh.mesh,
                    material: mesh.material,
                    world,
                }),
                NodeKind::Group { children } => {
                    stack.extend(children.iter().rev().map(|child| (*child, world)));
                }
            }
        }
        draws
    }

    fn insert(
        &mut self,
        name: String,
        transform: Transform,
        kind: NodeKind,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let requested = parent;
        let parent = parent.filter(|parent| {
            matches!(
                self.get(*parent).map(|node| &node.kind),
                Some(NodeKind::Group { .. })
            )
        });
        if let (Some(requested), None) = (requested, parent) {
            warn!("{name}: parent {} is not a group, attached as a root", requested.index());
        }
        match parent.and_then(|parent| self.get_mut(parent)) {
            Some(SceneNode {
                kind: NodeKind::Group { children },
                ..
            }) => children.push(id),
            _ => self.roots.push(id),
        }
        if !name.is_empty() {
            self.names.insert(name.clone(), id);
        }
        self.nodes.push(Some(SceneNode {
            name,
            transform,
            visible: true,
            kind,
            parent,
        }));
        id
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::{ModelNode, MeshNode, NodeId, Scene, SceneVisitor};
    use crate::geometry::Transform;
    use crate::material::Material;
    use crate::mesh::{cuboid, uv_sphere};

    struct CountingVisitor {
        meshes: Vec<String>,
        groups: usize,
    }

    impl SceneVisitor for CountingVisitor {
        fn visit_mesh(&mut self, _node: NodeId, name: &str, mesh: &mut MeshNode) {
            mesh.material.depth_write = false;
            self.meshes.push(name.to_string());
        }

        fn enter_group(&mut self, _node: NodeId, _name: &str) {
            self.groups += 1;
        }
    }

    fn gate_model() -> ModelNode {
        ModelNode::group(
            "gate",
            vec![
                ModelNode::mesh("outer_ring", uv_sphere(1.0, 4, 6), Material::default()),
                ModelNode::group(
                    "inner",
                    vec![ModelNode::mesh("inner_ring", cuboid(Vec3::ONE), Material::default())],
                ),
            ],
        )
        .with_transform(Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)))
    }

    #[test]
    fn visitor_reaches_every_mesh_leaf_in_order() {
        let mut scene = Scene::new();
        let root = scene.instantiate(&gate_model(), None);
        let mut visitor = CountingVisitor {
            meshes: Vec::new(),
            groups: 0,
        };
        scene.walk_mut(root, &mut visitor);

        assert_eq!(visitor.meshes, vec!["outer_ring", "inner_ring"]);
        assert_eq!(visitor.groups, 2);
        assert!(scene
            .draw_list()
            .iter()
            .all(|draw| !draw.material.depth_write));
    }

    #[test]
    fn draw_list_accumulates_parent_transforms_and_skips_hidden() {
        let mut scene = Scene::new();
        let root = scene.instantiate(&gate_model(), None);
        let draws = scene.draw_list();
        assert_eq!(draws.len(), 2);
        assert!(draws[0]
            .world
            .transform_point3(Vec3::ZERO)
            .abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1.0e-6));

        let inner = scene.find("inner").expect("inner group");
        scene.set_visible(inner, false);
        assert_eq!(scene.draw_list().len(), 1);

        scene.set_visible(root, false);
        assert!(scene.draw_list().is_empty());
    }

    #[test]
    fn remove_drops_subtree_and_names() {
        let mut scene = Scene::new();
        let root = scene.instantiate(&gate_model(), None);
        assert_eq!(scene.node_count(), 4);

        assert!(scene.remove(root));
        assert_eq!(scene.node_count(), 0);
        assert!(scene.find("inner_ring").is_none());
        assert!(scene.roots().is_empty());
        assert!(!scene.remove(root));
    }

    #[test]
    fn mesh_parent_is_rejected_and_node_becomes_root() {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(std::sync::Arc::new(cuboid(Vec3::ONE)));
        let leaf =
            scene.add_mesh_node("leaf", Transform::IDENTITY, mesh, Material::default(), None);
        let orphan =
            scene.add_mesh_node(
                "orphan",
                Transform::IDENTITY,
                mesh,
                Material::default(),
                Some(leaf),
            );

        assert_eq!(scene.roots(), &[leaf, orphan]);
        assert!(scene.get(orphan).and_then(|node| node.parent()).is_none());
    }
}
