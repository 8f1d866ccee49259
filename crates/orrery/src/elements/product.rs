//! Product nodes: the transformable assembly/part hierarchy

use std::collections::HashSet;
use std::sync::Arc;

use crate::elements::{ElementId, MaterialKey, MeshData, ProductKey};
use crate::foundation::math::{Mat4, Transform};
use crate::versioned::Versioned;

/// Whether a product node is a grouping assembly or a drawable part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductKind {
    /// Grouping node without geometry of its own
    Assembly,
    /// Leaf (or inner) node carrying a mesh
    Part,
}

/// A node in the product tree
///
/// A product's `level` is always consistent with its parent chain
/// (`parent.level + 1`, root products at level 0) and never exceeds the
/// configured maximum; creation and reparenting enforce this. The
/// composed-to-root matrix is recomputed by the synchronization pass
/// whenever any transform or hierarchy change occurred, so the render
/// side never sees a matrix inconsistent with the committed tree.
///
/// `dependents` is the alien-matrix reverse index: identities of lamps,
/// figures and labels whose rendering transform is derived from this
/// product. When the product is removed, every dependent's anchor is
/// cleared before the product is dropped, so no dangling transform
/// reference can survive a deletion.
#[derive(Debug)]
pub struct Product {
    name: String,
    kind: ProductKind,
    pub(crate) parent: Option<ProductKey>,
    pub(crate) children: Vec<ProductKey>,
    pub(crate) level: u32,
    transform: Versioned<Transform>,
    /// Composed-to-root matrix; written by the synchronization pass
    pub(crate) composed: Mat4,
    mesh: Option<Arc<MeshData>>,
    pub(crate) material: Option<MaterialKey>,
    visible: Versioned<bool>,
    /// Elements whose transform is derived from this product
    pub(crate) dependents: HashSet<ElementId>,
}

impl Product {
    /// Create an assembly node
    pub fn new_assembly(name: impl Into<String>, parent: Option<ProductKey>, level: u32) -> Self {
        Self {
            name: name.into(),
            kind: ProductKind::Assembly,
            parent,
            children: Vec::new(),
            level,
            transform: Versioned::new(Transform::identity()),
            composed: Mat4::identity(),
            mesh: None,
            material: None,
            visible: Versioned::new(true),
            dependents: HashSet::new(),
        }
    }

    /// Create a part node carrying a mesh and an optional shared material
    pub fn new_part(
        name: impl Into<String>,
        mesh: Arc<MeshData>,
        material: Option<MaterialKey>,
        parent: Option<ProductKey>,
        level: u32,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ProductKind::Part,
            parent,
            children: Vec::new(),
            level,
            transform: Versioned::new(Transform::identity()),
            composed: Mat4::identity(),
            mesh: Some(mesh),
            material,
            visible: Versioned::new(true),
            dependents: HashSet::new(),
        }
    }

    /// Product name (not required to be unique)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assembly or part
    pub fn kind(&self) -> ProductKind {
        self.kind
    }

    /// Parent node, if any
    pub fn parent(&self) -> Option<ProductKey> {
        self.parent
    }

    /// Direct children, in attachment order
    pub fn children(&self) -> &[ProductKey] {
        &self.children
    }

    /// Depth level (`parent.level + 1`, roots at 0)
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Stage a new local transform
    pub fn set_transform(&mut self, transform: Transform) -> bool {
        self.transform.set_if_changed(transform)
    }

    /// Committed local transform
    pub fn transform(&self) -> &Transform {
        self.transform.pure()
    }

    /// Composed-to-root matrix as of the last synchronization pass
    pub fn composed(&self) -> &Mat4 {
        &self.composed
    }

    /// Mesh handle for parts
    pub fn mesh(&self) -> Option<&Arc<MeshData>> {
        self.mesh.as_ref()
    }

    /// Shared material reference
    pub fn material(&self) -> Option<MaterialKey> {
        self.material
    }

    /// Stage visibility
    pub fn set_visible(&mut self, visible: bool) -> bool {
        self.visible.set_if_changed(visible)
    }

    /// Committed visibility
    pub fn visible(&self) -> bool {
        *self.visible.pure()
    }

    /// Whether the staged transform is awaiting commit
    pub fn transform_dirty(&self) -> bool {
        self.transform.is_dirty()
    }

    /// Commit staged attributes; returns whether anything changed
    pub fn commit(&mut self) -> bool {
        let mut changed = self.transform.update();
        changed |= self.visible.update();
        changed
    }
}
