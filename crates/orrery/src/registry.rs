//! Element registry: master ownership of every live scene object
//!
//! The registry owns one typed arena per element kind plus the name-keyed
//! mesh and texture caches. All staged-state mutation happens through it
//! while the universe data lock is held; the render thread drives
//! [`ElementRegistry::synchronize_all`] from its try-lock window.

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;
use slotmap::SlotMap;

use crate::elements::{
    ElementId, Figure, FigureKey, Lamp, LampKey, Label, LabelKey, Material, MaterialKey, MeshData,
    Product, ProductKey, Texture, World, WorldKey,
};
use crate::foundation::math::Mat4;

bitflags! {
    /// Which element kinds changed since the last synchronization pass
    ///
    /// Mutators set bits as they stage changes; the synchronization pass
    /// uses the mask to skip untouched phases and clears it afterwards.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChangeMask: u32 {
        /// World attributes or content lists changed
        const WORLDS = 1 << 0;
        /// Lamp set or attributes changed
        const LAMPS = 1 << 1;
        /// Product tree or attributes changed
        const PRODUCTS = 1 << 2;
        /// Figure set or attributes changed
        const FIGURES = 1 << 3;
        /// Label set or attributes changed
        const LABELS = 1 << 4;
        /// Material set or attributes changed
        const MATERIALS = 1 << 5;
        /// Texture cache changed (uploads pending)
        const TEXTURES = 1 << 6;
        /// Mesh cache changed
        const MESHES = 1 << 7;
        /// Universe-level settings changed
        const SETTINGS = 1 << 8;
    }
}

/// Master sets of every live element, by kind
#[derive(Debug, Default)]
pub struct ElementRegistry {
    pub(crate) worlds: SlotMap<WorldKey, World>,
    pub(crate) lamps: SlotMap<LampKey, Lamp>,
    pub(crate) products: SlotMap<ProductKey, Product>,
    pub(crate) figures: SlotMap<FigureKey, Figure>,
    pub(crate) labels: SlotMap<LabelKey, Label>,
    pub(crate) materials: SlotMap<MaterialKey, Material>,

    /// Shared meshes keyed by normalized resource name
    pub(crate) meshes: HashMap<String, Arc<MeshData>>,
    /// Shared textures keyed by normalized resource name
    pub(crate) textures: HashMap<String, Texture>,
    /// Names of textures cached but not yet uploaded to the pipeline
    pub(crate) pending_textures: Vec<String>,

    changes: ChangeMask,
}

impl ElementRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an element kind changed
    pub fn mark_changed(&mut self, mask: ChangeMask) {
        self.changes |= mask;
    }

    /// Pending change mask (cleared by the synchronization pass)
    pub fn changes(&self) -> ChangeMask {
        self.changes
    }

    /// Membership test by identity
    ///
    /// This is the precondition gate every cross-reference operation runs
    /// before touching the referenced element.
    pub fn contains(&self, id: ElementId) -> bool {
        match id {
            ElementId::World(k) => self.worlds.contains_key(k),
            ElementId::Lamp(k) => self.lamps.contains_key(k),
            ElementId::Product(k) => self.products.contains_key(k),
            ElementId::Figure(k) => self.figures.contains_key(k),
            ElementId::Label(k) => self.labels.contains_key(k),
            ElementId::Material(k) => self.materials.contains_key(k),
        }
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Register a world
    pub fn add_world(&mut self, world: World) -> WorldKey {
        self.mark_changed(ChangeMask::WORLDS);
        self.worlds.insert(world)
    }

    /// Register a lamp
    pub fn add_lamp(&mut self, lamp: Lamp) -> LampKey {
        self.mark_changed(ChangeMask::LAMPS);
        self.lamps.insert(lamp)
    }

    /// Register a product
    pub fn add_product(&mut self, product: Product) -> ProductKey {
        self.mark_changed(ChangeMask::PRODUCTS);
        self.products.insert(product)
    }

    /// Register a figure
    pub fn add_figure(&mut self, figure: Figure) -> FigureKey {
        self.mark_changed(ChangeMask::FIGURES);
        self.figures.insert(figure)
    }

    /// Register a label
    pub fn add_label(&mut self, label: Label) -> LabelKey {
        self.mark_changed(ChangeMask::LABELS);
        self.labels.insert(label)
    }

    /// Register a material
    pub fn add_material(&mut self, material: Material) -> MaterialKey {
        self.mark_changed(ChangeMask::MATERIALS);
        self.materials.insert(material)
    }

    /// Cache a mesh under its normalized name; rejects duplicates
    pub fn insert_mesh(&mut self, name: &str, mesh: Arc<MeshData>) -> bool {
        if self.meshes.contains_key(name) {
            return false;
        }
        self.meshes.insert(name.to_string(), mesh);
        self.mark_changed(ChangeMask::MESHES);
        true
    }

    /// Look up a cached mesh by normalized name
    pub fn mesh(&self, name: &str) -> Option<Arc<MeshData>> {
        self.meshes.get(name).cloned()
    }

    /// Cache a texture under its normalized name; rejects duplicates
    ///
    /// The texture is queued for pipeline upload during the next
    /// synchronization pass.
    pub fn insert_texture(&mut self, texture: Texture) -> bool {
        if self.textures.contains_key(&texture.name) {
            return false;
        }
        self.pending_textures.push(texture.name.clone());
        self.textures.insert(texture.name.clone(), texture);
        self.mark_changed(ChangeMask::TEXTURES);
        true
    }

    /// Look up a cached texture by normalized name
    pub fn texture(&self, name: &str) -> Option<&Texture> {
        self.textures.get(name)
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove a single element and detach it from every world list
    ///
    /// Cross-collection cleanup beyond world detachment (product tree
    /// surgery, anchor invalidation, material garbage collection) is the
    /// caller's responsibility; afterwards the element is simply no
    /// longer discoverable.
    pub fn remove_element(&mut self, id: ElementId) -> bool {
        self.detach_from_worlds(id);
        match id {
            ElementId::World(k) => {
                self.mark_changed(ChangeMask::WORLDS);
                self.worlds.remove(k).is_some()
            }
            ElementId::Lamp(k) => {
                self.mark_changed(ChangeMask::LAMPS);
                self.lamps.remove(k).is_some()
            }
            ElementId::Product(k) => {
                self.mark_changed(ChangeMask::PRODUCTS);
                self.products.remove(k).is_some()
            }
            ElementId::Figure(k) => {
                self.mark_changed(ChangeMask::FIGURES);
                self.figures.remove(k).is_some()
            }
            ElementId::Label(k) => {
                self.mark_changed(ChangeMask::LABELS);
                self.labels.remove(k).is_some()
            }
            ElementId::Material(k) => {
                self.mark_changed(ChangeMask::MATERIALS);
                self.materials.remove(k).is_some()
            }
        }
    }

    /// Remove a batch of elements
    ///
    /// Performed entirely under the data lock held by the caller, so no
    /// other thread can observe a partially removed batch.
    pub fn remove_elements(&mut self, ids: &[ElementId]) -> usize {
        ids.iter().filter(|&&id| self.remove_element(id)).count()
    }

    /// Remove an element reference from every world list
    pub fn detach_from_worlds(&mut self, id: ElementId) {
        let mut detached = false;
        for (_, world) in &mut self.worlds {
            detached |= world.remove_item(id);
        }
        if detached {
            self.mark_changed(ChangeMask::WORLDS);
        }
    }

    // ========================================================================
    // Product tree helpers
    // ========================================================================

    /// Collect a product and its full recursive descendant set
    pub fn collect_subtree(&self, root: ProductKey) -> Vec<ProductKey> {
        let mut result = Vec::new();
        if !self.products.contains_key(root) {
            return result;
        }
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            if let Some(product) = self.products.get(key) {
                result.push(key);
                stack.extend(product.children.iter().copied());
            }
        }
        result
    }

    /// Depth of the deepest node in the subtree, relative to the root
    pub fn subtree_height(&self, root: ProductKey) -> u32 {
        let mut height = 0;
        let mut stack = vec![(root, 0u32)];
        while let Some((key, depth)) = stack.pop() {
            height = height.max(depth);
            if let Some(product) = self.products.get(key) {
                for &child in &product.children {
                    stack.push((child, depth + 1));
                }
            }
        }
        height
    }

    /// Clear the anchors of every element depending on this product
    ///
    /// Returns the identities whose anchors were cleared. This is the
    /// alien-matrix invalidation step of product removal: after it runs,
    /// no live element holds a transform reference into the product.
    pub fn clear_dependents(&mut self, product: ProductKey) -> Vec<ElementId> {
        let Some(node) = self.products.get_mut(product) else {
            return Vec::new();
        };
        let dependents: Vec<ElementId> = node.dependents.drain().collect();
        for &id in &dependents {
            match id {
                ElementId::Lamp(k) => {
                    if let Some(lamp) = self.lamps.get_mut(k) {
                        lamp.anchor = None;
                    }
                    self.mark_changed(ChangeMask::LAMPS);
                }
                ElementId::Figure(k) => {
                    if let Some(figure) = self.figures.get_mut(k) {
                        figure.anchor = None;
                    }
                    self.mark_changed(ChangeMask::FIGURES);
                }
                ElementId::Label(k) => {
                    if let Some(label) = self.labels.get_mut(k) {
                        label.anchor = None;
                    }
                    self.mark_changed(ChangeMask::LABELS);
                }
                // Only lamps, figures and labels can anchor to a product
                _ => {}
            }
        }
        dependents
    }

    // ========================================================================
    // Synchronization pass (render thread only, lock held)
    // ========================================================================

    /// Commit every element's staged attributes into render-safe state
    ///
    /// Gated on the registry-wide change mask: when nothing changed since
    /// the last pass, this returns `false` without touching any element.
    /// Otherwise it commits all versioned attributes, recomputes the
    /// composed matrices of the product forest if the tree changed, and
    /// totally reassigns contiguous lamp light units. Returns whether the
    /// frame must redraw.
    pub fn synchronize_all(&mut self, max_light_units: u32) -> bool {
        if self.changes.is_empty() {
            return false;
        }

        for (_, world) in &mut self.worlds {
            world.commit();
        }
        for (_, material) in &mut self.materials {
            material.commit();
        }
        for (_, lamp) in &mut self.lamps {
            lamp.commit();
        }
        for (_, product) in &mut self.products {
            product.commit();
        }
        for (_, figure) in &mut self.figures {
            figure.commit();
        }
        for (_, label) in &mut self.labels {
            label.commit();
        }

        if self.changes.intersects(ChangeMask::PRODUCTS) {
            self.recompute_composed_matrices();
        }
        if self.changes.intersects(ChangeMask::LAMPS) {
            self.reindex_lamps(max_light_units);
        }

        log::trace!("synchronized scene state ({:?})", self.changes);
        self.changes = ChangeMask::empty();
        true
    }

    /// Recompute composed-to-root matrices for the whole product forest
    ///
    /// Total recompute: any hierarchy or transform change invalidates the
    /// forest and the walk is linear in the product count.
    fn recompute_composed_matrices(&mut self) {
        let roots: Vec<ProductKey> = self
            .products
            .iter()
            .filter(|(_, p)| p.parent.is_none())
            .map(|(k, _)| k)
            .collect();

        let mut stack: Vec<(ProductKey, Mat4)> =
            roots.into_iter().map(|k| (k, Mat4::identity())).collect();

        while let Some((key, parent_matrix)) = stack.pop() {
            let Some(product) = self.products.get_mut(key) else {
                continue;
            };
            let composed = parent_matrix * product.transform().to_matrix();
            product.composed = composed;
            let children = product.children.clone();
            for child in children {
                stack.push((child, composed));
            }
        }
    }

    /// Totally reassign light units `[0, lamp_count)`
    ///
    /// Lamps whose assigned unit ends up at or beyond `max_light_units`
    /// exist but are not applied during drawing.
    fn reindex_lamps(&mut self, max_light_units: u32) {
        let mut over_budget = 0usize;
        for (index, (_, lamp)) in self.lamps.iter_mut().enumerate() {
            let unit = u32::try_from(index).unwrap_or(u32::MAX);
            lamp.assign_unit(unit);
            if unit >= max_light_units {
                over_budget += 1;
            }
        }
        if over_budget > 0 {
            log::warn!(
                "{over_budget} lamp(s) exceed the {max_light_units} available light units and will not be applied"
            );
        }
    }

    // ========================================================================
    // Counts
    // ========================================================================

    /// Number of registered lamps
    pub fn lamp_count(&self) -> usize {
        self.lamps.len()
    }

    /// Number of registered products
    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    /// Number of registered materials
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Number of cached meshes
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Number of cached textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{LampKind, Viewport};

    fn viewport() -> Viewport {
        Viewport {
            x: 0,
            y: 0,
            width: 640,
            height: 480,
        }
    }

    #[test]
    fn test_contains_after_add_and_remove() {
        let mut registry = ElementRegistry::new();
        let lamp = registry.add_lamp(Lamp::new("a", LampKind::Celestial, 0));
        assert!(registry.contains(ElementId::Lamp(lamp)));

        registry.remove_element(ElementId::Lamp(lamp));
        assert!(!registry.contains(ElementId::Lamp(lamp)));
    }

    #[test]
    fn test_removed_element_leaves_no_world_reference() {
        let mut registry = ElementRegistry::new();
        let w1 = registry.add_world(World::new("w1", viewport()));
        let w2 = registry.add_world(World::new("w2", viewport()));
        let lamp = registry.add_lamp(Lamp::new("a", LampKind::Celestial, 0));
        let id = ElementId::Lamp(lamp);
        registry.worlds[w1].add_item(id);
        registry.worlds[w2].add_item(id);

        registry.remove_element(id);

        for (_, world) in &registry.worlds {
            assert!(!world.items().contains(&id));
        }
    }

    #[test]
    fn test_subtree_collection() {
        let mut registry = ElementRegistry::new();
        let root = registry.add_product(Product::new_assembly("root", None, 0));
        let child = registry.add_product(Product::new_assembly("child", Some(root), 1));
        let grandchild = registry.add_product(Product::new_assembly("gc", Some(child), 2));
        registry.products[root].children.push(child);
        registry.products[child].children.push(grandchild);

        let subtree = registry.collect_subtree(root);
        assert_eq!(subtree.len(), 3);
        assert!(subtree.contains(&root));
        assert!(subtree.contains(&grandchild));
        assert_eq!(registry.subtree_height(root), 2);
    }

    #[test]
    fn test_synchronize_skips_when_clean() {
        let mut registry = ElementRegistry::new();
        registry.add_lamp(Lamp::new("a", LampKind::Celestial, 0));
        assert!(registry.synchronize_all(8));
        // Mask cleared; a second pass with no mutations reports no change
        assert!(!registry.synchronize_all(8));
    }

    #[test]
    fn test_lamp_units_contiguous_after_removal() {
        let mut registry = ElementRegistry::new();
        let a = registry.add_lamp(Lamp::new("a", LampKind::Celestial, 0));
        let b = registry.add_lamp(Lamp::new("b", LampKind::Celestial, 1));
        let c = registry.add_lamp(Lamp::new("c", LampKind::Celestial, 2));
        registry.synchronize_all(8);

        registry.remove_element(ElementId::Lamp(b));
        registry.synchronize_all(8);

        let mut units: Vec<u32> = [a, c]
            .iter()
            .filter_map(|&k| registry.lamps.get(k))
            .map(Lamp::unit)
            .collect();
        units.sort_unstable();
        assert_eq!(units, vec![0, 1]);
    }
}
