//! The universe: top-level coordinator and public mutation surface
//!
//! Every mutating operation acquires one process-wide data lock for its
//! entire duration. This is a deliberately coarse single-lock design: it
//! trades mutator parallelism for invariants that are easy to state and
//! prove. Mutators block each other (bulk deletion and resource loading
//! are the documented latency risks); the render thread never blocks,
//! because its frame entry point only *tries* the lock (see
//! [`crate::render::Renderer`]).
//!
//! Resource loads follow the double-checked pattern everywhere they are
//! reachable from inside a locked operation: check the cache, release the
//! lock, decode outside the critical section, reacquire, re-check. When
//! two threads race on the same resource the loser discards its duplicate
//! and both observe success.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::assets::{
    self, AssetError, ImageTextureSource, MeshSource, ObjMeshSource, TextureSource,
};
use crate::config::UniverseConfig;
use crate::elements::{
    CameraView, ElementId, Figure, FigureKey, FigureMode, Lamp, LampKey, LampKind, LampParams,
    Label, LabelKey, Material, MaterialKey, MaterialParams, Product, ProductKey, Projection,
    Texture, TextureKind, Viewport, World, WorldKey,
};
use crate::error::{UniverseError, UniverseResult};
use crate::foundation::math::{rgb, Color, Mat4, Transform, Vec2, Vec3};
use crate::registry::{ChangeMask, ElementRegistry};
use crate::render::pipeline::{BackendInfo, Pipeline};
use crate::render::Renderer;
use crate::versioned::Versioned;

/// Staged scene state guarded by the universe data lock
pub(crate) struct UniverseState {
    pub(crate) registry: ElementRegistry,
    pub(crate) background: Versioned<Color>,
    pub(crate) loading: Versioned<bool>,
    loading_ops: u32,
    pub(crate) meshes_dir: PathBuf,
    pub(crate) textures_dir: PathBuf,
    pub(crate) backend: Option<BackendInfo>,
    pub(crate) max_light_units: u32,
}

impl UniverseState {
    fn new(config: &UniverseConfig) -> Self {
        Self {
            registry: ElementRegistry::new(),
            background: Versioned::new(rgb(0.0, 0.0, 0.0)),
            loading: Versioned::new(false),
            loading_ops: 0,
            meshes_dir: PathBuf::from(&config.meshes_dir),
            textures_dir: PathBuf::from(&config.textures_dir),
            backend: None,
            max_light_units: config.max_light_units,
        }
    }

    /// The render-side synchronization pass: commit everything staged
    pub(crate) fn synchronize(&mut self) -> bool {
        let mut changed = self.registry.synchronize_all(self.max_light_units);
        changed |= self.background.update();
        changed |= self.loading.update();
        changed
    }

    /// Upload textures cached since the last pass; returns whether any
    /// handle was assigned
    pub(crate) fn upload_pending_textures(&mut self, pipeline: &mut dyn Pipeline) -> bool {
        let pending = std::mem::take(&mut self.registry.pending_textures);
        let mut uploaded = false;
        for name in pending {
            if let Some(texture) = self.registry.textures.get_mut(&name) {
                if texture.handle.is_none() {
                    texture.handle = Some(pipeline.upload_texture(&texture.image));
                    uploaded = true;
                    log::debug!("uploaded texture '{name}'");
                }
            }
        }
        uploaded
    }
}

/// Raises the loading flag for the duration of a load operation
///
/// The committed flag drives the render-side loading overlay. Scopes
/// nest: the flag drops only when the outermost scope ends.
struct LoadingScope {
    shared: Arc<Mutex<UniverseState>>,
}

impl LoadingScope {
    fn enter(shared: &Arc<Mutex<UniverseState>>) -> Self {
        {
            let mut state = shared.lock().unwrap();
            state.loading_ops += 1;
            if state.loading_ops == 1 {
                state.loading.set(true);
                state.registry.mark_changed(ChangeMask::SETTINGS);
            }
        }
        Self {
            shared: Arc::clone(shared),
        }
    }
}

impl Drop for LoadingScope {
    fn drop(&mut self) {
        let mut state = self.shared.lock().unwrap();
        state.loading_ops = state.loading_ops.saturating_sub(1);
        if state.loading_ops == 0 {
            state.loading.set(false);
            state.registry.mark_changed(ChangeMask::SETTINGS);
        }
    }
}

/// Thread-safe coordinator handle over the shared scene state
///
/// `Universe` is cheap to clone; every clone refers to the same scene.
/// Hand clones to as many mutator threads as needed. The paired
/// [`Renderer`] returned by [`Universe::new`] belongs on the render
/// thread.
#[derive(Clone)]
pub struct Universe {
    shared: Arc<Mutex<UniverseState>>,
    config: Arc<UniverseConfig>,
    mesh_source: Arc<dyn MeshSource>,
    texture_source: Arc<dyn TextureSource>,
}

impl Universe {
    /// Create a universe with the default OBJ and image resource sources
    pub fn new(config: UniverseConfig) -> (Self, Renderer) {
        Self::with_sources(config, Arc::new(ObjMeshSource), Arc::new(ImageTextureSource))
    }

    /// Create a universe with custom resource sources
    pub fn with_sources(
        config: UniverseConfig,
        mesh_source: Arc<dyn MeshSource>,
        texture_source: Arc<dyn TextureSource>,
    ) -> (Self, Renderer) {
        if let Err(problem) = config.validate() {
            log::warn!("universe configuration problem: {problem}");
        }
        let config = Arc::new(config);
        let shared = Arc::new(Mutex::new(UniverseState::new(&config)));
        let renderer = Renderer::new(Arc::clone(&shared), Arc::clone(&config));
        (
            Self {
                shared,
                config,
                mesh_source,
                texture_source,
            },
            renderer,
        )
    }

    fn lock(&self) -> MutexGuard<'_, UniverseState> {
        self.shared.lock().unwrap()
    }

    // ========================================================================
    // Worlds
    // ========================================================================

    /// Create a rendering world covering the given viewport rectangle
    pub fn add_world(
        &self,
        name: &str,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> UniverseResult<WorldKey> {
        self.check_world_dimensions(width, height)?;

        let mut state = self.lock();
        let key = state.registry.add_world(World::new(
            name,
            Viewport {
                x,
                y,
                width,
                height,
            },
        ));
        log::debug!("added world '{name}' ({width}x{height})");
        Ok(key)
    }

    /// Remove a world; its elements stay registered
    pub fn remove_world(&self, world: WorldKey) -> UniverseResult<()> {
        let mut state = self.lock();
        if !state.registry.contains(ElementId::World(world)) {
            return Err(not_found("world is not registered"));
        }
        state.registry.remove_element(ElementId::World(world));
        Ok(())
    }

    /// Reconfigure a world's viewport rectangle
    pub fn set_world_viewport(&self, world: WorldKey, viewport: Viewport) -> UniverseResult<()> {
        self.check_world_dimensions(viewport.width, viewport.height)?;

        let mut state = self.lock();
        let node = state
            .registry
            .worlds
            .get_mut(world)
            .ok_or_else(|| not_found("world is not registered"))?;
        if node.set_viewport(viewport) {
            state.registry.mark_changed(ChangeMask::WORLDS);
        }
        Ok(())
    }

    /// Reposition a world's camera
    pub fn set_world_camera(&self, world: WorldKey, camera: CameraView) -> UniverseResult<()> {
        let mut state = self.lock();
        let node = state
            .registry
            .worlds
            .get_mut(world)
            .ok_or_else(|| not_found("world is not registered"))?;
        if node.set_camera(camera) {
            state.registry.mark_changed(ChangeMask::WORLDS);
        }
        Ok(())
    }

    /// Reconfigure a world's projection
    pub fn set_world_projection(
        &self,
        world: WorldKey,
        projection: Projection,
    ) -> UniverseResult<()> {
        let mut state = self.lock();
        let node = state
            .registry
            .worlds
            .get_mut(world)
            .ok_or_else(|| not_found("world is not registered"))?;
        if node.set_projection(projection) {
            state.registry.mark_changed(ChangeMask::WORLDS);
        }
        Ok(())
    }

    fn check_world_dimensions(&self, width: u32, height: u32) -> UniverseResult<()> {
        let min = self.config.world_size_min;
        let max = self.config.world_size_max;
        if width < min || width > max || height < min || height > max {
            return Err(UniverseError::InvalidArgument(format!(
                "world dimensions {width}x{height} are outside [{min}, {max}]"
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Lamps
    // ========================================================================

    /// Create a lamp in the given world
    ///
    /// The lamp receives a count-based light unit immediately; the next
    /// synchronization pass renormalizes all units, so the initial value
    /// is a known-accepted transient.
    pub fn add_lamp(&self, name: &str, world: WorldKey, kind: LampKind) -> UniverseResult<LampKey> {
        let mut state = self.lock();
        if !state.registry.contains(ElementId::World(world)) {
            return Err(not_found("world is not registered"));
        }

        let unit_guess = u32::try_from(state.registry.lamp_count())
            .unwrap_or(u32::MAX)
            .min(state.max_light_units);
        let key = state.registry.add_lamp(Lamp::new(name, kind, unit_guess));
        attach_to_world(&mut state.registry, world, ElementId::Lamp(key));
        log::debug!("added lamp '{name}' ({kind:?})");
        Ok(key)
    }

    /// Remove a lamp from the registry and every world referencing it
    pub fn remove_lamp(&self, lamp: LampKey) -> UniverseResult<()> {
        let mut state = self.lock();
        if !state.registry.contains(ElementId::Lamp(lamp)) {
            return Err(not_found("lamp is not registered"));
        }
        detach_anchor_dependent(&mut state.registry, ElementId::Lamp(lamp));
        state.registry.remove_element(ElementId::Lamp(lamp));
        Ok(())
    }

    /// Reference an existing lamp into an additional world
    ///
    /// The lamp is aliased, not copied: it keeps a single registry entry
    /// and a single source of truth for its attributes, and removing it
    /// once removes it from every world.
    pub fn refer_lamp_to_world(&self, lamp: LampKey, world: WorldKey) -> UniverseResult<()> {
        self.refer_to_world(ElementId::Lamp(lamp), world, "lamp")
    }

    /// Stage new lamp parameters
    pub fn set_lamp_params(&self, lamp: LampKey, params: LampParams) -> UniverseResult<()> {
        let mut state = self.lock();
        let node = state
            .registry
            .lamps
            .get_mut(lamp)
            .ok_or_else(|| not_found("lamp is not registered"))?;
        if node.set_params(params) {
            state.registry.mark_changed(ChangeMask::LAMPS);
        }
        Ok(())
    }

    /// Anchor a lamp to a product's composed matrix (or detach with `None`)
    pub fn set_lamp_anchor(
        &self,
        lamp: LampKey,
        anchor: Option<ProductKey>,
    ) -> UniverseResult<()> {
        let mut state = self.lock();
        if !state.registry.contains(ElementId::Lamp(lamp)) {
            return Err(not_found("lamp is not registered"));
        }
        set_anchor(&mut state.registry, ElementId::Lamp(lamp), anchor)?;
        state.registry.mark_changed(ChangeMask::LAMPS);
        Ok(())
    }

    // ========================================================================
    // Products
    // ========================================================================

    /// Create an assembly node, optionally under a parent in the same world
    pub fn add_assembly(
        &self,
        name: &str,
        world: WorldKey,
        parent: Option<ProductKey>,
    ) -> UniverseResult<ProductKey> {
        let mut state = self.lock();
        let (level, seed) = self.check_parent(&state, world, parent)?;

        let mut node = Product::new_assembly(name, parent, level);
        node.composed = seed;
        let key = state.registry.add_product(node);
        if let Some(parent_key) = parent {
            state.registry.products[parent_key].children.push(key);
        }
        attach_to_world(&mut state.registry, world, ElementId::Product(key));
        log::debug!("added assembly '{name}' at level {level}");
        Ok(key)
    }

    /// Create a part node carrying a mesh, optionally under a parent
    ///
    /// The mesh is resolved through the cache with one forced lazy-load
    /// attempt: if it is not cached, the lock is released, the file is
    /// loaded, and the cache is re-checked.
    pub fn add_part(
        &self,
        name: &str,
        world: WorldKey,
        mesh_name: &str,
        material: Option<MaterialKey>,
        parent: Option<ProductKey>,
    ) -> UniverseResult<ProductKey> {
        if mesh_name.trim().is_empty() {
            return Err(UniverseError::InvalidArgument(
                "no mesh name given".to_string(),
            ));
        }
        let corrected =
            assets::normalize_resource_name(mesh_name, &self.config.mesh_extension);

        let mut state = self.lock();
        if state.registry.mesh(&corrected).is_none() {
            // Forced lazy load: one attempt, no retry loop
            drop(state);
            self.load_mesh(&corrected)?;
            state = self.lock();
        }
        let Some(mesh) = state.registry.mesh(&corrected) else {
            // Unreachable after a successful load; kept as a guard
            return Err(not_found("mesh could not be resolved"));
        };

        if let Some(material_key) = material {
            if !state.registry.contains(ElementId::Material(material_key)) {
                return Err(not_found("material is not registered"));
            }
        }
        let (level, seed) = self.check_parent(&state, world, parent)?;

        let mut node = Product::new_part(name, mesh, material, parent, level);
        node.composed = seed;
        let key = state.registry.add_product(node);
        if let Some(parent_key) = parent {
            state.registry.products[parent_key].children.push(key);
        }
        attach_to_world(&mut state.registry, world, ElementId::Product(key));
        log::debug!("added part '{name}' at level {level}");
        Ok(key)
    }

    /// Create a part with a freshly created diffuse-textured material
    pub fn add_part_textured(
        &self,
        name: &str,
        world: WorldKey,
        mesh_name: &str,
        texture_name: &str,
        parent: Option<ProductKey>,
    ) -> UniverseResult<ProductKey> {
        let material = if texture_name.is_empty() {
            None
        } else {
            let prefixed = format!("{}{texture_name}", self.config.texture_prefix_diffuse);
            Some(self.add_material(Some(&prefixed))?)
        };
        self.add_part(name, world, mesh_name, material, parent)
    }

    /// Validate world and parent preconditions for product creation
    ///
    /// Returns the child's level and its composed-matrix seed.
    fn check_parent(
        &self,
        state: &UniverseState,
        world: WorldKey,
        parent: Option<ProductKey>,
    ) -> UniverseResult<(u32, Mat4)> {
        if !state.registry.contains(ElementId::World(world)) {
            return Err(not_found("world is not registered"));
        }

        let Some(parent_key) = parent else {
            return Ok((0, Mat4::identity()));
        };
        let Some(parent_node) = state.registry.products.get(parent_key) else {
            return Err(not_found("parent product is not registered"));
        };
        let Some(world_node) = state.registry.worlds.get(world) else {
            return Err(not_found("world is not registered"));
        };
        if !world_node.contains(ElementId::Product(parent_key)) {
            return Err(not_found("parent product does not belong to the given world"));
        }

        let level = parent_node.level() + 1;
        if level > self.config.max_product_level {
            return Err(UniverseError::DepthExceeded {
                level,
                max: self.config.max_product_level,
            });
        }
        Ok((level, *parent_node.composed()))
    }

    /// Reference an existing product into an additional world
    pub fn refer_product_to_world(&self, product: ProductKey, world: WorldKey) -> UniverseResult<()> {
        self.refer_to_world(ElementId::Product(product), world, "product")
    }

    /// Stage a new local transform for a product
    pub fn set_product_transform(
        &self,
        product: ProductKey,
        transform: Transform,
    ) -> UniverseResult<()> {
        let mut state = self.lock();
        let node = state
            .registry
            .products
            .get_mut(product)
            .ok_or_else(|| not_found("product is not registered"))?;
        if node.set_transform(transform) {
            state.registry.mark_changed(ChangeMask::PRODUCTS);
        }
        Ok(())
    }

    /// Stage product visibility
    pub fn set_product_visible(&self, product: ProductKey, visible: bool) -> UniverseResult<()> {
        let mut state = self.lock();
        let node = state
            .registry
            .products
            .get_mut(product)
            .ok_or_else(|| not_found("product is not registered"))?;
        if node.set_visible(visible) {
            state.registry.mark_changed(ChangeMask::PRODUCTS);
        }
        Ok(())
    }

    /// Replace a product's shared material reference
    pub fn set_product_material(
        &self,
        product: ProductKey,
        material: Option<MaterialKey>,
    ) -> UniverseResult<()> {
        let mut state = self.lock();
        if let Some(material_key) = material {
            if !state.registry.contains(ElementId::Material(material_key)) {
                return Err(not_found("material is not registered"));
            }
        }
        let node = state
            .registry
            .products
            .get_mut(product)
            .ok_or_else(|| not_found("product is not registered"))?;
        node.material = material;
        state.registry.mark_changed(ChangeMask::PRODUCTS);
        Ok(())
    }

    /// Move a product (and its subtree) under a new parent
    ///
    /// Depth is revalidated for the whole moved subtree and every
    /// descendant is releveled; a product can never become its own
    /// ancestor.
    pub fn set_product_parent(
        &self,
        product: ProductKey,
        new_parent: Option<ProductKey>,
    ) -> UniverseResult<()> {
        let mut state = self.lock();
        if !state.registry.contains(ElementId::Product(product)) {
            return Err(not_found("product is not registered"));
        }

        let new_level = match new_parent {
            None => 0,
            Some(parent_key) => {
                let Some(parent_node) = state.registry.products.get(parent_key) else {
                    return Err(not_found("parent product is not registered"));
                };
                if parent_key == product
                    || state.registry.collect_subtree(product).contains(&parent_key)
                {
                    return Err(UniverseError::InvalidArgument(
                        "cannot parent a product to itself or its own descendant".to_string(),
                    ));
                }
                parent_node.level() + 1
            }
        };

        let deepest = new_level + state.registry.subtree_height(product);
        if deepest > self.config.max_product_level {
            return Err(UniverseError::DepthExceeded {
                level: deepest,
                max: self.config.max_product_level,
            });
        }

        // Detach from the old parent
        let old_parent = state.registry.products[product].parent;
        if let Some(old_key) = old_parent {
            if let Some(old_node) = state.registry.products.get_mut(old_key) {
                old_node.children.retain(|&c| c != product);
            }
        }

        // Attach to the new one
        state.registry.products[product].parent = new_parent;
        if let Some(parent_key) = new_parent {
            state.registry.products[parent_key].children.push(product);
        }

        // Relevel the moved subtree
        let mut stack = vec![(product, new_level)];
        while let Some((key, level)) = stack.pop() {
            if let Some(node) = state.registry.products.get_mut(key) {
                node.level = level;
                for &child in &node.children {
                    stack.push((child, level + 1));
                }
            }
        }

        state.registry.mark_changed(ChangeMask::PRODUCTS);
        Ok(())
    }

    /// Remove a product and its full descendant set
    ///
    /// The batch is removed atomically under the data lock: registry
    /// entries, world references and alien-matrix anchors of dependent
    /// elements all go in one critical section, so no thread can observe
    /// a half-deleted tree. Materials referenced only by the removed
    /// batch are garbage-collected; textures are left alone.
    ///
    /// Proportional to subtree size times total element count; other
    /// mutator threads wait for the whole removal.
    pub fn remove_product(&self, product: ProductKey) -> UniverseResult<()> {
        let mut state = self.lock();
        if !state.registry.contains(ElementId::Product(product)) {
            return Err(not_found("product is not registered"));
        }

        let batch = state.registry.collect_subtree(product);
        let batch_ids: Vec<ElementId> = batch.iter().map(|&k| ElementId::Product(k)).collect();

        // Candidate materials for garbage collection
        let mut candidates: HashSet<MaterialKey> = batch
            .iter()
            .filter_map(|&k| state.registry.products.get(k).and_then(Product::material))
            .collect();

        // Invalidate alien-matrix references into every removed node
        for &key in &batch {
            let cleared = state.registry.clear_dependents(key);
            if !cleared.is_empty() {
                log::debug!("cleared {} anchor(s) into removed product", cleared.len());
            }
        }

        // Detach the batch root from its parent's child list
        let parent = state.registry.products[product].parent;
        if let Some(parent_key) = parent {
            if let Some(parent_node) = state.registry.products.get_mut(parent_key) {
                parent_node.children.retain(|&c| c != product);
            }
        }

        let removed = state.registry.remove_elements(&batch_ids);
        debug_assert_eq!(removed, batch_ids.len(), "product batch removal incomplete");

        // A candidate material survives if any remaining product uses it
        for (_, node) in &state.registry.products {
            if let Some(material_key) = node.material() {
                candidates.remove(&material_key);
            }
        }
        for material_key in candidates {
            state.registry.remove_element(ElementId::Material(material_key));
        }

        log::debug!("removed product batch of {removed} node(s)");
        Ok(())
    }

    // ========================================================================
    // Figures
    // ========================================================================

    /// Create a figure in the given world
    pub fn add_figure(&self, name: &str, world: WorldKey) -> UniverseResult<FigureKey> {
        let mut state = self.lock();
        if !state.registry.contains(ElementId::World(world)) {
            return Err(not_found("world is not registered"));
        }
        let key = state.registry.add_figure(Figure::new(name));
        attach_to_world(&mut state.registry, world, ElementId::Figure(key));
        Ok(key)
    }

    /// Remove a figure from the registry and every world referencing it
    pub fn remove_figure(&self, figure: FigureKey) -> UniverseResult<()> {
        let mut state = self.lock();
        if !state.registry.contains(ElementId::Figure(figure)) {
            return Err(not_found("figure is not registered"));
        }
        detach_anchor_dependent(&mut state.registry, ElementId::Figure(figure));
        state.registry.remove_element(ElementId::Figure(figure));
        Ok(())
    }

    /// Stage a figure's point list
    pub fn set_figure_points(&self, figure: FigureKey, points: Vec<Vec3>) -> UniverseResult<()> {
        let mut state = self.lock();
        let node = state
            .registry
            .figures
            .get_mut(figure)
            .ok_or_else(|| not_found("figure is not registered"))?;
        node.set_points(points);
        state.registry.mark_changed(ChangeMask::FIGURES);
        Ok(())
    }

    /// Stage a figure's drawing mode
    pub fn set_figure_mode(&self, figure: FigureKey, mode: FigureMode) -> UniverseResult<()> {
        self.with_figure(figure, |node| node.set_mode(mode))
    }

    /// Stage a figure's color
    pub fn set_figure_color(&self, figure: FigureKey, color: Color) -> UniverseResult<()> {
        self.with_figure(figure, |node| node.set_color(color))
    }

    /// Stage a figure's line width
    pub fn set_figure_line_width(&self, figure: FigureKey, width: f32) -> UniverseResult<()> {
        self.with_figure(figure, |node| node.set_line_width(width))
    }

    /// Stage a figure's visibility
    pub fn set_figure_visible(&self, figure: FigureKey, visible: bool) -> UniverseResult<()> {
        self.with_figure(figure, |node| node.set_visible(visible))
    }

    /// Stage a figure's local transform
    pub fn set_figure_transform(
        &self,
        figure: FigureKey,
        transform: Transform,
    ) -> UniverseResult<()> {
        self.with_figure(figure, |node| node.set_transform(transform))
    }

    /// Anchor a figure to a product's composed matrix (or detach with `None`)
    pub fn set_figure_anchor(
        &self,
        figure: FigureKey,
        anchor: Option<ProductKey>,
    ) -> UniverseResult<()> {
        let mut state = self.lock();
        if !state.registry.contains(ElementId::Figure(figure)) {
            return Err(not_found("figure is not registered"));
        }
        set_anchor(&mut state.registry, ElementId::Figure(figure), anchor)?;
        state.registry.mark_changed(ChangeMask::FIGURES);
        Ok(())
    }

    fn with_figure(
        &self,
        figure: FigureKey,
        apply: impl FnOnce(&mut Figure) -> bool,
    ) -> UniverseResult<()> {
        let mut state = self.lock();
        let node = state
            .registry
            .figures
            .get_mut(figure)
            .ok_or_else(|| not_found("figure is not registered"))?;
        if apply(node) {
            state.registry.mark_changed(ChangeMask::FIGURES);
        }
        Ok(())
    }

    // ========================================================================
    // Labels
    // ========================================================================

    /// Create a label, optionally backed by an interface texture
    ///
    /// The texture name is resolved under the interface prefix with the
    /// same forced lazy-load pattern parts use for meshes.
    pub fn add_label(
        &self,
        name: &str,
        world: WorldKey,
        width: f32,
        height: f32,
        texture_name: Option<&str>,
    ) -> UniverseResult<LabelKey> {
        if width <= 0.0 || height <= 0.0 {
            return Err(UniverseError::InvalidArgument(format!(
                "label dimensions {width}x{height} are not positive"
            )));
        }

        let texture = match texture_name {
            None | Some("") => None,
            Some(raw) => {
                let corrected = format!(
                    "{}{}",
                    self.config.texture_prefix_interface,
                    assets::normalize_resource_name(raw, &self.config.texture_extension)
                );
                let state = self.lock();
                let cached = state.registry.texture(&corrected).is_some();
                drop(state);
                if !cached {
                    self.load_texture(&corrected)?;
                }
                Some(corrected)
            }
        };

        let mut state = self.lock();
        if let Some(ref texture_id) = texture {
            if state.registry.texture(texture_id).is_none() {
                // Unreachable after a successful load; kept as a guard
                return Err(not_found("label texture could not be resolved"));
            }
        }
        if !state.registry.contains(ElementId::World(world)) {
            return Err(not_found("world is not registered"));
        }
        let key = state
            .registry
            .add_label(Label::new(name, Vec2::new(width, height), texture));
        attach_to_world(&mut state.registry, world, ElementId::Label(key));
        Ok(key)
    }

    /// Remove a label from the registry and every world referencing it
    pub fn remove_label(&self, label: LabelKey) -> UniverseResult<()> {
        let mut state = self.lock();
        if !state.registry.contains(ElementId::Label(label)) {
            return Err(not_found("label is not registered"));
        }
        detach_anchor_dependent(&mut state.registry, ElementId::Label(label));
        state.registry.remove_element(ElementId::Label(label));
        Ok(())
    }

    /// Reference an existing label into an additional world
    pub fn refer_label_to_world(&self, label: LabelKey, world: WorldKey) -> UniverseResult<()> {
        self.refer_to_world(ElementId::Label(label), world, "label")
    }

    /// Stage a label's anchor-relative position
    pub fn set_label_position(&self, label: LabelKey, position: Vec3) -> UniverseResult<()> {
        self.with_label(label, |node| node.set_position(position))
    }

    /// Stage a label's modulation color
    pub fn set_label_color(&self, label: LabelKey, color: Color) -> UniverseResult<()> {
        self.with_label(label, |node| node.set_color(color))
    }

    /// Stage a label's visibility
    pub fn set_label_visible(&self, label: LabelKey, visible: bool) -> UniverseResult<()> {
        self.with_label(label, |node| node.set_visible(visible))
    }

    /// Anchor a label to a product's composed matrix (or detach with `None`)
    pub fn set_label_anchor(
        &self,
        label: LabelKey,
        anchor: Option<ProductKey>,
    ) -> UniverseResult<()> {
        let mut state = self.lock();
        if !state.registry.contains(ElementId::Label(label)) {
            return Err(not_found("label is not registered"));
        }
        set_anchor(&mut state.registry, ElementId::Label(label), anchor)?;
        state.registry.mark_changed(ChangeMask::LABELS);
        Ok(())
    }

    fn with_label(
        &self,
        label: LabelKey,
        apply: impl FnOnce(&mut Label) -> bool,
    ) -> UniverseResult<()> {
        let mut state = self.lock();
        let node = state
            .registry
            .labels
            .get_mut(label)
            .ok_or_else(|| not_found("label is not registered"))?;
        if apply(node) {
            state.registry.mark_changed(ChangeMask::LABELS);
        }
        Ok(())
    }

    // ========================================================================
    // Materials
    // ========================================================================

    /// Create a material, optionally resolving a diffuse texture by name
    ///
    /// Texture names must carry their type prefix (for example
    /// `"d/steel"`); [`Universe::add_part_textured`] prepends the diffuse
    /// prefix automatically.
    pub fn add_material(&self, texture_name: Option<&str>) -> UniverseResult<MaterialKey> {
        let texture = match texture_name {
            None | Some("") => None,
            Some(raw) => {
                let corrected =
                    assets::normalize_resource_name(raw, &self.config.texture_extension);
                let state = self.lock();
                let cached = state.registry.texture(&corrected).is_some();
                drop(state);
                if !cached {
                    self.load_texture(&corrected)?;
                }
                Some(corrected)
            }
        };

        let mut state = self.lock();
        if let Some(ref texture_id) = texture {
            if state.registry.texture(texture_id).is_none() {
                // Unreachable after a successful load; kept as a guard
                return Err(not_found("material texture could not be resolved"));
            }
        }
        Ok(state.registry.add_material(Material::new(texture)))
    }

    /// Stage new material colors
    pub fn set_material_params(
        &self,
        material: MaterialKey,
        params: MaterialParams,
    ) -> UniverseResult<()> {
        let mut state = self.lock();
        let node = state
            .registry
            .materials
            .get_mut(material)
            .ok_or_else(|| not_found("material is not registered"))?;
        if node.set_params(params) {
            state.registry.mark_changed(ChangeMask::MATERIALS);
        }
        Ok(())
    }

    /// Remove a material; products referencing it fall back to defaults
    pub fn remove_material(&self, material: MaterialKey) -> UniverseResult<()> {
        let mut state = self.lock();
        if !state.registry.contains(ElementId::Material(material)) {
            return Err(not_found("material is not registered"));
        }
        let orphaned: Vec<ProductKey> = state
            .registry
            .products
            .iter()
            .filter(|(_, p)| p.material() == Some(material))
            .map(|(k, _)| k)
            .collect();
        for key in orphaned {
            state.registry.products[key].material = None;
        }
        state.registry.mark_changed(ChangeMask::PRODUCTS);
        state.registry.remove_element(ElementId::Material(material));
        Ok(())
    }

    // ========================================================================
    // Universe-level settings
    // ========================================================================

    /// Stage a new clear color
    pub fn set_background_color(&self, color: Color) {
        let mut state = self.lock();
        if state.background.set_if_changed(color) {
            state.registry.mark_changed(ChangeMask::SETTINGS);
        }
    }

    /// Swap the mesh search directory if `dir` exists and differs
    ///
    /// Returns whether the directory changed.
    pub fn set_meshes_dir(&self, dir: &str) -> bool {
        let path = Path::new(dir);
        if !path.is_dir() {
            log::warn!("mesh directory '{dir}' does not exist");
            return false;
        }
        let mut state = self.lock();
        if state.meshes_dir == path {
            return false;
        }
        state.meshes_dir = path.to_path_buf();
        true
    }

    /// Swap the texture search directory if `dir` exists and differs
    ///
    /// Returns whether the directory changed.
    pub fn set_textures_dir(&self, dir: &str) -> bool {
        let path = Path::new(dir);
        if !path.is_dir() {
            log::warn!("texture directory '{dir}' does not exist");
            return false;
        }
        let mut state = self.lock();
        if state.textures_dir == path {
            return false;
        }
        state.textures_dir = path.to_path_buf();
        true
    }

    /// Backend information captured at render initialization
    pub fn backend_info(&self) -> Option<BackendInfo> {
        self.lock().backend.clone()
    }

    /// Whether any load operation is currently in flight (staged view)
    pub fn is_loading(&self) -> bool {
        *self.lock().loading.staged()
    }

    // ========================================================================
    // Resource loading
    // ========================================================================

    /// Load a single mesh by name; idempotent once cached
    pub fn load_mesh(&self, name: &str) -> UniverseResult<()> {
        if name.trim().is_empty() {
            return Err(UniverseError::InvalidArgument(
                "no mesh name given".to_string(),
            ));
        }
        let _scope = LoadingScope::enter(&self.shared);
        let corrected = assets::normalize_resource_name(name, &self.config.mesh_extension);
        self.load_mesh_file(&corrected)
    }

    /// Bulk-load every mesh under the mesh directory (or a subdirectory)
    ///
    /// Returns the number of meshes newly loaded. May run for a long
    /// time; intended for application startup.
    pub fn load_meshes(&self, subdir: Option<&str>, recursive: bool) -> UniverseResult<u32> {
        let _scope = LoadingScope::enter(&self.shared);
        let base = self.lock().meshes_dir.clone();
        let names =
            collect_resource_names(&base, subdir, &self.config.mesh_extension, recursive)?;

        let mut loaded = 0u32;
        for name in names {
            match self.load_mesh_file(&name) {
                Ok(()) => loaded += 1,
                Err(e) => log::warn!("skipping mesh '{name}': {e}"),
            }
        }
        Ok(loaded)
    }

    /// Load a single texture by prefixed name; idempotent once cached
    pub fn load_texture(&self, name: &str) -> UniverseResult<()> {
        if name.trim().is_empty() {
            return Err(UniverseError::InvalidArgument(
                "no texture name given".to_string(),
            ));
        }
        let _scope = LoadingScope::enter(&self.shared);
        let corrected = assets::normalize_resource_name(name, &self.config.texture_extension);
        self.load_texture_file(&corrected)
    }

    /// Bulk-load every texture under the texture directory (or a subdirectory)
    ///
    /// Returns the number of textures newly loaded.
    pub fn load_textures(&self, subdir: Option<&str>, recursive: bool) -> UniverseResult<u32> {
        let _scope = LoadingScope::enter(&self.shared);
        let base = self.lock().textures_dir.clone();
        let names =
            collect_resource_names(&base, subdir, &self.config.texture_extension, recursive)?;

        let mut loaded = 0u32;
        for name in names {
            match self.load_texture_file(&name) {
                Ok(()) => loaded += 1,
                Err(e) => log::warn!("skipping texture '{name}': {e}"),
            }
        }
        Ok(loaded)
    }

    /// Load-or-get-cached for meshes: optimistic lookup, fallible load
    /// outside the critical section, re-validated insert
    fn load_mesh_file(&self, corrected: &str) -> UniverseResult<()> {
        let path = {
            let state = self.lock();
            if state.registry.mesh(corrected).is_some() {
                return Ok(());
            }
            assets::resource_path(&state.meshes_dir, corrected, &self.config.mesh_extension)
        };
        if !path.exists() {
            return Err(not_found(&format!(
                "mesh file '{}' does not exist",
                path.display()
            )));
        }

        let data = self
            .mesh_source
            .load_mesh(&path, corrected)
            .map_err(map_asset_error)?;
        let mesh = Arc::new(data);

        let mut state = self.lock();
        if !state.registry.insert_mesh(corrected, mesh) {
            // Another thread loaded the same mesh while this one was
            // decoding; the duplicate is discarded and both callers succeed
            log::debug!("mesh '{corrected}' loaded concurrently; discarding duplicate");
        }
        Ok(())
    }

    /// Load-or-get-cached for textures; validates dimensions and queues
    /// the pipeline upload
    fn load_texture_file(&self, corrected: &str) -> UniverseResult<()> {
        let kind = self.texture_kind_for(corrected)?;
        let path = {
            let state = self.lock();
            if state.registry.texture(corrected).is_some() {
                return Ok(());
            }
            assets::resource_path(
                &state.textures_dir,
                corrected,
                &self.config.texture_extension,
            )
        };
        if !path.exists() {
            return Err(not_found(&format!(
                "texture file '{}' does not exist",
                path.display()
            )));
        }

        let image = self
            .texture_source
            .load_image(&path)
            .map_err(map_asset_error)?;
        if !image.has_power_of_two_dimensions() {
            return Err(UniverseError::ResourceInvalid(format!(
                "texture '{corrected}' dimensions {}x{} are not powers of two",
                image.width, image.height
            )));
        }

        let mut state = self.lock();
        if !state.registry.insert_texture(Texture::new(corrected, kind, image)) {
            log::debug!("texture '{corrected}' loaded concurrently; discarding duplicate");
        }
        Ok(())
    }

    /// Classify a texture by its directory prefix
    fn texture_kind_for(&self, name: &str) -> UniverseResult<TextureKind> {
        if name.starts_with(&self.config.texture_prefix_diffuse) {
            Ok(TextureKind::Diffuse)
        } else if name.starts_with(&self.config.texture_prefix_interface) {
            Ok(TextureKind::Interface)
        } else if name.starts_with(&self.config.texture_prefix_normal) {
            Ok(TextureKind::Normal)
        } else {
            Err(UniverseError::ResourceInvalid(format!(
                "texture name '{name}' carries no type prefix"
            )))
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Membership test by identity (staged view)
    pub fn contains(&self, id: ElementId) -> bool {
        self.lock().registry.contains(id)
    }

    /// Ordered element references of a world (staged view)
    pub fn world_items(&self, world: WorldKey) -> Option<Vec<ElementId>> {
        self.lock()
            .registry
            .worlds
            .get(world)
            .map(|w| w.items().to_vec())
    }

    /// Light unit currently assigned to a lamp
    pub fn lamp_unit(&self, lamp: LampKey) -> Option<u32> {
        self.lock().registry.lamps.get(lamp).map(Lamp::unit)
    }

    /// Depth level of a product
    pub fn product_level(&self, product: ProductKey) -> Option<u32> {
        self.lock()
            .registry
            .products
            .get(product)
            .map(Product::level)
    }

    /// Number of registered products
    pub fn product_count(&self) -> usize {
        self.lock().registry.product_count()
    }

    /// Number of registered lamps
    pub fn lamp_count(&self) -> usize {
        self.lock().registry.lamp_count()
    }

    /// Number of registered materials
    pub fn material_count(&self) -> usize {
        self.lock().registry.material_count()
    }

    /// Number of cached meshes
    pub fn mesh_count(&self) -> usize {
        self.lock().registry.mesh_count()
    }

    /// Number of cached textures
    pub fn texture_count(&self) -> usize {
        self.lock().registry.texture_count()
    }

    // ========================================================================
    // Shared helpers
    // ========================================================================

    fn refer_to_world(&self, id: ElementId, world: WorldKey, what: &str) -> UniverseResult<()> {
        let mut state = self.lock();
        if !state.registry.contains(id) {
            return Err(not_found(&format!("{what} is not registered")));
        }
        let Some(world_node) = state.registry.worlds.get_mut(world) else {
            return Err(not_found("world is not registered"));
        };
        if !world_node.add_item(id) {
            return Err(UniverseError::Duplicate(format!(
                "{what} is already referenced by this world"
            )));
        }
        state.registry.mark_changed(ChangeMask::WORLDS);
        Ok(())
    }
}

/// Append an element to a freshly validated world's content list
fn attach_to_world(registry: &mut ElementRegistry, world: WorldKey, id: ElementId) {
    if let Some(world_node) = registry.worlds.get_mut(world) {
        // A freshly created key cannot collide; add_item only rejects
        // genuine re-references
        world_node.add_item(id);
    }
    registry.mark_changed(ChangeMask::WORLDS);
}

/// Point an element's anchor at a product, maintaining the reverse index
fn set_anchor(
    registry: &mut ElementRegistry,
    id: ElementId,
    anchor: Option<ProductKey>,
) -> UniverseResult<()> {
    if let Some(product_key) = anchor {
        if !registry.contains(ElementId::Product(product_key)) {
            return Err(not_found("anchor product is not registered"));
        }
    }

    detach_anchor_dependent(registry, id);
    match id {
        ElementId::Lamp(k) => registry.lamps[k].anchor = anchor,
        ElementId::Figure(k) => registry.figures[k].anchor = anchor,
        ElementId::Label(k) => registry.labels[k].anchor = anchor,
        _ => unreachable!("only lamps, figures and labels can be anchored"),
    }
    if let Some(product_key) = anchor {
        registry.products[product_key].dependents.insert(id);
    }
    Ok(())
}

/// Remove an element's dependent entry from its current anchor product
fn detach_anchor_dependent(registry: &mut ElementRegistry, id: ElementId) {
    let anchor = match id {
        ElementId::Lamp(k) => registry.lamps.get(k).and_then(Lamp::anchor),
        ElementId::Figure(k) => registry.figures.get(k).and_then(Figure::anchor),
        ElementId::Label(k) => registry.labels.get(k).and_then(Label::anchor),
        _ => None,
    };
    if let Some(product_key) = anchor {
        if let Some(product) = registry.products.get_mut(product_key) {
            product.dependents.remove(&id);
        }
    }
}

/// Names (relative to `base`, extension stripped) of loadable resources
fn collect_resource_names(
    base: &Path,
    subdir: Option<&str>,
    extension: &str,
    recursive: bool,
) -> UniverseResult<Vec<String>> {
    let dir = subdir.map_or_else(|| base.to_path_buf(), |s| base.join(s));
    let files = assets::files_with_extension(&dir, extension, recursive)
        .map_err(|e| not_found(&format!("cannot read '{}': {e}", dir.display())))?;

    Ok(files
        .iter()
        .map(|path| {
            let rel = path.strip_prefix(base).unwrap_or(path);
            let name = rel.to_string_lossy().replace('\\', "/");
            assets::normalize_resource_name(&name, extension)
        })
        .collect())
}

fn not_found(what: &str) -> UniverseError {
    log::warn!("{what}");
    UniverseError::NotFound(what.to_string())
}

fn map_asset_error(error: AssetError) -> UniverseError {
    match error {
        AssetError::Io(e) => UniverseError::NotFound(format!("resource unreadable: {e}")),
        AssetError::Parse(msg) | AssetError::InvalidFormat(msg) => {
            UniverseError::ResourceInvalid(msg)
        }
    }
}

// ============================================================================
// SCENARIO TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::MeshData;
    use crate::foundation::math::rgba;
    use crate::render::pipeline::{PipelineCall, RecordingPipeline};
    use std::fs;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};

    static FIXTURE_ID: AtomicU32 = AtomicU32::new(0);

    /// Mesh source returning a fixed triangle regardless of file content
    struct StubMeshSource;

    impl MeshSource for StubMeshSource {
        fn load_mesh(&self, _path: &Path, name: &str) -> Result<MeshData, AssetError> {
            Ok(MeshData {
                name: name.to_string(),
                positions: vec![
                    Vec3::new(0.0, 0.0, 0.0),
                    Vec3::new(1.0, 0.0, 0.0),
                    Vec3::new(0.0, 1.0, 0.0),
                ],
                normals: Vec::new(),
                texcoords: Vec::new(),
                indices: vec![0, 1, 2],
            })
        }
    }

    /// Texture source returning a synthetic image of a fixed size,
    /// optionally sleeping to widen race windows
    struct StubTextureSource {
        width: u32,
        height: u32,
        delay: Duration,
    }

    impl TextureSource for StubTextureSource {
        fn load_image(&self, _path: &Path) -> Result<crate::elements::TextureImage, AssetError> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            Ok(crate::elements::TextureImage {
                width: self.width,
                height: self.height,
                pixels: vec![255; (self.width * self.height * 4) as usize],
            })
        }
    }

    struct Fixture {
        universe: Universe,
        renderer: Renderer,
        root: PathBuf,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn fixture(max_product_level: u32) -> Fixture {
        fixture_with_texture_source(max_product_level, 64, 64, Duration::ZERO)
    }

    fn fixture_with_texture_source(
        max_product_level: u32,
        tex_width: u32,
        tex_height: u32,
        tex_delay: Duration,
    ) -> Fixture {
        let root = std::env::temp_dir().join(format!(
            "orrery_universe_test_{}_{}",
            std::process::id(),
            FIXTURE_ID.fetch_add(1, Ordering::Relaxed)
        ));
        let meshes = root.join("meshes");
        let textures = root.join("textures");
        fs::create_dir_all(&meshes).unwrap();
        fs::create_dir_all(textures.join("d")).unwrap();
        fs::create_dir_all(textures.join("i")).unwrap();
        fs::write(meshes.join("hull.obj"), "# stub").unwrap();
        fs::write(textures.join("d/steel.png"), "").unwrap();
        fs::write(textures.join("i/tag.png"), "").unwrap();

        let config = UniverseConfig {
            max_product_level,
            meshes_dir: meshes.to_string_lossy().into_owned(),
            textures_dir: textures.to_string_lossy().into_owned(),
            ..Default::default()
        };
        let (universe, renderer) = Universe::with_sources(
            config,
            Arc::new(StubMeshSource),
            Arc::new(StubTextureSource {
                width: tex_width,
                height: tex_height,
                delay: tex_delay,
            }),
        );
        Fixture {
            universe,
            renderer,
            root,
        }
    }

    fn last_background(pipeline: &RecordingPipeline) -> Option<Color> {
        pipeline.calls.iter().rev().find_map(|c| match c {
            PipelineCall::SetBackgroundColor(color) => Some(*color),
            _ => None,
        })
    }

    #[test]
    fn test_removed_element_is_gone_from_registry_and_all_worlds() {
        let f = fixture(8);
        let w1 = f.universe.add_world("w1", 0, 0, 640, 480).unwrap();
        let w2 = f.universe.add_world("w2", 0, 0, 640, 480).unwrap();
        let lamp = f.universe.add_lamp("sun", w1, LampKind::Celestial).unwrap();
        f.universe.refer_lamp_to_world(lamp, w2).unwrap();

        f.universe.remove_lamp(lamp).unwrap();

        assert!(!f.universe.contains(ElementId::Lamp(lamp)));
        for world in [w1, w2] {
            let items = f.universe.world_items(world).unwrap();
            assert!(!items.contains(&ElementId::Lamp(lamp)));
        }
    }

    #[test]
    fn test_depth_limit_leaves_no_partial_node() {
        let f = fixture(2);
        let world = f.universe.add_world("main", 0, 0, 640, 480).unwrap();
        let root = f.universe.add_assembly("root", world, None).unwrap();
        let a = f.universe.add_assembly("a", world, Some(root)).unwrap();
        let b = f.universe.add_assembly("b", world, Some(a)).unwrap();
        assert_eq!(f.universe.product_level(b), Some(2));

        let result = f.universe.add_assembly("c", world, Some(b));
        assert!(matches!(
            result,
            Err(UniverseError::DepthExceeded { level: 3, max: 2 })
        ));
        // No partial node registered, no dangling world reference
        assert_eq!(f.universe.product_count(), 3);
        assert_eq!(f.universe.world_items(world).unwrap().len(), 3);
    }

    #[test]
    fn test_remove_product_removes_subtree_and_clears_exact_anchors() {
        let f = fixture(8);
        let world = f.universe.add_world("main", 0, 0, 640, 480).unwrap();
        let root = f.universe.add_assembly("root", world, None).unwrap();
        let child = f.universe.add_assembly("child", world, Some(root)).unwrap();
        let grandchild = f
            .universe
            .add_assembly("grandchild", world, Some(child))
            .unwrap();
        let other = f.universe.add_assembly("other", world, None).unwrap();

        let anchored = f.universe.add_lamp("anchored", world, LampKind::Spot).unwrap();
        let unrelated = f.universe.add_lamp("unrelated", world, LampKind::Spot).unwrap();
        f.universe.set_lamp_anchor(anchored, Some(child)).unwrap();
        f.universe.set_lamp_anchor(unrelated, Some(other)).unwrap();

        f.universe.remove_product(root).unwrap();

        // Exactly N + 1 = 3 products removed, the unrelated one survives
        assert_eq!(f.universe.product_count(), 1);
        for key in [root, child, grandchild] {
            assert!(!f.universe.contains(ElementId::Product(key)));
        }
        assert!(f.universe.contains(ElementId::Product(other)));

        let state = f.universe.shared.lock().unwrap();
        assert_eq!(state.registry.lamps[anchored].anchor(), None);
        assert_eq!(state.registry.lamps[unrelated].anchor(), Some(other));
    }

    #[test]
    fn test_concurrent_texture_loads_cache_one_entry() {
        let f = fixture_with_texture_source(8, 64, 64, Duration::from_millis(30));
        let a = f.universe.clone();
        let b = f.universe.clone();

        let ta = std::thread::spawn(move || a.load_texture("d/steel"));
        let tb = std::thread::spawn(move || b.load_texture("d/steel"));

        // Both callers observe success; the loser discarded its duplicate
        ta.join().unwrap().unwrap();
        tb.join().unwrap().unwrap();
        assert_eq!(f.universe.texture_count(), 1);
    }

    #[test]
    fn test_render_frame_never_blocks_and_draws_stale_snapshot() {
        let mut f = fixture(8);
        let mut pipeline = RecordingPipeline::new();
        let red = rgba(1.0, 0.0, 0.0, 1.0);
        let blue = rgba(0.0, 0.0, 1.0, 1.0);

        f.universe.set_background_color(red);
        f.renderer.render_frame(&mut pipeline, 640, 480);
        assert_eq!(last_background(&pipeline), Some(red));

        // A mutator holds the data lock; stage a change behind its back
        let mut guard = f.universe.shared.lock().unwrap();
        guard.background.set(blue);

        pipeline.clear_calls();
        let started = Instant::now();
        f.renderer.render_frame(&mut pipeline, 640, 480);
        assert!(started.elapsed() < Duration::from_secs(1));

        // Frame completed from the previous committed snapshot
        assert_eq!(last_background(&pipeline), Some(red));

        drop(guard);
        pipeline.clear_calls();
        f.renderer.render_frame(&mut pipeline, 640, 480);
        assert_eq!(last_background(&pipeline), Some(blue));
    }

    #[test]
    fn test_lamp_units_stay_contiguous_across_removals() {
        let mut f = fixture(8);
        let mut pipeline = RecordingPipeline::new();
        let world = f.universe.add_world("main", 0, 0, 640, 480).unwrap();
        let a = f.universe.add_lamp("a", world, LampKind::Celestial).unwrap();
        let b = f.universe.add_lamp("b", world, LampKind::Celestial).unwrap();
        let c = f.universe.add_lamp("c", world, LampKind::Celestial).unwrap();

        f.renderer.render_frame(&mut pipeline, 640, 480);
        let mut units: Vec<u32> = [a, b, c]
            .iter()
            .map(|&k| f.universe.lamp_unit(k).unwrap())
            .collect();
        units.sort_unstable();
        assert_eq!(units, vec![0, 1, 2]);

        f.universe.remove_lamp(b).unwrap();
        f.renderer.render_frame(&mut pipeline, 640, 480);
        let mut units: Vec<u32> = [a, c]
            .iter()
            .map(|&k| f.universe.lamp_unit(k).unwrap())
            .collect();
        units.sort_unstable();
        assert_eq!(units, vec![0, 1]);
    }

    #[test]
    fn test_refer_lamp_aliases_without_second_entry() {
        let f = fixture(8);
        let w1 = f.universe.add_world("w1", 0, 0, 640, 480).unwrap();
        let w2 = f.universe.add_world("w2", 0, 0, 640, 480).unwrap();
        let lamp = f.universe.add_lamp("sun", w1, LampKind::Celestial).unwrap();

        f.universe.refer_lamp_to_world(lamp, w2).unwrap();
        assert_eq!(f.universe.lamp_count(), 1);
        assert!(f.universe.world_items(w2).unwrap().contains(&ElementId::Lamp(lamp)));

        // A second reference into the same world is rejected
        assert!(matches!(
            f.universe.refer_lamp_to_world(lamp, w2),
            Err(UniverseError::Duplicate(_))
        ));
    }

    #[test]
    fn test_material_survives_until_last_referencing_part_is_removed() {
        let f = fixture(8);
        let world = f.universe.add_world("main", 0, 0, 640, 480).unwrap();
        let material = f.universe.add_material(None).unwrap();
        let p1 = f
            .universe
            .add_part("p1", world, "hull", Some(material), None)
            .unwrap();
        let p2 = f
            .universe
            .add_part("p2", world, "hull", Some(material), None)
            .unwrap();

        f.universe.remove_product(p1).unwrap();
        assert!(f.universe.contains(ElementId::Material(material)));

        f.universe.remove_product(p2).unwrap();
        assert!(!f.universe.contains(ElementId::Material(material)));
        assert_eq!(f.universe.material_count(), 0);
    }

    #[test]
    fn test_part_mesh_lazy_loads_once_and_is_shared() {
        let f = fixture(8);
        let world = f.universe.add_world("main", 0, 0, 640, 480).unwrap();

        f.universe
            .add_part("p1", world, "hull.obj", None, None)
            .unwrap();
        assert_eq!(f.universe.mesh_count(), 1);

        // Same mesh name (with or without extension) reuses the cache
        f.universe.add_part("p2", world, "hull", None, None).unwrap();
        assert_eq!(f.universe.mesh_count(), 1);

        assert!(matches!(
            f.universe.add_part("p3", world, "missing", None, None),
            Err(UniverseError::NotFound(_))
        ));
        assert_eq!(f.universe.product_count(), 2);
    }

    #[test]
    fn test_non_power_of_two_texture_is_rejected() {
        let f = fixture_with_texture_source(8, 100, 64, Duration::ZERO);
        assert!(matches!(
            f.universe.load_texture("d/steel"),
            Err(UniverseError::ResourceInvalid(_))
        ));
        assert_eq!(f.universe.texture_count(), 0);
    }

    #[test]
    fn test_reparent_revalidates_depth_and_rejects_cycles() {
        let f = fixture(2);
        let world = f.universe.add_world("main", 0, 0, 640, 480).unwrap();
        let root = f.universe.add_assembly("root", world, None).unwrap();
        let a = f.universe.add_assembly("a", world, Some(root)).unwrap();
        let b = f.universe.add_assembly("b", world, Some(a)).unwrap();
        let c = f.universe.add_assembly("c", world, None).unwrap();

        // c under b would sit at level 3
        assert!(matches!(
            f.universe.set_product_parent(c, Some(b)),
            Err(UniverseError::DepthExceeded { .. })
        ));

        // root under its own grandchild is a cycle
        assert!(matches!(
            f.universe.set_product_parent(root, Some(b)),
            Err(UniverseError::InvalidArgument(_))
        ));

        // Detaching b makes it a root and relevels it
        f.universe.set_product_parent(b, None).unwrap();
        assert_eq!(f.universe.product_level(b), Some(0));
    }

    #[test]
    fn test_loading_flag_drives_overlay() {
        let mut f = fixture(8);
        let mut pipeline = RecordingPipeline::new();

        {
            let mut state = f.universe.shared.lock().unwrap();
            state.loading.set(true);
            state.registry.mark_changed(ChangeMask::SETTINGS);
        }
        f.renderer.render_frame(&mut pipeline, 640, 480);
        assert!(pipeline
            .calls
            .iter()
            .any(|c| matches!(c, PipelineCall::DrawLoadingOverlay { .. })));

        {
            let mut state = f.universe.shared.lock().unwrap();
            state.loading.set(false);
            state.registry.mark_changed(ChangeMask::SETTINGS);
        }
        pipeline.clear_calls();
        f.renderer.render_frame(&mut pipeline, 640, 480);
        assert!(!pipeline
            .calls
            .iter()
            .any(|c| matches!(c, PipelineCall::DrawLoadingOverlay { .. })));
    }

    #[test]
    fn test_world_dimension_bounds_are_enforced() {
        let f = fixture(8);
        assert!(matches!(
            f.universe.add_world("tiny", 0, 0, 10, 480),
            Err(UniverseError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.universe.add_world("huge", 0, 0, 640, 1_000_000),
            Err(UniverseError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_part_draw_reaches_pipeline_after_sync() {
        let mut f = fixture(8);
        let mut pipeline = RecordingPipeline::new();
        let world = f.universe.add_world("main", 0, 0, 640, 480).unwrap();
        f.universe
            .add_part("p1", world, "hull", None, None)
            .unwrap();

        f.renderer.render_frame(&mut pipeline, 640, 480);
        assert_eq!(pipeline.draw_count(), 1);

        // A contended follow-up frame still draws the part from the snapshot
        let guard = f.universe.shared.lock().unwrap();
        pipeline.clear_calls();
        f.renderer.render_frame(&mut pipeline, 640, 480);
        drop(guard);
        assert_eq!(pipeline.draw_count(), 1);
    }
}
