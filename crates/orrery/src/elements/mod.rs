//! Scene element kinds and their typed arena keys
//!
//! Every live object belongs to exactly one element registry and is
//! addressed by a stable generational key. A key survives arbitrary
//! insertions and removals of other elements and can never be confused
//! with a key of another kind.

pub mod figure;
pub mod lamp;
pub mod label;
pub mod material;
pub mod mesh;
pub mod product;
pub mod texture;
pub mod world;

pub use figure::{Figure, FigureMode};
pub use lamp::{Lamp, LampKind, LampParams};
pub use label::Label;
pub use material::{Material, MaterialParams};
pub use mesh::MeshData;
pub use product::{Product, ProductKind};
pub use texture::{Texture, TextureImage, TextureKind};
pub use world::{CameraView, Projection, Viewport, World};

slotmap::new_key_type! {
    /// Key of a rendering world
    pub struct WorldKey;

    /// Key of a light source
    pub struct LampKey;

    /// Key of a product node (assembly or part)
    pub struct ProductKey;

    /// Key of a figure (polyline object)
    pub struct FigureKey;

    /// Key of a billboard label
    pub struct LabelKey;

    /// Key of a shared material
    pub struct MaterialKey;
}

/// Tagged identity of any registered element
///
/// Used wherever a heterogeneous reference is needed: world content
/// lists, alien-matrix dependent sets, and registry membership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementId {
    /// A rendering world
    World(WorldKey),
    /// A light source
    Lamp(LampKey),
    /// A product node
    Product(ProductKey),
    /// A figure
    Figure(FigureKey),
    /// A label
    Label(LabelKey),
    /// A material
    Material(MaterialKey),
}
