pub mod geometry;
pub mod hitbox;
pub mod material;
pub mod mesh;
pub mod scene;
