pub mod animation;
pub mod app;
pub mod assets;
pub mod camera;
pub mod crossing;
pub mod frame;
pub mod input;
pub mod portal;
pub mod renderer;
pub mod reticle;
pub mod settings;
pub mod spawner;
pub mod switcher;
pub mod xr;
