pub mod crop_overlay;
pub mod filters;
pub mod shapes;
pub mod text;
pub mod transform;
