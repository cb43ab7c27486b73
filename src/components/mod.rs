pub mod controller;
pub mod crop_tool;
pub mod free_transform;
pub mod history;
