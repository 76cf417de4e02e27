pub mod clip;
pub mod compositor;
pub mod content;
pub mod gpu;
pub mod input;
pub mod manager;
pub mod menu;
pub mod render;
pub mod skin;
pub mod theme;
pub mod tree;
pub mod widgets;
