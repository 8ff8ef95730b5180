pub mod config;
pub mod error;
pub mod filter;
pub mod focus;
pub mod inspector;
pub mod lock;
pub mod lock_graph;
pub mod render;
pub mod snapshot;
pub mod vertex_macro;
