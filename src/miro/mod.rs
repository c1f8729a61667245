//! Miro whiteboard integration for mind maps

pub mod client;
pub mod render;

pub use client::{board_url, BoardApi, MiroClient, MiroError};
pub use render::{board_name, render_mind_map, RenderedBoard};
