//! Console domain: navigation gating, event documents and the events grid

pub mod events;
pub mod grid;
pub mod images;
pub mod nav;
pub mod value;
