//! textgraph — headless generation engine for node-graph driven text.
//!
//! An author wires Start, Simple, Branch and Template nodes into a directed
//! graph; the engine validates that graph once and then walks it with an
//! injected random source, resolving weighted value pools, optional
//! inclusion, ranged multi-selection and `${key}` template interpolation.

pub mod core;
pub mod schema;
