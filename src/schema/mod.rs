pub mod document;
pub mod node;
pub mod value_spec;
