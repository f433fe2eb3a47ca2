pub mod config;
pub mod engine;
pub mod pool;
pub mod random;
pub mod sampling;
pub mod template;
pub mod validate;
