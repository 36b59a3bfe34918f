//! Type aliases for shared state.
//!
//! - [`aliases`]: `Arc<Mutex<T>>`, `Arc<RwLock<T>>` and trait-object handles.

pub mod aliases;

pub use aliases::*;
