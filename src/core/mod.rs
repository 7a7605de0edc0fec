// Core primitives for CSV tokenizing

pub mod pool;
pub mod scanner;
pub mod source;

pub use pool::{FieldKind, FieldRef, PooledFields};
pub use scanner::*;
pub use source::CharSource;
