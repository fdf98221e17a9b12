//! Query engine: relation-aware filters over the entity store.

mod expr;
mod plan;
pub use expr::*;
pub use plan::*;
