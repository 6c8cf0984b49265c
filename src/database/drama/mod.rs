mod model;
pub mod normalize;

pub use model::*;
