// Transaction module - The transfer payload, its signed form and its pooled form

mod builder;
mod codec;
mod model;

pub use builder::*;
pub use codec::*;
pub use model::*;
