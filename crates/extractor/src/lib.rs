pub mod html;
pub mod normalize;

pub use html::{extract, tokenize, ExtractResult};
pub use normalize::normalize;
