pub mod normalize;

pub use normalize::{normalize_rule, segments};
