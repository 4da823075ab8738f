pub mod grouping;
pub mod normalizer;
pub mod types;
