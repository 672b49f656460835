// Pipeline processing: normalization, validation and partitioning

pub mod normalize;
pub mod partition;
pub mod validate;
