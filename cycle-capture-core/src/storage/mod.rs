pub mod bundle_builder;
pub mod metadata;
