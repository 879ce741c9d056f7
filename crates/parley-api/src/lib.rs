pub mod frames;
pub mod types;
pub mod validation;
