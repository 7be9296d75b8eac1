pub mod config;
pub mod error;
pub mod landmark;
pub mod measure;
pub mod pipeline;
pub mod proportion;
pub mod reconstruct;
pub mod scale;
pub mod validate;
