pub mod error;
pub mod inspector;
pub mod keys;
pub mod media_tool;
pub mod object_store;
pub mod staging;
pub mod transcoder;
pub mod upload_pipeline;
pub mod video_store;
