pub mod capture_sink;
pub mod config;
pub mod error;
pub mod export_result;
pub mod graph;
pub mod sample_buffer;
pub mod state;
