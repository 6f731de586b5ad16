pub mod audio_graph;
pub mod cycle_clock;
pub mod hardware_context;
pub mod recorder;
