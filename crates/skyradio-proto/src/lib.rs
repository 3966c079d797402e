pub mod balloons;
pub mod config;
pub mod geo;
pub mod platform;
pub mod playback;
pub mod protocol;
pub mod ranker;
pub mod refresh;
pub mod state;
pub mod stations;
