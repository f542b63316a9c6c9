pub mod config;
pub mod error;
pub mod event;
pub mod flags;
pub mod id;
pub mod media;
pub mod packet;
pub mod state;
pub mod stats;
