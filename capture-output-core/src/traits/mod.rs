pub mod encoder_backend;
pub mod media_feed;
pub mod output_delegate;
pub mod service_backend;
pub mod sink;
