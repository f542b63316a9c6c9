pub mod binding;
pub mod context;
pub mod encoder;
pub mod notifier;
pub mod output;
pub mod reconnect;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;
