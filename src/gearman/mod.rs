pub mod client;
pub mod protocol;
pub mod worker;

pub use client::BackgroundClient;
pub use worker::Worker;
