// Coordination core for human-in-the-loop workflow runs

pub mod consumer;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod pairing;
pub mod protocol;
pub mod sdk;
pub mod storage;
pub mod types;
pub mod utils;
pub mod workflow;
