pub mod automation;
pub mod conversation;
pub mod deal;
pub mod strategy;
pub mod task;
pub mod upload;
