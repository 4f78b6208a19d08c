pub mod network;
pub mod timers;
