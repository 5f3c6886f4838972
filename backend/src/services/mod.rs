pub mod presence;
pub mod quota;
pub mod scheduler;
pub mod voice_tracker;
