pub mod adjustments;
pub mod config;
pub mod gateway;
pub mod staff;
pub mod stats;
