// src/health/mod.rs
mod supervisor;

pub use supervisor::HealthSupervisor;
