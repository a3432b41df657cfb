//! Core data types shared across the control loop

pub mod fitness;
