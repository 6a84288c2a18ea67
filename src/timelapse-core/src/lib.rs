//! Timelapse Core Library
//!
//! Configuration and logging shared by the `timelapse` command line.

pub mod config;
pub mod colored_logger;
