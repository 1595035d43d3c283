//! DriveChat front ends: an interactive terminal loop and a browser UI over
//! the [`drivechat_rag`] pipeline.

pub mod chat;
pub mod config;
pub mod services;
pub mod telemetry;
pub mod web;
