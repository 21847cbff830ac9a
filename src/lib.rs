pub mod agent;
pub mod branding;
pub mod config;
pub mod error;
pub mod memory;
pub mod navigation;
pub mod shell;
pub mod tabs;
