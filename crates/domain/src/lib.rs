pub mod config;
pub mod content_id;
pub mod pattern;
pub mod payable;
pub mod paywall;
pub mod preview;
