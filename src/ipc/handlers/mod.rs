pub mod core;
pub mod dashboard;
pub mod directory;
pub mod gates;
pub mod permissions;
