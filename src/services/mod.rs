pub mod classifier;
pub mod fs_service;
