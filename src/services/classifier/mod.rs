pub mod backend;
pub mod inference;
pub mod mapping;
pub mod model_manager;
