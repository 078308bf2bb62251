pub mod classify_types;
