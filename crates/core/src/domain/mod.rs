pub mod catalog;
pub mod supplier;
