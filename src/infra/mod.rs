pub mod factory;
pub mod redis;
pub mod repositories;
