pub mod chunk;
pub mod coords;
pub mod generator;
pub mod service;
pub mod store;
