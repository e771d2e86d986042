//! Application services layer.

pub mod access;
pub mod echoes;
pub mod error;
pub mod events;
pub mod generator;
pub mod pagination;
pub mod recommend;
pub mod repos;
pub mod service;
pub mod summary;
