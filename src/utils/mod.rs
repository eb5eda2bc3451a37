pub mod anomaly;
pub mod config;
pub mod cost_explorer;
pub mod database;
pub mod generator;
pub mod graph;
pub mod organizations;
pub mod slack;
