pub mod actor;
pub mod ai;
pub mod components;
pub mod config;
pub mod executor;
pub mod occupancy;
pub mod physics;
pub mod physics_core;
pub mod planner;
pub mod terrain;
pub mod tilemap;
pub mod trajectory;
