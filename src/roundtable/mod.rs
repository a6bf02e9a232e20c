// src/roundtable/mod.rs

pub mod agent;
pub mod callback;
pub mod chain;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod dependency_graph;
pub mod group;
pub mod memory;
pub mod orchestration;
pub mod scoring;
pub mod selector;
pub mod tool_agent;
pub mod tool_protocol;
pub mod tools;
