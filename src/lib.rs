pub mod api;
pub mod command;
pub mod config;
pub mod middleware;
pub mod network_backend;
pub mod pages;
pub mod portal;
pub mod response;
pub mod services;
