pub mod auth;
pub mod backup;
pub mod client;
pub mod config;
pub mod db;
pub mod http;
pub mod ipc;
pub mod mail;
pub mod model;
