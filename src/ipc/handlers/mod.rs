pub mod admin;
pub mod auth;
pub mod catalog;
pub mod claims;
pub mod core;
pub mod exams;
pub mod groups;
pub mod modules;
pub mod notifications;
pub mod rooms;
pub mod users;
