pub mod db;
pub mod server;
pub mod services;
pub mod validation;
pub mod web;
