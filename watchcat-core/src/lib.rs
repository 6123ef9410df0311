// src/lib.rs

pub mod db;
pub mod config;
pub mod http;
pub mod repositories;
pub mod adapters;
pub mod registry;
pub mod platforms;
pub mod services;
pub mod test_utils;

pub use db::Database;
pub use watchcat_common::error::Error;
pub use http::{DefaultHttpClient, HttpClient, HttpResponse};
