#![deny(rust_2018_idioms)]

#[macro_use]
extern crate diesel;

pub use config::Config;

pub mod alert;
pub mod api;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod flow;
pub mod panel;
pub mod push;
pub mod session;
pub mod watch;
pub mod web;

pub type GlobalConfig = &'static Config;
pub type GlobalApiConfig = &'static api::Config;

pub(crate) fn reqwest_client() -> reqwest::Client {
    reqwest::Client::new()
}
