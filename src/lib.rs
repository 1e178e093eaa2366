pub mod cli;
pub mod coerce;
pub mod collector;
pub mod config;
pub mod convert;
pub mod driver;
pub mod engine;
pub mod filter;
pub mod models;
pub mod projection;
pub mod scrape;
pub mod secrets;
pub mod tenant;
pub mod web;
