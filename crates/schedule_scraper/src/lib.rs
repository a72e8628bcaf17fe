//! Keeps a queryable mirror of a university time schedule.
//!
//! Every cycle re-crawls the catalog (departments, then their classes and
//! sections) into a staging store and then flips it live, so readers always
//! see one complete snapshot.

pub mod config;
pub mod db;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod scrape;
pub mod server;
pub mod types;

#[cfg(test)]
mod test_pages;
