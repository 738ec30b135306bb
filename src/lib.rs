//! Extract payment transactions from arbitrary HTML pages, reconcile them
//! against passbook values and export the result.

pub mod config;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod scraper;
pub mod storage;
pub mod utils;
