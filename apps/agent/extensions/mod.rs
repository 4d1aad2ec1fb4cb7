pub mod ai;
pub mod chain;
pub mod clients;
pub mod db_extension;
pub mod indexer;
pub mod twitter;
