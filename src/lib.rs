pub mod app;
pub mod assembler;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod estimator;
pub mod fasta;
pub mod output;
pub mod pride;
pub mod registry;
pub mod search;
pub mod store;
pub mod tools;
pub mod uniprot;
