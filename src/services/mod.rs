//! Contracts for talking to the search-index service.

pub mod index_api;
