//! Integration tests for the school library server

mod api_tests;
mod lifecycle_tests;
