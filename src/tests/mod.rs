pub mod kv_tests;
pub mod coordinator_tests;
