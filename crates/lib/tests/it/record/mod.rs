//! Record integration tests
//!
//! These tests drive records the way an application does: declare backend
//! views, exchange values with them, and copy, compare or export the result.

mod compare_tests;
mod copy_tests;
mod export_tests;
mod helpers;
mod structure_tests;
mod sync_tests;
