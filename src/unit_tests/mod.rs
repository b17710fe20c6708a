// Shared test support and end-to-end tests.
// Only compiled during tests via #[cfg(test)] in lib.rs.

pub mod fixtures;
