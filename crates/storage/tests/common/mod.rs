pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{filesystem_backend, seeded_bytes};
