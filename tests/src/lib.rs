// Tenantflow Tests
//
// Meta-package for the cross-crate scenarios. The test code lives in
// `scenario_tests.rs` next to this package's Cargo.toml.
