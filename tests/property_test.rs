// tests/property_test.rs

//! Property-based tests for FleetMon
//!
//! These tests use property-based testing to verify invariants and properties
//! that should always hold, regardless of input values.

mod property {
    pub mod deobfuscate_test;
    pub mod parser_test;
    pub mod ring_test;
}
