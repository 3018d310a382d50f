//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `topichub_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    println!("topichub_core version={}", topichub_core::core_version());
}
