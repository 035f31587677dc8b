//! Build script for mobility-storage.
//!
//! Rebuilds the crate when database migrations change.

fn main() {
    println!("cargo:rerun-if-changed=migrations");
}
