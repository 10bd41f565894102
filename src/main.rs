// This binary crate is intentionally minimal.
// All topology logic lives in the library (src/lib.rs and its modules).
// Run demos with:
//   cargo run --example dense
fn main() {
    println!("lamina-nn: an incremental network-topology builder in Rust.");
    println!("Run `cargo run --example dense` to compose a small topology end to end.");
}
