//! stackrun CLI binary
//!
//! All logic is in the library; main.rs only invokes cli::run().

fn main() {
    // cli::run() reports its own errors; main only maps to process exit
    if let Err(code) = stackrun::cli::run() {
        std::process::exit(code.as_i32());
    }
}
