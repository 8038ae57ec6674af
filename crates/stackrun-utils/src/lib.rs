pub mod exit_codes;
pub mod logging;
pub mod types;

pub use exit_codes::ExitCode;
pub use types::Phase;
