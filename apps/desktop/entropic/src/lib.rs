// Library exports for testing
// The binary (main.rs) imports these as well

pub mod error;
pub mod host;
pub mod logger;

#[cfg(test)]
mod tests;

/// Directory name under the platform config, data and cache dirs.
pub const APP_DIR_NAME: &str = "entropic";
