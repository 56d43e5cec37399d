/*!
 * Core Module
 * Fundamental sandbox types, error codes and limits
 */

pub mod clock;
pub mod errors;
pub mod limits;
pub mod serde;
pub mod types;

// Re-export for convenience
pub use errors::*;
pub use types::*;
