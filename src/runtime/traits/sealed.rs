// ABOUTME: Sealed marker for runtime capability traits.
// ABOUTME: Only gateways defined in this crate may implement them.

/// Implemented by the crate's own runtimes; keeps the capability traits closed
/// so methods can be added without breaking downstream code.
pub trait Sealed {}
