/// Constants
pub mod constants;
/// Logger
pub mod logger;
/// Fixed-point amount math
pub mod math;
/// RPC providers
pub mod providers;
