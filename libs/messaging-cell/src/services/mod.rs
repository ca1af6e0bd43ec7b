pub mod notifier;
pub mod payments;

pub use notifier::*;
pub use payments::*;
