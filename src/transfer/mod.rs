pub mod engine;
pub mod faces;
pub mod geo;
pub mod ids;
pub mod keywords;
pub mod popularity;
pub mod resolver;
pub mod session;
pub mod stacks;
pub mod xmp;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{run, ImageOutcome, TransferOptions, TransferSummary};
pub use resolver::{IdentityResolver, TimestampFallbackResolver};
pub use session::{TransferSession, TransferStats};
