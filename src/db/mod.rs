pub mod catalog;
#[cfg(test)]
pub(crate) mod schema;
pub mod source;

pub use catalog::MediaRecord;
pub use source::SourceLibrary;
