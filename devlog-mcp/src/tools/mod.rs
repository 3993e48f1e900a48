pub mod ask;
pub mod directory;
pub mod query;

pub use ask::*;
pub use directory::*;
pub use query::*;
