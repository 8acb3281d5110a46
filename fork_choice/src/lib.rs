pub mod oracle;
pub mod outcome;
pub mod rule;

pub use oracle::*;
pub use outcome::*;
pub use rule::*;
