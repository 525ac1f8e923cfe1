mod config;
mod paths;
mod storage;
mod validation;

pub mod implementors;
pub use config::*;
pub use implementors::*;
pub use paths::*;
pub use storage::*;
pub use validation::*;
