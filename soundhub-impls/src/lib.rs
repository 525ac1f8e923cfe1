mod storages;

pub use storages::*;
