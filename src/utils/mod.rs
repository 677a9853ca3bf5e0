pub mod calculation;
pub mod locks;
pub mod scratch;
pub mod shared;
