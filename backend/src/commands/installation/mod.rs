pub mod crud;
pub mod lifecycle;
pub mod query;
pub mod timer;

pub use crud::*;
pub use lifecycle::*;
pub use query::*;
pub use timer::*;
