pub mod analysis;
pub mod signature;
pub mod voice;

pub use analysis::*;
pub use signature::*;
pub use voice::*;
