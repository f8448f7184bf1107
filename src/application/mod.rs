mod error;
mod notifications;
mod reporting;
mod store;

pub use error::*;
pub use notifications::*;
pub use reporting::*;
pub use store::*;
