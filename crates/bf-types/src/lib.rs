pub mod symbols;
pub mod market;
pub mod orders;
pub mod signal;
pub mod account;
pub mod events;
pub mod errors;

pub use symbols::*;
pub use market::*;
pub use orders::*;
pub use signal::*;
pub use account::*;
pub use events::*;
pub use errors::*;
