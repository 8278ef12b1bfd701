pub mod actions;
pub mod buffer;
pub mod config;
pub mod directive;
pub mod error;
pub mod persistence;
pub mod reconcile;
pub mod reducer;
pub mod sanitize;
pub mod scanner;
pub mod state;
pub mod turn;
pub mod validate;

pub use actions::*;
pub use directive::*;
pub use error::*;
pub use reducer::*;
pub use state::*;
pub use turn::*;

pub use persistence::*;
