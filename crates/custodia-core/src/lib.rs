pub mod account;
pub mod bonus;
pub mod config;
pub mod constants;
pub mod entity;
pub mod error;
pub mod notification;
pub mod opstate;
pub mod session;
pub mod types;
pub mod value;
pub mod wallet;

pub use account::*;
pub use bonus::*;
pub use config::*;
pub use constants::*;
pub use entity::Entity;
pub use error::{CustodiaError, ErrorKind};
pub use notification::*;
pub use opstate::*;
pub use session::*;
pub use types::*;
pub use value::Value;
pub use wallet::*;
