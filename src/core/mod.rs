//! Session core: event streaming, cancellation, session state, turn driving
//! and repository reconciliation.

pub mod actions;
pub mod cancel;
pub mod driver;
mod error;
pub mod reconcile;
pub mod session;
pub mod storage;
pub mod stream;
pub mod switch;
pub mod web;

pub use cancel::{CancelFlag, CancelRegister};
pub use error::{Error, Result};
pub use session::{Session, SessionHandle, SessionSnapshot, SessionStore};
pub use stream::{StreamEvent, StreamHub};
