//! Terminal status view for a running gesture session.

mod error;
mod session_view;

pub use error::GuiError;
pub use session_view::{draw, run_session_view, ViewState};
