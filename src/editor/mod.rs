//! Form editing module.
//!
//! Decodes control values, applies them to a working copy of a document and
//! returns the form fragments that need redrawing.

pub mod codec;
pub mod path;
pub mod render;
pub mod session;

// Re-exports for convenience
pub use codec::{ControlValue, FieldKind};
pub use path::{EntryList, FieldPath, RequestRef};
pub use render::{ControlView, Fragment, FragmentId, InnerTab, TabView, ViewState};
pub use session::{EditOutcome, EditorSession};
