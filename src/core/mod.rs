//! Core types shared by every module: the error taxonomy and record accessors.

pub mod error;
pub mod record;

pub use error::{ErrorContext, RemoteImagesError, user_friendly_error};
pub use record::{FieldArity, record_id, record_type};
