//! # cal.date payloads
//!
//! Types shared between the server and the upload clients: request and
//! response bodies, validation rules, themes, upload limits, and the
//! onboarding state machine.

pub mod error;
pub mod handle;
pub mod onboarding;
pub mod posts;
pub mod profile;
pub mod theme;
pub mod uploads;

pub use error::{ErrorBody, FieldErrors};
pub use profile::{Photo, ProfileView, Success, UpdateProfile, ValidProfile};
pub use theme::ThemeId;
