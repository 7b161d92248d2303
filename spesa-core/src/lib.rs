//! Spesa Core - Domain Records
//!
//! Pure data structures shared by the sync layer and the client. No I/O and
//! no caching logic lives here.

mod entities;
mod error;
mod identity;

pub use entities::*;
pub use error::{ApiFailure, FIELD_MESSAGE_SEPARATOR};
pub use identity::{ItemId, OfferId, Timestamp, UserId, TEMP_ID_PREFIX};
