mod error;
mod record;
mod value;

pub use error::{CreatedRecord, Result, StoreError};
pub use record::{Record, RecordId};
pub use value::Value;
