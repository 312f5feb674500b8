//! Domain types shared by every layer: data kinds, cell values, periods, records.

pub mod kind;
pub mod period;
pub mod record;
pub mod value;

pub use kind::{DataKind, ParseKindError};
pub use period::Period;
pub use record::{RawRecord, RecordError, TickerRecord};
pub use value::{ColumnType, Value};
