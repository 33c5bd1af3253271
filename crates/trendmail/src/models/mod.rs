pub mod record;
pub mod table;

pub use record::{ABSENT_MARKER, FieldValue, Record};
pub use table::{Cell, Row, Series, ShapedTable};
