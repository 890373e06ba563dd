pub mod expense;
pub mod selection;

pub use expense::{Expense, FromSheetRows, ToSheetRow};
pub use selection::{DEFAULT_SHEET_NAME, SheetRef};
