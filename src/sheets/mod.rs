mod auth;
mod client;

pub use auth::GoogleAuth;
pub use auth::clear_tokens as clear_sheets_tokens;
pub use client::{AccessToken, SheetsClient};

use crate::error::Result;
use crate::models::SheetRef;
use async_trait::async_trait;

/// First sheet row holding data; row 1 is the header.
pub const FIRST_DATA_ROW: u32 = 2;

/// Inclusive, 1-indexed range of sheet rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSpan {
    pub first: u32,
    pub last: u32,
}

#[async_trait]
pub trait SheetOperations {
    /// Number of data rows below the header.
    async fn count_rows(&self, sheet: &SheetRef) -> Result<u32>;

    /// Expense columns of the given rows, in sheet order (oldest first).
    async fn read_rows(&self, sheet: &SheetRef, rows: RowSpan) -> Result<Vec<Vec<String>>>;

    async fn append_row(&self, sheet: &SheetRef, row: Vec<String>) -> Result<()>;

    async fn spreadsheet_title(&self, spreadsheet_id: &str) -> Result<Option<String>>;
}

/// Quote a sheet name for A1 notation.
pub(crate) fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}
