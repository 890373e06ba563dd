use crate::error::Result;
use crate::models::{Expense, FromSheetRows, SheetRef};
use crate::sheets::{FIRST_DATA_ROW, RowSpan, SheetOperations};
use tracing::{debug, instrument, warn};

/// Outcome of asking for the next, older page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLoad {
    Loaded(usize),
    EndOfData,
}

/// Data rows (1-indexed, header excluded) covered by the next page, or `None` at end of data.
///
/// The window is `[total - offset - page_size + 1, total - offset]` clipped below at 1.
pub fn page_window(total: u32, offset: u32, page_size: u32) -> Option<(u32, u32)> {
    let last = total.saturating_sub(offset);
    let first = last.saturating_sub(page_size).saturating_add(1).max(1);
    if page_size == 0 || first > last {
        return None;
    }
    Some((first, last))
}

fn to_sheet_span((first, last): (u32, u32)) -> RowSpan {
    RowSpan {
        first: first + FIRST_DATA_ROW - 1,
        last: last + FIRST_DATA_ROW - 1,
    }
}

/// Newest-first prefix of the remote sheet fetched so far, plus the remote row count.
///
/// `expenses` always mirrors sheet rows `total ..= total - len + 1` with no gaps.
#[derive(Debug, Default)]
pub struct RemotePageCache {
    expenses: Vec<Expense>,
    total: u32,
}

impl RemotePageCache {
    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn has_more(&self) -> bool {
        (self.expenses.len() as u32) < self.total
    }

    pub fn reset(&mut self) {
        self.expenses.clear();
        self.total = 0;
    }

    /// Replace the cache with the newest `page_size` rows. The cache is only touched once
    /// every request has succeeded.
    #[instrument(name = "Loading first page", skip_all, fields(sheet = %sheet.sheet_name))]
    pub async fn load_first_page<R>(
        &mut self,
        remote: &R,
        sheet: &SheetRef,
        page_size: u32,
    ) -> Result<usize>
    where
        R: SheetOperations + Sync,
    {
        let total = remote.count_rows(sheet).await?;

        let expenses = match page_window(total, 0, page_size) {
            Some(window) => fetch_newest_first(remote, sheet, window).await?,
            None => Vec::new(),
        };

        debug!(total, fetched = expenses.len(), "Loaded first page");
        self.total = total.max(expenses.len() as u32);
        self.expenses = expenses;
        Ok(self.expenses.len())
    }

    /// Append the next `page_size` rows older than the current tail. Skips the network
    /// entirely once the cache holds every row.
    #[instrument(name = "Loading next page", skip_all, fields(sheet = %sheet.sheet_name))]
    pub async fn load_next_page<R>(
        &mut self,
        remote: &R,
        sheet: &SheetRef,
        page_size: u32,
    ) -> Result<PageLoad>
    where
        R: SheetOperations + Sync,
    {
        let offset = self.expenses.len() as u32;
        if offset >= self.total {
            return Ok(PageLoad::EndOfData);
        }

        let Some(window) = page_window(self.total, offset, page_size) else {
            return Ok(PageLoad::EndOfData);
        };

        let older = fetch_newest_first(remote, sheet, window).await?;
        if older.is_empty() {
            // Rows vanished remotely since the count was taken
            warn!(offset, total = self.total, "Expected rows were missing");
            self.total = offset;
            return Ok(PageLoad::EndOfData);
        }

        let loaded = older.len();
        self.expenses.extend(older);
        Ok(PageLoad::Loaded(loaded))
    }

    /// Record a row that was just appended remotely, without re-fetching.
    pub fn prepend_local(&mut self, expense: Expense) {
        self.expenses.insert(0, expense);
        self.total += 1;
    }
}

async fn fetch_newest_first<R>(
    remote: &R,
    sheet: &SheetRef,
    window: (u32, u32),
) -> Result<Vec<Expense>>
where
    R: SheetOperations + Sync,
{
    let rows = remote.read_rows(sheet, to_sheet_span(window)).await?;
    let mut expenses = Expense::from_sheet_rows(&rows)?;
    // Rows arrive oldest to newest
    expenses.reverse();
    Ok(expenses)
}
