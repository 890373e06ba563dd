use super::App;
use crate::error::{AppError, Result};
use crate::models::{Expense, SheetRef};
use crate::sheets::SheetOperations;
use crate::store::KeyValueStore;
use crate::sync::{DrainOutcome, LoadMore, ReconcileEngine, SubmitOutcome};
use crate::view::ExpenseView;
use chrono::{Local, NaiveDate};
use clap::Args;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{info, warn};

const SIGN_IN_HINT: &str = "Run `expense-tracker auth` to sign in again";

#[derive(Args, Debug)]
pub struct ExpenseArgs {
    /// What the money was spent on
    #[arg(long)]
    name: String,

    #[arg(long)]
    category: String,

    /// Amount, kept exactly as typed
    #[arg(long, value_parser = parse_price)]
    price: String,

    /// Defaults to today
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Save locally without contacting Google
    #[arg(long)]
    offline: bool,
}

fn parse_price(value: &str) -> std::result::Result<String, String> {
    let value = value.trim();
    Decimal::from_str(value)
        .map(|_| value.to_string())
        .map_err(|e| format!("not a valid amount: {}", e))
}

impl ExpenseArgs {
    fn to_expense(&self) -> Expense {
        let date = self.date.unwrap_or_else(|| Local::now().date_naive());
        Expense {
            date: date.format("%Y-%m-%d").to_string(),
            name: self.name.clone(),
            category: self.category.clone(),
            price: self.price.clone(),
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let app = App::resume(self.offline).await?;

        match app.engine.submit(self.to_expense()).await? {
            SubmitOutcome::Written => info!("Expense saved"),
            SubmitOutcome::Queued { pending } => {
                info!(pending, "Expense saved locally, it will sync once back online")
            }
            SubmitOutcome::QueuedAfterFailure { pending, error } => {
                warn!(pending, "Could not reach Google Sheets, expense saved locally: {}", error);
                if error.is_auth_expired() {
                    warn!("{}", SIGN_IN_HINT);
                }
            }
        }

        Ok(())
    }
}

pub(super) async fn list(pages: u32) -> Result<()> {
    let app = App::resume(false).await?;
    print!("{}", collect_view(app.engine.as_ref(), pages).await?);

    Ok(())
}

/// Refresh up to `pages` pages, then project. A failed refresh is logged and the last
/// known list, pending entries included, is still returned.
async fn collect_view<R, K>(engine: &ReconcileEngine<R, K>, pages: u32) -> Result<ExpenseView>
where
    R: SheetOperations + Send + Sync,
    K: KeyValueStore,
{
    match load_pages(engine, pages).await {
        Ok(()) => {}
        Err(AppError::MissingSheetSelection) => return Err(AppError::MissingSheetSelection),
        Err(e) => {
            warn!("Could not refresh expenses from Google Sheets: {}", e);
            if e.is_auth_expired() {
                warn!("{}", SIGN_IN_HINT);
            }
        }
    }

    engine.view().await
}

async fn load_pages<R, K>(engine: &ReconcileEngine<R, K>, pages: u32) -> Result<()>
where
    R: SheetOperations + Send + Sync,
    K: KeyValueStore,
{
    engine.load_expenses().await?;

    for _ in 1..pages {
        match engine.load_more().await? {
            LoadMore::Loaded(_) | LoadMore::Busy => {}
            LoadMore::EndOfData | LoadMore::Unavailable => break,
        }
    }

    Ok(())
}

pub(super) async fn pending() -> Result<()> {
    let app = App::open(true).await?;
    let pending = app.engine.pending()?;

    if pending.is_empty() {
        info!("Nothing waiting to sync");
        return Ok(());
    }

    for expense in &pending {
        println!("{} (Not Synced)", expense);
    }

    Ok(())
}

pub(super) async fn sync() -> Result<()> {
    let app = App::open(false).await?;

    if app.restore_session().await? {
        app.engine.set_authenticated(true);
    }

    sync_now(app.engine.as_ref()).await
}

/// Replay the queue and fail if a reachable sheet rejected any of it.
async fn sync_now<R, K>(engine: &ReconcileEngine<R, K>) -> Result<()>
where
    R: SheetOperations + Send + Sync,
    K: KeyValueStore,
{
    if !engine.is_online() {
        let pending = engine.pending()?.len();
        warn!(pending, "Offline, pending expenses kept locally");
        return Ok(());
    }

    if !engine.is_authenticated() {
        let pending = engine.pending()?.len();
        warn!(pending, "Not signed in, run `expense-tracker auth` first");
        return Ok(());
    }

    match engine.drain_queue().await {
        Ok(DrainOutcome::Drained(count)) => info!(count, "Synced pending expenses"),
        Ok(DrainOutcome::Empty) => info!("Nothing waiting to sync"),
        Ok(DrainOutcome::AlreadyRunning | DrainOutcome::Skipped) => {
            warn!(pending = engine.pending()?.len(), "Expenses still waiting to sync");
        }
        Err(e) => {
            if e.is_auth_expired() {
                warn!("{}", SIGN_IN_HINT);
            }
            return Err(e);
        }
    }

    Ok(())
}

pub(super) async fn details() -> Result<()> {
    let app = App::resume(false).await?;
    let sheet = SheetRef::require(app.store.as_ref())?;

    match app.engine.spreadsheet_title().await? {
        Some(title) => info!("Sheet: {} / {}", title, sheet.sheet_name),
        None => info!("Sheet: {}", sheet.sheet_name),
    }
    info!(url = %sheet.spreadsheet_url(), "Spreadsheet");

    match &app.config.share.base_url {
        Some(base_url) => info!(link = %sheet.share_link(base_url)?, "Shareable link"),
        None => info!("Set share.base_url in the config file to get a shareable link"),
    }

    Ok(())
}
