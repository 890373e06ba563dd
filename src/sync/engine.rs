use crate::error::{AppError, Result};
use crate::models::{Expense, SheetRef, ToSheetRow};
use crate::session::Session;
use crate::sheets::SheetOperations;
use crate::store::KeyValueStore;
use crate::sync::page_cache::{PageLoad, RemotePageCache};
use crate::sync::queue::PendingQueue;
use crate::view::ExpenseView;
use indicatif::ProgressStyle;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{Span, debug, info, instrument, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

#[derive(Debug)]
pub enum SubmitOutcome {
    /// Appended to the sheet and shown at the top of the list
    Written,
    /// Offline or signed out, kept locally
    Queued { pending: usize },
    /// The append failed, so the expense was kept locally instead
    QueuedAfterFailure { pending: usize, error: AppError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Empty,
    /// Offline or signed out; the queue is left for the next transition
    Skipped,
    AlreadyRunning,
    Drained(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMore {
    Loaded(usize),
    EndOfData,
    Busy,
    Unavailable,
}

/// Single-flight marker; the guard releases it on drop, including when a future is abandoned.
#[derive(Default)]
struct BusyFlag(AtomicBool);

struct BusyGuard<'a>(&'a AtomicBool);

impl BusyFlag {
    fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(&self.0))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Decides per submission whether to write through or queue, and replays the queue once the
/// sheet is reachable again. Shared between tasks behind an `Arc`.
pub struct ReconcileEngine<R, K> {
    remote: R,
    store: Arc<K>,
    queue: PendingQueue<K>,
    page_size: u32,
    cache: Mutex<RemotePageCache>,
    online: AtomicBool,
    authenticated: AtomicBool,
    loading_more: BusyFlag,
    draining: BusyFlag,
}

impl<R, K> ReconcileEngine<R, K>
where
    R: SheetOperations + Send + Sync,
    K: KeyValueStore,
{
    pub fn new(remote: R, store: Arc<K>, page_size: u32) -> Self {
        Self {
            remote,
            queue: PendingQueue::new(store.clone()),
            store,
            page_size,
            cache: Mutex::new(RemotePageCache::default()),
            online: AtomicBool::new(false),
            authenticated: AtomicBool::new(false),
            loading_more: BusyFlag::default(),
            draining: BusyFlag::default(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    fn can_reach_remote(&self) -> bool {
        self.is_online() && self.is_authenticated()
    }

    fn selection(&self) -> Result<SheetRef> {
        SheetRef::require(self.store.as_ref())
    }

    /// Record connectivity; true when this was a transition to online.
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::AcqRel);
        online && !was_online
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::Release);
    }

    /// Connectivity event. Going online replays the queue.
    pub async fn on_connectivity(&self, online: bool) -> Result<Option<DrainOutcome>> {
        if !self.set_online(online) {
            return Ok(None);
        }
        info!("Back online");
        self.drain_queue().await.map(Some)
    }

    /// A token was obtained or refreshed. Replays the queue.
    pub async fn on_authenticated(&self) -> Result<DrainOutcome> {
        self.set_authenticated(true);
        self.drain_queue().await
    }

    #[instrument(name = "Signing out", skip_all)]
    pub async fn sign_out(&self) -> Result<()> {
        self.set_authenticated(false);
        self.cache.lock().await.reset();
        Session::sign_out(self.store.as_ref())
    }

    /// Sign out when `error` is a rejected session. A failure to do so is logged so that the
    /// caller still reports the original error.
    async fn sign_out_after(&self, error: &AppError) {
        if !error.is_auth_expired() {
            return;
        }
        warn!("Session rejected by Google Sheets, signing out");
        if let Err(e) = self.sign_out().await {
            warn!("Failed to clear stored session: {}", e);
        }
    }

    #[instrument(name = "Submitting expense", skip_all)]
    pub async fn submit(&self, expense: Expense) -> Result<SubmitOutcome> {
        let sheet = self.selection()?;

        if !self.can_reach_remote() {
            let pending = self.queue.enqueue(&expense)?;
            info!(pending, "Expense saved locally until back online");
            return Ok(SubmitOutcome::Queued { pending });
        }

        match self.remote.append_row(&sheet, expense.to_sheet_row()).await {
            Ok(()) => {
                self.cache.lock().await.prepend_local(expense);
                Ok(SubmitOutcome::Written)
            }
            Err(error) => {
                let pending = self.queue.enqueue(&expense)?;
                warn!(pending, "Append failed, expense saved locally: {}", error);
                self.sign_out_after(&error).await;
                Ok(SubmitOutcome::QueuedAfterFailure { pending, error })
            }
        }
    }

    /// Replay every pending expense in submission order. Any failure aborts the drain and
    /// leaves the queue untouched; full success clears it and re-fetches the first page.
    #[instrument(name = "Syncing pending expenses", skip_all)]
    pub async fn drain_queue(&self) -> Result<DrainOutcome> {
        let Some(_draining) = self.draining.try_acquire() else {
            debug!("Drain already in progress");
            return Ok(DrainOutcome::AlreadyRunning);
        };

        let pending = self.queue.peek_all()?;
        if pending.is_empty() {
            return Ok(DrainOutcome::Empty);
        }

        if !self.can_reach_remote() {
            debug!(pending = pending.len(), "Sheet unreachable, keeping queue");
            return Ok(DrainOutcome::Skipped);
        }

        let sheet = self.selection()?;

        let span = Span::current();
        span.pb_set_style(
            &ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
            )
            .map_err(|e| AppError::Other(e.into()))?,
        );
        span.pb_set_message("Syncing pending expenses");
        span.pb_set_length(pending.len() as u64);

        for (idx, expense) in pending.iter().enumerate() {
            if let Err(error) = self.remote.append_row(&sheet, expense.to_sheet_row()).await {
                self.sign_out_after(&error).await;
                return Err(AppError::DrainPartialFailure {
                    failed_at: idx + 1,
                    pending: pending.len(),
                    source: Box::new(error),
                });
            }
            span.pb_inc(1);
        }

        self.queue.clear_drained(&pending)?;
        info!(synced = pending.len(), "Pending expenses synced");

        // Cached rows no longer line up with the remote total
        if let Err(e) = self.load_expenses().await {
            warn!("Failed to refresh expenses after sync: {}", e);
        }

        Ok(DrainOutcome::Drained(pending.len()))
    }

    /// Reload the newest page. Keeps the cached list when offline or signed out.
    pub async fn load_expenses(&self) -> Result<()> {
        let sheet = self.selection()?;

        if !self.can_reach_remote() {
            debug!("Sheet unreachable, keeping cached expenses");
            return Ok(());
        }

        let result = {
            let mut cache = self.cache.lock().await;
            cache
                .load_first_page(&self.remote, &sheet, self.page_size)
                .await
        };

        if let Err(error) = result {
            self.sign_out_after(&error).await;
            return Err(error);
        }

        Ok(())
    }

    /// Fetch the next older page. Re-entrant calls are ignored while one is in flight.
    pub async fn load_more(&self) -> Result<LoadMore> {
        let Some(_loading) = self.loading_more.try_acquire() else {
            debug!("Page load already in progress");
            return Ok(LoadMore::Busy);
        };

        let sheet = self.selection()?;

        if !self.can_reach_remote() {
            return Ok(LoadMore::Unavailable);
        }

        let result = {
            let mut cache = self.cache.lock().await;
            cache
                .load_next_page(&self.remote, &sheet, self.page_size)
                .await
        };

        match result {
            Ok(PageLoad::Loaded(count)) => Ok(LoadMore::Loaded(count)),
            Ok(PageLoad::EndOfData) => Ok(LoadMore::EndOfData),
            Err(error) => {
                self.sign_out_after(&error).await;
                Err(error)
            }
        }
    }

    pub async fn spreadsheet_title(&self) -> Result<Option<String>> {
        let sheet = self.selection()?;

        if !self.can_reach_remote() {
            return Ok(None);
        }

        match self.remote.spreadsheet_title(&sheet.spreadsheet_id).await {
            Ok(title) => Ok(title),
            Err(error) => {
                self.sign_out_after(&error).await;
                Err(error)
            }
        }
    }

    pub fn pending(&self) -> Result<Vec<Expense>> {
        self.queue.peek_all()
    }

    /// Pending entries plus the cached remote page, ready for display.
    pub async fn view(&self) -> Result<ExpenseView> {
        let pending = self.queue.peek_all()?;
        let cache = self.cache.lock().await;
        Ok(ExpenseView {
            pending,
            synced: cache.expenses().to_vec(),
            total: cache.total(),
            has_more: cache.has_more(),
        })
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    use super::*;
    use crate::sheets::test_helpers::MockSheets;
    use crate::store::test_helpers::MemoryStore;
    use crate::store::{SESSION_TOKEN, USER_HAS_SIGNED_IN};

    pub(crate) type TestEngine = ReconcileEngine<MockSheets, MemoryStore>;

    /// Engine with a selected sheet and a signed-in session.
    pub(crate) fn engine_against_mocks(
        remote: &MockSheets,
        online: bool,
    ) -> (Arc<TestEngine>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        SheetRef::new("spreadsheet", "Expenses")
            .save(store.as_ref())
            .unwrap();
        store.set(USER_HAS_SIGNED_IN, "true").unwrap();
        store
            .set(
                SESSION_TOKEN,
                r#"{"accessToken":"ya29","expirationTime":4102444800000}"#,
            )
            .unwrap();

        let engine = ReconcileEngine::new(remote.clone(), store.clone(), 5);
        engine.set_online(online);
        engine.set_authenticated(true);
        (Arc::new(engine), store)
    }
}
