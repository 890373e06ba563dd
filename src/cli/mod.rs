mod auth;
mod expenses;
mod select;
mod show;
mod watch;

use crate::config::Config;
use crate::error::Result;
use crate::session::{Session, SessionToken};
use crate::sheets::{AccessToken, GoogleAuth, SheetsClient};
use crate::store::FileStore;
use crate::sync::connectivity::ConnectivityProbe;
use crate::sync::{DrainOutcome, HttpProbe, ReconcileEngine};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use expenses::ExpenseArgs;
pub use select::SelectArgs;
pub use show::ShowResource;

#[derive(Parser, Debug)]
#[command(name = "expense-tracker")]
#[command(about = "Record expenses in a Google Sheet, even while offline", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Auth { reset } => auth::sign_in(*reset).await,
            Commands::SignOut => auth::sign_out().await,
            Commands::Select(args) => args.execute().await,
            Commands::Add(args) => args.execute().await,
            Commands::List { pages } => expenses::list(*pages).await,
            Commands::Pending => expenses::pending().await,
            Commands::Sync => expenses::sync().await,
            Commands::Details => expenses::details().await,
            Commands::Watch => watch::execute().await,
            Commands::Show { resource } => resource.execute().await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in to Google and sync anything saved while signed out
    Auth {
        /// Forget cached Google tokens first
        #[arg(long)]
        reset: bool,
    },
    /// Forget the current Google session
    SignOut,
    /// Choose the spreadsheet and sheet that expenses go to
    Select(SelectArgs),
    /// Record an expense
    Add(ExpenseArgs),
    /// List expenses, newest first
    List {
        /// Number of pages to fetch
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// List expenses not yet synced
    Pending,
    /// Sync expenses saved while offline
    Sync,
    /// Show the selected spreadsheet and its shareable link
    Details,
    /// Stay running and sync whenever the connection comes back
    Watch,
    Show {
        #[command(subcommand)]
        resource: ShowResource,
    },
}

type Engine = ReconcileEngine<SheetsClient, FileStore>;

/// Everything a command needs: config, durable state and an engine primed with the current
/// connectivity and session.
pub(crate) struct App {
    config: Config,
    store: Arc<FileStore>,
    engine: Arc<Engine>,
    token: AccessToken,
    probe: HttpProbe,
}

impl App {
    pub(crate) async fn open(offline: bool) -> Result<Self> {
        let config = Config::load()?;
        let store = Arc::new(FileStore::open(Config::state_file()?)?);
        let sheets = SheetsClient::new()?;
        let token = sheets.token();
        let engine = Arc::new(ReconcileEngine::new(
            sheets,
            store.clone(),
            config.view.page_size,
        ));

        let probe = HttpProbe::new(&config.connectivity)?;
        let online = !offline && probe.is_online().await;
        if !online {
            info!("Offline, expenses will be saved locally");
        }
        engine.set_online(online);

        Ok(Self {
            config,
            store,
            engine,
            token,
            probe,
        })
    }

    /// Open and pick up an existing session, then sync anything queued.
    pub(crate) async fn resume(offline: bool) -> Result<Self> {
        let app = Self::open(offline).await?;

        if app.restore_session().await? {
            app.replay_queue().await;
        }

        Ok(app)
    }

    /// Use a stored or silently refreshed session, if there is one. True when signed in.
    pub(crate) async fn restore_session(&self) -> Result<bool> {
        let auth = GoogleAuth::new(&self.config.google);
        match Session::resume(self.store.as_ref(), &auth, Utc::now()).await? {
            Some(token) => {
                self.use_token(&token);
                Ok(true)
            }
            None => {
                debug!("Not signed in");
                Ok(false)
            }
        }
    }

    /// Hand a session token to the Sheets client.
    pub(crate) fn use_token(&self, token: &SessionToken) {
        self.token.set(Some(token.access_token.clone()));
    }

    /// Mark the engine signed in and replay the queue. Failures leave the queue for the next
    /// attempt.
    pub(crate) async fn replay_queue(&self) {
        match self.engine.on_authenticated().await {
            Ok(DrainOutcome::Drained(count)) => info!(count, "Synced pending expenses"),
            Ok(_) => {}
            Err(e) => warn!("Failed to sync pending expenses: {}", e),
        }
    }
}
