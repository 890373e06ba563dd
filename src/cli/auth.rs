use super::App;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::session::{AuthProvider, Session};
use crate::sheets::{GoogleAuth, clear_sheets_tokens};
use crate::store::FileStore;
use chrono::Utc;
use tracing::info;

pub(super) async fn sign_in(reset: bool) -> Result<()> {
    if reset {
        clear_sheets_tokens()?;
    }

    let app = App::open(false).await?;
    let auth = GoogleAuth::new(&app.config.google);

    let grant = auth
        .request_interactive_sign_in()
        .await?
        .ok_or_else(|| AppError::Auth("Google did not return an access token".to_string()))?;
    let token = Session::record(app.store.as_ref(), &grant, Utc::now())?;

    info!("Google authentication verified");

    app.use_token(&token);
    app.replay_queue().await;

    Ok(())
}

pub(super) async fn sign_out() -> Result<()> {
    let store = FileStore::open(Config::state_file()?)?;
    Session::sign_out(&store)?;
    clear_sheets_tokens()?;

    info!("Signed out");

    Ok(())
}
