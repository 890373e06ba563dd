use crate::config::{Config, GoogleConfig};
use crate::error::{AppError, Result};
use crate::session::{AuthProvider, TokenGrant};
use crate::sheets::client::AUTH_SCOPE;
use async_trait::async_trait;
use chrono::Utc;
use hyper_util::client::legacy::connect::HttpConnector;
use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tracing::{debug, instrument};
use yup_oauth2::{
    AccessToken, ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod,
    authenticator::Authenticator, authenticator_delegate::InstalledFlowDelegate,
    hyper_rustls::HttpsConnector,
};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_CERT_URL: &str = "https://www.googleapis.com/oauth2/v1/certs";
pub(crate) const GOOGLE_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

// Used when Google does not report an expiry
const DEFAULT_EXPIRES_IN: u64 = 3600;

type AuthType = Authenticator<HttpsConnector<HttpConnector>>;

/// Google sign-in through the installed-app flow, with refresh tokens cached on disk.
pub struct GoogleAuth {
    config: GoogleConfig,
}

impl GoogleAuth {
    pub fn new(config: &GoogleConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    async fn authenticator(&self, prompt: Prompt) -> Result<AuthType> {
        from_installed_flow(
            self.config.client_id.clone(),
            self.config.client_secret.clone(),
            prompt,
        )
        .await
    }
}

#[async_trait]
impl AuthProvider for GoogleAuth {
    #[instrument(name = "Signing in to Google", skip_all)]
    async fn request_interactive_sign_in(&self) -> Result<Option<TokenGrant>> {
        let auth = self.authenticator(Prompt::Allowed).await?;

        let token = auth
            .token(&[AUTH_SCOPE])
            .await
            .map_err(|e| AppError::Auth(format!("Failed to get token: {}", e)))?;

        Ok(to_grant(&token))
    }

    #[instrument(name = "Refreshing Google session", skip_all)]
    async fn request_silent_token(&self) -> Result<Option<TokenGrant>> {
        // Without a cached refresh token the flow would prompt, so give up instead
        if !token_cache_path()?.exists() {
            debug!("No cached Google tokens, silent refresh unavailable");
            return Ok(None);
        }

        // A refresh the server rejects falls back to the consent flow, which must not prompt
        let auth = self.authenticator(Prompt::Refused).await?;

        match auth.token(&[AUTH_SCOPE]).await {
            Ok(token) => Ok(to_grant(&token)),
            Err(e) => {
                debug!("Silent token refresh failed: {}", e);
                Ok(None)
            }
        }
    }
}

fn to_grant(token: &AccessToken) -> Option<TokenGrant> {
    let access_token = token.token()?.to_string();
    let expires_in = token
        .expiration_time()
        .map(|at| at.unix_timestamp() - Utc::now().timestamp())
        .and_then(|secs| u64::try_from(secs).ok())
        .unwrap_or(DEFAULT_EXPIRES_IN);

    Some(TokenGrant {
        access_token,
        expires_in,
    })
}

/// Whether the consent flow may ask the user for an authorization code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prompt {
    Allowed,
    Refused,
}

/// Refuses to present the consent URL, so the flow fails instead of waiting on stdin.
struct NoPromptDelegate;

impl InstalledFlowDelegate for NoPromptDelegate {
    fn present_user_url<'a>(
        &'a self,
        _url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async { Err("Google sign-in required, run `expense-tracker auth`".to_string()) })
    }
}

async fn from_installed_flow(
    client_id: String,
    client_secret: String,
    prompt: Prompt,
) -> Result<AuthType> {
    let secret = ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: GOOGLE_AUTH_URL.to_string(),
        token_uri: GOOGLE_TOKEN_URL.to_string(),
        auth_provider_x509_cert_url: Some(GOOGLE_CERT_URL.to_string()),
        redirect_uris: vec![GOOGLE_REDIRECT_URI.to_string()],
        project_id: None,
        client_email: None,
        client_x509_cert_url: None,
    };

    let token_cache_path = token_cache_path()?;

    if let Some(parent) = token_cache_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::Auth(format!("Failed to create token cache directory: {}", e))
        })?;
    }

    // User will copy/paste the authorization code from the browser
    let mut builder =
        InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::Interactive)
            .persist_tokens_to_disk(token_cache_path);
    if prompt == Prompt::Refused {
        builder = builder.flow_delegate(Box::new(NoPromptDelegate));
    }

    let auth = builder
        .build()
        .await
        .map_err(|e| AppError::Auth(format!("Failed to build authenticator: {}", e)))?;

    Ok(auth)
}

/// Clear cached Google tokens by deleting the token cache file
#[instrument(name = "Clearing auth tokens for Google Sheets", skip_all)]
pub fn clear_tokens() -> Result<()> {
    let token_path = token_cache_path()?;

    if !token_path.exists() {
        debug!("No Google Sheets tokens to clear");
        return Ok(());
    }

    fs::remove_file(&token_path)
        .map_err(|e| AppError::Auth(format!("Failed to delete tokens file: {}", e)))?;
    debug!("Cleared Google Sheets cached tokens");

    Ok(())
}

fn token_cache_path() -> Result<PathBuf> {
    Config::cache_file("google_tokens.json")
}
