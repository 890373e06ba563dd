use super::{FIRST_DATA_ROW, RowSpan, SheetOperations, quote_sheet_name};
use crate::error::{AppError, Result};
use crate::models::SheetRef;
use async_trait::async_trait;
use google_sheets4::api::{Scope, Sheets, ValueRange};
use google_sheets4::common::GetToken;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use tracing::{debug, instrument};

// Read and write access to the user's spreadsheets
pub(crate) const AUTH_SCOPE: Scope = Scope::Spreadsheet;

type TokenResult = std::result::Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>;
type TokenFuture<'a> = Pin<Box<dyn Future<Output = TokenResult> + Send + 'a>>;

/// Access token shared between the session layer and the Sheets hub.
#[derive(Clone, Default)]
pub struct AccessToken(Arc<RwLock<Option<String>>>);

impl AccessToken {
    pub fn set(&self, token: Option<String>) {
        if let Ok(mut current) = self.0.write() {
            *current = token;
        }
    }

    fn current(&self) -> Option<String> {
        self.0.read().ok().and_then(|token| token.clone())
    }
}

impl GetToken for AccessToken {
    fn get_token<'a>(&'a self, _scopes: &'a [&str]) -> TokenFuture<'a> {
        let token = self.current();
        Box::pin(async move { Ok(token) })
    }
}

pub struct SheetsClient {
    hub: Sheets<HttpsConnector<HttpConnector>>,
    token: AccessToken,
}

impl SheetsClient {
    pub fn new() -> Result<Self> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| AppError::Sheets(format!("Failed to load native TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(hyper_util::rt::TokioExecutor::new()).build(connector);

        let token = AccessToken::default();
        let hub = Sheets::new(client, token.clone());

        Ok(Self { hub, token })
    }

    /// Handle for swapping the access token after sign-in or refresh.
    pub fn token(&self) -> AccessToken {
        self.token.clone()
    }
}

/// Map a Sheets API failure, recognising a rejected session by its 401 status.
fn map_sheets_error(e: google_sheets4::Error, context: &str) -> AppError {
    let unauthorized = match &e {
        google_sheets4::Error::Failure(response) => response.status().as_u16() == 401,
        google_sheets4::Error::BadRequest(body) => {
            body.pointer("/error/code").and_then(Value::as_u64) == Some(401)
        }
        _ => false,
    };

    if unauthorized {
        AppError::AuthExpired
    } else {
        AppError::Sheets(format!("{}: {}", context, e))
    }
}

/// Every expense column, so a row counts even when its date cell is empty.
fn count_range(sheet: &SheetRef) -> String {
    format!("{}!A{}:D", quote_sheet_name(&sheet.sheet_name), FIRST_DATA_ROW)
}

/// Sheets returns typed cells; the app only deals in display strings.
fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetOperations for SheetsClient {
    #[instrument(name = "Counting rows", skip_all, fields(sheet = %sheet.sheet_name))]
    async fn count_rows(&self, sheet: &SheetRef) -> Result<u32> {
        let range = count_range(sheet);
        let (_, response) = self
            .hub
            .spreadsheets()
            .values_get(&sheet.spreadsheet_id, &range)
            .major_dimension("ROWS")
            .add_scope(AUTH_SCOPE)
            .doit()
            .await
            .map_err(|e| map_sheets_error(e, "Failed to count rows"))?;

        let count = response.values.map(|rows| rows.len()).unwrap_or_default();
        debug!(count, "Counted rows");

        u32::try_from(count).map_err(|_| AppError::Sheets(format!("Too many rows: {}", count)))
    }

    #[instrument(name = "Reading rows", skip_all, fields(first = rows.first, last = rows.last))]
    async fn read_rows(&self, sheet: &SheetRef, rows: RowSpan) -> Result<Vec<Vec<String>>> {
        let range = format!(
            "{}!A{}:D{}",
            quote_sheet_name(&sheet.sheet_name),
            rows.first,
            rows.last
        );
        let (_, response) = self
            .hub
            .spreadsheets()
            .values_get(&sheet.spreadsheet_id, &range)
            .major_dimension("ROWS")
            .value_render_option("FORMATTED_VALUE")
            .add_scope(AUTH_SCOPE)
            .doit()
            .await
            .map_err(|e| {
                map_sheets_error(e, &format!("Failed to read sheet '{}'", sheet.sheet_name))
            })?;

        Ok(response
            .values
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    #[instrument(name = "Appending expense", skip_all, fields(sheet = %sheet.sheet_name))]
    async fn append_row(&self, sheet: &SheetRef, row: Vec<String>) -> Result<()> {
        let range = quote_sheet_name(&sheet.sheet_name);
        let value_range = ValueRange {
            major_dimension: Some("ROWS".to_string()),
            range: None,
            values: Some(vec![row.into_iter().map(Value::String).collect()]),
        };

        // USER_ENTERED so "1/1/2024" lands as a date
        self.hub
            .spreadsheets()
            .values_append(value_range, &sheet.spreadsheet_id, &range)
            .value_input_option("USER_ENTERED")
            .insert_data_option("INSERT_ROWS")
            .add_scope(AUTH_SCOPE)
            .doit()
            .await
            .map_err(|e| map_sheets_error(e, "Failed to append expense"))?;

        Ok(())
    }

    #[instrument(name = "Fetching spreadsheet details", skip(self))]
    async fn spreadsheet_title(&self, spreadsheet_id: &str) -> Result<Option<String>> {
        let (_, spreadsheet) = self
            .hub
            .spreadsheets()
            .get(spreadsheet_id)
            .include_grid_data(false)
            .add_scope(AUTH_SCOPE)
            .doit()
            .await
            .map_err(|e| map_sheets_error(e, "Failed to get spreadsheet"))?;

        Ok(spreadsheet.properties.and_then(|p| p.title))
    }
}
