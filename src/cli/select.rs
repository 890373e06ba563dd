use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{DEFAULT_SHEET_NAME, SheetRef};
use crate::store::FileStore;
use clap::Args;
use dialoguer::{Confirm, Input};
use tracing::info;

#[derive(Args, Debug)]
pub struct SelectArgs {
    /// Spreadsheet ID, as found in the sheet's URL
    #[arg(long)]
    spreadsheet_id: Option<String>,

    /// Name of the tab inside the spreadsheet
    #[arg(long)]
    sheet_name: Option<String>,

    /// Shareable link produced by `details`
    #[arg(long, conflicts_with_all = ["spreadsheet_id", "sheet_name"])]
    link: Option<String>,

    /// Save without asking for confirmation
    #[arg(long, short)]
    yes: bool,
}

impl SelectArgs {
    /// Values suggested to the user: explicit input first, then the saved selection, then the
    /// default sheet name.
    fn prefill(&self, saved: Option<SheetRef>) -> Result<(Option<String>, String)> {
        let from_link = match &self.link {
            Some(link) => Some(SheetRef::from_share_link(link).ok_or_else(|| {
                AppError::Config(format!("Link does not name a spreadsheet and sheet: {}", link))
            })?),
            None => None,
        };

        let spreadsheet_id = from_link
            .as_ref()
            .map(|s| s.spreadsheet_id.clone())
            .or_else(|| self.spreadsheet_id.clone())
            .or_else(|| saved.as_ref().map(|s| s.spreadsheet_id.clone()));

        let sheet_name = from_link
            .map(|s| s.sheet_name)
            .or_else(|| self.sheet_name.clone())
            .or_else(|| saved.map(|s| s.sheet_name))
            .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string());

        Ok((spreadsheet_id, sheet_name))
    }

    pub async fn execute(&self) -> Result<()> {
        let store = FileStore::open(Config::state_file()?)?;
        let (spreadsheet_id, sheet_name) = self.prefill(SheetRef::load(&store)?)?;

        let selection = match (spreadsheet_id, self.yes) {
            (Some(spreadsheet_id), true) => SheetRef::new(spreadsheet_id, sheet_name),
            (None, true) => return Err(AppError::MissingSheetSelection),
            (spreadsheet_id, false) => prompt(spreadsheet_id, sheet_name)?,
        };

        if !self.yes && !confirm(&selection)? {
            info!("Selection not saved");
            return Ok(());
        }

        selection.save(&store)?;
        info!(
            spreadsheet_id = %selection.spreadsheet_id,
            sheet_name = %selection.sheet_name,
            "Spreadsheet selected"
        );

        Ok(())
    }
}

fn prompt(spreadsheet_id: Option<String>, sheet_name: String) -> Result<SheetRef> {
    let mut id_input = Input::<String>::new().with_prompt("Spreadsheet ID");
    if let Some(spreadsheet_id) = spreadsheet_id {
        id_input = id_input.default(spreadsheet_id);
    }
    let spreadsheet_id = id_input
        .interact_text()
        .map_err(|e| AppError::Other(e.into()))?;

    let sheet_name = Input::<String>::new()
        .with_prompt("Sheet name")
        .default(sheet_name)
        .interact_text()
        .map_err(|e| AppError::Other(e.into()))?;

    Ok(SheetRef::new(spreadsheet_id.trim(), sheet_name.trim()))
}

fn confirm(selection: &SheetRef) -> Result<bool> {
    Confirm::new()
        .with_prompt(format!(
            "Use sheet '{}' of spreadsheet {}?",
            selection.sheet_name, selection.spreadsheet_id
        ))
        .default(true)
        .interact()
        .map_err(|e| AppError::Other(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: SelectArgs,
    }

    fn parse(args: &[&str]) -> SelectArgs {
        TestCli::parse_from(std::iter::once("select").chain(args.iter().copied())).args
    }

    #[test]
    fn test_link_wins_over_saved_selection() {
        let args = parse(&[
            "--link",
            "https://expenses.example.com/?spreadsheetId=shared&sheetName=Trip",
        ]);
        let saved = Some(SheetRef::new("mine", "Expenses"));

        let (spreadsheet_id, sheet_name) = args.prefill(saved).unwrap();

        assert_eq!(spreadsheet_id.as_deref(), Some("shared"));
        assert_eq!(sheet_name, "Trip");
    }

    #[test]
    fn test_saved_selection_prefills() {
        let args = parse(&[]);
        let saved = Some(SheetRef::new("mine", "Household"));

        let (spreadsheet_id, sheet_name) = args.prefill(saved).unwrap();

        assert_eq!(spreadsheet_id.as_deref(), Some("mine"));
        assert_eq!(sheet_name, "Household");
    }

    #[test]
    fn test_default_sheet_name() {
        let args = parse(&["--spreadsheet-id", "abc"]);

        let (spreadsheet_id, sheet_name) = args.prefill(None).unwrap();

        assert_eq!(spreadsheet_id.as_deref(), Some("abc"));
        assert_eq!(sheet_name, DEFAULT_SHEET_NAME);
    }

    #[test]
    fn test_bad_link_rejected() {
        let args = parse(&["--link", "https://expenses.example.com/"]);
        assert!(matches!(args.prefill(None), Err(AppError::Config(_))));
    }
}
