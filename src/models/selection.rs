use crate::error::{AppError, Result};
use crate::store::{KeyValueStore, SELECTED_SHEET_NAME, SELECTED_SPREADSHEET_ID};
use url::Url;

pub const DEFAULT_SHEET_NAME: &str = "Expenses";

const SPREADSHEET_ID_PARAM: &str = "spreadsheetId";
const SHEET_NAME_PARAM: &str = "sheetName";

/// The spreadsheet and tab that expenses are read from and appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRef {
    pub spreadsheet_id: String,
    pub sheet_name: String,
}

impl SheetRef {
    pub fn new(spreadsheet_id: impl Into<String>, sheet_name: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
        }
    }

    /// Read the persisted selection; both halves must be present and non-empty.
    pub fn load(store: &impl KeyValueStore) -> Result<Option<Self>> {
        let spreadsheet_id = store.get(SELECTED_SPREADSHEET_ID)?.filter(|s| !s.is_empty());
        let sheet_name = store.get(SELECTED_SHEET_NAME)?.filter(|s| !s.is_empty());

        Ok(match (spreadsheet_id, sheet_name) {
            (Some(spreadsheet_id), Some(sheet_name)) => Some(Self {
                spreadsheet_id,
                sheet_name,
            }),
            _ => None,
        })
    }

    /// Like `load`, but a missing selection is an error.
    pub fn require(store: &impl KeyValueStore) -> Result<Self> {
        Self::load(store)?.ok_or(AppError::MissingSheetSelection)
    }

    pub fn save(&self, store: &impl KeyValueStore) -> Result<()> {
        if self.spreadsheet_id.is_empty() || self.sheet_name.is_empty() {
            return Err(AppError::MissingSheetSelection);
        }
        store.set(SELECTED_SPREADSHEET_ID, &self.spreadsheet_id)?;
        store.set(SELECTED_SHEET_NAME, &self.sheet_name)?;
        Ok(())
    }

    pub fn spreadsheet_url(&self) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{}/edit",
            self.spreadsheet_id
        )
    }

    /// `<base>?spreadsheetId=<id>&sheetName=<name>`
    pub fn share_link(&self, base_url: &str) -> Result<String> {
        let mut url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("Invalid share base URL: {}", e)))?;
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair(SPREADSHEET_ID_PARAM, &self.spreadsheet_id)
            .append_pair(SHEET_NAME_PARAM, &self.sheet_name);
        Ok(url.to_string())
    }

    /// Extract a selection from a shareable link. The result is a suggestion only; callers
    /// must confirm with the user before saving it.
    pub fn from_share_link(link: &str) -> Option<Self> {
        let url = Url::parse(link).ok()?;
        let find = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.is_empty())
        };

        Some(Self {
            spreadsheet_id: find(SPREADSHEET_ID_PARAM)?,
            sheet_name: find(SHEET_NAME_PARAM)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_helpers::MemoryStore;

    #[test]
    fn test_load_requires_both_keys() {
        let store = MemoryStore::default();
        assert_eq!(SheetRef::load(&store).unwrap(), None);

        store.set(SELECTED_SPREADSHEET_ID, "abc").unwrap();
        assert_eq!(SheetRef::load(&store).unwrap(), None);
        assert!(matches!(
            SheetRef::require(&store),
            Err(AppError::MissingSheetSelection)
        ));

        store.set(SELECTED_SHEET_NAME, "Expenses").unwrap();
        assert_eq!(
            SheetRef::load(&store).unwrap(),
            Some(SheetRef::new("abc", "Expenses"))
        );
    }

    #[test]
    fn test_save_round_trips_through_store() {
        let store = MemoryStore::default();
        SheetRef::new("abc", "Travel").save(&store).unwrap();

        assert_eq!(
            SheetRef::require(&store).unwrap(),
            SheetRef::new("abc", "Travel")
        );
    }

    #[test]
    fn test_share_link() {
        let sheet = SheetRef::new("abc123", "Expenses");
        let link = sheet
            .share_link("https://expenses.example.com/app/")
            .unwrap();
        assert_eq!(
            link,
            "https://expenses.example.com/app/?spreadsheetId=abc123&sheetName=Expenses"
        );
    }

    #[test]
    fn test_share_link_encodes_sheet_name() {
        let sheet = SheetRef::new("abc123", "Trip & Food");
        let link = sheet.share_link("https://expenses.example.com/").unwrap();

        assert_eq!(SheetRef::from_share_link(&link), Some(sheet));
    }

    #[test]
    fn test_from_share_link_needs_both_params() {
        assert_eq!(
            SheetRef::from_share_link("https://expenses.example.com/?spreadsheetId=abc"),
            None
        );
        assert_eq!(SheetRef::from_share_link("not a url"), None);
    }

    #[test]
    fn test_spreadsheet_url() {
        assert_eq!(
            SheetRef::new("abc", "Expenses").spreadsheet_url(),
            "https://docs.google.com/spreadsheets/d/abc/edit"
        );
    }
}
