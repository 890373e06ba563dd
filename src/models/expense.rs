use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of sheet columns an expense occupies (A..D).
pub const EXPENSE_COLUMNS: usize = 4;

/// One expense as the user typed it. All fields are opaque display strings; records carry no
/// identity, so two identical submissions are two rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Expense {
    pub date: String,
    pub name: String,
    pub category: String,
    pub price: String,
}

impl fmt::Display for Expense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {} - {}",
            self.date, self.name, self.category, self.price
        )
    }
}

pub trait FromSheetRows: Sized {
    /// Convert header-less rows, as returned for a `A<n>:D<m>` range, to records.
    fn from_sheet_rows(rows: &[Vec<String>]) -> Result<Vec<Self>>;
}

pub trait ToSheetRow {
    /// Convert a record to the row appended to the sheet.
    fn to_sheet_row(&self) -> Vec<String>;
}

impl FromSheetRows for Expense {
    fn from_sheet_rows(rows: &[Vec<String>]) -> Result<Vec<Self>> {
        let mut expenses = Vec::with_capacity(rows.len());

        for (idx, row) in rows.iter().enumerate() {
            // The API trims trailing empty cells, and users may type past column D
            let mut row_vec: Vec<String> = row.iter().take(EXPENSE_COLUMNS).cloned().collect();
            row_vec.resize(EXPENSE_COLUMNS, String::new());

            let record = csv::StringRecord::from(row_vec);
            let expense: Expense = record
                .deserialize(None)
                .map_err(|e| AppError::Sheets(format!("Failed to parse row {}: {}", idx + 1, e)))?;

            expenses.push(expense);
        }

        Ok(expenses)
    }
}

impl ToSheetRow for Expense {
    fn to_sheet_row(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.name.clone(),
            self.category.clone(),
            self.price.clone(),
        ]
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_sheet_rows_with_data() {
        let rows = vec![row(&["2024-01-01", "Coffee", "Food", "3.50"])];

        let expenses = Expense::from_sheet_rows(&rows).unwrap();
        let expected = vec![Expense {
            date: "2024-01-01".to_string(),
            name: "Coffee".to_string(),
            category: "Food".to_string(),
            price: "3.50".to_string(),
        }];
        assert_eq!(expenses, expected);
    }

    #[test]
    fn test_from_sheet_rows_pads_short_rows() {
        let rows = vec![row(&["2024-01-01", "Coffee"])];

        let expenses = Expense::from_sheet_rows(&rows).unwrap();
        assert_eq!(expenses[0].name, "Coffee");
        assert_eq!(expenses[0].category, "");
        assert_eq!(expenses[0].price, "");
    }

    #[test]
    fn test_from_sheet_rows_ignores_extra_columns() {
        let rows = vec![row(&["2024-01-01", "Coffee", "Food", "3.50", "note"])];

        let expenses = Expense::from_sheet_rows(&rows).unwrap();
        assert_eq!(expenses[0].price, "3.50");
    }

    #[test]
    fn test_from_sheet_rows_empty() {
        let expenses = Expense::from_sheet_rows(&[]).unwrap();
        assert!(expenses.is_empty());
    }

    #[test]
    fn test_to_sheet_row_keeps_price_verbatim() {
        let expense = Expense {
            price: "€3,50".to_string(),
            ..test_helpers::mock_expense("Coffee")
        };
        assert_eq!(
            expense.to_sheet_row(),
            vec!["2024-01-01", "Coffee", "Food", "€3,50"]
        );
    }

    #[test]
    fn test_display() {
        let expense = test_helpers::mock_expense("Coffee");
        assert_eq!(expense.to_string(), "2024-01-01 - Coffee - Food - 3.50");
    }
}
