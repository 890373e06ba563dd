use crate::models::Expense;
use std::fmt;

/// Everything the list shows: unsynced entries grouped first, then the fetched remote page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseView {
    pub pending: Vec<Expense>,
    pub synced: Vec<Expense>,
    pub total: u32,
    pub has_more: bool,
}

impl fmt::Display for ExpenseView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for expense in &self.pending {
            writeln!(f, "{} (Not Synced)", expense)?;
        }

        for expense in &self.synced {
            writeln!(f, "{}", expense)?;
        }

        if self.pending.is_empty() && self.synced.is_empty() {
            writeln!(f, "No expenses found.")?;
        }

        if self.has_more {
            writeln!(
                f,
                "Showing {} of {}, use --pages to see more",
                self.synced.len(),
                self.total
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::expense::test_helpers::mock_expense;

    #[test]
    fn test_empty_view() {
        assert_eq!(ExpenseView::default().to_string(), "No expenses found.\n");
    }

    #[test]
    fn test_pending_listed_first_and_flagged() {
        let view = ExpenseView {
            pending: vec![mock_expense("Taxi")],
            synced: vec![mock_expense("Coffee")],
            total: 1,
            has_more: false,
        };

        assert_eq!(
            view.to_string(),
            "2024-01-01 - Taxi - Food - 3.50 (Not Synced)\n\
             2024-01-01 - Coffee - Food - 3.50\n"
        );
    }

    #[test]
    fn test_more_hint() {
        let view = ExpenseView {
            pending: vec![],
            synced: vec![mock_expense("Coffee")],
            total: 9,
            has_more: true,
        };

        assert!(view.to_string().ends_with("Showing 1 of 9, use --pages to see more\n"));
    }
}
