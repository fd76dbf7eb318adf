use chrono::NaiveDate;

/// Prefixes the static instructions with the current date.
///
/// The result is rebuilt for every turn and never stored in the
/// conversation, so prompts do not pile up across turns.
pub fn dated_system_prompt(instructions: &str, today: NaiveDate) -> String {
    format!("Today's date is {} {instructions}", today.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dated_system_prompt() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(
            dated_system_prompt("Route SQL questions to execute_query.", today),
            "Today's date is 2025-03-07 Route SQL questions to execute_query."
        );
    }
}
