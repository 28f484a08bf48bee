use chrono::{Datelike, NaiveDate};

use crate::constants::DEFAULT_BOOST_TERMS;

/// Turns a user request into a search-engine query.
///
/// The request is passed through as-is: no trimming, escaping or length limit.
/// Whatever the search API does with odd input is its own business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBuilder {
    pub boost_terms: String,
    pub include_month: bool,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self {
            boost_terms: DEFAULT_BOOST_TERMS.to_string(),
            include_month: false,
        }
    }
}

impl QueryBuilder {
    pub fn new(boost_terms: impl Into<String>) -> Self {
        Self {
            boost_terms: boost_terms.into(),
            include_month: false,
        }
    }

    pub fn with_month(mut self, include_month: bool) -> Self {
        self.include_month = include_month;
        self
    }

    pub fn build(&self, user_text: &str, today: Option<NaiveDate>) -> String {
        let mut parts = vec![user_text.to_string()];
        if self.include_month {
            if let Some(date) = today {
                parts.push(format!("{}年{}月", date.year(), date.month()));
            }
        }
        if !self.boost_terms.is_empty() {
            parts.push(self.boost_terms.clone());
        }
        parts.join(" ")
    }
}
