// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use anchor_core::{PlaceholderStyle, QuotingStyle};

/// Quote one identifier, doubling embedded closing quotes.
pub fn quote_ident(style: QuotingStyle, ident: &str) -> String {
	match style {
		QuotingStyle::DoubleQuote => format!("\"{}\"", ident.replace('"', "\"\"")),
		QuotingStyle::Bracketed => format!("[{}]", ident.replace(']', "]]")),
		QuotingStyle::Backtick => format!("`{}`", ident.replace('`', "``")),
	}
}

/// Quote a possibly schema-qualified name part by part.
pub fn quote_qualified(style: QuotingStyle, name: &str) -> String {
	name.split('.').map(|part| quote_ident(style, part)).collect::<Vec<_>>().join(".")
}

/// Render the placeholder with the given 1-based index.
pub fn placeholder(style: PlaceholderStyle, index: usize) -> String {
	match style {
		PlaceholderStyle::Numbered => format!("${index}"),
		PlaceholderStyle::Question => "?".to_string(),
		PlaceholderStyle::Named => format!("@p{index}"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_quoting_styles() {
		assert_eq!(quote_ident(QuotingStyle::DoubleQuote, "ORDERS"), "\"ORDERS\"");
		assert_eq!(quote_ident(QuotingStyle::Bracketed, "ORDERS"), "[ORDERS]");
		assert_eq!(quote_ident(QuotingStyle::Backtick, "ORDERS"), "`ORDERS`");
	}

	#[test]
	fn test_embedded_quotes_are_doubled() {
		assert_eq!(quote_ident(QuotingStyle::DoubleQuote, "we\"ird"), "\"we\"\"ird\"");
		assert_eq!(quote_ident(QuotingStyle::Bracketed, "we]ird"), "[we]]ird]");
	}

	#[test]
	fn test_qualified_names() {
		assert_eq!(quote_qualified(QuotingStyle::DoubleQuote, "HR.EMPLOYEES"), "\"HR\".\"EMPLOYEES\"");
	}

	#[test]
	fn test_placeholders() {
		assert_eq!(placeholder(PlaceholderStyle::Numbered, 3), "$3");
		assert_eq!(placeholder(PlaceholderStyle::Question, 3), "?");
		assert_eq!(placeholder(PlaceholderStyle::Named, 3), "@p3");
	}
}
