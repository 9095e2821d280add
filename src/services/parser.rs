// src/services/parser.rs
//! Everything that knows what the marketplace's pages look like.
//!
//! A field is located by its label (the anchor): the element whose whole text
//! is the label, and the value in the element right after it. That covers the
//! `th`/`td`, `dt`/`dd` and `span`/`span` layouts the site has used.

use bigdecimal::BigDecimal;
use log::debug;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::ParseError;
use crate::models::{AccountSummaryData, NARCalculationData};

/// Pages we know how to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    AccountSummary,
    NetAnnualizedReturn,
}

impl PageKind {
    pub fn name(&self) -> &'static str {
        match self {
            PageKind::AccountSummary => "account summary",
            PageKind::NetAnnualizedReturn => "net annualized return",
        }
    }
}

/// Label text (first entry is the canonical name) for one field.
struct Anchor(&'static [&'static str]);

impl Anchor {
    fn name(&self) -> &'static str {
        self.0[0]
    }
}

const TOTAL_PAYMENTS: Anchor = Anchor(&["Total Payments"]);
const ACCOUNT_VALUE: Anchor = Anchor(&["Account Value"]);
const OUTSTANDING_PRINCIPAL: Anchor = Anchor(&["Outstanding Principal", "Outstanding Principle"]);
const AVAILABLE_CASH: Anchor = Anchor(&["Available Cash"]);
const IN_FUNDING_NOTES: Anchor = Anchor(&["In Funding Notes", "In-Funding Notes"]);
const ADJUSTED_ACCOUNT_VALUE: Anchor = Anchor(&["Adjusted Account Value"]);
const INTEREST_RECEIVED: Anchor = Anchor(&["Interest Received"]);
const PAST_DUE_ADJUSTMENT: Anchor = Anchor(&["Adjustment for Past-Due Notes", "Past Due Notes Adjustment"]);

const ADJUSTED_NAR: Anchor = Anchor(&["Adjusted Net Annualized Return"]);
const WEIGHTED_AVERAGE_RATE: Anchor = Anchor(&["Weighted Average Rate", "Weighted Average Interest Rate"]);

fn label_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| {
        Selector::parse("th, td, dt, dd, div, span, label, li, p, strong, b")
            .expect("static label selector")
    })
}

fn login_form_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| {
        Selector::parse(r#"input[name="login_password"], form[action*="login"] input[type="password"]"#)
            .expect("static login selector")
    })
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+)?$").expect("static number pattern"))
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(':')
        .trim_end()
        .to_lowercase()
}

fn find_value(document: &Html, anchor: &Anchor) -> Option<String> {
    let labels: Vec<String> = anchor.0.iter().map(|l| normalize(l)).collect();

    for element in document.select(label_selector()) {
        let text = normalize(&element.text().collect::<String>());
        if !labels.contains(&text) {
            continue;
        }
        if let Some(value) = element.next_siblings().find_map(ElementRef::wrap) {
            let raw = value.text().collect::<String>();
            debug!("Anchor '{}' -> '{}'", anchor.name(), raw.trim());
            return Some(raw.trim().to_string());
        }
    }

    None
}

fn extract<F>(document: &Html, anchor: &Anchor, convert: F) -> Result<BigDecimal, ParseError>
where
    F: Fn(&str, &str) -> Result<BigDecimal, ParseError>,
{
    let raw = find_value(document, anchor)
        .ok_or_else(|| ParseError::FieldMissing(anchor.name().to_string()))?;
    convert(anchor.name(), &raw)
}

/// Parses a currency cell such as `$1,234.56`, `-$12.00` or `($12.00)`.
pub fn parse_amount(field: &str, raw: &str) -> Result<BigDecimal, ParseError> {
    let malformed = || ParseError::MalformedValue(field.to_string(), raw.to_string());

    let mut cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$' && *c != ',')
        .collect();

    let mut negative = false;
    if cleaned.starts_with('(') && cleaned.ends_with(')') && cleaned.len() > 2 {
        negative = true;
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
    }
    if let Some(rest) = cleaned.strip_prefix('-') {
        negative = !negative;
        cleaned = rest.to_string();
    }

    if !number_re().is_match(&cleaned) {
        return Err(malformed());
    }
    let value = BigDecimal::from_str(&cleaned).map_err(|_| malformed())?;
    Ok(if negative { -value } else { value })
}

fn strip_percent(text: &str) -> &str {
    let text = text.trim_end();
    text.strip_suffix('%').unwrap_or(text)
}

/// Parses a percentage cell such as `4.25%` into the ratio `0.0425`.
pub fn parse_percent(field: &str, raw: &str) -> Result<BigDecimal, ParseError> {
    let trimmed = raw.trim();
    // the sign may wrap the percent sign: (1.50%) as well as (1.50)%
    let number = match trimmed.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => format!("({})", strip_percent(inner)),
        None => strip_percent(trimmed).to_string(),
    };
    let value = parse_amount(field, &number)
        .map_err(|_| ParseError::MalformedValue(field.to_string(), raw.to_string()))?;

    // exact shift of the decimal point, no division
    let (digits, scale) = value.as_bigint_and_exponent();
    Ok(BigDecimal::new(digits, scale + 2))
}

pub fn parse_account_summary(user_email: &str, doc: &str) -> Result<AccountSummaryData, ParseError> {
    let document = Html::parse_document(doc);

    Ok(AccountSummaryData {
        user_email: user_email.to_string(),
        total_payments: extract(&document, &TOTAL_PAYMENTS, parse_amount)?,
        account_value: extract(&document, &ACCOUNT_VALUE, parse_amount)?,
        outstanding_principal: extract(&document, &OUTSTANDING_PRINCIPAL, parse_amount)?,
        available_cash: extract(&document, &AVAILABLE_CASH, parse_amount)?,
        in_funding_notes: extract(&document, &IN_FUNDING_NOTES, parse_amount)?,
        adjusted_account_value: extract(&document, &ADJUSTED_ACCOUNT_VALUE, parse_amount)?,
        interest_received: extract(&document, &INTEREST_RECEIVED, parse_amount)?,
        past_due_notes_adjustment: extract(&document, &PAST_DUE_ADJUSTMENT, parse_amount)?,
    })
}

pub fn parse_net_annualized_return(user_email: &str, doc: &str) -> Result<NARCalculationData, ParseError> {
    let document = Html::parse_document(doc);

    Ok(NARCalculationData {
        user_email: user_email.to_string(),
        adjusted_net_annualized_return: extract(&document, &ADJUSTED_NAR, parse_percent)?,
        weighted_average_rate: extract(&document, &WEIGHTED_AVERAGE_RATE, parse_percent)?,
    })
}

/// True when the document is the marketplace login form, which the site
/// serves both for rejected logins and for requests without a live session.
pub fn is_login_page(doc: &str) -> bool {
    let document = Html::parse_document(doc);
    let found = document.select(login_form_selector()).next().is_some();
    found
}
