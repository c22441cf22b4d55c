use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use scraper::Selector;
use url::Url;

use crate::document::{PageDocument, cell_href, cell_texts};
use crate::types::{DivisionLink, Motion, PolicyPage, Role, Vote};
use crate::utils::VoteTally;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Failed to parse URL: {0}")]
    UrlParse(String),
    #[error("Failed to parse date: {0}")]
    DateParse(String),
    #[error("Failed to parse time: {0}")]
    TimeParse(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

const HEADING_SEPARATOR: char = '—';
const CONSTITUENCY_SORT: &str = "&sort=constituency";
/// Asks a division page for every possible voter instead of the paginated default.
const ALL_POSSIBLE_VOTES: &str = "&display=allpossible";

static SEL_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#main h1").expect("invalid selector: page heading"));
static SEL_VOTE_ROWS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#votetable tr").expect("invalid selector: vote rows"));
static SEL_MOTION_ROWS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.votes tr").expect("invalid selector: motion rows"));

static RE_POLICY_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Policy #(\d+): ["“]([^:]+)["”]"#).expect("invalid regex: policy text")
});

/// Extracts a division record from its page.
///
/// `page_url` only labels errors; the motion id comes from the page's
/// "Constituency" sort link, resolved against `base`.
pub fn parse_division(html: &str, page_url: &str, base: &Url) -> Result<Motion, ParseError> {
    let document = PageDocument::parse(html);

    let heading = document.first_text(&SEL_HEADING);
    if heading.is_empty() {
        return Err(ParseError::MissingField(format!(
            "division heading in {}",
            page_url
        )));
    }

    let (text, when) = split_heading(&heading).ok_or_else(|| {
        ParseError::DateParse(format!(
            "No date separator in heading '{}' ({})",
            heading, page_url
        ))
    })?;
    let datetime = parse_heading_datetime(when, page_url)?;

    let (date_param, number) = division_key(&document, page_url, base)?;
    let date = NaiveDate::parse_from_str(&date_param, "%Y-%m-%d").map_err(|_| {
        ParseError::DateParse(format!(
            "Invalid division date '{}' in {}",
            date_param, page_url
        ))
    })?;

    let votes = parse_votes(&document, page_url, base)?;
    let result = VoteTally::from_votes(&votes).result();
    let hansard = hansard_link(&document, page_url)?;

    Ok(Motion {
        id: format!("pw-{}-{}", date_param, number),
        text: text.to_string(),
        date,
        datetime,
        hansard,
        result,
        direction: None,
        votes,
    })
}

/// Reads a policy page: its description and the Commons rows of its motions table.
pub fn parse_policy_page(html: &str, page_url: &str) -> Result<PolicyPage, ParseError> {
    let document = PageDocument::parse(html);

    let heading = document.first_text(&SEL_HEADING);
    let text = RE_POLICY_TEXT
        .captures(&heading)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ParseError::MissingField(format!("policy text in '{}' ({})", heading, page_url))
        })?;

    let mut divisions = Vec::new();

    for (i, row) in document.select_all(&SEL_MOTION_ROWS).into_iter().enumerate().skip(1) {
        let cells = cell_texts(row);
        let [house, date, subject, direction, ..] = cells.as_slice() else {
            log::warn!(
                "Skipping motion row {} in {}: expected 4 cells, found {}",
                i,
                page_url,
                cells.len()
            );
            continue;
        };

        if house != "Commons" {
            log::debug!("Skipping {} division '{}'", house, subject);
            continue;
        }

        let href = cell_href(row, 2).ok_or_else(|| {
            ParseError::MissingField(format!(
                "division link for '{}' in {}",
                subject, page_url
            ))
        })?;

        divisions.push(DivisionLink {
            date: date.clone(),
            subject: subject.clone(),
            direction: direction.clone(),
            url: format!("{}{}", href, ALL_POSSIBLE_VOTES),
        });
    }

    Ok(PolicyPage { text, divisions })
}

/// Splits on the last separator only, since motion titles may contain it too.
fn split_heading(heading: &str) -> Option<(&str, &str)> {
    heading
        .rsplit_once(HEADING_SEPARATOR)
        .map(|(text, when)| (text.trim(), when.trim()))
}

fn parse_heading_date(text: &str, page_url: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(text.trim(), "%d %b %Y").map_err(|_| {
        ParseError::DateParse(format!("Invalid heading date '{}' in {}", text, page_url))
    })
}

/// Parses `"19 Nov 2003 at 16:45"`. Late sittings are written past midnight
/// as `25:30`, which belongs to the following day.
fn parse_heading_datetime(
    fragment: &str,
    page_url: &str,
) -> Result<Option<NaiveDateTime>, ParseError> {
    let Some((date_str, time_str)) = fragment.split_once(" at ") else {
        parse_heading_date(fragment, page_url)?;
        return Ok(None);
    };

    let mut date = parse_heading_date(date_str, page_url)?;

    let (hour_str, minute_str) = time_str.trim().split_once(':').ok_or_else(|| {
        ParseError::TimeParse(format!("Invalid time '{}' in {}", time_str, page_url))
    })?;
    let mut hour: u32 = hour_str
        .parse()
        .map_err(|_| ParseError::TimeParse(format!("Invalid hour '{}' in {}", hour_str, page_url)))?;
    let minute: u32 = minute_str.parse().map_err(|_| {
        ParseError::TimeParse(format!("Invalid minute '{}' in {}", minute_str, page_url))
    })?;

    if hour >= 24 {
        hour -= 24;
        date = date.succ_opt().ok_or_else(|| {
            ParseError::DateParse(format!("Date overflow after {} in {}", date, page_url))
        })?;
    }

    let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
        ParseError::TimeParse(format!("Invalid time {}:{} in {}", hour, minute, page_url))
    })?;

    Ok(Some(date.and_time(time)))
}

/// Returns the `(date, number)` query parameters of the "Constituency" sort link.
fn division_key(
    document: &PageDocument,
    page_url: &str,
    base: &Url,
) -> Result<(String, String), ParseError> {
    let href = document.link_href("Constituency");
    if href.is_empty() {
        return Err(ParseError::MissingField(format!(
            "constituency link in {}",
            page_url
        )));
    }

    let link = base
        .join(&href.replace(CONSTITUENCY_SORT, ""))
        .map_err(|e| ParseError::UrlParse(format!("'{}' in {}: {}", href, page_url, e)))?;

    let param = |name: &str| {
        link.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ParseError::UrlParse(format!(
                    "No '{}' parameter in {} ({})",
                    name, link, page_url
                ))
            })
    };

    Ok((param("date")?, param("number")?))
}

fn parse_votes(document: &PageDocument, page_url: &str, base: &Url) -> Result<Vec<Vote>, ParseError> {
    let mut votes = Vec::new();

    for (i, row) in document.select_all(&SEL_VOTE_ROWS).into_iter().enumerate().skip(1) {
        let cells = cell_texts(row);
        let [name, constituency, party, raw_option, ..] = cells.as_slice() else {
            log::warn!(
                "Skipping vote row {} in {}: expected 4 cells, found {}",
                i,
                page_url,
                cells.len()
            );
            continue;
        };

        let href = cell_href(row, 0).ok_or_else(|| {
            ParseError::MissingField(format!("profile link for '{}' in {}", name, page_url))
        })?;
        let url = base
            .join(&href)
            .map_err(|e| ParseError::UrlParse(format!("'{}' in {}: {}", href, page_url, e)))?;

        let (option, role) = normalize_option(raw_option);

        votes.push(Vote {
            name: name.clone(),
            url: url.to_string(),
            constituency: constituency.clone(),
            party: party.clone(),
            option,
            role,
        });
    }

    Ok(votes)
}

/// `tell`-prefixed options mark tellers; `aye` is stored as `yes`.
fn normalize_option(raw: &str) -> (String, Option<Role>) {
    let (option, role) = match raw.strip_prefix("tell") {
        Some(rest) => (rest, Some(Role::Teller)),
        None => (raw, None),
    };
    let option = if option == "aye" { "yes" } else { option };
    (option.to_string(), role)
}

fn hansard_link(document: &PageDocument, page_url: &str) -> Result<String, ParseError> {
    let mut hansard = document.link_href("Online Hansard");
    if hansard.is_empty() {
        hansard = document.link_href("Source");
    }
    if hansard.is_empty() {
        return Err(ParseError::MissingField(format!(
            "hansard record in {}",
            page_url
        )));
    }
    Ok(hansard)
}
