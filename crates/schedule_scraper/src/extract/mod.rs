//! Turns time schedule pages into catalog records.
//!
//! Extraction is pure: it never performs I/O and never touches a store. Child
//! records are given their foreign keys from the parents passed in.

use crate::model::{Class, Department, MeetingTime, Section};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

/// Errors that can occur while extracting records from a page.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractError {
    /// The page bytes are not UTF-8 text
    #[error("Page is not valid UTF-8: {message}")]
    Encoding { message: String },

    /// The index page did not list a single department
    #[error("No departments found on index page")]
    NoDepartments,
}

/// Format-specific parser for the three levels of the catalog.
pub trait Extractor: Send + Sync + 'static {
    /// Departments listed on the root index. Links are resolved against `base`.
    fn departments(&self, page: &[u8], base: &Url) -> Result<Vec<Department>, ExtractError>;

    /// Classes listed on a department's page.
    fn classes(&self, page: &[u8], dept: &Department) -> Result<Vec<Class>, ExtractError>;

    /// Sections listed on a department's page, keyed to the given classes.
    /// Sections under a class not in `classes` are dropped.
    fn sections(&self, page: &[u8], classes: &[Class]) -> Result<Vec<Section>, ExtractError>;
}

// Static selectors for parsing - compiled once
static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static TABLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static NAMED_ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[name]").unwrap());
static CELL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static PRE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("pre").unwrap());

/// "Computer Science & Engineering (CSE)"
static DEPT_LINK_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<title>.+?)\s*\((?P<abbr>[A-Z][A-Z& ]*)\)$").unwrap());

/// A section's first line, e.g.
/// `Restr 12345 A  4  MWF  1130-1220  KNE  130  Reges,Stuart  Open  420/ 500  E`
static SECTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\s*(?:(?P<restr>Restr|IS|>)\s*)?
        (?P<sln>\d{5})\s+
        (?P<section>[A-Z][A-Z0-9]?)\s+
        (?P<credit>\S+)\s+
        (?P<days>\S+)\s+
        (?P<time>\S+)\s+
        (?P<building>\S+)\s+
        (?P<room>\S+)\s+
        (?:(?P<instructor>\S+)\s+)?
        (?P<status>Open|Closed)\s+
        (?P<taken>\d+)/\s*(?P<total>\d+)
        (?P<rest>.*)$",
    )
    .unwrap()
});

/// An additional meeting of the section above, e.g. `   TTh  1030-1120  MGH  241`
static MEETING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s+(?P<days>[MTWFSah]+)\s+(?P<time>\d{3,4}-\d{3,4}P?)\s+(?P<building>\S+)\s+(?P<room>\S+)\s*$",
    )
    .unwrap()
});

/// Extractor for the university's HTML time schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeScheduleExtractor;

impl Extractor for TimeScheduleExtractor {
    fn departments(&self, page: &[u8], base: &Url) -> Result<Vec<Department>, ExtractError> {
        let document = Html::parse_document(decode(page)?);
        let mut seen = HashSet::new();
        let mut departments = Vec::new();

        for link in document.select(&LINK_SELECTOR) {
            let text = normalized_text(&link);
            let Some(caps) = DEPT_LINK_TEXT.captures(&text) else {
                continue;
            };
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let Ok(url) = base.join(href) else {
                continue;
            };

            let abbreviation = caps["abbr"].trim();
            // The index lists some departments under more than one heading
            if seen.insert(abbreviation.to_string()) {
                departments.push(Department::new(abbreviation, &caps["title"], url.as_str()));
            }
        }

        if departments.is_empty() {
            return Err(ExtractError::NoDepartments);
        }
        Ok(departments)
    }

    fn classes(&self, page: &[u8], dept: &Department) -> Result<Vec<Class>, ExtractError> {
        let document = Html::parse_document(decode(page)?);

        let classes = document
            .select(&TABLE_SELECTOR)
            .filter_map(|table| parse_class_header(&table))
            .enumerate()
            .map(|(index, header)| {
                Class::new(
                    dept,
                    &header.abbreviation,
                    &header.code,
                    &header.title,
                    &header.description,
                    index as i64,
                )
            })
            .collect();

        Ok(classes)
    }

    fn sections(&self, page: &[u8], classes: &[Class]) -> Result<Vec<Section>, ExtractError> {
        let document = Html::parse_document(decode(page)?);
        let by_code: HashMap<&str, &Class> = classes
            .iter()
            .map(|class| (class.abbreviation_code.as_str(), class))
            .collect();

        let mut sections = Vec::new();
        let mut current: Option<&Class> = None;

        for table in document.select(&TABLE_SELECTOR) {
            if let Some(header) = parse_class_header(&table) {
                let code = Class::abbreviation_code_for(&header.abbreviation, &header.code);
                current = by_code.get(code.as_str()).copied();
                continue;
            }

            let Some(class) = current else {
                continue;
            };
            for pre in table.select(&PRE_SELECTOR) {
                let text: String = pre.text().collect();
                sections.extend(parse_section_block(&text, class));
            }
        }

        Ok(sections)
    }
}

fn decode(page: &[u8]) -> Result<&str, ExtractError> {
    std::str::from_utf8(page).map_err(|e| ExtractError::Encoding {
        message: e.to_string(),
    })
}

fn normalized_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

struct ClassHeader {
    abbreviation: String,
    code: String,
    title: String,
    description: String,
}

/// Parses a class heading table such as
/// `<a name="cse142">CSE 142</a> <a href="...">COMPUTER PRGRMNG I</a>`.
fn parse_class_header(table: &ElementRef) -> Option<ClassHeader> {
    let anchor = table.select(&NAMED_ANCHOR_SELECTOR).next()?;
    let label = normalized_text(&anchor);
    let (abbreviation, code) = label.rsplit_once(' ')?;

    let title = table
        .select(&LINK_SELECTOR)
        .next()
        .map(|link| normalized_text(&link))
        .unwrap_or_default();

    let description = table
        .select(&CELL_SELECTOR)
        .nth(1)
        .map(|cell| cell.inner_html().trim().to_string())
        .unwrap_or_default();

    Some(ClassHeader {
        abbreviation: abbreviation.to_string(),
        code: code.to_string(),
        title,
        description,
    })
}

/// Parses the text of one `<pre>` block into the sections it lists.
///
/// Lines after a section's first line either add a meeting time or, when
/// they match nothing else, append to its notes.
fn parse_section_block(text: &str, class: &Class) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(caps) = SECTION_LINE.captures(line) {
            sections.extend(current.take());

            let mut section = Section::new(class, &caps["sln"]);
            section.restriction = caps.name("restr").map_or("", |m| m.as_str()).to_string();
            section.section = caps["section"].to_string();
            section.credit = caps["credit"].to_string();
            section.meeting_times.push(MeetingTime {
                days: caps["days"].to_string(),
                time: caps["time"].to_string(),
                building: caps["building"].to_string(),
                room: caps["room"].to_string(),
            });
            section.instructor = caps
                .name("instructor")
                .map_or("", |m| m.as_str())
                .to_string();
            section.status = caps["status"].to_string();
            section.taken_spots = caps["taken"].parse().unwrap_or(0);
            section.total_spots = caps["total"].parse().unwrap_or(0);

            for token in caps["rest"].split_whitespace() {
                if token.contains("CR/NC") {
                    section.grades = token.to_string();
                } else if token.starts_with('$') {
                    section.fee = token.to_string();
                } else {
                    section.other.push_str(token);
                }
            }

            current = Some(section);
            continue;
        }

        let Some(section) = current.as_mut() else {
            continue;
        };
        if let Some(caps) = MEETING_LINE.captures(line) {
            section.meeting_times.push(MeetingTime {
                days: caps["days"].to_string(),
                time: caps["time"].to_string(),
                building: caps["building"].to_string(),
                room: caps["room"].to_string(),
            });
        } else {
            if !section.info.is_empty() {
                section.info.push('\n');
            }
            section.info.push_str(line.trim());
        }
    }

    sections.extend(current);
    sections
}
