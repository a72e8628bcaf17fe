/// Record types for the time schedule catalog
use super::{Column, Parent, PrimaryKey, Queryable};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// An academic department, the root of the catalog hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub abbreviation: String,
    pub title: String,
    /// Absolute URL of the department's class listing
    pub link: String,
}

impl Department {
    pub fn new(abbreviation: &str, title: &str, link: &str) -> Self {
        Self {
            abbreviation: abbreviation.to_string(),
            title: title.to_string(),
            link: link.to_string(),
        }
    }
}

impl Queryable for Department {
    const TABLE: &'static str = "departments";
    const COLUMNS: &'static [Column] = &[
        Column::text("abbreviation"),
        Column::text("title"),
        Column::text("link"),
    ];

    fn primary_key(&self) -> PrimaryKey {
        PrimaryKey::new(self.abbreviation.as_str())
    }
}

impl Parent for Department {
    fn foreign_key_value(&self) -> PrimaryKey {
        self.primary_key()
    }
}

/// A class offered by a department (e.g. CSE 142).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    /// Owning department (foreign key)
    pub dept_abbreviation: String,
    /// Abbreviation and code without whitespace, e.g. "CSE142"
    pub abbreviation_code: String,
    pub abbreviation: String,
    pub code: String,
    pub title: String,
    pub description: String,
    /// Position of the class on its department page
    pub index: i64,
}

static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?i)<a href=""#).unwrap());

impl Class {
    pub fn new(
        dept: &Department,
        abbreviation: &str,
        code: &str,
        title: &str,
        description: &str,
        index: i64,
    ) -> Self {
        Self {
            dept_abbreviation: dept.foreign_key_value().to_string(),
            abbreviation_code: Self::abbreviation_code_for(abbreviation, code),
            abbreviation: abbreviation.to_string(),
            code: code.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            index,
        }
    }

    /// Joins an abbreviation and code with all whitespace removed ("C LIT", "240" -> "CLIT240").
    pub fn abbreviation_code_for(abbreviation: &str, code: &str) -> String {
        abbreviation
            .chars()
            .chain(code.chars())
            .filter(|c| !c.is_whitespace())
            .collect()
    }

    /// Returns the description with every relative `<a href="...">` rewritten
    /// to point under `root`.
    pub fn description_with_absolute_links(&self, root: &str) -> String {
        let root = root.trim_end_matches('/');
        ANCHOR_HREF
            .split(&self.description)
            .enumerate()
            .fold(String::new(), |mut out, (i, piece)| {
                if i > 0 {
                    out.push_str(r#"<a href=""#);
                    if !piece.starts_with("http") {
                        out.push_str(root);
                        if !piece.starts_with('/') {
                            out.push('/');
                        }
                    }
                }
                out.push_str(piece);
                out
            })
    }
}

impl Queryable for Class {
    const TABLE: &'static str = "classes";
    const COLUMNS: &'static [Column] = &[
        Column::text("dept_abbreviation"),
        Column::text("abbreviation_code"),
        Column::text("abbreviation"),
        Column::text("code"),
        Column::text("title"),
        Column::text("description"),
        Column::integer("index"),
    ];

    fn primary_key(&self) -> PrimaryKey {
        PrimaryKey::new(format!("{}-{}", self.dept_abbreviation, self.abbreviation_code))
    }

    fn foreign_key(&self) -> Option<PrimaryKey> {
        Some(PrimaryKey::new(self.dept_abbreviation.as_str()))
    }
}

impl Parent for Class {
    fn foreign_key_value(&self) -> PrimaryKey {
        self.primary_key()
    }
}

/// One scheduled offering of a class, identified by its schedule line number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Owning class's composite key (foreign key)
    pub class_key: String,
    pub restriction: String,
    /// Schedule line number
    pub sln: String,
    pub section: String,
    pub credit: String,
    #[serde(with = "json_text")]
    pub meeting_times: Vec<MeetingTime>,
    pub instructor: String,
    pub status: String,
    pub taken_spots: i64,
    pub total_spots: i64,
    pub grades: String,
    pub fee: String,
    pub other: String,
    pub info: String,
}

impl Section {
    /// Creates an empty section belonging to `class`.
    pub fn new(class: &Class, sln: &str) -> Self {
        Self {
            class_key: class.foreign_key_value().to_string(),
            sln: sln.to_string(),
            ..Default::default()
        }
    }

    pub fn is_quiz_section(&self) -> bool {
        self.credit == "QZ"
    }

    pub fn is_open(&self) -> bool {
        self.total_spots - self.taken_spots >= 1
    }

    /// Whether the notes restrict this section to entering freshmen.
    pub fn is_freshmen(&self) -> bool {
        let info = self.info.to_lowercase().replace('\n', " ");
        ["freshmen", "freshman"].iter().any(|p| info.contains(p))
    }

    /// Whether the notes say this section is pending withdrawal.
    pub fn is_withdrawal(&self) -> bool {
        let info = self.info.to_lowercase();
        ["withdrawl", "withdrawal"].iter().any(|p| info.contains(p))
    }

    pub fn restriction_tokens(&self) -> Vec<(&'static str, bool)> {
        tokens_in(&self.restriction, &["Restr", "IS", ">"])
    }

    pub fn grade_tokens(&self) -> Vec<(&'static str, bool)> {
        tokens_in(&self.grades, &["CR/NC"])
    }

    pub fn other_tokens(&self) -> Vec<(&'static str, bool)> {
        tokens_in(&self.other, &["D", "H", "J", "R", "S", "W", "%", "#"])
    }
}

fn tokens_in(field: &str, tokens: &[&'static str]) -> Vec<(&'static str, bool)> {
    tokens.iter().map(|&t| (t, field.contains(t))).collect()
}

impl Queryable for Section {
    const TABLE: &'static str = "sections";
    const COLUMNS: &'static [Column] = &[
        Column::text("class_key"),
        Column::text("restriction"),
        Column::text("sln"),
        Column::text("section"),
        Column::text("credit"),
        Column::text("meeting_times"),
        Column::text("instructor"),
        Column::text("status"),
        Column::integer("taken_spots"),
        Column::integer("total_spots"),
        Column::text("grades"),
        Column::text("fee"),
        Column::text("other"),
        Column::text("info"),
    ];

    fn primary_key(&self) -> PrimaryKey {
        PrimaryKey::new(self.sln.as_str())
    }

    fn foreign_key(&self) -> Option<PrimaryKey> {
        Some(PrimaryKey::new(self.class_key.as_str()))
    }
}

/// When and where a section meets. Only ever stored inside its section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingTime {
    pub days: String,
    pub time: String,
    pub building: String,
    pub room: String,
}

impl MeetingTime {
    /// Lowercase day codes (`m`, `t`, `w`, `th`, `f`) this meeting is held on.
    pub fn day_set(&self) -> BTreeSet<&'static str> {
        let mut days = self.days.to_lowercase();
        let mut set = BTreeSet::new();
        // "th" must be consumed before "t"
        for day in ["m", "w", "f", "th", "t"] {
            if days.contains(day) {
                set.insert(day);
                days = days.replace(day, "");
            }
        }
        set
    }
}

/// Stores a list as a single JSON text value.
mod json_text {
    use super::MeetingTime;
    use serde::{de, ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &[MeetingTime],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let text = serde_json::to_string(value).map_err(ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<MeetingTime>, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(de::Error::custom)
    }
}
