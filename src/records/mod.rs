// Record normalization
// Maps loosely-typed CSV rows from the three source families onto canonical records

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

pub const MAX_ID_LENGTH: usize = 100;
pub const MAX_FALLBACK_TEXT_LENGTH: usize = 2000;
const FALLBACK_SEPARATOR: &str = " | ";

/// Metadata stored alongside each vector
pub type Metadata = serde_json::Map<String, Value>;

/// Content-bearing columns in priority order; each group contributes at most one value
const TEXT_COLUMNS: &[&[&str]] = &[
    &["sanskrit", "sanskrit_verse", "verse_text", "shloka", "sloka"],
    &["translation", "english_translation", "english", "meaning"],
    &["hinglish", "hinglish_paraphrase", "colloquial", "colloquial_paraphrase"],
    &["paraphrase", "hindi", "hindi_paraphrase", "simple_paraphrase"],
    &["summary", "commentary_summary", "commentary", "explanation"],
    &["message", "practice_text", "practice", "content", "text"],
];

const GENERIC_ID_COLUMNS: &[&str] = &["id", "source_id"];

/// Canonical structured field and the column aliases that feed it
struct StructuredField {
    name: &'static str,
    aliases: &'static [&'static str],
}

const CHAPTER: StructuredField = StructuredField {
    name: "chapter",
    aliases: &["chapter", "chapter_no", "chapter_number", "ch"],
};
const VERSE: StructuredField = StructuredField {
    name: "verse",
    aliases: &["verse", "verse_no", "verse_number", "shloka_no"],
};
const TAGS: StructuredField = StructuredField {
    name: "tags",
    aliases: &["tags", "tag", "themes", "topics"],
};
const TITLE: StructuredField = StructuredField {
    name: "title",
    aliases: &["title", "name", "practice_title", "heading"],
};

/// The three kinds of input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFamily {
    Verses,
    Commentary,
    Practices,
}

impl RecordFamily {
    pub const ALL: [Self; 3] = [Self::Verses, Self::Commentary, Self::Practices];

    /// Value stored in `metadata.source` and used for positional ids
    #[inline]
    pub fn source_name(self) -> &'static str {
        match self {
            Self::Verses => "verses",
            Self::Commentary => "commentary",
            Self::Practices => "practices",
        }
    }

    /// Value stored in `metadata.type`
    #[inline]
    pub fn record_type(self) -> &'static str {
        match self {
            Self::Verses => "verse",
            Self::Commentary => "commentary",
            Self::Practices => "practice",
        }
    }

    fn id_columns(self) -> &'static [&'static str] {
        match self {
            Self::Verses => &["verse_id", "shloka_id", "ref", "reference"],
            Self::Commentary => &["commentary_id", "comment_id"],
            Self::Practices => &["practice_id"],
        }
    }

    fn structured_fields(self) -> &'static [StructuredField] {
        match self {
            Self::Verses => &[CHAPTER, VERSE, TAGS],
            Self::Commentary => &[CHAPTER, VERSE, TITLE, TAGS],
            Self::Practices => &[TITLE, TAGS],
        }
    }
}

impl fmt::Display for RecordFamily {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_name())
    }
}

impl FromStr for RecordFamily {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "verses" | "verse" => Ok(Self::Verses),
            "commentary" | "commentaries" => Ok(Self::Commentary),
            "practices" | "practice" => Ok(Self::Practices),
            other => Err(format!("unknown record family: {}", other)),
        }
    }
}

/// One input row: header/value pairs in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    columns: Vec<(String, String)>,
}

impl RawRow {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            columns: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    #[inline]
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.columns.push((key.into(), value.into()));
    }

    #[inline]
    pub fn columns(&self) -> &[(String, String)] {
        &self.columns
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// First non-empty value whose header matches one of `aliases`, tried in alias order
    #[inline]
    pub fn resolve(&self, aliases: &[&str]) -> Option<&str> {
        aliases.iter().find_map(|alias| {
            self.columns.iter().find_map(|(key, value)| {
                let value = value.trim();
                (normalize_header(key) == *alias && !value.is_empty()).then_some(value)
            })
        })
    }
}

/// Canonical `{id, text, metadata}` unit ready for embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// Turns raw rows of one family into records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordNormalizer {
    family: RecordFamily,
}

impl RecordNormalizer {
    #[inline]
    pub fn new(family: RecordFamily) -> Self {
        Self { family }
    }

    #[inline]
    pub fn family(&self) -> RecordFamily {
        self.family
    }

    /// Normalize one row; `index` is its zero-based position in the file
    ///
    /// Total over arbitrary rows: missing columns degrade to fallbacks, never errors.
    #[inline]
    pub fn normalize(&self, row: &RawRow, index: usize) -> Record {
        let id = self.derive_id(row, index);
        let text = derive_text(row).unwrap_or_else(|| id.clone());
        let metadata = self.build_metadata(row, &id, &text);
        Record { id, text, metadata }
    }

    /// Normalize a whole file's rows, warning about ids that collide
    #[inline]
    pub fn normalize_all(&self, rows: &[RawRow]) -> Vec<Record> {
        let mut seen = HashSet::with_capacity(rows.len());
        rows.iter()
            .enumerate()
            .map(|(index, row)| {
                let record = self.normalize(row, index);
                if !seen.insert(record.id.clone()) {
                    warn!(
                        "Duplicate id {} in {} (row {}); later row wins on upsert",
                        record.id,
                        self.family,
                        index + 1
                    );
                }
                record
            })
            .collect()
    }

    fn derive_id(&self, row: &RawRow, index: usize) -> String {
        let raw = row
            .resolve(self.family.id_columns())
            .or_else(|| row.resolve(GENERIC_ID_COLUMNS))
            .map(sanitize_id)
            .filter(|id| !id.is_empty());

        raw.unwrap_or_else(|| format!("{}_{}", self.family.source_name(), index + 1))
    }

    fn build_metadata(&self, row: &RawRow, id: &str, text: &str) -> Metadata {
        let mut metadata = Metadata::new();

        for (key, value) in row.columns() {
            let key = strip_bom(key);
            if !key.is_empty() {
                metadata.insert(key.to_string(), Value::String(value.trim().to_string()));
            }
        }

        for field in self.family.structured_fields() {
            let value = row.resolve(field.aliases).unwrap_or_default();
            metadata.insert(field.name.to_string(), Value::String(value.to_string()));
        }

        metadata.insert(
            "source".to_string(),
            Value::String(self.family.source_name().to_string()),
        );
        metadata.insert(
            "type".to_string(),
            Value::String(self.family.record_type().to_string()),
        );
        metadata.insert("id".to_string(), Value::String(id.to_string()));
        metadata.insert("text".to_string(), Value::String(text.to_string()));
        metadata
    }
}

/// Concatenate recognised content columns; fall back to every value in the row
fn derive_text(row: &RawRow) -> Option<String> {
    let parts: Vec<&str> = TEXT_COLUMNS
        .iter()
        .filter_map(|aliases| row.resolve(aliases))
        .collect();

    if !parts.is_empty() {
        return Some(parts.join("\n"));
    }

    debug!("No recognised content column, joining all values");
    let joined = row
        .columns()
        .iter()
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(FALLBACK_SEPARATOR);

    let truncated = truncate_chars(&joined, MAX_FALLBACK_TEXT_LENGTH);
    (!truncated.is_empty()).then(|| truncated.to_string())
}

/// Collapse whitespace runs to `_` and bound the length for vector-store keys
#[inline]
pub fn sanitize_id(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join("_");
    truncate_chars(&collapsed, MAX_ID_LENGTH).to_string()
}

/// Trim a header, dropping a UTF-8 byte-order mark left by spreadsheet exports
fn strip_bom(header: &str) -> &str {
    header.trim().trim_start_matches('\u{feff}').trim()
}

/// Lowercase and unify separators so "English Translation" matches `english_translation`
#[inline]
pub fn normalize_header(header: &str) -> String {
    strip_bom(header)
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_index, _)) => s.get(..byte_index).unwrap_or(s),
        None => s,
    }
}

/// Read every row of a CSV document with a header row
#[inline]
pub fn read_rows_from_reader<R: Read>(reader: R) -> crate::Result<Vec<RawRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let mut rows = Vec::new();

    for result in csv_reader.records() {
        let record = result?;
        let row = RawRow::from_pairs(
            headers
                .iter()
                .zip(record.iter())
                .map(|(header, value)| (strip_bom(header).to_string(), value.to_string())),
        );
        if row.columns().iter().any(|(_, value)| !value.is_empty()) {
            rows.push(row);
        }
    }

    Ok(rows)
}

/// Read every row of a CSV file
#[inline]
pub fn read_rows<P: AsRef<Path>>(path: P) -> crate::Result<Vec<RawRow>> {
    let path = path.as_ref();
    debug!("Reading rows from {}", path.display());
    let file = std::fs::File::open(path)?;
    let rows = read_rows_from_reader(std::io::BufReader::new(file))?;
    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}
