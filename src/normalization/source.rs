//! Tab-delimited clue archive reader.
//!
//! Produces normalized rows lazily in file order. Rows too short to reach the
//! required columns, and rows from which no question/answer pair can be
//! formed, are skipped and counted; only I/O failures surface as errors.
use crate::normalization::fields::{
    is_final_round, parse_airdate, parse_game_id, parse_value, DateFormat, ValueRule,
};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use csv::{ByteRecord, ReaderBuilder};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Layout of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFormat {
    /// Header-driven season dump (`category`, `answer`, `comments`, `clue_value`, `air_date`, `round`).
    #[default]
    Seasons,
    /// Positional archive: `game_id, airdate, round, value, category, question, answer`.
    Archive,
}

impl SourceFormat {
    pub fn date_format(self) -> DateFormat {
        match self {
            SourceFormat::Seasons => DateFormat::Iso,
            SourceFormat::Archive => DateFormat::UsSlashed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    pub format: SourceFormat,
    pub value_rule: ValueRule,
}

impl ParserOptions {
    /// Archive files carry currency-formatted values; season dumps are digits only.
    pub fn for_format(format: SourceFormat) -> Self {
        Self {
            format,
            value_rule: ValueRule {
                strip_currency: format == SourceFormat::Archive,
            },
        }
    }
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self::for_format(SourceFormat::default())
    }
}

/// One normalized source row. `value == None` marks a final-round clue;
/// `airdate == None` means the date was missing or malformed.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub category: String,
    pub question: String,
    pub answer: String,
    pub value: Option<i32>,
    pub airdate: Option<DateTime<Utc>>,
    /// Raw air date text; groups clues of one episode when no game id column exists.
    pub airdate_raw: String,
    pub game_id: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    category: usize,
    answer: usize,
    question: usize,
    value: usize,
    airdate: usize,
    round: Option<usize>,
    game: Option<usize>,
    /// Season dumps keep the clue in `comments` and sometimes leave it blank,
    /// with the clue in `answer` and the response in `question`.
    swapped_answer: Option<usize>,
}

impl Columns {
    fn archive(headers: &ByteRecord) -> Result<Self> {
        if headers.len() < 7 {
            return Err(anyhow!(
                "archive layout needs 7 columns, header has {}",
                headers.len()
            ));
        }
        Ok(Self {
            game: Some(0),
            airdate: 1,
            round: Some(2),
            value: 3,
            category: 4,
            question: 5,
            answer: 6,
            swapped_answer: None,
        })
    }

    fn seasons(headers: &ByteRecord) -> Result<Self> {
        let require = |names: &[&str]| -> Result<usize> {
            position(headers, names).ok_or_else(|| anyhow!("{} col missing", names.join("/")))
        };
        let question = require(&["comments", "question"])?;
        let swapped_answer = position(headers, &["question"]).filter(|idx| *idx != question);
        Ok(Self {
            category: require(&["category"])?,
            answer: require(&["answer"])?,
            question,
            value: require(&["clue_value", "value"])?,
            airdate: require(&["air_date", "airdate"])?,
            round: position(headers, &["round"]),
            game: position(headers, &["game_id"]),
            swapped_answer,
        })
    }

    /// Fields a row must reach; optional trailing columns may be missing.
    fn required_width(&self) -> usize {
        [
            self.category,
            self.answer,
            self.question,
            self.value,
            self.airdate,
        ]
        .into_iter()
        .max()
        .map_or(0, |idx| idx + 1)
    }
}

fn position(headers: &ByteRecord, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| {
        headers
            .iter()
            .position(|h| trim_ascii(h).eq_ignore_ascii_case(name.as_bytes()))
    })
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Lazy single-pass iterator over the data rows of a source file.
pub struct SourceRows<R: Read> {
    reader: csv::Reader<R>,
    columns: Columns,
    width: usize,
    options: ParserOptions,
    record: ByteRecord,
    read: u64,
    skipped: u64,
}

impl SourceRows<BufReader<File>> {
    pub fn open(path: &Path, options: ParserOptions) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        Self::from_reader(BufReader::with_capacity(1 << 20, file), options)
            .with_context(|| format!("read header of {}", path.display()))
    }
}

impl<R: Read> SourceRows<R> {
    pub fn from_reader(input: R, options: ParserOptions) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .from_reader(input);
        let headers = reader.byte_headers()?.clone();
        let columns = match options.format {
            SourceFormat::Seasons => Columns::seasons(&headers)?,
            SourceFormat::Archive => Columns::archive(&headers)?,
        };
        Ok(Self {
            reader,
            columns,
            width: columns.required_width(),
            options,
            record: ByteRecord::new(),
            read: 0,
            skipped: 0,
        })
    }

    /// Data rows consumed so far, skipped ones included.
    pub fn rows_read(&self) -> u64 {
        self.read
    }

    /// Rows dropped as malformed so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn field(&self, idx: usize) -> Cow<'_, str> {
        String::from_utf8_lossy(self.record.get(idx).unwrap_or_default())
    }

    fn normalize(&self) -> Option<SourceRow> {
        if self.record.len() < self.width {
            return None;
        }
        let c = self.columns;
        let category = self.field(c.category).trim().to_string();
        if category.is_empty() {
            return None;
        }
        let (question, answer) = self.text_pair()?;
        let final_round = c
            .round
            .map(|idx| is_final_round(&self.field(idx)))
            .unwrap_or(false);
        let value = if final_round {
            None
        } else {
            Some(parse_value(&self.field(c.value), self.options.value_rule))
        };
        let airdate_raw = self.field(c.airdate).trim().to_string();
        let airdate = parse_airdate(&airdate_raw, self.options.format.date_format());
        let game_id = c.game.and_then(|idx| parse_game_id(&self.field(idx)));
        Some(SourceRow {
            category,
            question,
            answer,
            value,
            airdate,
            airdate_raw,
            game_id,
        })
    }

    /// Question and answer text, taking the swapped layout when `comments` is blank.
    fn text_pair(&self) -> Option<(String, String)> {
        let c = self.columns;
        let question = self.field(c.question).trim().to_string();
        let answer = self.field(c.answer).trim().to_string();
        if !question.is_empty() && !answer.is_empty() {
            return Some((question, answer));
        }
        if !question.is_empty() || answer.is_empty() {
            return None;
        }
        let response = self.field(c.swapped_answer?).trim().to_string();
        (!response.is_empty()).then_some((answer, response))
    }
}

impl<R: Read> Iterator for SourceRows<R> {
    type Item = Result<SourceRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(false) => return None,
                Ok(true) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.read += 1;
            match self.normalize() {
                Some(row) => return Some(Ok(row)),
                None => {
                    self.skipped += 1;
                    tracing::debug!(row = self.read, "skipping malformed source row");
                }
            }
        }
    }
}
