//! Timeline events: a date range, text, media and a display group.

pub mod repository;

use serde::{Deserialize, Deserializer, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub use repository::{TimelineMirror, TimelineRepository};

use crate::config::GroupRule;
use crate::error::{DataError, Result};

/// A calendar date where only the year is mandatory.
///
/// Older documents used `0` for an unspecified month or day; those decode to
/// `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineDate {
    pub year: i32,
    #[serde(default, deserialize_with = "zero_as_none")]
    pub month: Option<u8>,
    #[serde(default, deserialize_with = "zero_as_none")]
    pub day: Option<u8>,
}

fn zero_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<u8>, D::Error> {
    Ok(Option::<u8>::deserialize(deserializer)?.filter(|v| *v != 0))
}

/// Year `0` marked an unset end date in older documents.
fn unset_date_as_none<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<TimelineDate>, D::Error> {
    Ok(Option::<TimelineDate>::deserialize(deserializer)?.filter(|d| d.year != 0))
}

impl TimelineDate {
    pub fn year(year: i32) -> Self {
        Self {
            year,
            month: None,
            day: None,
        }
    }

    pub fn ymd(year: i32, month: u8, day: u8) -> Self {
        Self {
            year,
            month: Some(month),
            day: Some(day),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(month) = self.month {
            if !(1..=12).contains(&month) {
                return Err(DataError::validation(format!("month {} out of range", month)));
            }
        }
        match (self.month, self.day) {
            (None, Some(_)) => Err(DataError::validation("day given without month")),
            (_, Some(day)) if !(1..=31).contains(&day) => {
                Err(DataError::validation(format!("day {} out of range", day)))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineText {
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineMedia {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineBackground {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub color: String,
}

/// Stored body of a timeline event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEventData {
    pub start_date: TimelineDate,
    /// Written as `null` when unset so a merge-write clears a stored end date.
    #[serde(default, deserialize_with = "unset_date_as_none")]
    pub end_date: Option<TimelineDate>,
    #[serde(default)]
    pub text: TimelineText,
    #[serde(default)]
    pub media: TimelineMedia,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub background: TimelineBackground,
}

impl Default for TimelineEventData {
    fn default() -> Self {
        Self {
            start_date: TimelineDate::year(2000),
            end_date: None,
            text: TimelineText::default(),
            media: TimelineMedia::default(),
            group: String::new(),
            background: TimelineBackground::default(),
        }
    }
}

impl TimelineEventData {
    pub fn validate(&self) -> Result<()> {
        self.start_date.validate()?;
        if let Some(end) = &self.end_date {
            end.validate()?;
        }
        Ok(())
    }
}

/// First group whose keyword appears in `headline`.
pub fn derive_group<'a>(headline: &str, rules: &'a [GroupRule]) -> Option<&'a str> {
    rules
        .iter()
        .find(|rule| headline.contains(&rule.keyword))
        .map(|rule| rule.group.as_str())
}

/// A timeline event plus the local files still waiting to be uploaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineEvent {
    /// Assigned by the store on first save.
    pub id: Option<String>,
    pub data: TimelineEventData,
    pub media_file: Option<PathBuf>,
    pub thumbnail_file: Option<PathBuf>,
}

impl TimelineEvent {
    pub fn new(data: TimelineEventData) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    /// The event as the timeline widget expects it: unset date parts, an
    /// unset end date, empty media and an empty group are left out.
    pub fn timeline_js_data(&self) -> TimelineJsEvent<'_> {
        let media = &self.data.media;
        TimelineJsEvent {
            unique_id: self.id.as_deref(),
            start_date: self.data.start_date,
            end_date: self.data.end_date,
            text: &self.data.text,
            media: (!media.url.is_empty()).then_some(media),
            group: &self.data.group,
            background: &self.data.background,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TimelineJsDate {
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<u8>,
}

impl From<TimelineDate> for TimelineJsDate {
    fn from(date: TimelineDate) -> Self {
        Self {
            year: date.year,
            month: date.month,
            day: date.day,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TimelineJsEvent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<&'a str>,
    #[serde(serialize_with = "js_date")]
    pub start_date: TimelineDate,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "js_opt_date")]
    pub end_date: Option<TimelineDate>,
    pub text: &'a TimelineText,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<&'a TimelineMedia>,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub group: &'a str,
    pub background: &'a TimelineBackground,
}

fn js_date<S: serde::Serializer>(date: &TimelineDate, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    TimelineJsDate::from(*date).serialize(serializer)
}

fn js_opt_date<S: serde::Serializer>(
    date: &Option<TimelineDate>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    date.map(TimelineJsDate::from).serialize(serializer)
}

#[derive(Serialize)]
struct TimelineJsDocument<'a> {
    events: Vec<TimelineJsEvent<'a>>,
}

/// Write events as a timeline widget data file (`{"events": [...]}`).
pub fn export_timeline_js(events: &[TimelineEvent], output_path: &Path) -> Result<usize> {
    let document = TimelineJsDocument {
        events: events.iter().map(TimelineEvent::timeline_js_data).collect(),
    };
    let json = serde_json::to_string_pretty(&document)?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(events.len())
}
