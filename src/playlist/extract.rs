//! Turn one hour's playlist page into transmission records.
//!
//! A page has a day marker (`li.playlist_navi_head`) and, when anything was
//! played that hour, a `dl.music_research` list of alternating
//! `dt.time` / `dd.audio` entries. Each `dd.audio` holds an `li.title` with
//! two spans: artist first, title second.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use super::RawPage;
use crate::db::models::TransmissionRecord;
use crate::UNKNOWN_FIELD;

static DAY_MARKER: LazyLock<Selector> = LazyLock::new(|| selector("li.playlist_navi_head"));
static PLAYLIST: LazyLock<Selector> = LazyLock::new(|| selector("dl.music_research"));
static TIME_LABEL: LazyLock<Selector> = LazyLock::new(|| selector("dt.time"));
static AUDIO_INFO: LazyLock<Selector> = LazyLock::new(|| selector("dd.audio"));
static TITLE_ITEM: LazyLock<Selector> = LazyLock::new(|| selector("li.title"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| selector("span"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static CSS selector")
}

/// What a page says about its hour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Error status or no day marker: there is no history this far back.
    NoData,
    /// Valid page, nothing played this hour.
    Empty,
    /// Songs in document order.
    Songs(Vec<TransmissionRecord>),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Page body is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("Day marker is present but has no text")]
    EmptyDayMarker,
}

pub fn extract(page: &RawPage, station: &str) -> Result<Extraction, ExtractError> {
    if !page.is_success() {
        log::debug!("Status {} for {} hour {}", page.status, page.date, page.hour);
        return Ok(Extraction::NoData);
    }

    let doc = Html::parse_document(std::str::from_utf8(&page.body)?);

    let Some(day) = doc.select(&DAY_MARKER).next() else {
        return Ok(Extraction::NoData);
    };
    let day = first_text(day).ok_or(ExtractError::EmptyDayMarker)?;

    // Hours with no music have a day marker but no playlist
    let Some(playlist) = doc.select(&PLAYLIST).next() else {
        return Ok(Extraction::Empty);
    };

    let times: Vec<ElementRef> = playlist.select(&TIME_LABEL).collect();
    let infos: Vec<ElementRef> = playlist.select(&AUDIO_INFO).collect();
    if times.len() != infos.len() {
        log::warn!(
            "{} hour {}: {} time labels but {} audio blocks, pairing in order",
            page.date, page.hour, times.len(), infos.len()
        );
    }

    let mut records = Vec::with_capacity(times.len().min(infos.len()));
    for (time, info) in times.into_iter().zip(infos) {
        let Some(time) = first_text(time) else {
            log::warn!("{} hour {}: skipping entry without a time", page.date, page.hour);
            continue;
        };
        let (artist, title) = artist_and_title(info);
        records.push(TransmissionRecord {
            artist_name: artist,
            song_title: title,
            station_name: station.to_string(),
            timestamp: format!("{day} {time}"),
        });
    }

    Ok(Extraction::Songs(records))
}

/// First non-blank text inside an element, trimmed.
fn first_text(el: ElementRef<'_>) -> Option<&str> {
    el.text().map(str::trim).find(|s| !s.is_empty())
}

/// Artist and title are the first two spans of the first `li.title`.
fn artist_and_title(info: ElementRef<'_>) -> (String, String) {
    let mut spans = info
        .select(&TITLE_ITEM)
        .next()
        .into_iter()
        .flat_map(|item| item.select(&SPAN));
    let mut field = || {
        spans
            .next()
            .and_then(first_text)
            .unwrap_or(UNKNOWN_FIELD)
            .to_string()
    };
    let artist = field();
    let title = field();
    (artist, title)
}
