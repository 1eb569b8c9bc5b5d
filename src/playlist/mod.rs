//! Hourly playlist pages: fetching them and turning them into records.

pub mod extract;
pub mod fetch;

use chrono::NaiveDate;

/// Response for one (date, hour) unit, kept verbatim for diagnostics.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub date: NaiveDate,
    pub hour: u8,
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::RawPage;
    use chrono::NaiveDate;

    pub fn playlist_page(day: &str, entries: &[(&str, &str, &str)]) -> String {
        let mut items = String::new();
        for (time, artist, title) in entries {
            items.push_str(&format!(
                r##"<dt class="time">{time}</dt>
                <dd class="audio">
                  <ul>
                    <li class="title"><span>{artist}</span> - <span>{title}</span></li>
                    <li class="more"><a href="#">Details</a></li>
                  </ul>
                </dd>
                "##
            ));
        }
        format!(
            r#"<html><body>
            <ul class="playlist_navi"><li class="playlist_navi_head">{day}</li></ul>
            <dl class="music_research">{items}</dl>
            </body></html>"#
        )
    }

    pub fn empty_hour_page(day: &str) -> String {
        format!(
            r#"<html><body>
            <ul class="playlist_navi"><li class="playlist_navi_head">{day}</li></ul>
            <p>Keine Titel in dieser Stunde.</p>
            </body></html>"#
        )
    }

    pub fn no_data_page() -> String {
        "<html><body><p>Für diesen Zeitraum liegen keine Daten vor.</p></body></html>".to_string()
    }

    pub fn page(date: NaiveDate, hour: u8, html: String) -> RawPage {
        RawPage { date, hour, status: 200, body: html.into_bytes() }
    }
}
