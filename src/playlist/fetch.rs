use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use super::RawPage;

#[derive(Error, Debug)]
#[error("Request for {date} hour {hour} failed: {source}")]
pub struct FetchError {
    pub date: NaiveDate,
    pub hour: u8,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Anything that can produce the playlist page for one (date, hour).
pub trait PlaylistSource {
    /// One request, no retries. Non-2xx statuses come back as pages;
    /// only transport failures are errors.
    fn fetch(&self, date: NaiveDate, hour: u8) -> Result<RawPage, FetchError>;
}

/// Fetches playlist pages over HTTP with a form POST.
pub struct HttpFetcher {
    agent: ureq::Agent,
    url: String,
}

impl HttpFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            url: url.into(),
        }
    }
}

impl PlaylistSource for HttpFetcher {
    fn fetch(&self, date: NaiveDate, hour: u8) -> Result<RawPage, FetchError> {
        let wrap = |e: ureq::Error| FetchError { date, hour, source: Box::new(e) };

        log::debug!("POST {} date={date} hour={hour}", self.url);
        let mut response = self
            .agent
            .post(&self.url)
            .send_form(form_fields(date, hour))
            .map_err(wrap)?;

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_vec().map_err(wrap)?;
        log::debug!("  {status}, {} bytes", body.len());

        Ok(RawPage { date, hour, status, body })
    }
}

/// Form body for one unit: `date` as DD.MM.YYYY, `hour` without leading zero.
pub fn form_fields(date: NaiveDate, hour: u8) -> [(&'static str, String); 2] {
    [
        ("date", date.format("%d.%m.%Y").to_string()),
        ("hour", hour.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_fields() {
        let date = NaiveDate::from_ymd_opt(2023, 5, 1).unwrap();
        let [(dk, dv), (hk, hv)] = form_fields(date, 9);
        assert_eq!((dk, dv.as_str()), ("date", "01.05.2023"));
        assert_eq!((hk, hv.as_str()), ("hour", "9"));

        let [_, (_, hv)] = form_fields(date, 23);
        assert_eq!(hv, "23");
    }

    #[test]
    #[ignore] // Hits the live playlist endpoint
    fn test_fetch_live_page() {
        let fetcher = HttpFetcher::new(crate::PLAYLIST_URL, Duration::from_secs(30));
        let yesterday = chrono::Local::now().date_naive().pred_opt().unwrap();
        let page = fetcher.fetch(yesterday, 12).unwrap();
        assert!(page.is_success());
        assert!(!page.body.is_empty());
    }
}
