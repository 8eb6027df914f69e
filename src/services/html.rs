// src/services/html.rs

//! HTML page source.
//!
//! Fetches listing and participant pages over HTTP and extracts events,
//! participant entries and detail fragments with configured CSS selectors.
//! Documents are parsed synchronously after each fetch and never held
//! across an await point.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Event, Fragment, FragmentItem, ParticipantRef, SourceConfig};
use crate::services::source::PageSource;
use crate::utils::text::collapse_whitespace;
use crate::utils::url::resolve_url;

/// Compiled selectors, see [`crate::models::SourceSelectors`].
#[derive(Debug)]
struct Selectors {
    event_row: Selector,
    event_title: Selector,
    event_meta: Selector,
    event_info_link: Selector,
    event_participants_link: Selector,
    participant_row: Selector,
    participant_id_attr: String,
    label: Selector,
    value: Selector,
    day_header: Selector,
    fragment_items: Selector,
}

impl Selectors {
    fn compile(config: &SourceConfig) -> Result<Self> {
        let s = &config.selectors;
        Ok(Self {
            event_row: parse_selector(&s.event_row)?,
            event_title: parse_selector(&s.event_title)?,
            event_meta: parse_selector(&s.event_meta)?,
            event_info_link: parse_selector(&s.event_info_link)?,
            event_participants_link: parse_selector(&s.event_participants_link)?,
            participant_row: parse_selector(&s.participant_row)?,
            participant_id_attr: s.participant_id_attr.clone(),
            label: parse_selector(&s.label)?,
            value: parse_selector(&s.value)?,
            day_header: parse_selector(&s.day_header)?,
            fragment_items: parse_selector(&format!("{}, {}, {}", s.label, s.value, s.day_header))?,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn element_text(el: &ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// Page source backed by HTTP fetches of rendered pages.
pub struct HtmlPageSource {
    client: Client,
    listing_url: Url,
    selectors: Selectors,
    /// Last participants page: (url, body)
    cached_page: Option<(String, String)>,
}

impl HtmlPageSource {
    /// Create a source with the configured user agent and session cookie.
    pub fn new(config: &SourceConfig, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = config.cookie.as_deref().filter(|c| !c.trim().is_empty()) {
            let value = HeaderValue::from_str(cookie.trim())
                .map_err(|e| AppError::config(format!("invalid source.cookie: {e}")))?;
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            listing_url: Url::parse(&config.listing_url)?,
            selectors: Selectors::compile(config)?,
            cached_page: None,
        })
    }

    async fn get(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Body of `url`, reusing the last participants page when it matches.
    async fn page(&mut self, url: &str) -> Result<String> {
        if let Some((cached_url, body)) = &self.cached_page {
            if cached_url == url {
                return Ok(body.clone());
            }
        }
        let body = self.get(url).await?;
        self.cached_page = Some((url.to_string(), body.clone()));
        Ok(body)
    }

    fn participants_page_url(event: &Event) -> Result<&str> {
        event
            .participants_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(Some(event.url.as_str()).filter(|u| !u.is_empty()))
            .ok_or_else(|| AppError::fetch(&event.id, "event has no participants page"))
    }

    fn parse_events(&self, body: &str) -> Vec<Event> {
        let document = Html::parse_document(body);
        let s = &self.selectors;
        let mut events = Vec::new();

        for row in document.select(&s.event_row) {
            let title = row
                .select(&s.event_title)
                .next()
                .map(|el| element_text(&el))
                .unwrap_or_default();
            let meta: Vec<String> = row
                .select(&s.event_meta)
                .map(|el| element_text(&el))
                .filter(|t| !t.is_empty())
                .collect();
            let link = |sel: &Selector| {
                row.select(sel)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(|href| resolve_url(&self.listing_url, href))
            };

            let participants_url = link(&s.event_participants_link);
            let mut event = Event {
                url: link(&s.event_info_link)
                    .or_else(|| participants_url.clone())
                    .unwrap_or_default(),
                title,
                dates: meta.first().cloned().unwrap_or_default(),
                organizer: meta.get(1).cloned().unwrap_or_default(),
                location: meta.get(2).cloned().unwrap_or_default(),
                participants_url,
                ..Event::default()
            };

            if event.ensure_id() {
                events.push(event);
            } else {
                log::debug!("Skipping listing row without event id: '{}'", event.title);
            }
        }
        events
    }

    fn parse_participants(&self, body: &str) -> Vec<ParticipantRef> {
        let document = Html::parse_document(body);
        let s = &self.selectors;
        document
            .select(&s.participant_row)
            .enumerate()
            .map(|(i, row)| {
                let id = row
                    .value()
                    .attr(&s.participant_id_attr)
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("row-{}", i + 1));
                ParticipantRef { id, url: None }
            })
            .collect()
    }

    fn parse_fragment(&self, body: &str, participant_id: &str) -> Option<Fragment> {
        let document = Html::parse_document(body);
        let s = &self.selectors;
        let (_, row) = document
            .select(&s.participant_row)
            .enumerate()
            .find(|(i, row)| match row.value().attr(&s.participant_id_attr) {
                Some(id) => id.trim() == participant_id,
                None => format!("row-{}", i + 1) == participant_id,
            })?;
        Some(self.fragment_of(&row))
    }

    fn fragment_of(&self, root: &ElementRef) -> Fragment {
        let s = &self.selectors;
        let mut fragment = Vec::new();
        let mut pending_label: Option<String> = None;

        for el in root.select(&s.fragment_items) {
            if s.day_header.matches(&el) {
                fragment.push(FragmentItem::day(element_text(&el)));
            } else if s.label.matches(&el) {
                pending_label = Some(element_text(&el));
            } else if s.value.matches(&el) {
                if let Some(label) = pending_label.take() {
                    fragment.push(FragmentItem::pair(label, element_text(&el)));
                }
            }
        }
        fragment
    }
}

#[async_trait]
impl PageSource for HtmlPageSource {
    async fn list_events(&mut self) -> Result<Vec<Event>> {
        let url = self.listing_url.to_string();
        let body = self.get(&url).await?;
        let events = self.parse_events(&body);
        log::info!("Listing {} yielded {} events", url, events.len());
        Ok(events)
    }

    async fn list_participants(&mut self, event: &Event) -> Result<Vec<ParticipantRef>> {
        let url = Self::participants_page_url(event)?.to_string();
        let body = self.page(&url).await?;
        Ok(self.parse_participants(&body))
    }

    async fn fetch_participant(
        &mut self,
        event: &Event,
        participant: &ParticipantRef,
    ) -> Result<Fragment> {
        let url = match participant.url.as_deref() {
            Some(detail) => detail.to_string(),
            None => Self::participants_page_url(event)?.to_string(),
        };
        let body = self.page(&url).await?;
        self.parse_fragment(&body, &participant.id).ok_or_else(|| {
            AppError::fetch(
                format!("{}/{}", event.id, participant.id),
                "participant entry not found on page",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <div class="group mb-6">
            <div class="font-caption text-lg">Trofeo de Primavera</div>
            <div class="text-xs">12-13 abr 2025</div>
            <div class="text-xs">Club Agility Norte</div>
            <div class="text-xs">Oviedo, Asturias</div>
            <a href="/zone/events/0f8fad5b-d9cb-469f-a165-70867728950e/info">Info</a>
            <a href="/zone/events/0f8fad5b-d9cb-469f-a165-70867728950e/participants_list">Participantes</a>
          </div>
          <div class="group mb-6">
            <div class="font-caption text-lg">Sin enlace</div>
          </div>
        </body></html>
    "#;

    const PARTICIPANTS: &str = r#"
        <html><body>
          <div data-participant-id="p-1">
            <span class="field-label">Guía</span><span class="field-value">Ana  Pérez</span>
            <span class="field-label">Perro</span><span class="field-value">Luna</span>
            <h3>Sábado</h3>
            <span class="field-label">Fecha</span><span class="field-value">12/04/2025</span>
            <span class="field-label">Mangas</span><span class="field-value">G2 / M</span>
          </div>
          <div data-participant-id="p-2">
            <span class="field-label">Guía</span><span class="field-value">Luis</span>
          </div>
        </body></html>
    "#;

    fn source() -> HtmlPageSource {
        HtmlPageSource::new(&SourceConfig::default(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn listing_rows_become_events() {
        let events = source().parse_events(LISTING);
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.id, "0f8fad5b-d9cb-469f-a165-70867728950e");
        assert_eq!(event.title, "Trofeo de Primavera");
        assert_eq!(event.dates, "12-13 abr 2025");
        assert_eq!(event.organizer, "Club Agility Norte");
        assert_eq!(event.location, "Oviedo, Asturias");
        assert!(event.url.ends_with("/info"));
        assert!(
            event
                .participants_url
                .as_deref()
                .unwrap()
                .starts_with("https://www.flowagility.com/zone/events/")
        );
    }

    #[test]
    fn participant_rows_and_fragments() {
        let source = source();
        let refs = source.parse_participants(PARTICIPANTS);
        assert_eq!(
            refs.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["p-1", "p-2"]
        );

        let fragment = source.parse_fragment(PARTICIPANTS, "p-1").unwrap();
        assert_eq!(
            fragment,
            vec![
                FragmentItem::pair("Guía", "Ana Pérez"),
                FragmentItem::pair("Perro", "Luna"),
                FragmentItem::day("Sábado"),
                FragmentItem::pair("Fecha", "12/04/2025"),
                FragmentItem::pair("Mangas", "G2 / M"),
            ]
        );
        assert!(source.parse_fragment(PARTICIPANTS, "p-9").is_none());
    }

    #[test]
    fn invalid_selector_rejected() {
        let mut config = SourceConfig::default();
        config.selectors.label = "[[invalid".to_string();
        assert!(HtmlPageSource::new(&config, Duration::from_secs(5)).is_err());
    }
}
