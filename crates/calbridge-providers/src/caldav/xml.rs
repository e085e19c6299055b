//! WebDAV / CalDAV request bodies and multistatus parsing.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::{ProviderError, ProviderResult};

pub const DAV_NS: &str = "DAV:";
pub const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";

/// Builds a request body, remembering the first write failure.
struct XmlBody {
    writer: Writer<Cursor<Vec<u8>>>,
    error: Option<String>,
}

impl XmlBody {
    fn new(root: &str) -> Self {
        let mut body = Self {
            writer: Writer::new(Cursor::new(Vec::new())),
            error: None,
        };
        let mut start = BytesStart::new(root);
        start.push_attribute(("xmlns:d", DAV_NS));
        start.push_attribute(("xmlns:c", CALDAV_NS));
        body.emit(Event::Start(start));
        body
    }

    fn emit(&mut self, event: Event<'_>) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.writer.write_event(event) {
            self.error = Some(e.to_string());
        }
    }

    fn start(&mut self, name: &str) -> &mut Self {
        self.emit(Event::Start(BytesStart::new(name)));
        self
    }

    fn end(&mut self, name: &str) -> &mut Self {
        self.emit(Event::End(BytesEnd::new(name)));
        self
    }

    fn empty(&mut self, name: &str) -> &mut Self {
        self.emit(Event::Empty(BytesStart::new(name)));
        self
    }

    fn text_element(&mut self, name: &str, text: &str) -> &mut Self {
        if text.is_empty() {
            return self.empty(name);
        }
        self.start(name);
        self.emit(Event::Text(BytesText::new(text)));
        self.end(name)
    }

    fn finish(mut self, root: &str) -> ProviderResult<String> {
        self.end(root);
        if let Some(error) = self.error {
            return Err(ProviderError::internal(format!(
                "failed to build XML body: {error}"
            )));
        }
        String::from_utf8(self.writer.into_inner().into_inner())
            .map_err(|e| ProviderError::internal(format!("XML body is not UTF-8: {e}")))
    }
}

/// PROPFIND body requesting the given (prefixed) properties.
pub fn propfind_body(props: &[&str]) -> ProviderResult<String> {
    let mut body = XmlBody::new("d:propfind");
    body.start("d:prop");
    for prop in props {
        body.empty(prop);
    }
    body.end("d:prop");
    body.finish("d:propfind")
}

/// MKCALENDAR body for an event calendar.
pub fn mkcalendar_body(display_name: &str, description: &str) -> ProviderResult<String> {
    let mut body = XmlBody::new("c:mkcalendar");
    body.start("d:set").start("d:prop");
    body.text_element("d:displayname", display_name);
    if !description.is_empty() {
        body.text_element("c:calendar-description", description);
    }
    body.start("c:supported-calendar-component-set");
    let mut comp = BytesStart::new("c:comp");
    comp.push_attribute(("name", "VEVENT"));
    body.emit(Event::Empty(comp));
    body.end("c:supported-calendar-component-set");
    body.end("d:prop").end("d:set");
    body.finish("c:mkcalendar")
}

/// RFC 6578 sync-collection REPORT body. An empty token requests a full listing.
pub fn sync_collection_body(sync_token: &str) -> ProviderResult<String> {
    let mut body = XmlBody::new("d:sync-collection");
    body.text_element("d:sync-token", sync_token);
    body.text_element("d:sync-level", "1");
    body.start("d:prop").empty("d:getetag").end("d:prop");
    body.finish("d:sync-collection")
}

/// calendar-multiget REPORT body for the given hrefs.
pub fn calendar_multiget_body(hrefs: &[&str]) -> ProviderResult<String> {
    let mut body = XmlBody::new("c:calendar-multiget");
    body.start("d:prop")
        .empty("d:getetag")
        .empty("c:calendar-data")
        .end("d:prop");
    for href in hrefs {
        body.text_element("d:href", href);
    }
    body.finish("c:calendar-multiget")
}

/// Properties of a calendar collection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectionProps {
    pub display_name: Option<String>,
    pub sync_token: Option<String>,
    /// Raw VCALENDAR text holding the calendar's VTIMEZONE.
    pub calendar_timezone: Option<String>,
}

/// One member reported by a sync-collection REPORT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMember {
    Changed { href: String, etag: Option<String> },
    Removed { href: String },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Members in response order.
    pub members: Vec<SyncMember>,
    pub sync_token: Option<String>,
    /// The server capped the result (507 on the collection itself).
    pub truncated: bool,
}

/// One resource from a calendar-multiget REPORT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultigetEntry {
    pub href: String,
    pub etag: Option<String>,
    /// `None` when the server returned no calendar data for the href.
    pub data: Option<String>,
}

/// Extracts the local name from a potentially namespaced element name.
fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

/// Parses the numeric code of a `HTTP/1.1 404 Not Found` status line.
fn status_code(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse().ok()
}

fn reader(xml: &str) -> quick_xml::Reader<&[u8]> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    reader
}

fn parse_error(err: quick_xml::Error) -> ProviderError {
    ProviderError::invalid_response(format!("malformed multistatus XML: {err}"))
}

/// Walks the document and hands every text node to `on_text` along with
/// the element stack (local names).
fn walk(
    xml: &str,
    mut on_open: impl FnMut(&[String]),
    mut on_close: impl FnMut(&[String]),
    mut on_text: impl FnMut(&[String], String),
) -> ProviderResult<()> {
    let mut reader = reader(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(parse_error)? {
            Event::Start(e) => {
                stack.push(local_name(e.name().as_ref()));
                on_open(&stack);
            }
            Event::Empty(e) => {
                stack.push(local_name(e.name().as_ref()));
                on_open(&stack);
                on_close(&stack);
                stack.pop();
            }
            Event::End(_) => {
                on_close(&stack);
                stack.pop();
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(parse_error)?.into_owned();
                on_text(&stack, text);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                on_text(&stack, text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn current(stack: &[String]) -> &str {
    stack.last().map(String::as_str).unwrap_or_default()
}

fn inside(stack: &[String], element: &str) -> bool {
    stack.iter().any(|name| name == element)
}

/// Returns the first `href` nested in `property`, e.g. the target of
/// `current-user-principal` or `calendar-home-set`.
pub fn parse_property_href(xml: &str, property: &str) -> ProviderResult<Option<String>> {
    let mut found = None;
    walk(
        xml,
        |_| {},
        |_| {},
        |stack, text| {
            if found.is_none() && current(stack) == "href" && inside(stack, property) {
                found = Some(text);
            }
        },
    )?;
    Ok(found)
}

/// Parses a Depth: 0 PROPFIND on a calendar collection.
pub fn parse_collection_props(xml: &str) -> ProviderResult<CollectionProps> {
    let mut props = CollectionProps::default();
    walk(
        xml,
        |_| {},
        |_| {},
        |stack, text| {
            if !inside(stack, "prop") {
                return;
            }
            match current(stack) {
                "displayname" => props.display_name = Some(text),
                "sync-token" => props.sync_token = Some(text),
                "calendar-timezone" => props.calendar_timezone = Some(text),
                _ => {}
            }
        },
    )?;
    Ok(props)
}

#[derive(Default)]
struct ResponseState {
    href: Option<String>,
    status: Option<u16>,
    propstat_status: Option<u16>,
    propstat_etag: Option<String>,
    etag: Option<String>,
}

/// Parses a sync-collection REPORT response.
///
/// A member whose response status is 404 was removed. A 507 response marks
/// the report as truncated; the caller continues from the returned token.
pub fn parse_sync_report(xml: &str) -> ProviderResult<SyncReport> {
    let report = std::cell::RefCell::new(SyncReport::default());
    let state = std::cell::RefCell::new(ResponseState::default());

    walk(
        xml,
        |stack| match current(stack) {
            "response" => *state.borrow_mut() = ResponseState::default(),
            "propstat" => {
                let mut s = state.borrow_mut();
                s.propstat_status = None;
                s.propstat_etag = None;
            }
            _ => {}
        },
        |stack| match current(stack) {
            "propstat" => {
                let mut s = state.borrow_mut();
                if s.propstat_status.is_none_or(|code| code == 200)
                    && let Some(etag) = s.propstat_etag.take()
                {
                    s.etag = Some(etag);
                }
            }
            "response" => {
                let s = std::mem::take(&mut *state.borrow_mut());
                let Some(href) = s.href else { return };
                let mut report = report.borrow_mut();
                match s.status {
                    Some(404) => report.members.push(SyncMember::Removed { href }),
                    Some(507) => report.truncated = true,
                    _ => report.members.push(SyncMember::Changed {
                        href,
                        etag: s.etag,
                    }),
                }
            }
            _ => {}
        },
        |stack, text| {
            let in_response = inside(stack, "response");
            let mut s = state.borrow_mut();
            match current(stack) {
                "href" if in_response && !inside(stack, "propstat") => s.href = Some(text),
                "status" if inside(stack, "propstat") => s.propstat_status = status_code(&text),
                "status" if in_response => s.status = status_code(&text),
                "getetag" if in_response => s.propstat_etag = Some(text),
                "sync-token" if !in_response => report.borrow_mut().sync_token = Some(text),
                _ => {}
            }
        },
    )?;

    Ok(report.into_inner())
}

/// Parses a calendar-multiget REPORT response, keeping response order.
pub fn parse_multiget(xml: &str) -> ProviderResult<Vec<MultigetEntry>> {
    let entries = std::cell::RefCell::new(Vec::new());
    let current_entry = std::cell::RefCell::new(None::<MultigetEntry>);

    walk(
        xml,
        |stack| {
            if current(stack) == "response" {
                *current_entry.borrow_mut() = Some(MultigetEntry {
                    href: String::new(),
                    etag: None,
                    data: None,
                });
            }
        },
        |stack| {
            if current(stack) == "response"
                && let Some(entry) = current_entry.borrow_mut().take()
                && !entry.href.is_empty()
            {
                entries.borrow_mut().push(entry);
            }
        },
        |stack, text| {
            let mut slot = current_entry.borrow_mut();
            let Some(entry) = slot.as_mut() else { return };
            match current(stack) {
                "href" if !inside(stack, "propstat") => entry.href = text,
                "getetag" => entry.etag = Some(text),
                "calendar-data" if !text.trim().is_empty() => entry.data = Some(text),
                _ => {}
            }
        },
    )?;

    Ok(entries.into_inner())
}
