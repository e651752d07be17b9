// ── Multistatus parsing ──────────────────────────────────────────────────────

use crate::webdav::types::DavResource;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Body for a PROPFIND asking only for what a listing needs.
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:displayname/>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getcontenttype/>
    <d:getetag/>
    <d:getlastmodified/>
  </d:prop>
</d:propfind>"#;

/// Strip a namespace prefix (`d:href` → `href`).
fn local_name(raw: &[u8]) -> String {
    let s = String::from_utf8_lossy(raw);
    match s.rfind(':') {
        Some(pos) => s[pos + 1..].to_string(),
        None => s.to_string(),
    }
}

/// Parse a `207 Multi-Status` body. Properties inside a non-200 propstat
/// are ignored.
pub fn parse_multistatus(xml: &str) -> Result<Vec<DavResource>, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut resources = Vec::new();
    let mut current: Option<DavResource> = None;
    let mut pending = DavResource::default();
    let mut current_tag: Option<String> = None;
    let mut in_resourcetype = false;
    let mut propstat_ok = true;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let local = local_name(e.name().as_ref());
                match local.as_str() {
                    "response" => current = Some(DavResource::default()),
                    "propstat" => {
                        pending = DavResource::default();
                        propstat_ok = true;
                    }
                    "resourcetype" => in_resourcetype = true,
                    "collection" if in_resourcetype => pending.is_collection = true,
                    "href" | "displayname" | "getcontentlength" | "getcontenttype" | "getetag"
                    | "getlastmodified" | "status" => current_tag = Some(local),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                if in_resourcetype && local_name(e.name().as_ref()) == "collection" {
                    pending.is_collection = true;
                }
            }
            Ok(Event::Text(ref e)) => {
                if let (Some(tag), Some(res)) = (current_tag.as_deref(), current.as_mut()) {
                    let text = e.unescape().map_err(|e| format!("XML text: {}", e))?.to_string();
                    match tag {
                        "href" => res.href = text,
                        "displayname" => pending.display_name = Some(text),
                        "getcontentlength" => pending.content_length = text.parse().ok(),
                        "getcontenttype" => pending.content_type = Some(text),
                        "getetag" => pending.etag = Some(text.trim_matches('"').to_string()),
                        "getlastmodified" => pending.last_modified = Some(text),
                        "status" => propstat_ok = text.split_whitespace().nth(1) == Some("200"),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let local = local_name(e.name().as_ref());
                match local.as_str() {
                    "propstat" => {
                        if let (true, Some(res)) = (propstat_ok, current.as_mut()) {
                            let p = std::mem::take(&mut pending);
                            res.is_collection |= p.is_collection;
                            res.display_name = p.display_name.or(res.display_name.take());
                            res.content_length = p.content_length.or(res.content_length);
                            res.content_type = p.content_type.or(res.content_type.take());
                            res.etag = p.etag.or(res.etag.take());
                            res.last_modified = p.last_modified.or(res.last_modified.take());
                        }
                    }
                    "response" => {
                        if let Some(res) = current.take() {
                            resources.push(res);
                        }
                    }
                    "resourcetype" => in_resourcetype = false,
                    _ => {
                        if current_tag.as_deref() == Some(local.as_str()) {
                            current_tag = None;
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parse error at {}: {}", reader.buffer_position(), e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(resources)
}
