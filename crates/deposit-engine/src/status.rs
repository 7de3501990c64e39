//! Status Resolver (C5, §4.5): polls a deposit's `status_probe_uri`,
//! extracts the SWORDv2 Atom statement's state category, and maps it to a
//! canonical status through the configured [`StatusMapping`].

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::blocking::Client;
use reqwest::StatusCode;

use deposit_engine_types::repository::StatusMapping;

const STATE_SCHEME: &str = "http://purl.org/net/sword/terms/state";

/// Outcome of one probe (§4.5): either a canonical status was resolved, or
/// the term seen has no configured mapping ("unknown; try again later").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Resolved(String),
    Unknown(String),
}

/// Probe `probe_uri` and resolve its state against `mapping` (§4.5).
/// A HEAD probe is sent first so a probe URI that moved behind a `30x` is
/// discovered without transferring the statement body twice; at most one
/// redirect is followed, by hand, rather than adopting `reqwest`'s default
/// multi-hop redirect policy for this call (§4.5: "follow at most one
/// redirect").
pub fn probe_status(http: &Client, probe_uri: &str, mapping: &StatusMapping) -> Result<ProbeOutcome> {
    let body = fetch_statement(http, probe_uri)?;
    let term = extract_state_term(&body)?;
    match mapping.resolve(&term) {
        Some(status) => Ok(ProbeOutcome::Resolved(status.to_string())),
        None => Ok(ProbeOutcome::Unknown(term)),
    }
}

/// §4.5's redirect set: 300-307, excluding 304 (Not Modified, no Location)
/// and 306 (reserved/unused).
fn is_redirect_status(status: StatusCode) -> bool {
    let code = status.as_u16();
    (300..=307).contains(&code) && code != 304 && code != 306
}

fn fetch_statement(http: &Client, probe_uri: &str) -> Result<String> {
    let probe = http
        .head(probe_uri)
        .send()
        .with_context(|| format!("probing status statement {probe_uri}"))?;

    let target = if is_redirect_status(probe.status()) {
        probe
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .with_context(|| format!("redirect from {probe_uri} carried no Location header"))?
            .to_string()
    } else {
        probe_uri.to_string()
    };

    let resp = http
        .get(&target)
        .send()
        .with_context(|| format!("fetching status statement {target}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("status probe {target} returned {}", resp.status());
    }
    resp.text().context("reading status statement body")
}

/// Extract the `term` attribute of `<category scheme="...state">` (§4.5).
fn extract_state_term(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(tag)) | Ok(Event::Start(tag)) if tag.local_name().as_ref() == b"category" => {
                let mut scheme = None;
                let mut term = None;
                for attr in tag.attributes().flatten() {
                    let key = attr.key.local_name();
                    let value = attr.decode_and_unescape_value(reader.decoder())?.to_string();
                    match key.as_ref() {
                        b"scheme" => scheme = Some(value),
                        b"term" => term = Some(value),
                        _ => {}
                    }
                }
                if scheme.as_deref() == Some(STATE_SCHEME) {
                    if let Some(term) = term {
                        return Ok(term);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => anyhow::bail!("malformed status statement: {e}"),
            _ => {}
        }
        buf.clear();
    }

    anyhow::bail!("status statement carried no category with scheme {STATE_SCHEME}")
}
