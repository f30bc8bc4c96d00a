//! OpenDev irclogs client.
//!
//! Fetches one HTML page per day, starting at the cutoff day and walking
//! forward until the server answers 404, and turns the rows of each page's
//! `table.irclog` into [`Message`]s.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use reqwest::{Client, StatusCode, Url};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::message::{Message, NicknameSet};

/// Upper bound on pages walked in one run, in case a server never 404s.
const MAX_DAYS: u32 = 366;

/// Length of `YYYY-MM-DDTHH:MM:SS`.
const TIMESTAMP_LEN: usize = 19;

/// Messages accepted for one run, with every speaker among them.
#[derive(Debug, Default)]
pub struct Collected {
    pub messages: Vec<Message>,
    pub nicknames: NicknameSet,
}

impl Collected {
    /// Keep `message` if it is inside the window and not from an ignored nick.
    fn accept(&mut self, message: Message, cutoff: NaiveDateTime, ignore_nicks: &[String]) {
        if message.timestamp < cutoff {
            return;
        }
        if ignore_nicks.iter().any(|nick| *nick == message.nickname) {
            return;
        }
        self.nicknames.insert(message.nickname.clone());
        self.messages.push(message);
    }
}

pub struct IrcLogClient {
    base_url: Url,
    client: Client,
}

impl IrcLogClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| Error::Url(format!("{base_url}: {e}")))?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { base_url, client })
    }

    /// URL of the log page for `channel` on `date`. The channel goes in as
    /// an escaped path segment, so `#nova` becomes `%23nova`.
    pub fn log_url(&self, channel: &str, date: NaiveDate) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Url(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .push(channel)
            .push(&format!("{channel}.{}.log.html", date.format("%Y-%m-%d")));
        Ok(url)
    }

    /// Fetch one day's page. `None` means the day has no log (HTTP 404).
    pub async fn fetch_day(&self, channel: &str, date: NaiveDate) -> Result<Option<String>> {
        let url = self.log_url(channel, date)?;
        debug!("Fetching log from {url}");

        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Some(resp.text().await?))
    }

    /// Collect every message from `cutoff` onwards, skipping `ignore_nicks`.
    pub async fn collect_messages(
        &self,
        channel: &str,
        cutoff: NaiveDateTime,
        ignore_nicks: &[String],
    ) -> Result<Collected> {
        let mut collected = Collected::default();
        let mut day = cutoff.date();

        for _ in 0..MAX_DAYS {
            let Some(html) = self.fetch_day(channel, day).await? else {
                debug!("No log for {day}, stopping");
                break;
            };

            let rows = parse_log_html(&html)?;
            let total = rows.len();
            let mut skipped = 0;
            for row in rows {
                match row {
                    Some(message) => collected.accept(message, cutoff, ignore_nicks),
                    None => skipped += 1,
                }
            }
            debug!("{day}: {total} rows, {skipped} unparseable");

            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }

        if day.signed_duration_since(cutoff.date()).num_days() >= i64::from(MAX_DAYS) {
            warn!("Stopped after {MAX_DAYS} days of logs without reaching a missing day");
        }

        info!(
            "Collected {} messages from {} speakers in {channel}",
            collected.messages.len(),
            collected.nicknames.len()
        );
        Ok(collected)
    }
}

/// Start of the look-back window as naive UTC.
///
/// `now_local` is the wall-clock time, read as a time in `timezone`. Around
/// a DST change the standard offset wins: a repeated hour resolves to its
/// second occurrence, and a skipped hour uses the offset from before the jump.
pub fn compute_cutoff(now_local: NaiveDateTime, timezone: &str, hours: u32) -> Result<NaiveDateTime> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| Error::Timezone(timezone.to_string()))?;
    let now_utc = match tz.from_local_datetime(&now_local).latest() {
        Some(local) => local.naive_utc(),
        None => {
            let before_gap = now_local - chrono::Duration::days(1);
            let offset = tz.offset_from_utc_datetime(&before_gap).fix().local_minus_utc();
            now_local - chrono::Duration::seconds(i64::from(offset))
        }
    };
    Ok(now_utc - chrono::Duration::hours(i64::from(hours)))
}

/// Parse every row of the page's `table.irclog`.
///
/// Rows without a usable id, nick cell or text cell come back as `None`.
/// A page without the table has no rows.
pub fn parse_log_html(html: &str) -> Result<Vec<Option<Message>>> {
    let table_sel = selector("table.irclog")?;
    let row_sel = selector("tr")?;
    let nick_sel = selector("th.nick")?;
    let text_sel = selector("td.text")?;

    let document = Html::parse_document(html);
    let Some(table) = document.select(&table_sel).next() else {
        return Ok(Vec::new());
    };

    Ok(table
        .select(&row_sel)
        .map(|tr| parse_row(tr, &nick_sel, &text_sel))
        .collect())
}

fn parse_row(tr: ElementRef<'_>, nick_sel: &Selector, text_sel: &Selector) -> Option<Message> {
    let timestamp = parse_timestamp_id(tr.value().attr("id")?)?;

    let nickname = cell_text(tr.select(nick_sel).next()?);
    if nickname.is_empty() {
        return None;
    }
    let text = cell_text(tr.select(text_sel).next()?);

    Some(Message::new(timestamp, nickname, text))
}

/// Row ids look like `t2024-01-15T14:30:25`, possibly followed by fractions
/// of a second or an offset, which are dropped. A bare date means midnight.
pub fn parse_timestamp_id(id: &str) -> Option<NaiveDateTime> {
    let raw = match id.strip_prefix('t') {
        Some(rest) => rest.get(..TIMESTAMP_LEN).unwrap_or(rest),
        None => id,
    };
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|day| day.and_hms_opt(0, 0, 0))
        })
}

/// Text of a cell with each text node trimmed, joined without separators.
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().map(str::trim).collect()
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Parse(format!("{css}: {e:?}")))
}
