// Portal page parsing
//
// Both pages are flat runs of `<td class="maintd">` cells with no other
// structural hook. The info page alternates label/value cells; the
// sessions page is a table whose rows are a fixed number of cells wide.
// All positional assumptions live in `PageLayout`.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::Error;
use crate::models::{AccountProfile, Session, UsageInfo, UserInfoPage};

/// Seconds east of UTC for every timestamp the portal prints.
const PORTAL_UTC_OFFSET_SECS: i32 = 8 * 3600;

const TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

static FIRST_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid integer regex"));

static FIRST_DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+").expect("valid decimal regex"));

static USAGE_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d[\d,]*)(?:\.(\d+))?\s*([KMGT]?)B?$").expect("valid usage regex")
});

/// Extracts typed records from the two portal pages.
pub trait PageParser: Send + Sync {
    /// Parse the user-info page.
    fn parse_user_info(&self, html: &str) -> Result<UserInfoPage, Error>;

    /// Parse the active-sessions page.
    fn parse_sessions(&self, html: &str) -> Result<Vec<Session>, Error>;
}

/// Positional layout of the portal pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    /// Class carried by every data cell.
    pub cell_class: String,
    /// Cells per row on the sessions page.
    pub row_stride: usize,
    pub id_column: usize,
    pub ip_column: usize,
    pub start_time_column: usize,
    pub usage_column: usize,
    pub device_column: usize,
    pub usage_label: String,
    pub balance_label: String,
    pub ipv6_usage_label: String,
    pub name_label: String,
    pub id_number_label: String,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            cell_class: "maintd".into(),
            row_stride: 14,
            id_column: 0,
            ip_column: 1,
            start_time_column: 2,
            usage_column: 3,
            device_column: 11,
            usage_label: "使用流量(IPV4)".into(),
            balance_label: "帐户余额".into(),
            ipv6_usage_label: "使用流量(IPV6)".into(),
            name_label: "姓名".into(),
            id_number_label: "证件号".into(),
        }
    }
}

/// `PageParser` for the portal's `maintd` cell layout.
#[derive(Debug, Clone, Default)]
pub struct MaintdParser {
    layout: PageLayout,
}

impl MaintdParser {
    pub fn new(layout: PageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    fn cell_selector(&self) -> Result<Selector, Error> {
        let css = format!(".{}", self.layout.cell_class);
        Selector::parse(&css)
            .map_err(|e| Error::parse(format!("invalid cell selector {css:?}: {e:?}")))
    }

    fn sessions_row(
        &self,
        row: &[ElementRef<'_>],
        input: &Selector,
        offset: &FixedOffset,
    ) -> Result<Session, Error> {
        let layout = &self.layout;
        let cell = |column: usize| {
            row.get(column)
                .ok_or_else(|| Error::parse(format!("row has no column {column}")))
        };

        let id = cell(layout.id_column)?
            .select(input)
            .next()
            .and_then(|el| el.value().attr("value"))
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::parse("session row has no id input"))?
            .to_owned();

        let start_raw = cell_text(cell(layout.start_time_column)?);
        let usage_raw = cell_text(cell(layout.usage_column)?);

        Ok(Session {
            ip: cell_text(cell(layout.ip_column)?),
            start_time: parse_start_time(&start_raw, offset)?,
            usage_bytes: parse_usage_quantity(&usage_raw)?,
            device_name: cell_text(cell(layout.device_column)?),
            id,
        })
    }
}

impl PageParser for MaintdParser {
    fn parse_user_info(&self, html: &str) -> Result<UserInfoPage, Error> {
        let document = Html::parse_document(html);
        let selector = self.cell_selector()?;
        let cells: Vec<String> = document.select(&selector).map(|c| cell_text(&c)).collect();

        let fields: HashMap<&str, &str> = cells
            .chunks_exact(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
            .collect();
        debug!(fields = fields.len(), "parsed user info cells");

        let layout = &self.layout;
        let required = |label: &str| {
            fields
                .get(label)
                .copied()
                .ok_or_else(|| Error::parse(format!("user info page has no {label:?} field")))
        };

        let usage_mebibytes = first_integer(required(&layout.usage_label)?)?;
        let balance = first_decimal(required(&layout.balance_label)?)?;
        let ipv6_usage_mebibytes = fields
            .get(layout.ipv6_usage_label.as_str())
            .map(|value| first_integer(value))
            .transpose()?;

        let optional = |label: &str| {
            fields
                .get(label)
                .map(|v| (*v).to_owned())
                .filter(|v| !v.is_empty())
        };

        Ok(UserInfoPage {
            usage: UsageInfo {
                usage_mebibytes,
                balance,
                ipv6_usage_mebibytes,
            },
            profile: AccountProfile {
                full_name: optional(&layout.name_label),
                id_number: optional(&layout.id_number_label),
            },
        })
    }

    fn parse_sessions(&self, html: &str) -> Result<Vec<Session>, Error> {
        let document = Html::parse_document(html);
        let selector = self.cell_selector()?;
        let input = Selector::parse("input")
            .map_err(|e| Error::parse(format!("invalid input selector: {e:?}")))?;
        let offset = FixedOffset::east_opt(PORTAL_UTC_OFFSET_SECS)
            .ok_or_else(|| Error::parse("invalid portal UTC offset"))?;

        let cells: Vec<ElementRef<'_>> = document.select(&selector).collect();
        let stride = self.layout.row_stride;
        if stride == 0 {
            return Err(Error::parse("row stride must be positive"));
        }
        if cells.is_empty() {
            return Err(Error::parse("sessions page has no table cells"));
        }
        if cells.len() % stride != 0 {
            return Err(Error::parse(format!(
                "sessions table has {} cells, not a multiple of {stride}",
                cells.len()
            )));
        }

        let rows: Vec<&[ElementRef<'_>]> = cells.chunks_exact(stride).collect();
        // First row is the header, last row the footer.
        let interior = rows.len().saturating_sub(2);
        debug!(rows = interior, "parsing sessions table");

        let mut seen = HashSet::with_capacity(interior);
        let mut sessions = Vec::with_capacity(interior);
        for row in rows.iter().skip(1).take(interior) {
            let session = self.sessions_row(row, &input, &offset)?;
            if !seen.insert(session.id.clone()) {
                return Err(Error::parse(format!("duplicate session id {}", session.id)));
            }
            sessions.push(session);
        }

        Ok(sessions)
    }
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_owned()
}

fn first_integer(value: &str) -> Result<u64, Error> {
    let digits = FIRST_INTEGER
        .find(value)
        .ok_or_else(|| Error::parse(format!("no integer in {value:?}")))?;
    digits
        .as_str()
        .parse()
        .map_err(|e| Error::parse(format!("integer {:?} out of range: {e}", digits.as_str())))
}

fn first_decimal(value: &str) -> Result<f64, Error> {
    let number = FIRST_DECIMAL
        .find(value)
        .ok_or_else(|| Error::parse(format!("no decimal in {value:?}")))?;
    let parsed: f64 = number
        .as_str()
        .parse()
        .map_err(|e| Error::parse(format!("bad decimal {:?}: {e}", number.as_str())))?;
    if !parsed.is_finite() {
        return Err(Error::parse(format!("decimal {:?} is not finite", number.as_str())));
    }
    Ok(parsed)
}

/// Parse a portal timestamp as local time at `offset`.
pub fn parse_start_time(raw: &str, offset: &FixedOffset) -> Result<DateTime<FixedOffset>, Error> {
    let naive = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| Error::parse(format!("unparsable start time {raw:?}")))?;
    naive
        .and_local_timezone(*offset)
        .single()
        .ok_or_else(|| Error::parse(format!("ambiguous start time {raw:?}")))
}

/// Normalize a usage quantity such as `"1.2G"`, `"350.5MB"` or
/// `"1,024B"` to bytes. Unit prefixes are decimal (K = 1000).
pub fn parse_usage_quantity(raw: &str) -> Result<u64, Error> {
    let caps = USAGE_QUANTITY
        .captures(raw.trim())
        .ok_or_else(|| Error::parse(format!("unparsable usage {raw:?}")))?;

    let whole = caps[1].replace(',', "");
    let fraction = caps.get(2).map_or("", |m| m.as_str());
    let multiplier: u128 = match caps[3].to_ascii_uppercase().as_str() {
        "" => 1,
        "K" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        unit => return Err(Error::parse(format!("unknown usage unit {unit:?}"))),
    };

    let overflow = || Error::parse(format!("usage {raw:?} out of range"));
    let scale = u32::try_from(fraction.len())
        .ok()
        .and_then(|digits| 10u128.checked_pow(digits))
        .ok_or_else(overflow)?;
    let mantissa: u128 = format!("{whole}{fraction}").parse().map_err(|_| overflow())?;

    let scaled = mantissa.checked_mul(multiplier).ok_or_else(overflow)?;
    let bytes = scaled.checked_add(scale / 2).ok_or_else(overflow)? / scale;
    u64::try_from(bytes).map_err(|_| overflow())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Datelike, Timelike};
    use pretty_assertions::assert_eq;

    use super::*;

    fn td(text: &str) -> String {
        format!("<td class=\"maintd\">{text}</td>")
    }

    fn info_page(pairs: &[(&str, &str)]) -> String {
        let cells: String = pairs
            .iter()
            .map(|(label, value)| format!("<tr>{}{}</tr>", td(label), td(value)))
            .collect();
        format!("<html><body><table>{cells}</table></body></html>")
    }

    fn session_row(id: &str, ip: &str, start: &str, usage: &str, device: &str) -> String {
        let mut cells = vec![
            td(&format!("<input type=\"checkbox\" name=\"ids\" value=\"{id}\">")),
            td(ip),
            td(start),
            td(usage),
        ];
        cells.extend((4..11).map(|i| td(&format!("col{i}"))));
        cells.push(td(device));
        cells.extend((12..14).map(|i| td(&format!("col{i}"))));
        format!("<tr>{}</tr>", cells.concat())
    }

    fn filler_row(label: &str) -> String {
        let cells: String = (0..14).map(|i| td(&format!("{label}{i}"))).collect();
        format!("<tr>{cells}</tr>")
    }

    fn sessions_page(rows: &[String]) -> String {
        format!(
            "<html><body><table>{}{}{}</table></body></html>",
            filler_row("header"),
            rows.concat(),
            filler_row("footer")
        )
    }

    #[test]
    fn extracts_usage_and_balance() {
        let html = info_page(&[
            ("用户名", "alice"),
            ("姓名", "张三"),
            ("使用流量(IPV4)", " 123456(MB) "),
            ("使用流量(IPV6)", "789(MB)"),
            ("帐户余额", "12.50(元)"),
        ]);
        let page = MaintdParser::default().parse_user_info(&html).unwrap();

        assert_eq!(page.usage.usage_mebibytes, 123_456);
        assert!((page.usage.balance - 12.5).abs() < f64::EPSILON);
        assert_eq!(page.usage.ipv6_usage_mebibytes, Some(789));
        assert_eq!(page.profile.full_name.as_deref(), Some("张三"));
        assert_eq!(page.profile.id_number, None);
    }

    #[test]
    fn missing_balance_label_is_an_error() {
        let html = info_page(&[("使用流量(IPV4)", "100(MB)")]);
        let err = MaintdParser::default().parse_user_info(&html).unwrap_err();
        let Error::Parse { message } = err else {
            panic!("expected parse error");
        };
        assert!(message.contains("帐户余额"));
    }

    #[test]
    fn balance_without_decimal_is_an_error() {
        let html = info_page(&[("使用流量(IPV4)", "100"), ("帐户余额", "12元")]);
        assert!(MaintdParser::default().parse_user_info(&html).is_err());
    }

    #[test]
    fn parses_interior_session_rows() {
        let html = sessions_page(&[
            session_row("101", "10.0.0.1", "2015-03-01 08:30:00", "1.2G", "laptop"),
            session_row("102", "10.0.0.2", "2015-03-02 23:59:59", "350.5M", "phone"),
            session_row("103", "10.0.0.3", "2015-03-03 00:00:00", "0B", ""),
        ]);
        let sessions = MaintdParser::default().parse_sessions(&html).unwrap();

        assert_eq!(sessions.len(), 3);
        assert_eq!(sessions[0].id, "101");
        assert_eq!(sessions[0].ip, "10.0.0.1");
        assert_eq!(sessions[0].usage_bytes, 1_200_000_000);
        assert_eq!(sessions[0].device_name, "laptop");
        assert_eq!(sessions[0].start_time.offset().local_minus_utc(), 8 * 3600);
        assert_eq!(sessions[0].start_time.hour(), 8);
        assert_eq!(sessions[0].start_time.to_utc().hour(), 0);
        assert_eq!(sessions[1].usage_bytes, 350_500_000);
        assert_eq!(sessions[1].start_time.day(), 2);
        assert_eq!(sessions[2].usage_bytes, 0);
        assert!(sessions.iter().all(|s| !s.id.is_empty()));
    }

    #[test]
    fn header_and_footer_only_yields_no_sessions() {
        let html = sessions_page(&[]);
        assert!(MaintdParser::default().parse_sessions(&html).unwrap().is_empty());
    }

    #[test]
    fn row_without_input_fails_the_whole_page() {
        let broken = session_row("9", "10.0.0.9", "2015-03-01 08:30:00", "1K", "pc")
            .replace("<input type=\"checkbox\" name=\"ids\" value=\"9\">", "9");
        let html = sessions_page(&[
            session_row("1", "10.0.0.1", "2015-03-01 08:30:00", "1K", "pc"),
            broken,
        ]);
        assert!(MaintdParser::default().parse_sessions(&html).is_err());
    }

    #[test]
    fn bad_start_time_fails_the_whole_page() {
        let html = sessions_page(&[session_row("1", "10.0.0.1", "yesterday", "1K", "pc")]);
        assert!(MaintdParser::default().parse_sessions(&html).is_err());
    }

    #[test]
    fn duplicate_session_ids_are_rejected() {
        let html = sessions_page(&[
            session_row("1", "10.0.0.1", "2015-03-01 08:30:00", "1K", "pc"),
            session_row("1", "10.0.0.2", "2015-03-01 08:30:00", "1K", "pc"),
        ]);
        assert!(MaintdParser::default().parse_sessions(&html).is_err());
    }

    #[test]
    fn ragged_table_is_rejected() {
        let html = sessions_page(&[format!("<tr>{}{}</tr>", td("a"), td("b"))]);
        assert!(MaintdParser::default().parse_sessions(&html).is_err());
    }

    #[test]
    fn page_without_cells_is_rejected() {
        let html = "<html><body>请先登录</body></html>";
        assert!(MaintdParser::default().parse_sessions(html).is_err());
    }

    #[test]
    fn usage_quantities_normalize_to_bytes() {
        assert_eq!(parse_usage_quantity("512B").unwrap(), 512);
        assert_eq!(parse_usage_quantity("512").unwrap(), 512);
        assert_eq!(parse_usage_quantity("1.5K").unwrap(), 1_500);
        assert_eq!(parse_usage_quantity("1.2GB").unwrap(), 1_200_000_000);
        assert_eq!(parse_usage_quantity("2 mb").unwrap(), 2_000_000);
        assert_eq!(parse_usage_quantity("1,024.25M").unwrap(), 1_024_250_000);
        assert_eq!(parse_usage_quantity("0.0005K").unwrap(), 1);
        assert_eq!(parse_usage_quantity("3T").unwrap(), 3_000_000_000_000);
    }

    #[test]
    fn malformed_usage_is_rejected() {
        for raw in [
            "",
            "G",
            "-1M",
            "1.2X",
            "1.2.3M",
            "99999999999999999999999T",
            "3.40282366920938463463374607431768211455",
        ] {
            assert!(parse_usage_quantity(raw).is_err(), "{raw:?} should fail");
        }
    }

    #[test]
    fn start_time_accepts_iso_separator() {
        let offset = FixedOffset::east_opt(PORTAL_UTC_OFFSET_SECS).unwrap();
        let a = parse_start_time("2015-03-01 08:30:00", &offset).unwrap();
        let b = parse_start_time("2015-03-01T08:30:00", &offset).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.year(), 2015);
        assert_eq!(a.to_rfc3339(), "2015-03-01T08:30:00+08:00");
    }
}
