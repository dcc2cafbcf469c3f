use std::sync::LazyLock;

use regex::Regex;

use super::model::LogRecord;

/// Characters allowed in URL-ish fields (path, username, ...).
const URL_TOKEN: &str = r"A-Za-z0-9_.~:/?#\[\]@!$&'()*+,=%\-";

/// date time s-ip cs-method cs-uri-stem cs-uri-query s-port cs-username
/// c-ip cs(User-Agent) cs(Referer) sc-status sc-substatus sc-win32-status time-taken
static W3C_LINE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        concat!(
            r"^([0-9]{{4}}-[0-9]{{2}}-[0-9]{{2}} [0-9:]+)",
            r" ([0-9.]+)",
            r" (\w+)",
            r" ([{t}]+)",
            r" ([{t};]+)",
            r" ([0-9]+)",
            r" ([{t}]+)",
            r" ([0-9.]+)",
            r" ([{t};]*)",
            r" ([{t};]+)",
            r" ([0-9.]+) ([0-9.]+) ([0-9.]+) ([0-9.]+)$",
        ),
        t = URL_TOKEN
    );
    Regex::new(&pattern).expect("W3C line pattern is a valid regex")
});

/// Parser for the fixed 14-field IIS W3C layout.
///
/// Lines that do not match end to end are rejected with `None`; blank
/// lines and `#Fields:` style directives fall into that bucket and are
/// expected in normal log files.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineParser;

impl LineParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, line: &str) -> Option<LogRecord> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let caps = W3C_LINE.captures(line)?;
        let (
            _,
            [timestamp, server_ip, http_method, path, query, server_port, username, client_ip, user_agent, referer, http_status, sub_status, win32_status, time_taken_ms],
        ) = caps.extract();

        Some(LogRecord {
            timestamp: timestamp.to_string(),
            server_ip: server_ip.to_string(),
            http_method: http_method.to_string(),
            path: path.to_string(),
            query: query.to_string(),
            server_port: server_port.to_string(),
            username: username.to_string(),
            client_ip: client_ip.to_string(),
            user_agent: user_agent.to_string(),
            referer: referer.to_string(),
            http_status: http_status.to_string(),
            sub_status: sub_status.to_string(),
            win32_status: win32_status.to_string(),
            time_taken_ms: time_taken_ms.to_string(),
        })
    }
}

/// Shorthand for [`LineParser::parse`].
pub fn parse_line(line: &str) -> Option<LogRecord> {
    LineParser.parse(line)
}
