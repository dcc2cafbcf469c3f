/// A store column: name in the `iis_logs` table and its varchar length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub max_len: usize,
}

const fn column(name: &'static str, max_len: usize) -> Column {
    Column { name, max_len }
}

/// One parsed access-log line.
///
/// Every field holds the matched substring verbatim; nothing is coerced
/// into numbers or timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    pub server_ip: String,
    pub http_method: String,
    pub path: String,
    pub query: String,
    pub server_port: String,
    pub username: String,
    pub client_ip: String,
    pub user_agent: String,
    pub referer: String,
    pub http_status: String,
    pub sub_status: String,
    pub win32_status: String,
    pub time_taken_ms: String,
}

impl LogRecord {
    /// Store columns, in the same order as [`LogRecord::values`].
    pub const COLUMNS: [Column; 14] = [
        column("date_time", 20),
        column("local_ip", 16),
        column("method", 16),
        column("path", 255),
        column("query", 255),
        column("port", 5),
        column("username", 255),
        column("remoteIp", 16),
        column("userAgent", 255),
        column("refer", 255),
        column("status", 20),
        column("subStatus", 10),
        column("win32Status", 10),
        column("timeTaken", 10),
    ];

    /// Field values in column order.
    pub fn values(&self) -> [&String; 14] {
        [
            &self.timestamp,
            &self.server_ip,
            &self.http_method,
            &self.path,
            &self.query,
            &self.server_port,
            &self.username,
            &self.client_ip,
            &self.user_agent,
            &self.referer,
            &self.http_status,
            &self.sub_status,
            &self.win32_status,
            &self.time_taken_ms,
        ]
    }

    /// First column whose value is longer than the store accepts.
    pub fn oversized_column(&self) -> Option<Column> {
        Self::COLUMNS
            .iter()
            .zip(self.values())
            .find(|(col, value)| value.chars().count() > col.max_len)
            .map(|(col, _)| *col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> LogRecord {
        LogRecord {
            timestamp: "2023-01-01 00:00:00".to_string(),
            server_ip: "10.0.0.1".to_string(),
            http_method: "GET".to_string(),
            path: "/index.html".to_string(),
            query: "-".to_string(),
            server_port: "80".to_string(),
            username: "-".to_string(),
            client_ip: "192.168.1.5".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            referer: "-".to_string(),
            http_status: "200".to_string(),
            sub_status: "0".to_string(),
            win32_status: "0".to_string(),
            time_taken_ms: "15".to_string(),
        }
    }

    #[test]
    fn test_values_follow_column_order() {
        let rec = record();
        let values = rec.values();
        assert_eq!(values[0], "2023-01-01 00:00:00");
        assert_eq!(values[7], "192.168.1.5");
        assert_eq!(values[13], "15");
        assert_eq!(LogRecord::COLUMNS[7].name, "remoteIp");
        assert_eq!(LogRecord::COLUMNS[13].name, "timeTaken");
    }

    #[test]
    fn test_regular_record_fits() {
        assert!(record().oversized_column().is_none());
    }

    #[test]
    fn test_oversized_port_detected() {
        let mut rec = record();
        rec.server_port = "123456".to_string();
        let col = rec.oversized_column().expect("port should overflow");
        assert_eq!(col.name, "port");
    }

    #[test]
    fn test_first_oversized_column_wins() {
        let mut rec = record();
        rec.path = "a".repeat(256);
        rec.time_taken_ms = "12345678901".to_string();
        assert_eq!(rec.oversized_column().map(|c| c.name), Some("path"));
    }
}
