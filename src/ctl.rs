//! Administrative access to a running server through its RPC service.
use std::io::Write;
use std::net::ToSocketAddrs;

use chrono::Local;
use tracing::debug;

use crate::engine::snapshot::to_indented_json;
use crate::engine::StoreData;
use crate::sync::SyncClient;
use crate::Result;

const TABLE_HEADER: [&str; 3] = ["Expire", "IP", "Data"];
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `ServerCtl` fetches the live records of a server and renders them as JSON or as a table
#[derive(Debug, Clone)]
pub struct ServerCtl<A: ToSocketAddrs> {
    server: A,
    records: Vec<StoreData>,
}

impl<A: ToSocketAddrs> ServerCtl<A> {
    /// create a `ServerCtl` for the RPC service listening at `server`
    pub fn new(server: A) -> Self {
        ServerCtl {
            server,
            records: Vec::new(),
        }
    }

    /// fetches every live record from the server, replacing the previous result
    ///
    /// # Errors
    /// IO errors, a non OK answer, or a payload that is not a JSON array of records
    pub fn dump(&mut self) -> Result<&[StoreData]> {
        let resp = SyncClient::connect(&self.server)?.dump()?;
        self.records = if resp.json.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str::<Option<Vec<StoreData>>>(&resp.json)?.unwrap_or_default()
        };
        debug!(records = self.records.len(), "dump");
        Ok(&self.records)
    }

    /// writes the records as JSON indented with two spaces. Nothing is written when there
    /// are no records.
    pub fn write_json<W: Write>(&self, out: &mut W) -> Result<()> {
        if !self.records.is_empty() {
            out.write_all(&to_indented_json(&self.records)?)?;
            writeln!(out)?;
        }
        Ok(())
    }

    /// writes the records as a table sorted by expiry then IP, with expiries in local time.
    /// Nothing is written when there are no records.
    pub fn write_table<W: Write>(&self, out: &mut W) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }

        let mut sorted: Vec<&StoreData> = self.records.iter().collect();
        sorted.sort_by(|a, b| {
            a.expire
                .timestamp()
                .cmp(&b.expire.timestamp())
                .then_with(|| a.ip.to_string().cmp(&b.ip.to_string()))
        });
        let rows: Vec<[String; 3]> = sorted
            .into_iter()
            .map(|sd| {
                [
                    sd.expire.with_timezone(&Local).format(TIME_FORMAT).to_string(),
                    sd.ip.to_string(),
                    sd.data.clone(),
                ]
            })
            .collect();

        let mut widths = TABLE_HEADER.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        write_row(out, &widths, &TABLE_HEADER)?;
        for row in &rows {
            write_row(out, &widths, row)?;
        }
        Ok(())
    }
}

fn write_row<W: Write, S: AsRef<str>>(out: &mut W, widths: &[usize; 3], cells: &[S; 3]) -> Result<()> {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!(" {:<width$} ", cell.as_ref(), width = width))
        .collect::<String>();
    writeln!(out, "{}", line.trim_end())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(ip: &str, data: &str, expire: i64) -> StoreData {
        StoreData {
            expire: Utc.timestamp_opt(expire, 0).unwrap(),
            ip: ip.parse().unwrap(),
            data: data.to_string(),
        }
    }

    fn ctl(records: Vec<StoreData>) -> ServerCtl<&'static str> {
        ServerCtl {
            server: "127.0.0.1:9877",
            records,
        }
    }

    #[test]
    fn empty_dump_writes_nothing() {
        let ctl = ctl(vec![]);
        let mut out = Vec::new();
        ctl.write_json(&mut out).unwrap();
        ctl.write_table(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn table_is_sorted_by_expiry_then_ip() {
        let ctl = ctl(vec![
            record("10.0.0.9", "late", 2_000_000_000),
            record("10.0.0.2", "b", 1_900_000_000),
            record("10.0.0.1", "a", 1_900_000_000),
        ]);
        let mut out = Vec::new();
        ctl.write_table(&mut out).unwrap();
        let table = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("Expire") && lines[0].contains("IP") && lines[0].contains("Data"));
        assert!(lines[1].contains("10.0.0.1"));
        assert!(lines[2].contains("10.0.0.2"));
        assert!(lines[3].contains("10.0.0.9"));

        let local = Utc
            .timestamp_opt(1_900_000_000, 0)
            .unwrap()
            .with_timezone(&Local)
            .format(TIME_FORMAT)
            .to_string();
        assert!(lines[1].starts_with(&format!(" {}", local)));
    }

    #[test]
    fn json_is_indented() {
        let ctl = ctl(vec![record("10.0.0.1", "a", 1_900_000_000)]);
        let mut out = Vec::new();
        ctl.write_json(&mut out).unwrap();
        let json = String::from_utf8(out).unwrap();
        assert!(json.starts_with("[\n  {\n    \"Expire\""));
        let back: Vec<StoreData> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctl.records);
    }
}
