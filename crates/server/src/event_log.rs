//! Human-readable event log.
//!
//! Every record is one timestamped line. The server writes records for
//! client activity, telemetry frames and simulation transitions; the sink
//! decides where they end up.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, mpsc};
use std::thread::{self, JoinHandle};

use chrono::Local;
use tracing::warn;

use crate::config::LogConfig;

/// Kind of record, used to route it to its category file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Client,
    Telemetry,
    Simulation,
}

/// Write-only sink for event records.
pub trait EventLog: Send + Sync {
    /// Append one already-stamped record.
    fn append(&self, category: LogCategory, record: &str);
}

/// Prefix `message` with the local wall-clock time: `[HH:MM:SS] message`.
pub fn stamp(message: &str) -> String {
    format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
}

/// Stamp a record about a specific client: `[HH:MM:SS] name (IP:ip) -> message`.
pub fn stamp_client(name: &str, addr: SocketAddr, message: &str) -> String {
    stamp(&format!("{} (IP:{}) -> {}", name, addr.ip(), message))
}

/// Event log backed by append-mode files: one main file plus one optional
/// file per category.
///
/// Records are handed to a writer thread, so `append` never blocks on disk
/// and is safe to call while holding the simulation lock. Dropping the log
/// flushes every queued record.
pub struct FileEventLog {
    tx: Option<mpsc::Sender<(LogCategory, String)>>,
    writer: Option<JoinHandle<()>>,
}

struct LogFiles {
    main: File,
    clients: Option<File>,
    telemetry: Option<File>,
    simulation: Option<File>,
}

impl LogFiles {
    fn write(&mut self, category: LogCategory, record: &str) {
        write_line(&mut self.main, record);
        let file = match category {
            LogCategory::Client => self.clients.as_mut(),
            LogCategory::Telemetry => self.telemetry.as_mut(),
            LogCategory::Simulation => self.simulation.as_mut(),
        };
        if let Some(file) = file {
            write_line(file, record);
        }
    }
}

impl FileEventLog {
    /// Open (creating if needed) every file named in `config` and start the writer.
    pub fn open(config: &LogConfig) -> std::io::Result<Self> {
        let open_opt = |path: &Option<PathBuf>| path.as_deref().map(open_append).transpose();

        let mut files = LogFiles {
            main: open_append(&config.file)?,
            clients: open_opt(&config.clients_file)?,
            telemetry: open_opt(&config.telemetry_file)?,
            simulation: open_opt(&config.simulation_file)?,
        };

        let (tx, rx) = mpsc::channel::<(LogCategory, String)>();
        let writer = thread::Builder::new().name("event-log".to_string()).spawn(move || {
            // Runs until every sender is gone
            for (category, record) in rx {
                files.write(category, &record);
            }
        })?;

        Ok(Self { tx: Some(tx), writer: Some(writer) })
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn write_line(file: &mut File, record: &str) {
    if let Err(e) = writeln!(file, "{record}").and_then(|()| file.flush()) {
        warn!("Failed to write event log record: {}", e);
    }
}

impl EventLog for FileEventLog {
    fn append(&self, category: LogCategory, record: &str) {
        let Some(tx) = &self.tx else { return };
        if tx.send((category, record.to_string())).is_err() {
            warn!("Event log writer stopped, dropping record");
        }
    }
}

impl Drop for FileEventLog {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain and exit
        self.tx.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                warn!("Event log writer panicked");
            }
        }
    }
}

/// In-memory event log, mostly useful in tests.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    records: Mutex<Vec<(LogCategory, String)>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record appended so far.
    pub fn records(&self) -> Vec<(LogCategory, String)> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Records of one category, in order.
    pub fn category(&self, category: LogCategory) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|(c, _)| *c == category)
            .map(|(_, r)| r)
            .collect()
    }
}

impl EventLog for MemoryEventLog {
    fn append(&self, category: LogCategory, record: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push((category, record.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_format() {
        let record = stamp("en estación 1");
        assert!(record.starts_with('['));
        assert_eq!(&record[9..], "] en estación 1");
    }

    #[test]
    fn test_stamp_client_includes_ip() {
        let addr: SocketAddr = "10.0.0.7:4242".parse().unwrap();
        let record = stamp_client("ana", addr, "Observador autenticado.");
        assert!(record.ends_with("ana (IP:10.0.0.7) -> Observador autenticado."));
    }

    #[test]
    fn test_file_log_routes_categories() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            file: dir.path().join("main.log"),
            clients_file: Some(dir.path().join("clients.log")),
            telemetry_file: None,
            simulation_file: Some(dir.path().join("sim.log")),
        };
        let log = FileEventLog::open(&config).unwrap();
        log.append(LogCategory::Client, "a");
        log.append(LogCategory::Simulation, "b");
        log.append(LogCategory::Telemetry, "c");
        drop(log);

        let read = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("main.log"), "a\nb\nc\n");
        assert_eq!(read("clients.log"), "a\n");
        assert_eq!(read("sim.log"), "b\n");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_log_appends_from_tasks_reach_disk_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            file: dir.path().join("main.log"),
            clients_file: None,
            telemetry_file: None,
            simulation_file: None,
        };
        let log = std::sync::Arc::new(FileEventLog::open(&config).unwrap());

        let lock = std::sync::Arc::new(tokio::sync::Mutex::new(()));
        let mut tasks = Vec::new();
        for task in 0..4 {
            let log = log.clone();
            let lock = lock.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..50 {
                    let _guard = lock.lock().await;
                    log.append(LogCategory::Simulation, &format!("{task}-{i}"));
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        drop(std::sync::Arc::into_inner(log).unwrap());

        let contents = std::fs::read_to_string(dir.path().join("main.log")).unwrap();
        assert_eq!(contents.lines().count(), 200);
        assert!(contents.lines().any(|l| l == "3-49"));
    }

    #[test]
    fn test_memory_log_filters_by_category() {
        let log = MemoryEventLog::new();
        log.append(LogCategory::Client, "x");
        log.append(LogCategory::Telemetry, "y");
        assert_eq!(log.category(LogCategory::Telemetry), vec!["y".to_string()]);
        assert_eq!(log.records().len(), 2);
    }
}
