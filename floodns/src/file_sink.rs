//! CSV result logs of a run.

use floodns_core::{
    ConnectionId, FlowId, LinkId, NodeId,
    log::{ConnectionInfo, FlowInfo, Interval, LinkInfo, LogError, LogSink, NodeInfo},
};
use std::{
    fmt::{self, Display},
    fs::{self, File},
    io::{self, BufWriter, Write as _},
    path::{Path, PathBuf},
};

pub const FILE_NAME_RUN_FINISHED: &str = "run_finished.txt";

/// The CSV files written by a [`FileSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFile {
    LinkInfo,
    LinkUtilization,
    LinkNumActiveFlows,
    NodeInfo,
    NodeNumActiveFlows,
    FlowInfo,
    FlowBandwidth,
    ConnectionInfo,
    ConnectionBandwidth,
}

impl LogFile {
    pub const ALL: [Self; 9] = [
        Self::LinkInfo,
        Self::LinkUtilization,
        Self::LinkNumActiveFlows,
        Self::NodeInfo,
        Self::NodeNumActiveFlows,
        Self::FlowInfo,
        Self::FlowBandwidth,
        Self::ConnectionInfo,
        Self::ConnectionBandwidth,
    ];

    pub const fn file_name(self) -> &'static str {
        match self {
            Self::LinkInfo => "link_info.csv",
            Self::LinkUtilization => "link_utilization.csv",
            Self::LinkNumActiveFlows => "link_num_active_flows.csv",
            Self::NodeInfo => "node_info.csv",
            Self::NodeNumActiveFlows => "node_num_active_flows.csv",
            Self::FlowInfo => "flow_info.csv",
            Self::FlowBandwidth => "flow_bandwidth.csv",
            Self::ConnectionInfo => "connection_info.csv",
            Self::ConnectionBandwidth => "connection_bandwidth.csv",
        }
    }
}

/// A [`LogSink`] writing one CSV file per logged quantity in a directory.
///
/// Every line ends with CR-LF. `run_finished.txt` holds `No` until the sink
/// is closed without error, then `Yes`.
///
/// Writing never interrupts the simulation: the first failure is kept and
/// handed over by [`LogSink::take_error`] (or returned by
/// [`LogSink::close`]), after which nothing more is written.
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    writers: Vec<BufWriter<File>>,
    error: Option<LogError>,
    failed: bool,
}

impl FileSink {
    /// Create `dir` if needed and (re)create all the log files in it.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, LogError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;

        let mut writers = Vec::with_capacity(LogFile::ALL.len());
        for file in LogFile::ALL {
            let path = dir.join(file.file_name());
            let handle = File::create(&path).map_err(|source| io_error(&path, source))?;
            writers.push(BufWriter::new(handle));
        }

        let sink = Self {
            dir,
            writers,
            error: None,
            failed: false,
        };
        sink.mark_finished(false)?;
        tracing::debug!(dir = %sink.dir.display(), "log files created");
        Ok(sink)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, file: LogFile) -> PathBuf {
        self.dir.join(file.file_name())
    }

    fn mark_finished(&self, finished: bool) -> Result<(), LogError> {
        let path = self.dir.join(FILE_NAME_RUN_FINISHED);
        fs::write(&path, if finished { "Yes" } else { "No" })
            .map_err(|source| io_error(&path, source))
    }

    fn write_line(&mut self, file: LogFile, line: fmt::Arguments<'_>) {
        if self.failed {
            return;
        }
        let writer = &mut self.writers[file as usize];
        if let Err(source) = writer
            .write_fmt(line)
            .and_then(|()| writer.write_all(b"\r\n"))
        {
            self.fail(self.dir.join(file.file_name()), source);
        }
    }

    fn interval<T: Display>(&mut self, file: LogFile, id: u64, interval: Interval<T>) {
        self.write_line(
            file,
            format_args!(
                "{id},{start},{end},{value}",
                start = interval.start,
                end = interval.end,
                value = interval.value
            ),
        );
    }

    fn fail(&mut self, path: PathBuf, source: io::Error) {
        tracing::error!(path = %path.display(), error = %source, "cannot write result log");
        self.failed = true;
        self.error = Some(io_error(&path, source));
    }
}

impl LogSink for FileSink {
    fn flow_bandwidth(&mut self, flow: FlowId, interval: Interval<f64>) {
        self.interval(LogFile::FlowBandwidth, flow.into_u64(), interval);
    }

    fn flow_info(&mut self, info: &FlowInfo) {
        self.write_line(
            LogFile::FlowInfo,
            format_args!(
                "{},{},{},{},{},{},{},{},{},{}",
                info.id,
                info.src,
                info.dst,
                info.path,
                info.start,
                info.end,
                info.duration,
                info.bandwidth_sum,
                info.average_bandwidth,
                label(info.label.as_deref()),
            ),
        );
    }

    fn connection_bandwidth(&mut self, connection: ConnectionId, interval: Interval<f64>) {
        self.interval(LogFile::ConnectionBandwidth, connection.into_u64(), interval);
    }

    fn connection_info(&mut self, info: &ConnectionInfo) {
        let flows: Vec<String> = info.flows.iter().map(FlowId::to_string).collect();
        self.write_line(
            LogFile::ConnectionInfo,
            format_args!(
                "{},{},{},{},{},{},{},{},{},{},{},{}",
                info.id,
                info.src,
                info.dst,
                info.total_size,
                info.transmitted,
                flows.join(";"),
                info.start,
                info.end,
                info.duration,
                info.average_bandwidth,
                if info.finished { "T" } else { "F" },
                label(info.label.as_deref()),
            ),
        );
    }

    fn link_utilization(&mut self, link: LinkId, interval: Interval<f64>) {
        self.interval(LogFile::LinkUtilization, link.into_u64(), interval);
    }

    fn link_num_active_flows(&mut self, link: LinkId, interval: Interval<usize>) {
        self.interval(LogFile::LinkNumActiveFlows, link.into_u64(), interval);
    }

    fn link_info(&mut self, info: &LinkInfo) {
        self.write_line(
            LogFile::LinkInfo,
            format_args!(
                "{},{},{},{},{},{},{},{},{}",
                info.id,
                info.src,
                info.dst,
                info.start,
                info.end,
                info.duration,
                info.average_utilization,
                info.average_active_flows,
                label(info.label.as_deref()),
            ),
        );
    }

    fn node_num_active_flows(&mut self, node: NodeId, interval: Interval<usize>) {
        self.interval(LogFile::NodeNumActiveFlows, node.into_u64(), interval);
    }

    fn node_info(&mut self, info: &NodeInfo) {
        self.write_line(
            LogFile::NodeInfo,
            format_args!(
                "{},{},{}",
                info.id,
                info.average_active_flows,
                label(info.label.as_deref()),
            ),
        );
    }

    fn take_error(&mut self) -> Option<LogError> {
        self.error.take()
    }

    fn close(&mut self) -> Result<(), LogError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        if self.failed {
            return Err(io_error(
                &self.dir,
                io::Error::other("an earlier write failed"),
            ));
        }
        for (file, writer) in LogFile::ALL.into_iter().zip(&mut self.writers) {
            if let Err(source) = writer.flush() {
                let path = self.dir.join(file.file_name());
                return Err(io_error(&path, source));
            }
        }
        self.mark_finished(true)?;
        tracing::debug!(dir = %self.dir.display(), "log files closed");
        Ok(())
    }
}

/// A label cannot break the CSV line it is written on.
fn label(label: Option<&str>) -> String {
    label
        .unwrap_or_default()
        .replace([',', '\r', '\n'], "_")
}

fn io_error(path: &Path, source: io::Error) -> LogError {
    LogError::Io {
        file: path.display().to_string(),
        source,
    }
}
