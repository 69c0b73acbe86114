use std::fmt;
use std::path::PathBuf;

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};

use common::ingest::{BreachRecord, InsertReport, InsertRequest, Phase};
use leakcheck_daemon::http_server::api::client::ApiError;

#[derive(Args, Debug, Clone)]
pub struct Ingest {
    /// Breach dump with one username:password per line
    #[arg(long)]
    pub file: PathBuf,

    /// breach (1) stores the credentials, similarity (2) stores near-miss variants
    #[arg(long, default_value = "breach")]
    pub phase: Phase,

    /// Variants per record in the similarity phase
    #[arg(long, default_value_t = 10)]
    pub num_variants: usize,

    /// Also store a username-only entry per record in the breach phase
    #[arg(long)]
    pub include_username_variant: bool,

    /// Use the daemon's external variant generator instead of the built-in rules
    #[arg(long)]
    pub external_generator: bool,

    /// Metadata sealed into every entry, e.g. the dump's name
    #[arg(long, default_value = "")]
    pub metadata: String,
}

/// Why a line was not sent
enum Skip {
    Blank,
    Rejected(String),
}

impl Ingest {
    /// Turn one raw dump line into a request the server will accept
    fn prepare(&self, raw: &[u8]) -> Result<InsertRequest, Skip> {
        let record = BreachRecord::parse_line(raw)
            .map_err(|e| Skip::Rejected(e.to_string()))?
            .ok_or(Skip::Blank)?;
        let request = self.request(record);
        request.validate().map_err(Skip::Rejected)?;
        Ok(request)
    }

    fn request(&self, record: BreachRecord) -> InsertRequest {
        let mut request = record.into_request(self.phase);
        request.metadata = self.metadata.clone().into_bytes();
        request.num_variants = self.num_variants;
        request.include_username_variant = self.include_username_variant;
        request.use_external_generator = self.external_generator;
        request
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {source}")]
    Api {
        line: usize,
        #[source]
        source: ApiError,
    },
}

/// Totals over every record sent
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub records: usize,
    pub skipped_lines: usize,
    pub appended: usize,
    pub duplicates: usize,
    pub substituted: usize,
    pub collisions: usize,
}

impl IngestSummary {
    fn add(&mut self, report: &InsertReport) {
        self.records += 1;
        self.appended += report.appended;
        self.duplicates += report.duplicates;
        self.substituted += report.substituted;
        self.collisions += report.collisions;
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ingested {} records", self.records)?;
        writeln!(f, "  appended:      {}", self.appended)?;
        writeln!(f, "  duplicates:    {}", self.duplicates)?;
        writeln!(f, "  substituted:   {}", self.substituted)?;
        writeln!(f, "  collisions:    {}", self.collisions)?;
        write!(f, "  skipped lines: {}", self.skipped_lines)
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ingest {
    type Error = IngestError;
    type Output = IngestSummary;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let read_error = |source| IngestError::Read {
            path: self.file.clone(),
            source,
        };
        let file = tokio::fs::File::open(&self.file).await.map_err(read_error)?;
        let mut lines = BufReader::new(file).split(b'\n');

        let mut summary = IngestSummary::default();
        let mut line = 0;
        while let Some(raw) = lines.next_segment().await.map_err(read_error)? {
            line += 1;
            let request = match self.prepare(&raw) {
                Ok(request) => request,
                Err(Skip::Blank) => continue,
                Err(Skip::Rejected(reason)) => {
                    eprintln!("line {}: {}, skipping", line, reason);
                    summary.skipped_lines += 1;
                    continue;
                }
            };

            match ctx.client.call(request).await {
                Ok(report) => summary.add(&report),
                // the server refused this record; the rest of the dump still goes in
                Err(ApiError::HttpStatus(status, msg)) if status.is_client_error() => {
                    eprintln!("line {}: rejected ({}): {}, skipping", line, status, msg);
                    summary.skipped_lines += 1;
                }
                Err(source) => return Err(IngestError::Api { line, source }),
            }
        }

        Ok(summary)
    }
}
