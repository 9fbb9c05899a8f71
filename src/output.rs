use crate::metrics::stats::StatsSnapshot;
use anyhow::Result;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

pub enum OutputWriter {
    Csv(BufWriter<tokio::fs::File>),
    Stdout,
}

impl OutputWriter {
    pub async fn new_csv(path: String) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = File::create(&path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(StatsSnapshot::csv_header().as_bytes()).await?;
        writer.write_all(b"\n").await?;

        info!(%path, "writing CSV snapshots");
        Ok(Self::Csv(writer))
    }

    pub fn new_stdout() -> Self {
        println!("{}", StatsSnapshot::csv_header());
        Self::Stdout
    }

    pub async fn write_snapshot(&mut self, snapshot: &StatsSnapshot) -> Result<()> {
        match self {
            Self::Csv(writer) => {
                writer.write_all(snapshot.to_csv_row().as_bytes()).await?;
                writer.write_all(b"\n").await?;
                // Flush so tailing readers see progress promptly
                writer.flush().await?;
            }
            Self::Stdout => {
                println!("{}", snapshot.to_csv_row());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::stats::Stats;

    #[tokio::test]
    async fn csv_file_gets_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/run.csv");
        let mut out = OutputWriter::new_csv(path.to_str().unwrap().to_string()).await.unwrap();
        let stats = Stats::new();
        stats.record_batch(3, 100).await;
        out.write_snapshot(&stats.snapshot().await).await.unwrap();
        drop(out);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], StatsSnapshot::csv_header());
        assert_eq!(lines[1].split(',').nth(1), Some("3"));
    }
}
