//! Line-oriented JSON reporter.

use std::io::{self, Write};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::sync::Mutex;
use vigil_core::{Context, Reporter, Status};

/// Writes `{"<probe>": "ok" | "<error>"}` followed by a newline for every
/// status it receives.
pub struct WriterReporter<W> {
    writer: Mutex<W>,
}

impl WriterReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> WriterReporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send + 'static> Reporter for WriterReporter<W> {
    fn name(&self) -> &str {
        "writer"
    }

    async fn report(&self, _ctx: &Context, status: &Status) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(&status.summary()).context("failed to encode status")?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).context("failed to write status")?;
        writer.flush().context("failed to flush status")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use vigil_core::ProbeError;

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn writes_one_line_per_status() {
        let reporter = WriterReporter::new(Vec::new());
        let ctx = Context::background();

        let healthy = Status::builder().with("db", None).finish(Duration::ZERO);
        let failing = Status::builder()
            .with("db", None)
            .with("cache", Some(ProbeError::check(anyhow::anyhow!("refused"))))
            .finish(Duration::ZERO);

        reporter.report(&ctx, &healthy).await.unwrap();
        reporter.report(&ctx, &failing).await.unwrap();

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines, [r#"{"db":"ok"}"#, r#"{"cache":"refused","db":"ok"}"#]);
    }

    #[tokio::test]
    async fn empty_status_writes_empty_object() {
        let reporter = WriterReporter::new(Vec::new());
        reporter
            .report(&Context::background(), &Status::default())
            .await
            .unwrap();
        assert_eq!(reporter.into_inner(), b"{}\n");
    }

    #[tokio::test]
    async fn write_errors_are_returned() {
        let reporter = WriterReporter::new(Broken);
        let err = reporter
            .report(&Context::background(), &Status::default())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("closed"));
    }
}
