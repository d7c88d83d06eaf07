//! Newline-delimited JSON server.

use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

use super::service::{GateResponse, GateService};
use crate::error::Result;

/// Longest request line accepted, excluding the trailing newline.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Serves gate requests from a line-oriented stream.
///
/// Each input line is one JSON request; each response is written as one JSON
/// line and flushed immediately so callers can pipeline requests. Lines
/// longer than `max_line_bytes` are skipped and answered with an error.
pub struct LineServer {
    service: GateService,
    max_line_bytes: usize,
}

enum ReadLine {
    Line(String),
    TooLong,
    Eof,
}

impl LineServer {
    pub fn new(service: GateService) -> Self {
        Self {
            service,
            max_line_bytes: MAX_LINE_BYTES,
        }
    }

    /// Override the request line cap.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Serve until the input reaches end of file.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.serve_with_shutdown(reader, writer, std::future::pending())
            .await
    }

    /// Serve until the input ends or the provided signal resolves.
    pub async fn serve_with_shutdown<R, W, F>(
        &self,
        mut reader: R,
        mut writer: W,
        signal: F,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        info!(max_line_bytes = self.max_line_bytes, "Serving gate requests");

        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Shutdown signal received, stopping line server");
                    break;
                }
                line = read_line(&mut reader, self.max_line_bytes) => {
                    let response = match line {
                        Ok(ReadLine::Line(line)) => self.service.handle_line(&line),
                        Ok(ReadLine::TooLong) => {
                            warn!(max_line_bytes = self.max_line_bytes, "Discarded oversized request line");
                            Some(GateResponse::Error {
                                message: format!(
                                    "Request line exceeds {} bytes",
                                    self.max_line_bytes
                                ),
                            })
                        }
                        Ok(ReadLine::Eof) => {
                            info!("Input closed, stopping line server");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to read request");
                            return Err(e.into());
                        }
                    };

                    if let Some(response) = response {
                        let mut out = serde_json::to_vec(&response)?;
                        out.push(b'\n');
                        writer.write_all(&out).await?;
                        writer.flush().await?;
                    }
                }
            }
        }

        writer.flush().await?;
        Ok(())
    }
}

/// Read one line of at most `max` bytes, discarding the rest of a longer one.
async fn read_line<R>(reader: &mut R, max: usize) -> std::io::Result<ReadLine>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max as u64 + 1;
    let mut buf = Vec::new();

    if (&mut *reader).take(limit).read_until(b'\n', &mut buf).await? == 0 {
        return Ok(ReadLine::Eof);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max {
        loop {
            let mut rest = Vec::new();
            let read = (&mut *reader).take(limit).read_until(b'\n', &mut rest).await?;
            if read == 0 || rest.last() == Some(&b'\n') {
                break;
            }
        }
        return Ok(ReadLine::TooLong);
    }

    Ok(ReadLine::Line(String::from_utf8_lossy(&buf).into_owned()))
}
