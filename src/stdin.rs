use tokio::select;
use tokio::{
    io::{stdin, AsyncBufReadExt, AsyncRead, BufReader},
    sync::{mpsc, oneshot},
};
use tracing::warn;

use crate::error::{IndexError, Result};
use crate::hash_index::HashIndex;
use crate::page_store::FilePageStore;
use crate::repl::execute_user_input;

/// Runs every line of stdin as a command, then closes the index.
pub async fn process_from_stdin(index: HashIndex<FilePageStore>) -> Result<()> {
    let (send, mut recv) = mpsc::channel::<String>(100);
    let (ctlrs, mut ctlrc) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctlrs.send(());
        }
    });

    let read_task = tokio::spawn(async move {
        read_line_from_stdin(BufReader::new(stdin()), &send).await;
    });

    let process_task = tokio::spawn(async move {
        process_lines_from_stdin(index, &mut recv, &mut ctlrc).await
    });

    let processed = process_task
        .await
        .map_err(|err| IndexError::io("stdin processing")(std::io::Error::other(err)));
    read_task.abort();
    processed?
}

async fn process_lines_from_stdin(
    index: HashIndex<FilePageStore>,
    reciever: &mut mpsc::Receiver<String>,
    ctlrc_signal: &mut oneshot::Receiver<()>,
) -> Result<()> {
    loop {
        select! {
            Ok(()) = &mut *ctlrc_signal => {
                break;
            }
            line = reciever.recv() => {
                let Some(line) = line else {
                    break;
                };
                if execute_user_input(&index, Some(&line)).await {
                    break;
                }
            }
        }
    }
    index.close().await?;
    Ok(())
}

async fn read_line_from_stdin<R: AsyncRead + Unpin>(
    reader: BufReader<R>,
    send: &mpsc::Sender<String>,
) {
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if send.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "failed to read from stdin");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_are_forwarded_until_eof() {
        let (send, mut recv) = mpsc::channel::<String>(10);
        let input: &[u8] = b"PUT a #1:1\nGET a\n";
        read_line_from_stdin(BufReader::new(input), &send).await;
        drop(send);
        assert_eq!(recv.recv().await.as_deref(), Some("PUT a #1:1"));
        assert_eq!(recv.recv().await.as_deref(), Some("GET a"));
        assert_eq!(recv.recv().await, None);
    }
}
