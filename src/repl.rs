use tokio::io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::select;
use tokio::sync::oneshot::{channel, Receiver};
use tracing::error;

use crate::command::Command;
use crate::error::Result;
use crate::execute::execute_command;
use crate::hash::KeyHasher;
use crate::hash_index::HashIndex;
use crate::page_store::{FilePageStore, PageStore};

pub async fn run_repl(index: HashIndex<FilePageStore>) -> Result<()> {
    // Make a oneshot
    // Send the sender to another task awaiting ctrl-c
    // Send the receiver to inner loop who does a select! between waiting
    // for input and waiting for ctrl-c

    let (sender, mut receiver) = channel::<()>();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = sender.send(());
            }
            Err(err) => {
                error!(error = %err, "unable to listen for ctrl-c");
                // hold the sender so the receiver stays pending
                std::future::pending::<()>().await;
            }
        }
    });

    println!("Welcome to ehindex!");
    let mut reader = BufReader::new(stdin()).lines();
    loop {
        if inner_loop(&index, &mut reader, &mut receiver).await {
            break;
        };
    }
    index.close().await?;
    println!("Goodbye!");
    Ok(())
}

/// Parses and runs one line. Returns true once the session should end.
pub(crate) async fn execute_user_input<S: PageStore, H: KeyHasher>(
    index: &HashIndex<S, H>,
    input: Option<&str>,
) -> bool {
    let Some(input) = input else {
        return true;
    };
    if input.trim().is_empty() {
        return false;
    }

    match input.parse::<Command>() {
        Err(err) => println!("Error: {}", err),
        Ok(cmd) => {
            let should_quit = cmd == Command::Exit;
            match execute_command(cmd, index).await {
                Ok(output) => println!("{}", output),
                Err(err) => {
                    error!(error = %err, "command failed");
                    println!("Error: {}", err);
                }
            }
            return should_quit;
        }
    }
    false
}

async fn inner_loop(
    index: &HashIndex<FilePageStore>,
    reader: &mut Lines<BufReader<Stdin>>,
    receiver: &mut Receiver<()>,
) -> bool {
    select! {
        Ok(()) = &mut *receiver => {
            println!("Received ctrl-c");
            execute_user_input(index, Some("EXIT")).await
        }
        input = reader.next_line() => {
            match input {
                Ok(line) => execute_user_input(index, line.as_deref()).await,
                Err(err) => {
                    error!(error = %err, "failed to read from stdin");
                    true
                }
            }
        }
    }
}
