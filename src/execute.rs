use crate::command::Command;
use crate::error::Result;
use crate::hash::KeyHasher;
use crate::hash_index::HashIndex;
use crate::page_store::PageStore;

/// Run one command against the index and render its reply.
pub async fn execute_command<S: PageStore, H: KeyHasher>(
    cmd: Command,
    index: &HashIndex<S, H>,
) -> Result<String> {
    let output = match cmd {
        Command::Put(key, rid) => {
            index.put(&key, rid).await?;
            "OK".to_string()
        }
        Command::Get(key) => match index.get(&key).await? {
            Some(rid) => rid.to_string(),
            None => "Key not found".to_string(),
        },
        Command::Delete(key) => {
            if index.remove(&key).await? {
                "Deleted".to_string()
            } else {
                "Key not found".to_string()
            }
        }
        Command::Contains(key) => index.contains(&key).await?.to_string(),
        Command::Count(key) => index.count(&key).await?.to_string(),
        Command::Size => index.size().await.to_string(),
        Command::Stats => {
            let stats = index.stats().await?;
            format!(
                "size {} nodes {}/{} buckets {}/{} depth {}",
                stats.size,
                stats.live_nodes,
                stats.node_table_len,
                stats.bucket_pages - stats.free_buckets,
                stats.bucket_pages,
                stats.max_global_depth
            )
        }
        Command::Flush | Command::Exit => {
            index.flush().await?;
            "OK".to_string()
        }
        Command::Clear => {
            index.clear().await?;
            "OK".to_string()
        }
    };
    Ok(output)
}
