use anyhow::Result;
use threadline_storage::SessionStore;

use crate::build_storage;

pub(crate) async fn show(user_id: &str) -> Result<()> {
    let storage = build_storage().await?;
    match storage.get_session(user_id).await? {
        Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
        None => println!("No session found for user: {user_id}"),
    }
    Ok(())
}

pub(crate) async fn clear(user_id: &str) -> Result<()> {
    let storage = build_storage().await?;
    if storage.delete_session(user_id).await? {
        println!("Session deleted for user: {user_id}");
    } else {
        println!("No session found for user: {user_id}");
    }
    Ok(())
}
