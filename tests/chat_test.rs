use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use sale_backend::chat::GroupLayer;
use sale_backend::db::DatabaseManager;
use sale_backend::server::{create_server, AppState};
use sale_backend::storage::SqliteStorage;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the full router on an ephemeral port.
async fn spawn_server(layer: Arc<GroupLayer>) -> Result<SocketAddr> {
    let db = Arc::new(DatabaseManager::in_memory()?);
    db.run_migrations()?;
    let storage = Arc::new(SqliteStorage::new(db));
    let app = create_server(AppState::new(storage, layer, "chat"));

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let server = hyper::Server::from_tcp(listener)?.serve(app.into_make_service());
    tokio::spawn(server);
    Ok(addr)
}

async fn wait_for_members(layer: &GroupLayer, expected: usize) -> Result<()> {
    for _ in 0..200 {
        if layer.member_count("chat") == expected {
            return Ok(());
        }
        sleep(Duration::from_millis(10)).await;
    }
    Err(anyhow!(
        "chat group has {} members, expected {expected}",
        layer.member_count("chat")
    ))
}

async fn next_message(client: &mut Client) -> Result<Message> {
    let frame = timeout(Duration::from_secs(5), client.next())
        .await?
        .ok_or_else(|| anyhow!("socket closed"))??;
    Ok(frame)
}

#[tokio::test]
async fn chat_relays_json_to_every_member() -> Result<()> {
    let layer = Arc::new(GroupLayer::new(16));
    let addr = spawn_server(layer.clone()).await?;

    let (mut first, _) = connect_async(format!("ws://{addr}/chat/")).await?;
    let (mut second, _) = connect_async(format!("ws://{addr}/chat?room=main")).await?;
    wait_for_members(&layer, 2).await?;

    // Not JSON: dropped, and the socket stays usable.
    first.send(Message::Text("not json".to_string())).await?;
    let payload = r#"{"msg":"hi","n":[1,2]}"#;
    first.send(Message::Text(payload.to_string())).await?;

    for client in [&mut first, &mut second] {
        assert_eq!(next_message(client).await?, Message::Text(payload.to_string()));
    }

    second.send(Message::Text("42".to_string())).await?;
    for client in [&mut first, &mut second] {
        assert_eq!(next_message(client).await?, Message::Text("42".to_string()));
    }

    first.close(None).await?;
    wait_for_members(&layer, 1).await?;
    second.close(None).await?;
    wait_for_members(&layer, 0).await?;
    Ok(())
}

#[tokio::test]
async fn members_joining_later_miss_earlier_messages() -> Result<()> {
    let layer = Arc::new(GroupLayer::new(16));
    let addr = spawn_server(layer.clone()).await?;

    let (mut early, _) = connect_async(format!("ws://{addr}/chat/")).await?;
    wait_for_members(&layer, 1).await?;
    early.send(Message::Text(r#"{"n":1}"#.to_string())).await?;
    assert_eq!(next_message(&mut early).await?, Message::Text(r#"{"n":1}"#.to_string()));

    let (mut late, _) = connect_async(format!("ws://{addr}/chat/")).await?;
    wait_for_members(&layer, 2).await?;
    early.send(Message::Text(r#"{"n":2}"#.to_string())).await?;
    assert_eq!(next_message(&mut late).await?, Message::Text(r#"{"n":2}"#.to_string()));

    early.close(None).await?;
    late.close(None).await?;
    wait_for_members(&layer, 0).await?;
    Ok(())
}
