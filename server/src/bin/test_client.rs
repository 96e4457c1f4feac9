use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Scripted probe against a running server: signs up, joins, wanders for a
/// few seconds while printing the snapshots it receives, says one chat
/// line, and leaves cleanly.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = "ws://127.0.0.1:8080";
    println!("Connecting to {}", url);
    let (mut ws, _) = connect_async(url).await?;

    // First frame is always the init with our future player id.
    let init = next_message(&mut ws).await?;
    if init["type"] != "init" {
        println!("Expected init but got: {}", init);
        return Ok(());
    }
    let my_id = init["id"].as_str().unwrap_or_default().to_string();
    println!("Server assigned id {}", my_id);

    // Sign up under a throwaway username so reruns never collide.
    let username = format!("probe-{}", std::process::id());
    send(
        &mut ws,
        json!({ "type": "signup", "username": username, "password": "probe" }),
    )
    .await?;
    let reply = next_message(&mut ws).await?;
    if reply["type"] != "signup" || reply["success"] != true {
        println!("Signup failed: {}", reply);
        return Ok(());
    }
    println!("Signed up as {}", username);

    send(
        &mut ws,
        json!({ "type": "join", "name": "Probe", "faction": "blue" }),
    )
    .await?;

    // Wander on a small circle and report what the snapshots say.
    for i in 0..10u32 {
        let angle = i as f32 / 5.0;
        let x = 400.0 + 50.0 * angle.cos();
        let y = 300.0 + 50.0 * angle.sin();
        send(
            &mut ws,
            json!({ "type": "move", "position": { "x": x, "y": y, "rotY": angle } }),
        )
        .await?;

        match next_of_type(&mut ws, "update").await {
            Ok(update) => {
                let players = update["players"].as_object();
                let count = players.map(|p| p.len()).unwrap_or(0);
                let me = players.and_then(|p| p.get(my_id.as_str()));
                match me {
                    Some(me) => println!(
                        "Snapshot: {} players, self at ({:.1}, {:.1}) health {}",
                        count,
                        me["position"]["x"].as_f64().unwrap_or(0.0),
                        me["position"]["y"].as_f64().unwrap_or(0.0),
                        me["health"]
                    ),
                    None => println!("Snapshot: {} players, self missing", count),
                }
            }
            Err(e) => println!("No snapshot received: {}", e),
        }
        sleep(Duration::from_millis(500)).await;
    }

    send(&mut ws, json!({ "type": "chat", "message": "probe complete" })).await?;
    match next_of_type(&mut ws, "chat").await {
        Ok(chat) => println!("Chat echoed back: {} says {:?}", chat["name"], chat["message"]),
        Err(e) => println!("Chat did not come back: {}", e),
    }

    println!("Leaving game");
    send(&mut ws, json!({ "type": "leaveGame" })).await?;

    // Drain until the server closes the socket.
    while let Ok(Some(frame)) = timeout(Duration::from_secs(2), ws.next()).await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => continue,
        }
    }
    println!("Server closed the connection, probe finished");

    Ok(())
}

async fn send<S>(ws: &mut S, payload: Value) -> Result<(), Box<dyn std::error::Error>>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::error::Error + 'static,
{
    ws.send(Message::text(payload.to_string())).await?;
    Ok(())
}

/// Next text frame parsed as JSON, with a read timeout.
async fn next_message<S>(ws: &mut S) -> Result<Value, Box<dyn std::error::Error>>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = timeout(Duration::from_secs(3), ws.next())
            .await?
            .ok_or("connection closed")??;
        if let Message::Text(text) = frame {
            return Ok(serde_json::from_str(text.as_str())?);
        }
    }
}

/// Skips frames until one with the wanted `type` tag arrives.
async fn next_of_type<S>(ws: &mut S, wanted: &str) -> Result<Value, Box<dyn std::error::Error>>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        if tokio::time::Instant::now() >= deadline {
            return Err("timed out waiting for message".into());
        }
        let message = next_message(ws).await?;
        if message["type"] == wanted {
            return Ok(message);
        }
    }
}
